use anyhow::Result;
use clap::{Parser, Subcommand};
use facecard_core::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod capture;
mod commands;
mod config;
mod engine;
mod prompt;

use config::Config;

#[derive(Parser)]
#[command(name = "facecard", about = "Face enrollment, recognition and biometric QR cards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Photograph a person into the dataset
    Capture {
        /// Person's name; becomes the dataset folder and label
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Build the enrollment store from the dataset
    Train,
    /// Identify the faces in one picture
    Recognize {
        /// Match tolerance (default 1.095, ArcFace cosine 0.40)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Existing image; prompts for capture or file when absent
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Recognize faces continuously from the camera
    Live {
        /// Match tolerance; prompted when absent
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Create a biometric QR card from a photo
    QrCreate {
        /// Existing image; prompts for capture or file when absent
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Validate a camera photo against a QR card
    QrValidate {
        /// QR card image
        #[arg(long)]
        qr: Option<PathBuf>,
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Validate every image in a folder against a QR card
    QrValidateFolder {
        /// QR card image
        #[arg(long)]
        qr: Option<PathBuf>,
        /// Folder of images to validate
        #[arg(short, long)]
        folder: Option<PathBuf>,
        #[arg(short, long)]
        threshold: Option<f32>,
    },
}

/// Kind of the first error in the chain that carries one.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    use facecard_core::carrier::CarrierError;
    use facecard_core::dataset::DatasetError;
    use facecard_core::payload::PayloadError;
    use facecard_core::validation::ValidationError;
    use facecard_core::{ProviderError, StoreError};

    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ValidationError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<CarrierError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<PayloadError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<StoreError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<DatasetError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<ProviderError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<engine::EngineError>() {
            Some(e.kind())
        } else if cause.is::<facecard_hw::CameraError>() {
            Some(ErrorKind::DeviceUnavailable)
        } else if let Some(e) = cause.downcast_ref::<prompt::InputError>() {
            Some(e.kind())
        } else if cause.is::<std::io::Error>() {
            Some(ErrorKind::Io)
        } else {
            None
        }
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Capture { name } => commands::capture::run(&config, name),
        Commands::Train => commands::train::run(&config),
        Commands::Recognize { threshold, image } => commands::recognize::run(&config, threshold, image),
        Commands::Live { threshold } => commands::live::run(&config, threshold),
        Commands::QrCreate { image } => commands::qr::create(&config, image),
        Commands::QrValidate { qr, threshold } => commands::qr::validate(&config, qr, threshold),
        Commands::QrValidateFolder {
            qr,
            folder,
            threshold,
        } => commands::qr::validate_folder(&config, qr, folder, threshold),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match error_kind(&e) {
                Some(kind) => tracing::error!(%kind, "{e:#}"),
                None => tracing::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_folder_validation() {
        let cli = Cli::try_parse_from([
            "facecard",
            "qr-validate-folder",
            "--qr",
            "card.png",
            "--folder",
            "shots",
            "--threshold",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::QrValidateFolder { qr, folder, threshold } => {
                assert_eq!(qr, Some(PathBuf::from("card.png")));
                assert_eq!(folder, Some(PathBuf::from("shots")));
                assert_eq!(threshold, Some(0.5));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_error_kind_through_context() {
        let err = anyhow::Error::from(facecard_core::validation::ValidationError::NoDetection)
            .context("validating probe.jpg");
        assert_eq!(error_kind(&err), Some(ErrorKind::NoDetection));

        let err = anyhow::Error::from(prompt::parse_threshold("abc").unwrap_err());
        assert_eq!(error_kind(&err), Some(ErrorKind::InputValidation));

        let err = anyhow::Error::from(facecard_hw::CameraError::DeviceBusy).context("opening /dev/video0");
        assert_eq!(error_kind(&err), Some(ErrorKind::DeviceUnavailable));

        assert_eq!(error_kind(&anyhow::anyhow!("plain")), None);
    }
}

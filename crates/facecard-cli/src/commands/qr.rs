//! Biometric QR cards: create one from a photo, validate faces against one.

use crate::capture::Controls;
use crate::config::Config;
use crate::engine;
use crate::prompt;
use anyhow::{Context, Result};
use facecard_core::annotate::{self, RED};
use facecard_core::validation::{self, BatchOutcome, ValidationError};
use facecard_core::{carrier, dataset, BiometricPayload, EmbeddingProvider, FirstMatch};
use std::path::{Path, PathBuf};

/// Label given to every embedding decoded from a card.
const CARD_LABEL: &str = "card";
/// Side of the QR thumbnail pasted onto the final image.
const QR_THUMBNAIL: u32 = 150;
const QR_OFFSET: i64 = 10;

/// `facecard qr-create`
pub fn create(config: &Config, image: Option<PathBuf>) -> Result<()> {
    let Some(acquired) = super::acquire_image(config, image, &config.output_dir)? else {
        tracing::info!("capture aborted");
        return Ok(());
    };

    let result = engine::load_provider(config)
        .map_err(anyhow::Error::from)
        .and_then(|mut provider| create_card(config, &mut provider, &acquired.path));

    if acquired.captured {
        match std::fs::remove_file(&acquired.path) {
            Ok(()) => tracing::debug!(path = %acquired.path.display(), "captured photo removed"),
            Err(e) => tracing::warn!(path = %acquired.path.display(), error = %e, "failed to remove captured photo"),
        }
    }
    result
}

fn create_card<P: EmbeddingProvider + ?Sized>(
    config: &Config,
    provider: &mut P,
    image_path: &Path,
) -> Result<()> {
    let mut image = dataset::load_image(image_path)?;

    tracing::info!("detecting faces");
    let detections = provider.detect_and_embed(&image)?;
    if detections.is_empty() {
        return Err(ValidationError::NoDetection.into());
    }
    let payload = BiometricPayload::from_detections(&detections, config.payload_precision);

    let ts = super::timestamp("%Y-%m-%d_%H-%M-%S");
    let folder = config.qr_codes_dir().join(&ts);
    super::ensure_dir(&folder)?;

    let json_path = folder.join(format!("biometric_data_{ts}.json"));
    std::fs::write(&json_path, payload.to_json_pretty()?)
        .with_context(|| format!("writing {}", json_path.display()))?;
    tracing::info!(path = %json_path.display(), faces = payload.len(), "biometric data saved");

    let qr = carrier::encode(&payload)?;
    let qr_path = folder.join(format!("biometric_qr_{ts}.png"));
    qr.save(&qr_path)
        .with_context(|| format!("saving {}", qr_path.display()))?;
    tracing::info!(path = %qr_path.display(), side = qr.width(), "QR code saved");

    for detection in &detections {
        annotate::draw_region(&mut image, &detection.region, RED, 3);
    }
    annotate::overlay_qr(&mut image, &qr, QR_THUMBNAIL, QR_OFFSET, QR_OFFSET);
    super::save_image(&image, &folder.join(format!("final_image_{ts}.png")))?;
    Ok(())
}

/// Folder runs only take PNG and JPEG files.
fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Decode a card image into its payload.
fn read_card(qr_path: &Path) -> Result<BiometricPayload> {
    tracing::info!(path = %qr_path.display(), "detecting QR code");
    let image = dataset::load_image(qr_path)?;
    let payload = carrier::decode(&image::imageops::grayscale(&image))?;
    tracing::info!(faces = payload.len(), "biometric data loaded from QR code");
    Ok(payload)
}

/// `facecard qr-validate`
pub fn validate(config: &Config, qr: Option<PathBuf>, threshold: Option<f32>) -> Result<()> {
    let qr = prompt::path(qr, "Enter the path to the QR code image file", "QR code path")?;
    let threshold = prompt::threshold(threshold)?;

    let temp_dir = config.temp_validation_dir();
    let result = validate_with_camera(config, &qr, threshold, &temp_dir);

    if temp_dir.exists() {
        match std::fs::remove_dir_all(&temp_dir) {
            Ok(()) => tracing::info!(path = %temp_dir.display(), "temporary directory deleted"),
            Err(e) => tracing::warn!(path = %temp_dir.display(), error = %e, "failed to delete temporary directory"),
        }
    }
    result
}

fn validate_with_camera(config: &Config, qr: &Path, threshold: f32, temp_dir: &Path) -> Result<()> {
    let payload = read_card(qr)?;
    let candidates = payload.candidates(CARD_LABEL);
    let mut provider = engine::load_provider(config)?;

    let camera = engine::open_camera(config)?;
    let controls = Controls::spawn();
    tracing::info!("capturing picture for validation");
    let Some(photo) = crate::capture::capture_to(&camera, &controls, temp_dir)? else {
        tracing::error!("picture capture aborted");
        return Ok(());
    };
    let image = dataset::load_image(&photo)?;

    let verdict = validation::validate_image(
        &mut provider,
        &FirstMatch::new(),
        &candidates,
        &image,
        threshold,
    )?;

    let results_dir = config.validation_results_dir();
    super::ensure_dir(&results_dir)?;
    let out = results_dir.join(format!("result_{}.jpg", super::timestamp("%Y%m%d_%H%M%S")));
    super::save_image(&verdict.annotated, &out)?;

    for face in &verdict.faces {
        tracing::info!(
            matched = face.result.matched,
            confidence = ?face.result.confidence,
            distance = ?face.result.distance,
            threshold,
            "face compared"
        );
    }
    if verdict.matched {
        tracing::info!("SUCCESS: the person matches the biometric data");
    } else {
        tracing::info!("FAILURE: the person does not match the biometric data");
    }
    Ok(())
}

/// `facecard qr-validate-folder`
pub fn validate_folder(
    config: &Config,
    qr: Option<PathBuf>,
    folder: Option<PathBuf>,
    threshold: Option<f32>,
) -> Result<()> {
    let qr = prompt::path(qr, "Enter the path to the QR code image file", "QR code path")?;
    let folder = prompt::path(
        folder,
        "Enter the path to the folder containing images",
        "folder path",
    )?;
    let threshold = prompt::threshold(threshold)?;

    let payload = read_card(&qr)?;
    let candidates = payload.candidates(CARD_LABEL);
    let mut provider = engine::load_provider(config)?;

    let run_dir = config
        .validation_results_dir()
        .join(format!("run_{}", super::timestamp("%Y%m%d_%H%M%S")));
    super::ensure_dir(&run_dir)?;

    let paths: Vec<PathBuf> = dataset::list_images(&folder, false)?
        .into_iter()
        .filter(|p| is_photo(p))
        .collect();
    tracing::info!(folder = %folder.display(), images = paths.len(), "validating folder");
    let inputs = dataset::load_images(&paths);

    let items = validation::validate_batch(
        &mut provider,
        &FirstMatch::new(),
        &candidates,
        inputs,
        threshold,
    );

    let mut matched = 0usize;
    for item in &items {
        if item.outcome == BatchOutcome::Matched {
            matched += 1;
        }
        let Some(annotated) = &item.annotated else {
            continue;
        };
        let out = run_dir.join(format!("result_{}", item.file_name));
        if let Err(e) = super::save_image(annotated, &out) {
            tracing::error!(file = %item.file_name, error = %format!("{e:#}"), "failed to save result");
        }
    }

    let report = run_dir.join("report.json");
    std::fs::write(&report, serde_json::to_string_pretty(&items)?)
        .with_context(|| format!("writing {}", report.display()))?;

    tracing::info!(
        total = items.len(),
        matched,
        report = %report.display(),
        "folder validation complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_photo() {
        assert!(is_photo(Path::new("a/IMG_01.JPG")));
        assert!(is_photo(Path::new("b.jpeg")));
        assert!(is_photo(Path::new("c.png")));
        assert!(!is_photo(Path::new("d.bmp")));
        assert!(!is_photo(Path::new("e")));
    }
}

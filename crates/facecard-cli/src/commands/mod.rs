//! One module per subcommand.

pub mod capture;
pub mod live;
pub mod qr;
pub mod recognize;
pub mod train;

use crate::capture::{self as frames, Controls};
use crate::config::Config;
use crate::engine;
use crate::prompt::{self, ImageSource, InputError};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// An image chosen for a single-shot command.
pub(crate) struct Acquired {
    pub path: PathBuf,
    /// Taken by us from the camera, so ours to delete.
    pub captured: bool,
}

/// Resolve the probe image: `given`, or ask whether to capture one into
/// `capture_dir` or name an existing file. `None` when the capture is
/// aborted.
pub(crate) fn acquire_image(
    config: &Config,
    given: Option<PathBuf>,
    capture_dir: &Path,
) -> Result<Option<Acquired>> {
    let source = match given {
        Some(_) => ImageSource::File,
        None => prompt::image_source()?,
    };

    match source {
        ImageSource::Capture => {
            let camera = engine::open_camera(config)?;
            let controls = Controls::spawn();
            let path = frames::capture_to(&camera, &controls, capture_dir)?;
            Ok(path.map(|path| Acquired {
                path,
                captured: true,
            }))
        }
        ImageSource::File => {
            let path = prompt::path(given, "Enter the path to the image", "image path")?;
            if !path.is_file() {
                return Err(InputError::FileNotFound(path).into());
            }
            Ok(Some(Acquired {
                path,
                captured: false,
            }))
        }
    }
}

/// Local time formatted with `fmt`, for file and folder names.
pub(crate) fn timestamp(fmt: &str) -> String {
    chrono::Local::now().format(fmt).to_string()
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

/// Save an image; the format follows the file extension.
pub(crate) fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    tracing::info!(path = %path.display(), "image saved");
    Ok(())
}

/// File name of `path` as text, falling back to the whole path.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

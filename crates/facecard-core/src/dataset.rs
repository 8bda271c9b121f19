//! Image discovery and decoding.
//!
//! A dataset directory holds one subdirectory per identity; every image's
//! label is the name of the folder that contains it.

use crate::error::ErrorKind;
use image::RgbImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("folder not found: {0}")]
    FolderNotFound(PathBuf),
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl DatasetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatasetError::FolderNotFound(_) => ErrorKind::InputValidation,
            DatasetError::Image { .. } => ErrorKind::Io,
        }
    }
}

/// A decoded image with its identity label.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub label: String,
    pub path: PathBuf,
    pub image: RgbImage,
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files under `folder`, sorted by path.
///
/// `recursive = false` looks at direct children only.
pub fn list_images(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>, DatasetError> {
    if !folder.is_dir() {
        return Err(DatasetError::FolderNotFound(folder.to_path_buf()));
    }

    let walker = WalkDir::new(folder).max_depth(if recursive { usize::MAX } else { 1 });
    let mut images: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_path(e.path()))
        .map(|e| e.into_path())
        .collect();

    images.sort();
    Ok(images)
}

/// Label for a dataset image: its parent folder's name.
pub fn label_for(path: &Path) -> Option<String> {
    path.parent()?
        .file_name()?
        .to_str()
        .map(|s| s.to_string())
}

/// Decode an image file to RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, DatasetError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Decode many images in parallel; output order matches `paths`.
pub fn load_images(paths: &[PathBuf]) -> Vec<(PathBuf, Result<RgbImage, DatasetError>)> {
    paths
        .par_iter()
        .map(|p| (p.clone(), load_image(p)))
        .collect()
}

/// Scan and decode a dataset directory.
///
/// Unreadable files are logged and left out; the order of the remaining
/// images is path order.
pub fn load_dataset(root: &Path) -> Result<Vec<LabeledImage>, DatasetError> {
    let paths = list_images(root, true)?;
    tracing::info!(root = %root.display(), images = paths.len(), "scanning dataset");

    let mut samples = Vec::with_capacity(paths.len());
    for (path, decoded) in load_images(&paths) {
        let Some(label) = label_for(&path) else {
            tracing::warn!(path = %path.display(), "cannot derive label; skipping");
            continue;
        };
        match decoded {
            Ok(image) => samples.push(LabeledImage { label, path, image }),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable image"),
        }
    }
    Ok(samples)
}

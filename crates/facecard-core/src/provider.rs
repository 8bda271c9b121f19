//! Embedding provider: image in, face regions paired with embeddings out.

use crate::detector::{DetectorError, FaceDetector};
use crate::error::ErrorKind;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Detection, FaceRegion};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Provider
    }
}

/// Detects faces and computes one embedding per face.
///
/// Regions and embeddings come from the same detection pass and are paired
/// 1:1. An image without faces yields an empty vector, not an error.
pub trait EmbeddingProvider {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ProviderError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ProviderError> {
        (**self).detect_and_embed(image)
    }
}

/// SCRFD detection + ArcFace recognition on the grayscale image.
pub struct OnnxProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxProvider {
    pub fn load(detector_model: &Path, recognizer_model: &Path) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(detector_model)?;
        let recognizer = FaceRecognizer::load(recognizer_model)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ProviderError> {
        let gray = image::imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        let faces = self.detector.detect(&gray)?;
        let mut detections = Vec::with_capacity(faces.len());

        for face in &faces {
            if face.landmarks.is_none() {
                tracing::debug!(confidence = face.confidence, "face without landmarks; skipping");
                continue;
            }
            let embedding = self.recognizer.extract(&gray, face)?;
            detections.push(Detection {
                region: FaceRegion::from_box(face.x, face.y, face.width, face.height, width, height),
                embedding,
            });
        }

        tracing::debug!(faces = detections.len(), width, height, "detect_and_embed");
        Ok(detections)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::Rgb;
    use std::collections::HashMap;

    /// Provider keyed by the red channel of the top-left pixel.
    ///
    /// Unknown markers yield no faces; markers registered with `failing`
    /// return an error.
    #[derive(Default)]
    pub struct ScriptedProvider {
        script: HashMap<u8, Vec<Detection>>,
        failing: Vec<u8>,
        pub calls: usize,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, marker: u8, detections: Vec<Detection>) -> Self {
            self.script.insert(marker, detections);
            self
        }

        pub fn failing(mut self, marker: u8) -> Self {
            self.failing.push(marker);
            self
        }

        pub fn marked_image(marker: u8) -> RgbImage {
            let mut img = RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]));
            img.put_pixel(0, 0, Rgb([marker, 0, 0]));
            img
        }
    }

    impl EmbeddingProvider for ScriptedProvider {
        fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ProviderError> {
            self.calls += 1;
            let marker = image.get_pixel(0, 0)[0];
            if self.failing.contains(&marker) {
                return Err(ProviderError::Other(format!("scripted failure for {marker}")));
            }
            Ok(self.script.get(&marker).cloned().unwrap_or_default())
        }
    }
}

//! `facecard recognize`: identify the faces in one picture.

use crate::config::Config;
use crate::engine;
use crate::prompt;
use anyhow::{Context, Result};
use facecard_core::validation::recognize_image;
use facecard_core::{dataset, EnrollmentStore, RecognitionContext};
use std::path::PathBuf;

/// Tolerance used when `--threshold` is not given, calibrated for the
/// ArcFace embeddings the bundled provider produces.
pub const DEFAULT_TOLERANCE: f32 = facecard_core::recognizer::ARCFACE_TOLERANCE;

pub fn run(config: &Config, threshold: Option<f32>, image: Option<PathBuf>) -> Result<()> {
    let threshold = prompt::threshold(Some(threshold.unwrap_or(DEFAULT_TOLERANCE)))?;

    let store = EnrollmentStore::load(&config.store_path)
        .with_context(|| format!("loading store {}", config.store_path.display()))?;
    tracing::info!(entries = store.len(), "encodings loaded");
    let context = RecognitionContext::new(store, threshold);
    let mut provider = engine::load_provider(config)?;

    let Some(acquired) = super::acquire_image(config, image, &config.output_dir)? else {
        tracing::info!("capture aborted");
        return Ok(());
    };
    let image = dataset::load_image(&acquired.path)?;

    let recognition = recognize_image(&mut provider, &context, &image)?;
    if recognition.faces.is_empty() {
        tracing::info!(path = %acquired.path.display(), "no faces detected");
    }
    for face in &recognition.faces {
        tracing::info!(
            name = %face.result.label,
            matched = face.result.matched,
            confidence = ?face.result.confidence,
            distance = ?face.result.distance,
            threshold,
            region = ?<[u32; 4]>::from(face.region),
            "face recognized"
        );
    }

    let out_dir = config.compared_dir();
    super::ensure_dir(&out_dir)?;
    let out = out_dir.join(format!("compared_{}", super::file_name(&acquired.path)));
    super::save_image(&recognition.annotated, &out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecard_core::recognizer::ARCFACE_EMBEDDING_DIM;
    use facecard_core::{find_best_match, Embedding, EnrollmentEntry};

    /// Unit vector at cosine `cos` from the first axis.
    fn unit_at(cos: f32) -> Embedding {
        let mut values = vec![0.0; ARCFACE_EMBEDDING_DIM];
        values[0] = cos;
        values[1] = (1.0 - cos * cos).sqrt();
        Embedding::new(values)
    }

    #[test]
    fn test_default_tolerance_fits_arcface_scale() {
        let gallery = vec![EnrollmentEntry::new("Alice", unit_at(1.0))];

        // Typical same-person ArcFace similarity.
        let same = find_best_match(&unit_at(0.5), &gallery, DEFAULT_TOLERANCE);
        assert!(same.matched);
        assert_eq!(same.label, "Alice");

        // Unrelated faces are near orthogonal.
        let other = find_best_match(&unit_at(0.1), &gallery, DEFAULT_TOLERANCE);
        assert!(!other.matched);
    }
}

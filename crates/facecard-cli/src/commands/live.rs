//! `facecard live`: continuous recognition on camera frames.

use crate::capture::{Command, Controls};
use crate::config::Config;
use crate::engine;
use crate::prompt;
use anyhow::{Context, Result};
use facecard_core::{EmbeddingProvider, EnrollmentStore, RecognitionContext};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Shrink `image` by an integer `factor` for faster detection.
fn downscale(image: RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return image;
    }
    let width = (image.width() / factor).max(1);
    let height = (image.height() / factor).max(1);
    imageops::resize(&image, width, height, FilterType::Triangle)
}

pub fn run(config: &Config, threshold: Option<f32>) -> Result<()> {
    let store = EnrollmentStore::load(&config.store_path)
        .with_context(|| format!("loading store {}", config.store_path.display()))?;
    tracing::info!(entries = store.len(), "encodings loaded");

    let camera = engine::open_camera(config)?;
    let threshold = prompt::threshold(threshold)?;
    let context = RecognitionContext::new(store, threshold);
    let mut provider = engine::load_provider(config)?;

    let factor = config.live_downscale.max(1);
    let controls = Controls::spawn();
    let mut stream = camera.stream()?;
    let mut frames = 0u64;

    tracing::info!(threshold, downscale = factor, "live recognition started; 'q' then ENTER to quit");
    loop {
        if controls.poll() == Some(Command::Quit) {
            break;
        }

        let frame = stream.next_frame()?;
        let sequence = frame.sequence;
        let small = downscale(frame.into_rgb_image()?, factor);
        frames += 1;

        let detections = match provider.detect_and_embed(&small) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(sequence, error = %e, "frame skipped");
                continue;
            }
        };

        for detection in &detections {
            let result = context.identify(&detection.embedding);
            let region = detection.region.scaled(factor);
            tracing::info!(
                sequence,
                name = %result.label,
                confidence = ?result.confidence,
                distance = ?result.distance,
                region = ?<[u32; 4]>::from(region),
                "face"
            );
        }
    }

    tracing::info!(frames, "live recognition stopped");
    Ok(())
}

//! `facecard train`: build the enrollment store from the dataset.

use crate::config::Config;
use crate::engine;
use anyhow::{Context, Result};
use facecard_core::annotate::{self, GREEN};
use facecard_core::{dataset, EnrollmentStore};

pub fn run(config: &Config) -> Result<()> {
    let mut provider = engine::load_provider(config)?;
    let images = dataset::load_dataset(&config.dataset_dir)?;

    let processed = config.processed_dir();
    super::ensure_dir(&processed)?;

    let store = EnrollmentStore::build(&mut provider, &images, |i, sample, regions| {
        let mut annotated = sample.image.clone();
        for region in regions {
            annotate::draw_region(&mut annotated, region, GREEN, 2);
        }
        let path = processed.join(format!("{}_{}.jpg", sample.label, i + 1));
        if let Err(e) = super::save_image(&annotated, &path) {
            tracing::warn!(error = %e, "failed to save processed image");
        }
    })?;

    store
        .persist(&config.store_path)
        .with_context(|| format!("writing store {}", config.store_path.display()))?;

    tracing::info!(
        path = %config.store_path.display(),
        entries = store.len(),
        identities = store.distinct_labels().len(),
        "training complete"
    );
    Ok(())
}

//! Comparing the faces of probe images against candidate embeddings.
//!
//! Validation (QR card workflows) must be decisive: an image without a face
//! is an explicit `NoDetection`. Recognition (picture tool) reports every face
//! it finds and simply returns nothing for a faceless image.

use crate::annotate::{self, GREEN, RED};
use crate::dataset::DatasetError;
use crate::error::ErrorKind;
use crate::matcher::{Matcher, RecognitionContext};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{Detection, EnrollmentEntry, FaceRegion, MatchResult};
use image::RgbImage;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

const BOX_THICKNESS: u32 = 3;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("no faces detected in the image")]
    NoDetection,
    #[error("no candidate embeddings to compare against")]
    NoCandidates,
    #[error("probe embedding has {probe} components, candidates have {candidates}")]
    DimensionMismatch { probe: usize, candidates: usize },
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::NoDetection => ErrorKind::NoDetection,
            ValidationError::NoCandidates => ErrorKind::InputValidation,
            ValidationError::DimensionMismatch { .. } => ErrorKind::MalformedPayload,
            ValidationError::Provider(e) => e.kind(),
            ValidationError::Dataset(e) => e.kind(),
        }
    }
}

/// Verdict for one probe face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceVerdict {
    pub region: FaceRegion,
    pub result: MatchResult,
}

/// Outcome of validating one image against a card.
#[derive(Debug, Clone)]
pub struct Validation {
    pub faces: Vec<FaceVerdict>,
    /// True when at least one face passed.
    pub matched: bool,
    pub annotated: RgbImage,
}

/// Outcome of recognizing the faces of one image against the store.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub faces: Vec<FaceVerdict>,
    pub annotated: RgbImage,
}

fn check_dimensions(
    detections: &[Detection],
    candidates: &[EnrollmentEntry],
) -> Result<(), ValidationError> {
    let Some(expected) = candidates.first().map(|c| c.embedding.dim()) else {
        return Ok(());
    };
    match detections.iter().find(|d| d.embedding.dim() != expected) {
        Some(d) => Err(ValidationError::DimensionMismatch {
            probe: d.embedding.dim(),
            candidates: expected,
        }),
        None => Ok(()),
    }
}

/// Match every face of `image` against `candidates` with `matcher`.
///
/// Matched faces are outlined green. If no face matched, every face is
/// outlined red.
pub fn validate_image<P, M>(
    provider: &mut P,
    matcher: &M,
    candidates: &[EnrollmentEntry],
    image: &RgbImage,
    threshold: f32,
) -> Result<Validation, ValidationError>
where
    P: EmbeddingProvider + ?Sized,
    M: Matcher + ?Sized,
{
    if candidates.is_empty() {
        return Err(ValidationError::NoCandidates);
    }

    let detections = provider.detect_and_embed(image)?;
    if detections.is_empty() {
        return Err(ValidationError::NoDetection);
    }
    check_dimensions(&detections, candidates)?;

    let faces: Vec<FaceVerdict> = detections
        .iter()
        .map(|d| FaceVerdict {
            region: d.region,
            result: matcher.compare(&d.embedding, candidates, threshold),
        })
        .collect();
    let matched = faces.iter().any(|f| f.result.matched);

    let mut annotated = image.clone();
    for face in &faces {
        if matched && face.result.matched {
            annotate::draw_region(&mut annotated, &face.region, GREEN, BOX_THICKNESS);
        } else if !matched {
            annotate::draw_region(&mut annotated, &face.region, RED, BOX_THICKNESS);
        }
    }

    for face in &faces {
        tracing::debug!(
            matched = face.result.matched,
            distance = ?face.result.distance,
            confidence = ?face.result.confidence,
            threshold,
            "face verdict"
        );
    }

    Ok(Validation {
        faces,
        matched,
        annotated,
    })
}

/// Per-image outcome in a folder run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Matched,
    NotMatched,
    NoFace,
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub faces: Vec<FaceVerdict>,
    /// Result image; the unmodified input for faceless images, absent on failure.
    #[serde(skip)]
    pub annotated: Option<RgbImage>,
}

/// Validate every decoded input, in the given order.
///
/// Each input yields exactly one item; failures are recorded per item and
/// never stop the run.
pub fn validate_batch<P, M>(
    provider: &mut P,
    matcher: &M,
    candidates: &[EnrollmentEntry],
    inputs: Vec<(PathBuf, Result<RgbImage, DatasetError>)>,
    threshold: f32,
) -> Vec<BatchItem>
where
    P: EmbeddingProvider + ?Sized,
    M: Matcher + ?Sized,
{
    let total = inputs.len();
    let mut items = Vec::with_capacity(total);

    for (i, (path, decoded)) in inputs.into_iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::info!(image = i + 1, total, file = %file_name, "validating image");

        let result = match decoded {
            Err(e) => Err(ValidationError::from(e)),
            Ok(image) => match validate_image(&mut *provider, matcher, candidates, &image, threshold) {
                Err(ValidationError::NoDetection) => Ok((image, None)),
                other => other.map(|v| (image, Some(v))),
            },
        };

        let item = match result {
            Ok((image, None)) => {
                tracing::warn!(file = %file_name, "no faces detected");
                BatchItem {
                    file_name,
                    outcome: BatchOutcome::NoFace,
                    faces: Vec::new(),
                    annotated: Some(image),
                }
            }
            Ok((_, Some(v))) => BatchItem {
                file_name,
                outcome: if v.matched {
                    BatchOutcome::Matched
                } else {
                    BatchOutcome::NotMatched
                },
                faces: v.faces,
                annotated: Some(v.annotated),
            },
            Err(e) => {
                tracing::error!(file = %file_name, kind = %e.kind(), error = %e, "validation failed");
                BatchItem {
                    file_name,
                    outcome: BatchOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                    faces: Vec::new(),
                    annotated: None,
                }
            }
        };
        items.push(item);
    }

    items
}

/// Identify every face of `image` against the session's store.
///
/// Each face gets a red box with a filled label band. A faceless image
/// yields an empty result.
pub fn recognize_image<P, T>(
    provider: &mut P,
    context: &RecognitionContext<T>,
    image: &RgbImage,
) -> Result<Recognition, ValidationError>
where
    P: EmbeddingProvider + ?Sized,
    T: Matcher,
{
    let detections = provider.detect_and_embed(image)?;
    check_dimensions(&detections, context.store().entries())?;

    let mut annotated = image.clone();
    let faces: Vec<FaceVerdict> = detections
        .iter()
        .map(|d| {
            annotate::draw_region(&mut annotated, &d.region, RED, 2);
            annotate::draw_label_band(&mut annotated, &d.region, RED);
            FaceVerdict {
                region: d.region,
                result: context.identify(&d.embedding),
            }
        })
        .collect();

    Ok(Recognition { faces, annotated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{BestMatch, FirstMatch};
    use crate::provider::testing::ScriptedProvider;
    use crate::store::EnrollmentStore;
    use crate::types::{Embedding, UNKNOWN_LABEL};
    use image::Rgb;

    const CARD: [f32; 3] = [0.1, 0.2, 0.3];

    fn region(left: u32) -> FaceRegion {
        FaceRegion { top: 2, right: left + 6, bottom: 10, left }
    }

    fn face(left: u32, values: &[f32]) -> Detection {
        Detection {
            region: region(left),
            embedding: Embedding::new(values.to_vec()),
        }
    }

    fn card() -> Vec<EnrollmentEntry> {
        vec![EnrollmentEntry::new("card", Embedding::new(CARD.to_vec()))]
    }

    #[test]
    fn test_validate_match_draws_green() {
        let mut provider = ScriptedProvider::new().with(1, vec![face(2, &CARD)]);
        let image = ScriptedProvider::marked_image(1);
        let v = validate_image(&mut provider, &FirstMatch::new(), &card(), &image, 0.6).unwrap();
        assert!(v.matched);
        assert_eq!(v.faces.len(), 1);
        assert_eq!(v.faces[0].result.distance, Some(0.0));
        assert_eq!(*v.annotated.get_pixel(2, 2), GREEN);
    }

    #[test]
    fn test_validate_no_match_draws_red_on_every_face() {
        let mut provider = ScriptedProvider::new()
            .with(1, vec![face(1, &[0.9, 0.9, 0.9]), face(8, &[-0.9, 0.9, 0.9])]);
        let image = ScriptedProvider::marked_image(1);
        let v = validate_image(&mut provider, &FirstMatch::new(), &card(), &image, 0.6).unwrap();
        assert!(!v.matched);
        assert!(v.faces.iter().all(|f| f.result.label == UNKNOWN_LABEL));
        assert_eq!(*v.annotated.get_pixel(1, 2), RED);
        assert_eq!(*v.annotated.get_pixel(8, 2), RED);
    }

    #[test]
    fn test_validate_only_matched_faces_outlined_when_any_matches() {
        let mut provider = ScriptedProvider::new()
            .with(1, vec![face(1, &[0.9, 0.9, 0.9]), face(8, &CARD)]);
        let image = ScriptedProvider::marked_image(1);
        let v = validate_image(&mut provider, &FirstMatch::new(), &card(), &image, 0.6).unwrap();
        assert!(v.matched);
        assert_eq!(*v.annotated.get_pixel(8, 2), GREEN);
        assert_eq!(*v.annotated.get_pixel(1, 5), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_validate_without_face_is_error() {
        let mut provider = ScriptedProvider::new();
        let image = ScriptedProvider::marked_image(7);
        let err = validate_image(&mut provider, &FirstMatch::new(), &card(), &image, 0.6).unwrap_err();
        assert!(matches!(err, ValidationError::NoDetection));
        assert_eq!(err.kind(), ErrorKind::NoDetection);
    }

    #[test]
    fn test_validate_dimension_mismatch() {
        let mut provider = ScriptedProvider::new().with(1, vec![face(1, &[0.1, 0.2])]);
        let image = ScriptedProvider::marked_image(1);
        let err = validate_image(&mut provider, &FirstMatch::new(), &card(), &image, 0.6).unwrap_err();
        assert!(matches!(err, ValidationError::DimensionMismatch { probe: 2, candidates: 3 }));
    }

    #[test]
    fn test_validate_requires_candidates() {
        let mut provider = ScriptedProvider::new();
        let image = ScriptedProvider::marked_image(1);
        let err = validate_image(&mut provider, &FirstMatch::new(), &[], &image, 0.6).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert_eq!(provider.calls, 0);
    }

    #[test]
    fn test_batch_five_images_two_faceless() {
        let near = [0.12, 0.2, 0.3];
        let mut provider = ScriptedProvider::new()
            .with(1, vec![face(1, &CARD)])
            .with(3, vec![face(1, &near)])
            .with(5, vec![face(1, &CARD), face(8, &[0.9, 0.9, 0.9])]);

        let inputs: Vec<(PathBuf, Result<RgbImage, DatasetError>)> = (1..=5u8)
            .map(|m| (PathBuf::from(format!("probe_{m}.jpg")), Ok(ScriptedProvider::marked_image(m))))
            .collect();

        let items = validate_batch(&mut provider, &FirstMatch::new(), &card(), inputs, 0.6);

        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|i| i.annotated.is_some()));
        let outcomes: Vec<_> = items.iter().map(|i| i.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                BatchOutcome::Matched,
                BatchOutcome::NoFace,
                BatchOutcome::Matched,
                BatchOutcome::NoFace,
                BatchOutcome::Matched,
            ]
        );
        assert_eq!(items[1].file_name, "probe_2.jpg");
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let mut provider = ScriptedProvider::new()
            .with(1, vec![face(1, &CARD)])
            .failing(2);
        let unreadable = DatasetError::FolderNotFound(PathBuf::from("gone"));
        let inputs = vec![
            (PathBuf::from("a.jpg"), Err(unreadable)),
            (PathBuf::from("b.jpg"), Ok(ScriptedProvider::marked_image(2))),
            (PathBuf::from("c.jpg"), Ok(ScriptedProvider::marked_image(1))),
        ];

        let items = validate_batch(&mut provider, &FirstMatch::new(), &card(), inputs, 0.6);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0].outcome, BatchOutcome::Failed { .. }));
        assert!(matches!(
            items[1].outcome,
            BatchOutcome::Failed { kind: ErrorKind::Provider, .. }
        ));
        assert_eq!(items[2].outcome, BatchOutcome::Matched);
        assert!(items[1].annotated.is_none());
    }

    #[test]
    fn test_batch_report_serialization() {
        let mut provider = ScriptedProvider::new().with(1, vec![face(1, &CARD)]);
        let inputs = vec![(PathBuf::from("x.png"), Ok(ScriptedProvider::marked_image(1)))];
        let items = validate_batch(&mut provider, &FirstMatch::new(), &card(), inputs, 0.6);
        let json = serde_json::to_value(&items).unwrap();
        assert_eq!(json[0]["status"], "matched");
        assert_eq!(json[0]["file_name"], "x.png");
        assert_eq!(json[0]["faces"][0]["result"]["label"], "card");
    }

    #[test]
    fn test_recognize_reports_each_face() {
        let store = EnrollmentStore::from_entries(vec![
            EnrollmentEntry::new("Alice", Embedding::new(vec![0.0, 0.0, 0.0])),
            EnrollmentEntry::new("Bob", Embedding::new(vec![1.0, 1.0, 1.0])),
        ])
        .unwrap();
        let context = RecognitionContext::with_matcher(store, BestMatch::new(), 0.6);
        let mut provider = ScriptedProvider::new()
            .with(1, vec![face(1, &[0.05, 0.0, 0.0]), face(8, &[5.0, 5.0, 5.0])]);

        let r = recognize_image(&mut provider, &context, &ScriptedProvider::marked_image(1)).unwrap();
        assert_eq!(r.faces.len(), 2);
        assert_eq!(r.faces[0].result.label, "Alice");
        assert!(r.faces[0].result.matched);
        assert_eq!(r.faces[1].result.label, UNKNOWN_LABEL);
        assert_eq!(*r.annotated.get_pixel(1, 2), RED);
    }

    #[test]
    fn test_recognize_faceless_image_is_empty() {
        let context = RecognitionContext::new(EnrollmentStore::new(), 0.6);
        let mut provider = ScriptedProvider::new();
        let r = recognize_image(&mut provider, &context, &ScriptedProvider::marked_image(4)).unwrap();
        assert!(r.faces.is_empty());
    }
}

//! Biometric payload: the JSON document carried inside a QR card.
//!
//! Wire format: `[{"face_encoding": [i64, ...], "location": [top, right, bottom, left], "precision": p}, ...]`
//!
//! Each component is sent as `round(value * 10^p)`, which keeps one 512-dim
//! ArcFace face under the level-L QR capacity. Entries without `precision`
//! carry plain decimal floats and are still accepted.

use crate::error::ErrorKind;
use crate::types::{Detection, Embedding, EnrollmentEntry, FaceRegion};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Decimal places kept for each embedding component in a payload.
pub const DEFAULT_PRECISION: u32 = 3;

/// Largest precision accepted on either side of the wire.
pub const MAX_PRECISION: u32 = 6;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload is not valid biometric JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload carries no faces")]
    Empty,
    #[error("payload entry {index} has {actual} components, expected {expected}")]
    InconsistentDimension {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("payload entry {index} uses a different precision than the first entry")]
    InconsistentPrecision { index: usize },
    #[error("unsupported payload precision {0} (max {MAX_PRECISION})")]
    UnsupportedPrecision(u32),
}

impl PayloadError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedPayload
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadEntry {
    pub face_encoding: Vec<f32>,
    pub location: FaceRegion,
}

#[derive(Serialize)]
struct ScaledEntry<'a> {
    face_encoding: Vec<i64>,
    location: &'a FaceRegion,
    precision: u32,
}

#[derive(Deserialize)]
struct WireEntry {
    face_encoding: Vec<f64>,
    location: FaceRegion,
    #[serde(default)]
    precision: Option<u32>,
}

fn scale(value: f32, precision: u32) -> i64 {
    (f64::from(value) * 10f64.powi(precision as i32)).round() as i64
}

fn unscale(value: f64, precision: u32) -> f32 {
    (value / 10f64.powi(precision as i32)) as f32
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiometricPayload {
    entries: Vec<PayloadEntry>,
    /// `None` for payloads parsed from plain decimal arrays.
    precision: Option<u32>,
}

impl BiometricPayload {
    /// Payload for the faces of one enrollment image, with components rounded
    /// to `precision` decimal places (capped at [`MAX_PRECISION`]).
    pub fn from_detections(detections: &[Detection], precision: u32) -> Self {
        let precision = precision.min(MAX_PRECISION);
        Self {
            entries: detections
                .iter()
                .map(|d| PayloadEntry {
                    face_encoding: d
                        .embedding
                        .values
                        .iter()
                        .map(|&v| unscale(scale(v, precision) as f64, precision))
                        .collect(),
                    location: d.region,
                })
                .collect(),
            precision: Some(precision),
        }
    }

    pub fn entries(&self) -> &[PayloadEntry] {
        &self.entries
    }

    pub fn precision(&self) -> Option<u32> {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact JSON, as embedded in the QR symbol.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Indented JSON for the on-disk copy.
    pub fn to_json_pretty(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse decoded QR text.
    ///
    /// Missing fields, wrong types, an empty list, entries of differing
    /// dimension or precision, and precisions above [`MAX_PRECISION`] are all
    /// rejected.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        let wire: Vec<WireEntry> = serde_json::from_str(text)?;

        let Some(first) = wire.first() else {
            return Err(PayloadError::Empty);
        };
        let precision = first.precision;
        let expected = first.face_encoding.len();
        if let Some(p) = precision.filter(|&p| p > MAX_PRECISION) {
            return Err(PayloadError::UnsupportedPrecision(p));
        }

        let mut entries = Vec::with_capacity(wire.len());
        for (index, entry) in wire.into_iter().enumerate() {
            if entry.precision != precision {
                return Err(PayloadError::InconsistentPrecision { index });
            }
            if entry.face_encoding.len() != expected || expected == 0 {
                return Err(PayloadError::InconsistentDimension {
                    index,
                    expected,
                    actual: entry.face_encoding.len(),
                });
            }
            let face_encoding = match precision {
                Some(p) => entry.face_encoding.iter().map(|&v| unscale(v, p)).collect(),
                None => entry.face_encoding.iter().map(|&v| v as f32).collect(),
            };
            entries.push(PayloadEntry {
                face_encoding,
                location: entry.location,
            });
        }
        Ok(Self { entries, precision })
    }

    /// Candidates for the matcher, all carrying `label`.
    pub fn candidates(&self, label: &str) -> Vec<EnrollmentEntry> {
        self.entries
            .iter()
            .map(|e| EnrollmentEntry::new(label, Embedding::new(e.face_encoding.clone())))
            .collect()
    }
}

impl Serialize for BiometricPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.precision {
            Some(precision) => serializer.collect_seq(self.entries.iter().map(|e| ScaledEntry {
                face_encoding: e.face_encoding.iter().map(|&v| scale(v, precision)).collect(),
                location: &e.location,
                precision,
            })),
            None => serializer.collect_seq(&self.entries),
        }
    }
}

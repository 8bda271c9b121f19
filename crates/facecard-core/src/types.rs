use serde::{Deserialize, Serialize};

/// Label reported when no enrolled identity passes the match predicate.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Face embedding vector (512-dimensional for ArcFace, 128 for dlib-style models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Face bounds in source-image pixels, ordered `(top, right, bottom, left)`.
///
/// Serializes as a four-element array in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    /// Build a region from a floating-point box, clamped to a `width`×`height` image.
    pub fn from_box(x: f32, y: f32, w: f32, h: f32, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        let clamp = |v: f32, max: f32| v.round().clamp(0.0, max) as u32;
        Self {
            top: clamp(y, max_y),
            right: clamp(x + w, max_x),
            bottom: clamp(y + h, max_y),
            left: clamp(x, max_x),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Scale every bound by an integer factor (detections made on a downscaled frame).
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }
}

impl From<[u32; 4]> for FaceRegion {
    fn from([top, right, bottom, left]: [u32; 4]) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

impl From<FaceRegion> for [u32; 4] {
    fn from(r: FaceRegion) -> Self {
        [r.top, r.right, r.bottom, r.left]
    }
}

/// One face found by the embedding provider: its region and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// A labeled reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentEntry {
    pub label: String,
    pub embedding: Embedding,
}

impl EnrollmentEntry {
    pub fn new(label: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            label: label.into(),
            embedding,
        }
    }
}

/// Result of matching a probe embedding against a candidate sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Matched label, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Distance to the reported candidate. `None` only for an empty candidate set.
    pub distance: Option<f32>,
    /// `(1 - distance) * 100`, unclamped.
    pub confidence: Option<f32>,
    pub matched: bool,
    /// Position of the reported candidate in the candidate sequence.
    pub index: Option<usize>,
}

impl MatchResult {
    /// The result for an empty candidate set.
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance: None,
            confidence: None,
            matched: false,
            index: None,
        }
    }
}

/// Confidence score for a distance: `(1 - distance) * 100`.
///
/// Negative for distances above 1.0; never clamped.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (1.0 - distance) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_identical() {
        let a = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_formula() {
        for d in [0.0f32, 0.4, 0.6, 1.0, 1.3] {
            assert_eq!(confidence_from_distance(d), (1.0 - d) * 100.0);
        }
        assert!(confidence_from_distance(1.3) < 0.0);
        assert_eq!(confidence_from_distance(0.0), 100.0);
    }

    #[test]
    fn test_region_serializes_as_array() {
        let r = FaceRegion { top: 10, right: 80, bottom: 90, left: 20 };
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "[10,80,90,20]");
        let back: FaceRegion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_region_from_box_clamps() {
        let r = FaceRegion::from_box(-5.0, 10.0, 50.0, 300.0, 100, 100);
        assert_eq!(r.left, 0);
        assert_eq!(r.top, 10);
        assert_eq!(r.right, 45);
        assert_eq!(r.bottom, 99);
    }

    #[test]
    fn test_region_scaled() {
        let r = FaceRegion { top: 1, right: 4, bottom: 3, left: 2 };
        assert_eq!(r.scaled(4), FaceRegion { top: 4, right: 16, bottom: 12, left: 8 });
    }
}

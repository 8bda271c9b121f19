//! facecard-core — Face enrollment, matching and biometric QR cards.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both running
//! via ONNX Runtime for CPU inference. Enrollments persist to SQLite; a card
//! carries a face's embedding as JSON inside a QR symbol.

pub mod alignment;
pub mod annotate;
pub mod carrier;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod matcher;
pub mod payload;
pub mod provider;
pub mod recognizer;
pub mod store;
pub mod types;
pub mod validation;

pub use error::ErrorKind;
pub use matcher::{find_any_match, find_best_match, BestMatch, FirstMatch, Matcher, RecognitionContext};
pub use payload::BiometricPayload;
pub use provider::{EmbeddingProvider, OnnxProvider, ProviderError};
pub use store::{EnrollmentStore, StoreError};
pub use types::{Detection, Embedding, EnrollmentEntry, FaceRegion, MatchResult, UNKNOWN_LABEL};

//! facecheck-core: Face embedding extraction for attendance check-in.
//!
//! Detection, embedding and liveness scoring are delegated to an external
//! biometric analyzer behind the [`FaceAnalyzer`] trait. This crate owns the
//! acceptance policy: exactly one face, anti-spoof score at or above the
//! threshold, non-empty embedding.

pub mod analyzer;
pub mod extractor;
pub mod types;

pub use analyzer::{AnalyzerError, CommandAnalyzer, FaceAnalyzer};
pub use extractor::{EmbeddingExtractor, ExtractError, ExtractPolicy, ANTISPOOF_THRESHOLD};
pub use types::{AntiSpoof, BoundingBox, DetectedFace, Embedding};

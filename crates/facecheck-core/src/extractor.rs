//! Single-face embedding extraction.
//!
//! One call runs one detection pass over one frame. The frame is accepted only
//! when exactly one face is present and that face passes the anti-spoof gate;
//! there are no retries here, a rejected frame is recaptured by the caller.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::{DetectedFace, Embedding};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Minimum anti-spoof score for a face to be accepted (inclusive).
pub const ANTISPOOF_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No face detected")]
    NoFaceDetected,
    #[error("Multiple faces detected. Please use an image with only one face.")]
    MultipleFacesDetected { count: usize },
    #[error("The image appears to be a photo of a photo or screen. Please use a real face image.")]
    SpoofSuspected { score: Option<f64> },
    #[error("face analyzer: {0}")]
    Analyzer(#[from] AnalyzerError),
}

impl ExtractError {
    /// Validation failures are fixed by recapturing; analyzer failures are not.
    pub fn is_recapturable(&self) -> bool {
        !matches!(self, ExtractError::Analyzer(_))
    }
}

/// Acceptance policy for detection results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractPolicy {
    pub min_antispoof: f64,
    /// Accept faces the analyzer returned without a liveness score.
    pub allow_missing_antispoof: bool,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self {
            min_antispoof: ANTISPOOF_THRESHOLD,
            allow_missing_antispoof: false,
        }
    }
}

/// Apply the acceptance policy to one detection pass.
///
/// Multiple faces are rejected outright rather than picking one, regardless
/// of how good any individual face looks.
pub fn select_face<'a>(
    faces: &'a [DetectedFace],
    policy: &ExtractPolicy,
) -> Result<&'a DetectedFace, ExtractError> {
    let face = match faces {
        [] => return Err(ExtractError::NoFaceDetected),
        [face] => face,
        _ => {
            return Err(ExtractError::MultipleFacesDetected {
                count: faces.len(),
            })
        }
    };

    match face.antispoof_score() {
        // Written as a negated >= so a NaN score is rejected.
        Some(score) if !(score >= policy.min_antispoof) => {
            Err(ExtractError::SpoofSuspected { score: Some(score) })
        }
        None if !policy.allow_missing_antispoof => {
            Err(ExtractError::SpoofSuspected { score: None })
        }
        _ => Ok(face),
    }
}

/// Embedding extractor over a lazily-loaded analyzer.
///
/// The analyzer's model is loaded on the first `extract` and kept for the
/// lifetime of the extractor. A failed load is attempted again next call.
pub struct EmbeddingExtractor<A> {
    analyzer: A,
    policy: ExtractPolicy,
    loaded: OnceCell<()>,
}

impl<A: FaceAnalyzer> EmbeddingExtractor<A> {
    pub fn new(analyzer: A) -> Self {
        Self {
            analyzer,
            policy: ExtractPolicy::default(),
            loaded: OnceCell::new(),
        }
    }

    pub fn with_policy(mut self, policy: ExtractPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ExtractPolicy {
        &self.policy
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Extract the embedding of the sole face in an RGB8 frame.
    pub async fn extract(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Embedding, ExtractError> {
        self.loaded
            .get_or_try_init(|| async {
                let started = Instant::now();
                self.analyzer.load().await?;
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "face analyzer loaded"
                );
                Ok::<_, AnalyzerError>(())
            })
            .await?;

        let faces = self.analyzer.detect(rgb, width, height).await?;
        tracing::debug!(faces = faces.len(), width, height, "detection pass complete");

        let face = match select_face(&faces, &self.policy) {
            Ok(face) => face,
            Err(e) => {
                tracing::info!(reason = %e, "frame rejected");
                return Err(e);
            }
        };

        if face.embedding.is_empty() {
            return Err(AnalyzerError::Failed("analyzer returned an empty embedding".into()).into());
        }
        if let Some(index) = face.embedding.iter().position(|v| !v.is_finite()) {
            return Err(AnalyzerError::Failed(format!(
                "analyzer returned a non-finite embedding value at index {index}"
            ))
            .into());
        }

        Ok(Embedding::new(face.embedding.clone()))
    }
}

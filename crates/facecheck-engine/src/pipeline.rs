//! Check-in pipeline: capture → extract → submit, resolved into the attendance store.

use crate::attempt::{AttendanceAttempt, AttendanceStore};
use crate::history::{HistoryBackend, HistoryCache};
use chrono::NaiveDate;
use facecheck_api::{
    png_data_url, ApiError, AttendanceClient, CheckinRecord, EnrollmentRecord, HistoryQuery,
};
use facecheck_core::{EmbeddingExtractor, Embedding, ExtractError, FaceAnalyzer};
use facecheck_hw::{CaptureError, CaptureFrame, FrameError, FrameSource};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Where accepted embeddings are sent.
pub trait AttendanceBackend: Send + Sync {
    fn submit_checkin(
        &self,
        embedding: &Embedding,
    ) -> impl Future<Output = Result<CheckinRecord, ApiError>> + Send;

    fn submit_enrollment(
        &self,
        embedding: &Embedding,
        created_at: NaiveDate,
        image_data: Option<&str>,
    ) -> impl Future<Output = Result<EnrollmentRecord, ApiError>> + Send;
}

impl AttendanceBackend for AttendanceClient {
    async fn submit_checkin(&self, embedding: &Embedding) -> Result<CheckinRecord, ApiError> {
        self.check_in(embedding).await
    }

    async fn submit_enrollment(
        &self,
        embedding: &Embedding,
        created_at: NaiveDate,
        image_data: Option<&str>,
    ) -> Result<EnrollmentRecord, ApiError> {
        self.enroll_face(embedding, created_at, image_data).await
    }
}

/// Failure of one pipeline run. Display is the message shown to the user.
#[derive(Error, Debug)]
pub enum CheckinError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Submit(#[from] ApiError),
    #[error("could not encode captured image: {0}")]
    Encode(#[from] FrameError),
}

impl CheckinError {
    /// Whether starting a fresh attempt could succeed without outside action.
    ///
    /// Camera errors are not: the user has to grant access or switch to a file.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CheckinError::Capture(_) => false,
            CheckinError::Extract(e) => e.is_recapturable(),
            CheckinError::Submit(e) => e.is_retryable(),
            CheckinError::Encode(_) => false,
        }
    }
}

pub struct CheckinPipeline<A, B, H = B> {
    extractor: EmbeddingExtractor<A>,
    backend: B,
    store: AttendanceStore,
    history: Option<Arc<HistoryCache<H>>>,
    history_query: HistoryQuery,
}

impl<A: FaceAnalyzer, B: AttendanceBackend> CheckinPipeline<A, B> {
    pub fn new(extractor: EmbeddingExtractor<A>, backend: B) -> Self {
        Self {
            extractor,
            backend,
            store: AttendanceStore::new(),
            history: None,
            history_query: HistoryQuery::default(),
        }
    }
}

impl<A, B, H> CheckinPipeline<A, B, H> {
    /// Resolve attempts into an existing store instead of a private one.
    pub fn with_store(mut self, store: AttendanceStore) -> Self {
        self.store = store;
        self
    }

    /// Refresh `cache` (history, then stats) after every successful check-in.
    pub fn with_history<H2>(
        self,
        cache: Arc<HistoryCache<H2>>,
        query: HistoryQuery,
    ) -> CheckinPipeline<A, B, H2> {
        CheckinPipeline {
            extractor: self.extractor,
            backend: self.backend,
            store: self.store,
            history: Some(cache),
            history_query: query,
        }
    }

    pub fn store(&self) -> &AttendanceStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn history(&self) -> Option<&Arc<HistoryCache<H>>> {
        self.history.as_ref()
    }
}

impl<A, B, H> CheckinPipeline<A, B, H>
where
    A: FaceAnalyzer,
    B: AttendanceBackend,
    H: HistoryBackend,
{
    /// Run one check-in attempt and return the state it settled in.
    ///
    /// While an attempt is already loading no second submission is made; the
    /// caller waits for the in-flight one and gets its resolution.
    pub async fn check_in<S: FrameSource>(&self, source: &mut S) -> AttendanceAttempt {
        let Some(ticket) = self.store.begin() else {
            tracing::debug!("check-in already in flight, waiting for it");
            return self.store.wait_settled().await;
        };
        let attempt = ticket.generation();
        let started = Instant::now();

        let outcome = self.capture_and_submit(source).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let committed = match outcome {
            Ok(record) => {
                tracing::info!(attempt, elapsed_ms, attendance_id = ?record.attendance_id, "check-in succeeded");
                self.store.succeed(ticket, record).is_ok()
            }
            Err(e) => {
                tracing::warn!(attempt, elapsed_ms, error = %e, "check-in failed");
                // A failed commit only means the attempt was superseded.
                let _ = self.store.fail(ticket, e.to_string());
                false
            }
        };

        let settled = self.store.snapshot();
        if committed {
            self.refresh_history().await;
        }
        settled
    }

    /// Capture a frame and register its embedding as the user's enrolled face.
    ///
    /// The still is attached as a PNG data URL. Enrollment does not touch the
    /// attempt store.
    pub async fn enroll<S: FrameSource>(
        &self,
        source: &mut S,
        created_at: NaiveDate,
    ) -> Result<EnrollmentRecord, CheckinError> {
        let frame = source.acquire_frame().await?;
        let embedding = self.embed(&frame).await?;
        let image_data = png_data_url(&frame.to_png()?);

        let record = self
            .backend
            .submit_enrollment(&embedding, created_at, Some(&image_data))
            .await?;
        tracing::info!(id = ?record.id, %created_at, "face enrolled");
        Ok(record)
    }

    async fn capture_and_submit<S: FrameSource>(
        &self,
        source: &mut S,
    ) -> Result<CheckinRecord, CheckinError> {
        let frame = source.acquire_frame().await?;
        let embedding = self.embed(&frame).await?;
        Ok(self.backend.submit_checkin(&embedding).await?)
    }

    async fn embed(&self, frame: &CaptureFrame) -> Result<Embedding, ExtractError> {
        self.extractor
            .extract(&frame.data, frame.width, frame.height)
            .await
    }

    async fn refresh_history(&self) {
        let Some(cache) = &self.history else {
            return;
        };
        if let Err(e) = cache.refresh(&self.history_query).await {
            tracing::warn!(error = %e, "history refresh after check-in failed");
        }
        if let Err(e) = cache.refresh_stats().await {
            tracing::warn!(error = %e, "stats refresh after check-in failed");
        }
    }
}

//! `FrameSource`: one capability, two ways to obtain a still frame.

use crate::camera::CameraError;
use crate::frame::CaptureFrame;
use crate::session::CameraSession;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Device(#[from] CameraError),
    #[error("could not read image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("capture task failed: {0}")]
    Task(String),
}

/// Something that can produce one still frame per check-in attempt.
pub trait FrameSource: Send {
    fn acquire_frame(&mut self) -> impl Future<Output = Result<CaptureFrame, CaptureError>> + Send;
}

/// Live camera snapshot.
///
/// Each acquisition opens the device, lets exposure settle, takes one still
/// and releases the device before returning, on success and failure alike.
#[derive(Debug, Clone)]
pub struct CameraSource {
    device_path: String,
    warmup_frames: usize,
}

impl CameraSource {
    pub fn new(device_path: impl Into<String>, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.into(),
            warmup_frames,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl FrameSource for CameraSource {
    async fn acquire_frame(&mut self) -> Result<CaptureFrame, CaptureError> {
        let path = self.device_path.clone();
        let warmup = self.warmup_frames;

        let frame = tokio::task::spawn_blocking(move || {
            let mut session: CameraSession = CameraSession::new();
            session.start(&path, warmup)?;
            let frame = session.capture_still();
            session.stop();
            frame
        })
        .await
        .map_err(|e| CaptureError::Task(e.to_string()))??;

        tracing::debug!(
            device = %self.device_path,
            width = frame.width,
            height = frame.height,
            seq = frame.sequence,
            "camera still captured"
        );
        Ok(frame)
    }
}

/// Image file decoded straight into a frame; there is no streaming phase.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileSource {
    async fn acquire_frame(&mut self) -> Result<CaptureFrame, CaptureError> {
        let path = self.path.clone();
        let frame = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .map(|img| CaptureFrame::from_rgb_image(img.to_rgb8(), 0))
                .map_err(|source| CaptureError::Decode { path, source })
        })
        .await
        .map_err(|e| CaptureError::Task(e.to_string()))??;

        tracing::debug!(
            path = %self.path.display(),
            width = frame.width,
            height = frame.height,
            "image file decoded"
        );
        Ok(frame)
    }
}

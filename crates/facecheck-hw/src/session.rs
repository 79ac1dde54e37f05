//! Camera session: start, snapshot, stop.
//!
//! A session holds at most one open device. Release happens exactly once,
//! whether through `stop`, a failed capture path, or drop.

use crate::camera::{Camera, CameraError};
use crate::frame::CaptureFrame;

/// An opened, streamable capture device.
pub trait CaptureDevice {
    /// Snapshot the current frame.
    fn grab(&mut self) -> Result<CaptureFrame, CameraError>;

    /// Release every handle held by the device.
    fn release(self)
    where
        Self: Sized;
}

pub struct CameraSession<D: CaptureDevice = Camera> {
    device: Option<D>,
}

impl<D: CaptureDevice> Default for CameraSession<D> {
    fn default() -> Self {
        Self { device: None }
    }
}

impl<D: CaptureDevice> CameraSession<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a device using `open`. Fails with `DeviceBusy` if already streaming.
    ///
    /// Open errors (missing device, denied permission) are returned as-is;
    /// there is no fallback to another device.
    pub fn start_with<F>(&mut self, open: F) -> Result<(), CameraError>
    where
        F: FnOnce() -> Result<D, CameraError>,
    {
        if self.device.is_some() {
            return Err(CameraError::DeviceBusy);
        }
        self.device = Some(open()?);
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.device.is_some()
    }

    /// Snapshot the current frame. Only valid while streaming.
    pub fn capture_still(&mut self) -> Result<CaptureFrame, CameraError> {
        self.device
            .as_mut()
            .ok_or(CameraError::NotStreaming)?
            .grab()
    }

    /// Release the device. Returns false when nothing was held.
    pub fn stop(&mut self) -> bool {
        match self.device.take() {
            Some(device) => {
                device.release();
                true
            }
            None => false,
        }
    }
}

impl CameraSession<Camera> {
    /// Open a V4L2 device and discard `warmup_frames` before the first snapshot.
    pub fn start(&mut self, device_path: &str, warmup_frames: usize) -> Result<(), CameraError> {
        self.start_with(|| {
            let camera = Camera::open(device_path)?;
            camera.warmup(warmup_frames)?;
            Ok(camera)
        })
    }
}

impl<D: CaptureDevice> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

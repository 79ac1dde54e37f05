//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, CaptureFrame};
use crate::session::CaptureDevice;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("camera is not streaming")]
    NotStreaming,
}

/// A capture-capable node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    /// Card name reported by the driver, e.g. "Integrated Camera".
    pub name: String,
    pub driver: String,
    pub bus: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes per pixel. Requested first.
    Yuyv,
    /// One JPEG image per buffer.
    Mjpg,
    /// 8-bit luminance only.
    Grey,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }

    pub fn fourcc(self) -> FourCC {
        FourCC::new(match self {
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Mjpg => b"MJPG",
            PixelFormat::Grey => b"GREY",
        })
    }

    /// Convert one dequeued buffer to packed RGB8.
    fn to_rgb(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let converted = match self {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
            PixelFormat::Mjpg => {
                return image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map(|img| img.to_rgb8().into_raw())
                    .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode: {e}")));
            }
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("{self:?} conversion: {e}")))
    }
}

static CLAIMED_DEVICES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Process-wide exclusive claim on a device path, released on drop.
#[derive(Debug)]
pub(crate) struct DeviceClaim {
    path: String,
}

impl DeviceClaim {
    pub(crate) fn acquire(path: &str) -> Result<Self, CameraError> {
        let mut claimed = CLAIMED_DEVICES
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !claimed.insert(path.to_string()) {
            return Err(CameraError::DeviceBusy);
        }
        Ok(Self {
            path: path.to_string(),
        })
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        if let Some(claimed) = CLAIMED_DEVICES.get() {
            claimed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.path);
        }
    }
}

/// An open, claimed V4L2 capture device with a negotiated format.
pub struct Camera {
    device: Device,
    path: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    _claim: DeviceClaim,
}

impl Camera {
    /// Open `path` (e.g. `/dev/video0`) and negotiate 640x480, preferring YUYV.
    ///
    /// Fails with `DeviceBusy` while another session in this process holds it.
    pub fn open(path: &str) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.to_string()));
        }
        let claim = DeviceClaim::acquire(path)?;
        let device = Device::with_path(path).map_err(|e| open_error(path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut requested = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
        requested.fourcc = PixelFormat::Yuyv.fourcc();
        requested.width = REQUESTED_WIDTH;
        requested.height = REQUESTED_HEIGHT;
        let negotiated = device
            .set_format(&requested)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "driver chose {}, need YUYV, MJPG or GREY",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            path: path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
            _claim: claim,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Discard `count` frames so auto-exposure settles before the snapshot.
    pub fn warmup(&self, count: usize) -> Result<(), CameraError> {
        if count == 0 {
            return Ok(());
        }
        let mut stream = self.stream()?;
        for _ in 0..count {
            dequeue(&mut stream)?;
        }
        tracing::debug!(count, "discarded warmup frames");
        Ok(())
    }

    /// Take one still and convert it to RGB8.
    pub fn capture_frame(&self) -> Result<CaptureFrame, CameraError> {
        let mut stream = self.stream()?;
        let (buf, meta) = dequeue(&mut stream)?;
        Ok(CaptureFrame {
            data: self.pixel_format.to_rgb(buf, self.width, self.height)?,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("mmap stream: {e}")))
    }

    /// Capture-capable devices among `/dev/video0` through `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

fn dequeue<'a>(
    stream: &'a mut MmapStream<'_>,
) -> Result<(&'a [u8], &'a v4l::buffer::Metadata), CameraError> {
    stream
        .next()
        .map_err(|e| CameraError::CaptureFailed(format!("dequeue buffer: {e}")))
}

fn open_error(path: &str, e: std::io::Error) -> CameraError {
    const EBUSY: i32 = 16;
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(path.to_string()),
        _ if e.raw_os_error() == Some(EBUSY) => CameraError::DeviceBusy,
        _ => CameraError::DeviceNotFound(format!("{path}: {e}")),
    }
}

impl CaptureDevice for Camera {
    fn grab(&mut self) -> Result<CaptureFrame, CameraError> {
        self.capture_frame()
    }

    fn release(self) {
        tracing::info!(device = %self.path, "camera released");
        drop(self);
    }
}

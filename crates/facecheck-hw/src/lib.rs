//! facecheck-hw: Frame acquisition for face check-in.
//!
//! A [`CaptureFrame`] comes either from a V4L2 camera (start, snapshot, stop)
//! or from a decoded image file. Both are exposed through [`FrameSource`].

pub mod camera;
pub mod frame;
pub mod session;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{CaptureFrame, FrameError};
pub use session::{CameraSession, CaptureDevice};
pub use source::{CameraSource, CaptureError, FileSource, FrameSource};

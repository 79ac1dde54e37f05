//! facecheck-engine: Orchestration of face check-in attempts.
//!
//! [`CheckinPipeline`] captures a frame, extracts one embedding and submits
//! it, resolving the outcome into the shared [`AttendanceStore`]. A
//! [`HistoryCache`] holds the backend's view of past attendance.

pub mod attempt;
pub mod history;
pub mod pipeline;

pub use attempt::{
    AttemptStatus, AttemptTicket, AttendanceAttempt, AttendanceStore, StaleAttemptDiscarded,
};
pub use history::{HistoryBackend, HistoryCache};
pub use pipeline::{AttendanceBackend, CheckinError, CheckinPipeline};

//! facecheck-api: Client for the attendance backend.
//!
//! Every call carries the bearer token from [`ApiConfig`]. Non-2xx responses
//! are translated into [`ApiError`], preferring the backend's `detail` text.

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{png_data_url, AttendanceClient, CheckinRoute};
pub use config::ApiConfig;
pub use error::ApiError;
pub use reqwest::StatusCode;
pub use types::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, CheckinRecord, EnrollmentRecord,
    HistoryQuery,
};

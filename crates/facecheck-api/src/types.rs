//! Wire types for the attendance endpoints.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Unknown,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for AttendanceStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => AttendanceStatus::Present,
            "absent" => AttendanceStatus::Absent,
            "late" => AttendanceStatus::Late,
            "excused" => AttendanceStatus::Excused,
            _ => AttendanceStatus::Unknown,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-confirmed result of a check-in.
///
/// Accepts both backend shapes: `{success, message, attendance_id}` from the
/// face check-in route and `{id, student_id, date, status}` from plain marking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinRecord {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "id")]
    pub attendance_id: Option<i64>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
}

fn default_success() -> bool {
    true
}

/// Stored face enrollment, as echoed by `/face/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<NaiveDate>,
}

/// One historical attendance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawHistoryRecord")]
pub struct AttendanceRecord {
    pub id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub status: AttendanceStatus,
    pub timestamp: Option<NaiveTime>,
}

/// History entries as the backend sends them: `{date|created_at, status, time?}`.
#[derive(Deserialize)]
struct RawHistoryRecord {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

impl From<RawHistoryRecord> for AttendanceRecord {
    fn from(raw: RawHistoryRecord) -> Self {
        let created_at = raw.created_at.as_deref();
        Self {
            id: raw.id,
            date: raw.date.as_deref().or(created_at).and_then(parse_date),
            status: raw.status.map(AttendanceStatus::from).unwrap_or(AttendanceStatus::Unknown),
            timestamp: raw
                .time
                .as_deref()
                .and_then(parse_time)
                .or_else(|| created_at.and_then(parse_datetime_time)),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_datetime_time(s: &str) -> Option<NaiveTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.time());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|dt| dt.time())
}

/// Aggregates computed by the backend. The client never derives these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub attendance_rate: f64,
    pub days_present: u32,
    pub current_streak: u32,
}

/// Optional filters for `GET /attendance/history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_status_is_case_insensitive() {
        let s: AttendanceStatus = serde_json::from_str(r#""Present""#).unwrap();
        assert_eq!(s, AttendanceStatus::Present);
        let s: AttendanceStatus = serde_json::from_str(r#""on-leave""#).unwrap();
        assert_eq!(s, AttendanceStatus::Unknown);
        assert_eq!(serde_json::to_string(&AttendanceStatus::Late).unwrap(), r#""late""#);
    }

    #[test]
    fn test_history_record_with_date_and_time() {
        let r: AttendanceRecord =
            serde_json::from_str(r#"{"id":3,"date":"2024-01-05","status":"present","time":"08:59"}"#)
                .unwrap();
        assert_eq!(r.id, Some(3));
        assert_eq!(r.date, Some(date("2024-01-05")));
        assert_eq!(r.status, AttendanceStatus::Present);
        assert_eq!(r.timestamp, NaiveTime::from_hms_opt(8, 59, 0));
    }

    #[test]
    fn test_history_record_from_created_at() {
        let r: AttendanceRecord =
            serde_json::from_str(r#"{"created_at":"2024-02-10T09:15:30Z","status":"LATE"}"#).unwrap();
        assert_eq!(r.date, Some(date("2024-02-10")));
        assert_eq!(r.status, AttendanceStatus::Late);
        assert_eq!(r.timestamp, NaiveTime::from_hms_opt(9, 15, 30));
    }

    #[test]
    fn test_history_record_missing_fields() {
        let r: AttendanceRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(r.date, None);
        assert_eq!(r.status, AttendanceStatus::Unknown);
        assert_eq!(r.timestamp, None);
    }

    #[test]
    fn test_checkin_record_shapes() {
        let face: CheckinRecord = serde_json::from_str(
            r#"{"success":true,"message":"Face check-in successful for student 7","attendance_id":42}"#,
        )
        .unwrap();
        assert!(face.success);
        assert_eq!(face.attendance_id, Some(42));

        let plain: CheckinRecord = serde_json::from_str(
            r#"{"id":9,"student_id":7,"date":"2024-01-05","status":"present"}"#,
        )
        .unwrap();
        assert!(plain.success);
        assert_eq!(plain.attendance_id, Some(9));
        assert_eq!(plain.date, Some(date("2024-01-05")));
        assert_eq!(plain.status, Some(AttendanceStatus::Present));
    }

    #[test]
    fn test_stats_verbatim() {
        let s: AttendanceStats =
            serde_json::from_str(r#"{"attendance_rate":50,"days_present":1,"current_streak":0}"#)
                .unwrap();
        assert_eq!(s.attendance_rate, 50.0);
        assert_eq!(s.days_present, 1);
        assert_eq!(s.current_streak, 0);
    }
}

//! Async HTTP client for the attendance backend.

use crate::config::ApiConfig;
use crate::error::{self, ApiError};
use crate::types::{AttendanceRecord, AttendanceStats, CheckinRecord, EnrollmentRecord, HistoryQuery};
use base64::Engine as _;
use chrono::NaiveDate;
use facecheck_core::Embedding;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;

const CHECKIN_FAILED: &str = "Failed to mark attendance";
const ENROLL_FAILED: &str = "Failed to upload face embedding";
const HISTORY_FAILED: &str = "Failed to fetch attendance history";
const STATS_FAILED: &str = "Failed to fetch attendance stats";

/// Which endpoint receives check-in embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckinRoute {
    /// `POST /attendance/face-checkin`: identity match, then attendance.
    #[default]
    FaceCheckin,
    /// `POST /attendance`: generic marking.
    Generic,
}

impl CheckinRoute {
    fn path(self) -> &'static str {
        match self {
            CheckinRoute::FaceCheckin => "/attendance/face-checkin",
            CheckinRoute::Generic => "/attendance",
        }
    }
}

#[derive(Serialize)]
struct CheckinBody<'a> {
    embedding: &'a Embedding,
}

#[derive(Serialize)]
struct EnrollBody<'a> {
    embedding: &'a Embedding,
    created_at: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data: Option<&'a str>,
}

/// Attendance backend client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct AttendanceClient {
    http: Client,
    base_url: String,
    route: CheckinRoute,
}

impl AttendanceClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| ApiError::Config(format!("base url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "base url must be http(s), got {}",
                parsed.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret().trim()))
                .map_err(|_| ApiError::Config("token contains invalid header characters".into()))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        } else {
            tracing::warn!("no API token configured; backend calls will be unauthenticated");
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            route: CheckinRoute::default(),
        })
    }

    pub fn with_route(mut self, route: CheckinRoute) -> Self {
        self.route = route;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Submit a check-in embedding. One request, no retry.
    pub async fn check_in(&self, embedding: &Embedding) -> Result<CheckinRecord, ApiError> {
        tracing::debug!(dim = embedding.dim(), route = ?self.route, "submitting check-in");
        let req = self
            .http
            .post(self.url(self.route.path()))
            .json(&CheckinBody { embedding });
        let record: CheckinRecord = self.send_json(req, CHECKIN_FAILED).await?;
        tracing::info!(attendance_id = ?record.attendance_id, "check-in accepted");
        Ok(record)
    }

    /// Upload an enrollment embedding, optionally with the source image as a data URL.
    pub async fn enroll_face(
        &self,
        embedding: &Embedding,
        created_at: NaiveDate,
        image_data: Option<&str>,
    ) -> Result<EnrollmentRecord, ApiError> {
        tracing::debug!(dim = embedding.dim(), %created_at, "uploading face embedding");
        let req = self.http.post(self.url("/face/upload")).json(&EnrollBody {
            embedding,
            created_at,
            image_data,
        });
        self.send_json(req, ENROLL_FAILED).await
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<AttendanceRecord>, ApiError> {
        let req = self.http.get(self.url("/attendance/history")).query(query);
        let records: Vec<AttendanceRecord> = self.send_json(req, HISTORY_FAILED).await?;
        tracing::debug!(count = records.len(), "attendance history fetched");
        Ok(records)
    }

    pub async fn stats(&self) -> Result<AttendanceStats, ApiError> {
        let req = self.http.get(self.url("/attendance/stats"));
        self.send_json(req, STATS_FAILED).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        context: &'static str,
    ) -> Result<T, ApiError> {
        let resp = req
            .send()
            .await
            .map_err(|source| ApiError::Transport { context, source })?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|source| ApiError::Decode { context, source });
        }

        let body = resp.bytes().await.unwrap_or_default();
        let err = error::from_response(status, &body, context);
        tracing::warn!(%status, error = %err, "{context}");
        Err(err)
    }
}

/// Render PNG bytes as a `data:` URL, the form the enrollment endpoint stores.
pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceStatus;
    use axum::extract::Query;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn client(base_url: &str) -> AttendanceClient {
        AttendanceClient::new(&ApiConfig::new(base_url).with_token("test-token")).unwrap()
    }

    fn embedding() -> Embedding {
        Embedding::new(vec![0.25, -0.5, 1.0])
    }

    #[tokio::test]
    async fn test_check_in_success() {
        let router = Router::new().route(
            "/api/attendance/face-checkin",
            post(|headers: AxumHeaders, Json(body): Json<Value>| async move {
                let authed = headers.get("authorization").and_then(|v| v.to_str().ok())
                    == Some("Bearer test-token");
                if !authed || body["embedding"] != "0.25,-0.5,1" {
                    return (StatusCode::BAD_REQUEST, Json(json!({"detail": "bad request shape"})));
                }
                (
                    StatusCode::OK,
                    Json(json!({"success": true, "message": "ok", "attendance_id": 42})),
                )
            }),
        );
        let base = serve(router).await;

        let record = client(&base).check_in(&embedding()).await.unwrap();
        assert!(record.success);
        assert_eq!(record.attendance_id, Some(42));
    }

    #[tokio::test]
    async fn test_check_in_detail_message() {
        let router = Router::new().route(
            "/api/attendance/face-checkin",
            post(|| async {
                (StatusCode::BAD_REQUEST, Json(json!({"detail": "Face not recognized"})))
            }),
        );
        let base = serve(router).await;

        let err = client(&base).check_in(&embedding()).await.unwrap_err();
        assert_eq!(err.to_string(), "Face not recognized");
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_check_in_unauthorized_is_hard_failure() {
        let router = Router::new().route(
            "/api/attendance/face-checkin",
            post(|| async {
                (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Could not validate credentials"})))
            }),
        );
        let base = serve(router).await;

        let err = client(&base).check_in(&embedding()).await.unwrap_err();
        assert!(err.requires_reauth());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_without_detail_uses_fallback() {
        let router = Router::new().route(
            "/api/attendance/face-checkin",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(router).await;

        let err = client(&base).check_in(&embedding()).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to mark attendance (HTTP 502)");
    }

    #[tokio::test]
    async fn test_generic_route() {
        let router = Router::new().route(
            "/api/attendance",
            post(|| async { Json(json!({"id": 5, "student_id": 7, "date": "2024-01-05", "status": "present"})) }),
        );
        let base = serve(router).await;

        let record = client(&base)
            .with_route(CheckinRoute::Generic)
            .check_in(&embedding())
            .await
            .unwrap();
        assert_eq!(record.attendance_id, Some(5));
        assert_eq!(record.status, Some(AttendanceStatus::Present));
    }

    #[tokio::test]
    async fn test_transport_failure_is_generic() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/api"))
            .check_in(&embedding())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(err.to_string(), CHECKIN_FAILED);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let router = Router::new().route(
            "/api/attendance/stats",
            get(|| async { "not json" }),
        );
        let base = serve(router).await;

        let err = client(&base).stats().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_history_preserves_order_and_passes_query() {
        let router = Router::new().route(
            "/api/attendance/history",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("limit").map(String::as_str) != Some("2") {
                    return Json(json!([]));
                }
                Json(json!([
                    {"date": "2024-01-05", "status": "present"},
                    {"date": "2024-01-06", "status": "absent"}
                ]))
            }),
        );
        let base = serve(router).await;

        let query = HistoryQuery { limit: Some(2), ..Default::default() };
        let records = client(&base).history(&query).await.unwrap();
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.date.unwrap().to_string(), r.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("2024-01-05".to_string(), AttendanceStatus::Present),
                ("2024-01-06".to_string(), AttendanceStatus::Absent),
            ]
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let router = Router::new().route(
            "/api/attendance/stats",
            get(|| async { Json(json!({"attendance_rate": 50, "days_present": 1, "current_streak": 0})) }),
        );
        let base = serve(router).await;

        let stats = client(&base).stats().await.unwrap();
        assert_eq!(
            stats,
            AttendanceStats { attendance_rate: 50.0, days_present: 1, current_streak: 0 }
        );
    }

    #[tokio::test]
    async fn test_enroll_sends_date_and_image() {
        let router = Router::new().route(
            "/api/face/upload",
            post(|Json(body): Json<Value>| async move {
                let ok = body["created_at"] == "2024-03-01"
                    && body["embedding"] == "0.25,-0.5,1"
                    && body["image_data"].as_str().is_some_and(|s| s.starts_with("data:image/png;base64,"));
                if !ok {
                    return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": [{"msg": "field required"}]})));
                }
                (StatusCode::OK, Json(json!({"id": 1, "user_id": 7, "created_at": "2024-03-01"})))
            }),
        );
        let base = serve(router).await;

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let image = png_data_url(&[0x89, b'P', b'N', b'G']);
        let record = client(&base)
            .enroll_face(&embedding(), day, Some(&image))
            .await
            .unwrap();
        assert_eq!(record.user_id, Some(7));
        assert_eq!(record.created_at, Some(day));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            AttendanceClient::new(&ApiConfig::new("ftp://example.com/api")),
            Err(ApiError::Config(_))
        ));
        assert!(AttendanceClient::new(&ApiConfig::new("not a url")).is_err());
    }

    #[test]
    fn test_png_data_url() {
        assert_eq!(png_data_url(b"abc"), "data:image/png;base64,YWJj");
    }
}

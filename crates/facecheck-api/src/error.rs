use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 401 from the backend. The session must be re-established; resubmitting won't help.
    #[error("Not authenticated. Please log in again.")]
    Unauthorized { detail: Option<String> },
    /// Non-2xx response. `message` is the backend's own text when it sent one.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{context}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context}: unexpected response from server")]
    Decode {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid API configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the user can fix this by simply trying again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Unauthorized { .. } | ApiError::Config(_))
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Transport { source, .. } | ApiError::Decode { source, .. } => source.status(),
            ApiError::Config(_) => None,
        }
    }
}

/// Translate a non-2xx response into an error.
pub(crate) fn from_response(status: StatusCode, body: &[u8], context: &'static str) -> ApiError {
    let message = error_message(body);
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized { detail: message };
    }
    ApiError::Rejected {
        status,
        message: message.unwrap_or_else(|| format!("{context} (HTTP {})", status.as_u16())),
    }
}

/// Pull the user-facing message out of an error body.
///
/// `detail` wins: either a plain string or a validation list whose `msg`
/// entries are joined. A top-level `message` is the fallback.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;

    let from_detail = match value.get("detail") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    };

    from_detail
        .or_else(|| value.get("message")?.as_str().map(str::to_string))
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_string() {
        assert_eq!(
            error_message(br#"{"detail":"Face not recognized"}"#).as_deref(),
            Some("Face not recognized")
        );
    }

    #[test]
    fn test_detail_validation_list() {
        let body = br#"{"detail":[{"loc":["body","embedding"],"msg":"field required"},{"msg":"bad date"}]}"#;
        assert_eq!(error_message(body).as_deref(), Some("field required; bad date"));
    }

    #[test]
    fn test_detail_preferred_over_message() {
        let body = br#"{"message":"generic","detail":"Already checked in for today"}"#;
        assert_eq!(error_message(body).as_deref(), Some("Already checked in for today"));
    }

    #[test]
    fn test_message_fallback_and_garbage() {
        assert_eq!(error_message(br#"{"message":"oops"}"#).as_deref(), Some("oops"));
        assert_eq!(error_message(br#"{"detail":""}"#), None);
        assert_eq!(error_message(b"<html>502</html>"), None);
    }

    #[test]
    fn test_from_response_mapping() {
        let err = from_response(
            StatusCode::BAD_REQUEST,
            br#"{"detail":"Face not recognized"}"#,
            "Failed to mark attendance",
        );
        assert_eq!(err.to_string(), "Face not recognized");
        assert!(err.is_retryable());

        let err = from_response(StatusCode::INTERNAL_SERVER_ERROR, b"", "Failed to mark attendance");
        assert_eq!(err.to_string(), "Failed to mark attendance (HTTP 500)");

        let err = from_response(StatusCode::UNAUTHORIZED, br#"{"detail":"expired"}"#, "x");
        assert!(err.requires_reauth());
        assert!(!err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }
}

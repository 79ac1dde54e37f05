use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8001/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for the attendance backend.
///
/// The token is passed in explicitly; the client never reads ambient state.
#[derive(Debug)]
pub struct ApiConfig {
    /// Base URL including the API prefix, e.g. `https://lms.example.edu/api`.
    pub base_url: String,
    /// Bearer token attached to every request.
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

use anyhow::{Context, Result};
use facecheck_api::ApiConfig;
use facecheck_core::{ExtractPolicy, ANTISPOOF_THRESHOLD};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Effective configuration: defaults, then the TOML file, then `FACECHECK_*` variables.
pub struct Config {
    /// Attendance API base URL including the `/api` prefix.
    pub api_url: String,
    /// Bearer token for the attendance API.
    pub api_token: Option<SecretString>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// V4L2 device path used for live capture.
    pub camera_device: String,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Command line of the external face analyzer.
    pub analyzer_cmd: Option<String>,
    /// Minimum anti-spoof score for a face to be accepted.
    pub antispoof_threshold: f64,
    /// Refresh history and stats after a successful check-in.
    pub auto_refresh: bool,
    /// File the second layer was read from, if any.
    pub source: Option<PathBuf>,
}

/// On-disk layer. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
    camera_device: Option<String>,
    warmup_frames: Option<usize>,
    analyzer_cmd: Option<String>,
    antispoof_threshold: Option<f64>,
    auto_refresh: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: facecheck_api::config::DEFAULT_BASE_URL.to_string(),
            api_token: None,
            timeout_secs: facecheck_api::config::DEFAULT_TIMEOUT.as_secs(),
            camera_device: "/dev/video0".to_string(),
            warmup_frames: 4,
            analyzer_cmd: None,
            antispoof_threshold: ANTISPOOF_THRESHOLD,
            auto_refresh: true,
            source: None,
        }
    }
}

impl Config {
    /// Load all three layers from the real environment.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = config_path(env);

        let file = match &path {
            Some(p) if p.exists() => Some(read_file(p)?),
            _ => None,
        };

        let mut config = Self::default();
        if let Some(file) = file {
            config.apply_file(file);
            config.source = path;
        }
        config.apply_env(env);
        Ok(config)
    }

    pub fn api_config(&self) -> ApiConfig {
        let config = ApiConfig::new(self.api_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        match &self.api_token {
            Some(token) => config.with_token(token.expose_secret()),
            None => config,
        }
    }

    pub fn extract_policy(&self) -> ExtractPolicy {
        ExtractPolicy {
            min_antispoof: self.antispoof_threshold,
            ..ExtractPolicy::default()
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.api_url {
            self.api_url = v;
        }
        if let Some(v) = file.api_token {
            self.api_token = Some(SecretString::from(v));
        }
        if let Some(v) = file.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = file.camera_device {
            self.camera_device = v;
        }
        if let Some(v) = file.warmup_frames {
            self.warmup_frames = v;
        }
        if file.analyzer_cmd.is_some() {
            self.analyzer_cmd = file.analyzer_cmd;
        }
        if let Some(v) = file.antispoof_threshold {
            self.antispoof_threshold = v;
        }
        if let Some(v) = file.auto_refresh {
            self.auto_refresh = v;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FACECHECK_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = env("FACECHECK_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(SecretString::from(v));
        }
        if let Some(v) = env_parse(&env, "FACECHECK_TIMEOUT_SECS") {
            self.timeout_secs = v;
        }
        if let Some(v) = env("FACECHECK_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = env_parse(&env, "FACECHECK_WARMUP_FRAMES") {
            self.warmup_frames = v;
        }
        if let Some(v) = env("FACECHECK_ANALYZER_CMD") {
            self.analyzer_cmd = Some(v);
        }
        if let Some(v) = env_parse(&env, "FACECHECK_ANTISPOOF_THRESHOLD") {
            self.antispoof_threshold = v;
        }
        if let Some(v) = env("FACECHECK_AUTO_REFRESH") {
            self.auto_refresh = v != "0";
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self
            .source
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults and environment only)".to_string());
        writeln!(f, "config file         {source}")?;
        writeln!(f, "api_url             {}", self.api_url)?;
        let token = if self.api_token.is_some() { "<redacted>" } else { "(unset)" };
        writeln!(f, "api_token           {token}")?;
        writeln!(f, "timeout_secs        {}", self.timeout_secs)?;
        writeln!(f, "camera_device       {}", self.camera_device)?;
        writeln!(f, "warmup_frames       {}", self.warmup_frames)?;
        writeln!(
            f,
            "analyzer_cmd        {}",
            self.analyzer_cmd.as_deref().unwrap_or("(unset)")
        )?;
        writeln!(f, "antispoof_threshold {}", self.antispoof_threshold)?;
        write!(f, "auto_refresh        {}", self.auto_refresh)
    }
}

/// `$FACECHECK_CONFIG`, else `$XDG_CONFIG_HOME/facecheck/config.toml`, else
/// `~/.config/facecheck/config.toml`.
fn config_path(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(explicit) = env("FACECHECK_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    let config_dir = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(config_dir.join("facecheck").join("config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

//! Biometric analyzer seam and the sidecar-process adapter.
//!
//! The analyzer runs detection, embedding and anti-spoof scoring. Nothing in
//! this crate depends on how; only on the `{box, embedding, antispoof?}` shape.

use crate::types::DetectedFace;
use serde::Deserialize;
use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analysis failed: {0}")]
    Failed(String),
    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),
    #[error("analyzer i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Face detection + embedding + anti-spoof over one RGB8 frame.
pub trait FaceAnalyzer: Send + Sync {
    /// Initialize the underlying model. Called once before the first `detect`.
    fn load(&self) -> impl Future<Output = Result<(), AnalyzerError>> + Send;

    /// Run one detection pass over a packed RGB8 frame.
    fn detect(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<Vec<DetectedFace>, AnalyzerError>> + Send;
}

/// Output of the sidecar: either a bare face list or a `{ "face": [...] }` result object.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnalyzerOutput {
    Faces(Vec<DetectedFace>),
    Result { face: Vec<DetectedFace> },
}

/// Analyzer backed by an external tool.
///
/// Each detection spawns the tool, writes the frame to its stdin as PNG and
/// reads a JSON face list from its stdout.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_ANALYZER_TIMEOUT,
        }
    }

    /// Build from a whitespace-separated command line, e.g. `face-embed --antispoof`.
    pub fn from_command_line(line: &str) -> Result<Self, AnalyzerError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| AnalyzerError::Unavailable("empty analyzer command".into()))?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl FaceAnalyzer for CommandAnalyzer {
    async fn load(&self) -> Result<(), AnalyzerError> {
        let resolved = resolve_program(&self.program).ok_or_else(|| {
            AnalyzerError::Unavailable(format!("{} not found on PATH", self.program))
        })?;
        tracing::info!(program = %resolved.display(), "analyzer command resolved");
        Ok(())
    }

    async fn detect(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let png = encode_png(rgb, width, height)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin concurrently so a chatty tool cannot fill stdout and stall.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let _ = stdin.write_all(&png).await;
            })
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalyzerError::Timeout(self.timeout))??;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzerError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let parsed: AnalyzerOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| AnalyzerError::Failed(format!("unreadable analyzer output: {e}")))?;
        Ok(match parsed {
            AnalyzerOutput::Faces(faces) | AnalyzerOutput::Result { face: faces } => faces,
        })
    }
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AnalyzerError> {
    let img = image::RgbImage::from_raw(width, height, rgb.to_vec()).ok_or_else(|| {
        AnalyzerError::Failed(format!(
            "frame buffer of {} bytes does not match {width}x{height} RGB",
            rgb.len()
        ))
    })?;
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| AnalyzerError::Failed(format!("png encode: {e}")))?;
    Ok(buf.into_inner())
}

/// Resolve a program name the way the shell would: paths as-is, bare names via `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use facecheck_api::{AttendanceClient, HistoryQuery};
use facecheck_core::{CommandAnalyzer, EmbeddingExtractor};
use facecheck_engine::{AttemptStatus, CheckinError, CheckinPipeline, HistoryCache};
use facecheck_hw::{Camera, CameraSource, CaptureError, CaptureFrame, FileSource, FrameSource};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facecheck", about = "Face-based attendance check-in")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check in with a face from the camera (or an image file)
    Checkin {
        /// Use this image instead of the camera
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Register your face for future check-ins
    Enroll {
        /// Use this image instead of the camera
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Enrollment date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show attendance history
    History {
        #[arg(long)]
        student_id: Option<i64>,
        /// First day to include, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to include, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show attendance statistics
    Stats,
    /// List V4L2 capture devices
    Devices,
    /// Print the effective configuration
    Config,
}

/// Camera or file, chosen per invocation.
enum Source {
    Camera(CameraSource),
    File(FileSource),
}

impl Source {
    fn new(config: &Config, file: Option<PathBuf>) -> Self {
        match file {
            Some(path) => Source::File(FileSource::new(path)),
            None => Source::Camera(CameraSource::new(
                config.camera_device.clone(),
                config.warmup_frames,
            )),
        }
    }
}

impl FrameSource for Source {
    async fn acquire_frame(&mut self) -> Result<CaptureFrame, CaptureError> {
        match self {
            Source::Camera(camera) => camera.acquire_frame().await,
            Source::File(file) => file.acquire_frame().await,
        }
    }
}

type Pipeline = CheckinPipeline<CommandAnalyzer, AttendanceClient>;

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let Some(cmd) = config.analyzer_cmd.as_deref() else {
        bail!("no face analyzer configured; set FACECHECK_ANALYZER_CMD or analyzer_cmd in the config file");
    };
    let analyzer = CommandAnalyzer::from_command_line(cmd).context("invalid analyzer command")?;
    let extractor = EmbeddingExtractor::new(analyzer).with_policy(config.extract_policy());
    let client = client(config)?;

    let pipeline = CheckinPipeline::new(extractor, client.clone());
    if config.auto_refresh {
        let cache = Arc::new(HistoryCache::new(client));
        return Ok(pipeline.with_history(cache, HistoryQuery::default()));
    }
    Ok(pipeline)
}

fn client(config: &Config) -> Result<AttendanceClient> {
    AttendanceClient::new(&config.api_config()).context("failed to set up API client")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Checkin { file } => {
            let pipeline = build_pipeline(&config)?;
            let mut source = Source::new(&config, file);
            let attempt = pipeline.check_in(&mut source).await;

            match attempt.status {
                AttemptStatus::Succeeded => {
                    let message = attempt
                        .result
                        .as_ref()
                        .and_then(|r| r.message.as_deref())
                        .unwrap_or("Attendance marked");
                    println!("{message}");
                    if let Some(id) = attempt.result.as_ref().and_then(|r| r.attendance_id) {
                        println!("  attendance id: {id}");
                    }
                    if let Some(stats) = pipeline.history().and_then(|h| h.stats()) {
                        println!(
                            "  attendance rate: {:.1}%  days present: {}  streak: {}",
                            stats.attendance_rate, stats.days_present, stats.current_streak
                        );
                    }
                }
                _ => {
                    let error = attempt.error.as_deref().unwrap_or("check-in did not complete");
                    eprintln!("Check-in failed: {error}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Enroll { file, date } => {
            let pipeline = build_pipeline(&config)?;
            let mut source = Source::new(&config, file);
            let created_at = date.unwrap_or_else(|| Local::now().date_naive());

            match pipeline.enroll(&mut source, created_at).await {
                Ok(record) => {
                    println!("Face enrolled ({created_at})");
                    if let Some(id) = record.id {
                        println!("  enrollment id: {id}");
                    }
                }
                Err(e) => {
                    eprintln!("Enrollment failed: {e}");
                    if e.is_recoverable() {
                        eprintln!("Capture a new image and try again.");
                    } else if matches!(e, CheckinError::Capture(CaptureError::Device(_))) {
                        eprintln!("Camera unavailable; grant access or pass --file <image>.");
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::History {
            student_id,
            from,
            to,
            limit,
        } => {
            let query = HistoryQuery {
                student_id,
                from,
                to,
                limit,
            };
            let records = client(&config)?
                .history(&query)
                .await
                .context("could not load attendance history")?;

            if records.is_empty() {
                println!("No attendance records");
            } else {
                println!("{:<12} {:<8} TIME", "DATE", "STATUS");
                for r in &records {
                    let date = r.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
                    let time = r
                        .timestamp
                        .map(|t| t.format("%H:%M").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!("{date:<12} {:<8} {time}", r.status.as_str());
                }
            }
        }
        Commands::Stats => {
            let stats = client(&config)?
                .stats()
                .await
                .context("could not load attendance stats")?;
            println!("Attendance rate: {:.1}%", stats.attendance_rate);
            println!("Days present:    {}", stats.days_present);
            println!("Current streak:  {}", stats.current_streak);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Config => {
            println!("{config}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

use anyhow::{Context, Result};
use murmur_core::{Event, Murmur, ProgressTracker, Settings};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Resolved locations plus the loaded settings.
pub struct AppContext {
    pub data_dir: PathBuf,
    pub settings: Settings,
}

impl AppContext {
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(Settings::data_dir);
        let path = Settings::path_in(&data_dir);
        let settings = Settings::load_from(&path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(Self { data_dir, settings })
    }

    pub fn settings_path(&self) -> PathBuf {
        Settings::path_in(&self.data_dir)
    }

    pub fn open(&self) -> Result<Murmur> {
        Murmur::builder(self.settings.clone())
            .data_dir(&self.data_dir)
            .build()
            .context("Failed to initialize murmur")
    }
}

pub fn ensure_ffmpeg_installed(file: &Path) -> Result<()> {
    let is_wav = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "wav" | "wave"));
    if is_wav {
        return Ok(());
    }
    if std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_err()
    {
        eprintln!("Error: FFmpeg is not installed or not in PATH.");
        eprintln!("\nmurmur needs FFmpeg to read non-WAV audio.");
        eprintln!("Please install FFmpeg:");
        eprintln!("  - Ubuntu/Debian: sudo apt install ffmpeg");
        eprintln!("  - macOS: brew install ffmpeg");
        eprintln!("  - Windows: choco install ffmpeg or download from ffmpeg.org\n");
        anyhow::bail!("ffmpeg not found");
    }
    Ok(())
}

/// Print download and extraction progress to stderr until aborted.
pub fn spawn_progress_printer(mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = ProgressTracker::new();
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            tracker.observe(&event);

            match &event {
                Event::DownloadProgress {
                    model_id,
                    downloaded_bytes,
                    total_bytes,
                    percentage,
                } => {
                    let eta = tracker
                        .get(model_id)
                        .and_then(|stats| stats.eta(*total_bytes))
                        .map(|eta| format!(", {}s left", eta.as_secs()))
                        .unwrap_or_default();
                    eprint!(
                        "\r{model_id}: {percentage:5.1}% ({} / {}, {}/s{eta})   ",
                        format_bytes(*downloaded_bytes),
                        format_bytes(*total_bytes),
                        format_bytes(tracker.speed(model_id) as u64),
                    );
                    let _ = std::io::stderr().flush();
                }
                Event::ExtractionStarted { model_id } => eprintln!("\n{model_id}: extracting..."),
                Event::DownloadComplete { model_id } => eprintln!("\n{model_id}: download complete"),
                Event::DownloadCancelled { model_id } => eprintln!("\n{model_id}: cancelled"),
                _ => {}
            }
        }
    })
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

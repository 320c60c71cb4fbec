//! Persistent settings.
//!
//! Stored as `settings.json` in the data directory. Every field has a serde
//! default so older files keep loading as fields are added.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::transcription::WordCorrection;

/// Overrides the data directory (settings, catalog, models).
pub const DATA_DIR_ENV: &str = "MURMUR_DATA_DIR";
/// Overrides only the models directory.
pub const MODELS_DIR_ENV: &str = "MURMUR_MODELS_DIR";

/// When an idle engine is unloaded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelUnloadTimeout {
    Never,
    /// Unload right after every transcription
    Immediately,
    Min2,
    #[default]
    Min5,
    Min10,
    Min15,
    Hour1,
    /// Short timeout for debugging
    Sec5,
}

impl ModelUnloadTimeout {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelUnloadTimeout::Never => "never",
            ModelUnloadTimeout::Immediately => "immediately",
            ModelUnloadTimeout::Min2 => "min2",
            ModelUnloadTimeout::Min5 => "min5",
            ModelUnloadTimeout::Min10 => "min10",
            ModelUnloadTimeout::Min15 => "min15",
            ModelUnloadTimeout::Hour1 => "hour1",
            ModelUnloadTimeout::Sec5 => "sec5",
        }
    }

    /// Idle period after which the engine is unloaded. `None` for
    /// [`Never`](Self::Never) and [`Immediately`](Self::Immediately), which are
    /// not driven by the idle watcher.
    pub fn idle_duration(&self) -> Option<Duration> {
        match self {
            ModelUnloadTimeout::Never | ModelUnloadTimeout::Immediately => None,
            ModelUnloadTimeout::Min2 => Some(Duration::from_secs(120)),
            ModelUnloadTimeout::Min5 => Some(Duration::from_secs(300)),
            ModelUnloadTimeout::Min10 => Some(Duration::from_secs(600)),
            ModelUnloadTimeout::Min15 => Some(Duration::from_secs(900)),
            ModelUnloadTimeout::Hour1 => Some(Duration::from_secs(3600)),
            ModelUnloadTimeout::Sec5 => Some(Duration::from_secs(5)),
        }
    }
}

impl fmt::Display for ModelUnloadTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelUnloadTimeout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(ModelUnloadTimeout::Never),
            "immediately" | "0" => Ok(ModelUnloadTimeout::Immediately),
            "min2" | "2m" => Ok(ModelUnloadTimeout::Min2),
            "min5" | "5m" => Ok(ModelUnloadTimeout::Min5),
            "min10" | "10m" => Ok(ModelUnloadTimeout::Min10),
            "min15" | "15m" => Ok(ModelUnloadTimeout::Min15),
            "hour1" | "1h" => Ok(ModelUnloadTimeout::Hour1),
            "sec5" | "5s" => Ok(ModelUnloadTimeout::Sec5),
            _ => Err(format!(
                "Unknown unload timeout: {}. Available: never, immediately, min2, min5, min10, min15, hour1, sec5",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Where model assets are stored (None = `<data dir>/models`)
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// Seconds of audio per inference chunk
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: u32,

    /// Load every freshly downloaded model and make it the active one.
    /// Deferred until a running session ends.
    #[serde(default = "default_true")]
    pub auto_activate: bool,

    /// Events buffered per observer before the slowest one lags
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Seconds without data before a download is considered stalled
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default)]
    pub model_unload_timeout: ModelUnloadTimeout,

    /// Default language code, or "auto"
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub translate_to_english: bool,

    /// Preferred spellings; close matches in the output are replaced
    #[serde(default)]
    pub custom_words: Vec<String>,

    /// Largest edit distance, relative to word length, still corrected
    #[serde(default = "default_word_correction_threshold")]
    pub word_correction_threshold: f64,
}

fn default_chunk_seconds() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_download_timeout() -> u64 {
    120
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_word_correction_threshold() -> f64 {
    0.18
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: None,
            chunk_seconds: default_chunk_seconds(),
            auto_activate: true,
            event_capacity: default_event_capacity(),
            download_timeout_secs: default_download_timeout(),
            model_unload_timeout: ModelUnloadTimeout::default(),
            language: default_language(),
            translate_to_english: false,
            custom_words: Vec::new(),
            word_correction_threshold: default_word_correction_threshold(),
        }
    }
}

impl Settings {
    /// Data directory: `$MURMUR_DATA_DIR`, else `<local data dir>/murmur`.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV)
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir);
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("murmur")
    }

    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join("settings.json")
    }

    pub fn catalog_path(data_dir: &Path) -> PathBuf {
        data_dir.join("catalog.json")
    }

    /// A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Effective models directory, honoring `$MURMUR_MODELS_DIR`.
    pub fn resolve_models_dir(&self, data_dir: &Path) -> PathBuf {
        if let Ok(dir) = std::env::var(MODELS_DIR_ENV)
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir);
        }
        self.models_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("models"))
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_seconds.max(1) as usize * crate::provider::SAMPLE_RATE as usize
    }

    pub fn word_correction(&self) -> WordCorrection {
        WordCorrection::new(self.custom_words.clone(), self.word_correction_threshold)
    }
}

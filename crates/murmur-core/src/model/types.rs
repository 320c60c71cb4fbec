//! Shared model types: engine families, descriptors and derived status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inference engine family a model runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Whisper GGML models, one file each. Supports translation to English.
    Whisper,
    /// Parakeet ONNX models, shipped as archives holding a directory.
    Parakeet,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Whisper => "whisper",
            EngineKind::Parakeet => "parakeet",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineKind::Whisper => "Whisper",
            EngineKind::Parakeet => "Parakeet",
        }
    }

    pub fn supports_translation(&self) -> bool {
        matches!(self, EngineKind::Whisper)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper" => Ok(EngineKind::Whisper),
            "parakeet" => Ok(EngineKind::Parakeet),
            _ => Err(format!("Unknown engine: {}. Available: whisper, parakeet", s)),
        }
    }
}

/// Catalog entry for one model asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub description: String,
    /// File name of the downloaded asset inside the models directory
    pub asset_filename: String,
    pub is_archive: bool,
    pub engine: EngineKind,
    pub url: String,
    #[serde(default)]
    pub size_mb: Option<u64>,
    /// Relative accuracy used to pick a translation-capable fallback (0-10)
    #[serde(default)]
    pub accuracy: u8,
    #[serde(default)]
    pub is_custom: bool,
}

/// Derived lifecycle status of a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    #[default]
    None,
    Downloading,
    Extracting,
    Downloaded,
    Loading,
    Ready,
    Error,
    Unloaded,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::None => "none",
            ModelStatus::Downloading => "downloading",
            ModelStatus::Extracting => "extracting",
            ModelStatus::Downloaded => "downloaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
            ModelStatus::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a download in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

impl DownloadProgress {
    pub fn new(downloaded_bytes: u64, total_bytes: u64) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            percentage: percentage(downloaded_bytes, total_bytes),
        }
    }
}

/// Percentage of `total` covered by `downloaded`, clamped to `[0, 100]`.
/// Unknown totals (zero) report `0`.
pub fn percentage(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// A descriptor together with its derived status, as returned by `list_models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelView {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub status: ModelStatus,
    pub is_downloaded: bool,
    pub is_active: bool,
    pub progress: Option<DownloadProgress>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_clamped() {
        assert_eq!(percentage(50, 100), 50.0);
        assert_eq!(percentage(150, 100), 100.0);
        assert_eq!(percentage(10, 0), 0.0);
    }

    #[test]
    fn test_engine_from_str() {
        assert_eq!("Whisper".parse::<EngineKind>(), Ok(EngineKind::Whisper));
        assert_eq!("parakeet".parse::<EngineKind>(), Ok(EngineKind::Parakeet));
        assert!("vosk".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_only_whisper_translates() {
        assert!(EngineKind::Whisper.supports_translation());
        assert!(!EngineKind::Parakeet.supports_translation());
    }
}

//! Session options, status and result shaping.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Segment;
use super::format::to_plain_text;
use crate::provider::InferenceOptions;

/// Language value requesting automatic identification.
pub const AUTO_LANGUAGE: &str = "auto";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Cancelling => "cancelling",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }

    /// A session is occupying the engine.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Cancelling)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionOptions {
    /// Language code or `"auto"`
    #[serde(default = "default_language")]
    pub language: String,
    /// Request English output (Whisper only)
    #[serde(default)]
    pub translate: bool,
}

fn default_language() -> String {
    AUTO_LANGUAGE.to_string()
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: default_language(),
            translate: false,
        }
    }
}

impl TranscriptionOptions {
    pub fn new(language: impl Into<String>, translate: bool) -> Self {
        Self {
            language: language.into(),
            translate,
        }
    }

    /// Engine options: `auto` becomes `None`, Chinese script variants collapse
    /// to `zh`.
    pub fn inference(&self) -> InferenceOptions {
        let language = self.language.trim();
        let language = if language.is_empty() || language.eq_ignore_ascii_case(AUTO_LANGUAGE) {
            None
        } else if language == "zh-Hans" || language == "zh-Hant" {
            Some("zh".to_string())
        } else {
            Some(language.to_string())
        };
        InferenceOptions {
            language,
            translate: self.translate,
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub path: String,
    pub segments: Vec<Segment>,
    pub text: String,
}

impl Transcript {
    pub fn new(path: impl Into<String>, segments: Vec<Segment>) -> Self {
        let text = to_plain_text(&segments);
        Self {
            path: path.into(),
            segments,
            text,
        }
    }
}

/// Authoritative segment set: trimmed, empty ones dropped, ordered by start,
/// and never ending before they start.
pub fn finalize_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = segments
        .into_iter()
        .filter_map(|s| {
            let text = s.text.trim();
            if text.is_empty() {
                return None;
            }
            let start = if s.start.is_finite() { s.start.max(0.0) } else { 0.0 };
            let end = if s.end.is_finite() { s.end.max(start) } else { start };
            Some(Segment::new(start, end, text))
        })
        .collect();
    out.sort_by(|a, b| a.start.total_cmp(&b.start));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_language_is_none() {
        let opts = TranscriptionOptions::default().inference();
        assert_eq!(opts.language, None);
        assert!(!opts.translate);
        assert_eq!(TranscriptionOptions::new("AUTO", false).inference().language, None);
    }

    #[test]
    fn test_chinese_variants_normalized() {
        assert_eq!(
            TranscriptionOptions::new("zh-Hans", true).inference(),
            InferenceOptions {
                language: Some("zh".to_string()),
                translate: true
            }
        );
        assert_eq!(
            TranscriptionOptions::new("zh-Hant", false).inference().language,
            Some("zh".to_string())
        );
        assert_eq!(
            TranscriptionOptions::new("de", false).inference().language,
            Some("de".to_string())
        );
    }

    #[test]
    fn test_finalize_segments() {
        let segments = vec![
            Segment::new(5.0, 6.0, " later "),
            Segment::new(0.0, 1.0, ""),
            Segment::new(2.0, 1.0, "backwards"),
            Segment::new(-1.0, 0.5, "first"),
        ];
        let out = finalize_segments(segments);
        assert_eq!(
            out,
            vec![
                Segment::new(0.0, 0.5, "first"),
                Segment::new(2.0, 2.0, "backwards"),
                Segment::new(5.0, 6.0, "later"),
            ]
        );
    }

    #[test]
    fn test_status_classes() {
        assert!(SessionStatus::Running.is_active());
        assert!(SessionStatus::Cancelling.is_active());
        assert!(!SessionStatus::Completed.is_active());
        assert!(!SessionStatus::Idle.is_active());
    }
}

//! Transcription sessions.
//!
//! # Architecture
//!
//! ```text
//! SessionController::transcribe_file / transcribe_stream
//!   ├── ensure an engine is loaded (lazy load, translation switch)
//!   ├── claim the single session slot      (Busy otherwise)
//!   ├── decode the source                  (SourceUnavailable)
//!   └── per chunk: infer → offset → correct words → publish transcription-progress
//!         └── terminal: file-transcription-completed | transcription-cancelled
//!                       | transcription-failed
//! ```

pub mod controller;
pub mod correction;
pub mod format;
pub mod session;

use serde::{Deserialize, Serialize};

pub use controller::{AudioSource, SessionController};
pub use correction::WordCorrection;
pub use format::{format_timestamp, to_plain_text, to_srt};
pub use session::{SessionStatus, Transcript, TranscriptionOptions};

/// A timed span of recognized text, in seconds from the start of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

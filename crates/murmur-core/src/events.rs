//! Events published by the core and the bus that carries them.
//!
//! Every observer owns its own [`tokio::sync::broadcast::Receiver`]. Events of
//! a single operation arrive in the order they were published; there is no
//! ordering guarantee across operations. A lagging observer loses the oldest
//! events and should resynchronize with point-in-time queries.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::transcription::Segment;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Phase of a model load/unload reported through `model-state-changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStateKind {
    LoadingStarted,
    LoadingCompleted,
    LoadingFailed,
    Unloaded,
}

impl ModelStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStateKind::LoadingStarted => "loading_started",
            ModelStateKind::LoadingCompleted => "loading_completed",
            ModelStateKind::LoadingFailed => "loading_failed",
            ModelStateKind::Unloaded => "unloaded",
        }
    }
}

impl std::fmt::Display for ModelStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all_fields = "camelCase")]
pub enum Event {
    #[serde(rename = "model-state-changed")]
    ModelStateChanged {
        event_type: ModelStateKind,
        model_id: Option<String>,
        model_name: Option<String>,
        error: Option<String>,
    },
    #[serde(rename = "model-download-progress")]
    DownloadProgress {
        model_id: String,
        downloaded_bytes: u64,
        total_bytes: u64,
        percentage: f64,
    },
    #[serde(rename = "model-download-complete")]
    DownloadComplete { model_id: String },
    #[serde(rename = "model-download-failed")]
    DownloadFailed { model_id: String, error: String },
    #[serde(rename = "model-download-cancelled")]
    DownloadCancelled { model_id: String },
    #[serde(rename = "model-extraction-started")]
    ExtractionStarted { model_id: String },
    #[serde(rename = "model-extraction-completed")]
    ExtractionCompleted { model_id: String },
    #[serde(rename = "model-extraction-failed")]
    ExtractionFailed { model_id: String, error: String },
    /// Incremental batch; observers append.
    #[serde(rename = "transcription-progress")]
    TranscriptionProgress { segments: Vec<Segment> },
    /// Authoritative result; observers replace whatever they accumulated.
    #[serde(rename = "file-transcription-completed")]
    FileTranscriptionCompleted {
        path: String,
        segments: Vec<Segment>,
        text: String,
    },
    #[serde(rename = "transcription-cancelled")]
    TranscriptionCancelled { path: String, segments: Vec<Segment> },
    #[serde(rename = "transcription-failed")]
    TranscriptionFailed { path: String, error: String },
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ModelStateChanged { .. } => "model-state-changed",
            Event::DownloadProgress { .. } => "model-download-progress",
            Event::DownloadComplete { .. } => "model-download-complete",
            Event::DownloadFailed { .. } => "model-download-failed",
            Event::DownloadCancelled { .. } => "model-download-cancelled",
            Event::ExtractionStarted { .. } => "model-extraction-started",
            Event::ExtractionCompleted { .. } => "model-extraction-completed",
            Event::ExtractionFailed { .. } => "model-extraction-failed",
            Event::TranscriptionProgress { .. } => "transcription-progress",
            Event::FileTranscriptionCompleted { .. } => "file-transcription-completed",
            Event::TranscriptionCancelled { .. } => "transcription-cancelled",
            Event::TranscriptionFailed { .. } => "transcription-failed",
        }
    }

    /// True for the events that end a transcription session.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            Event::FileTranscriptionCompleted { .. }
                | Event::TranscriptionCancelled { .. }
                | Event::TranscriptionFailed { .. }
        )
    }

    pub(crate) fn model_state(
        event_type: ModelStateKind,
        model_id: Option<&str>,
        model_name: Option<&str>,
        error: Option<String>,
    ) -> Self {
        Event::ModelStateChanged {
            event_type,
            model_id: model_id.map(str::to_string),
            model_name: model_name.map(str::to_string),
            error,
        }
    }
}

/// Multi-observer publisher for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no observers is not an error.
    pub fn emit(&self, event: Event) {
        tracing::trace!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

//! Engine slot shared by the model manager and the session controller.
//!
//! Everything that decides whether the engine may change hands lives behind
//! one mutex: the loaded backend, an in-progress load, the session status and
//! a deferred auto-activation. Checks and updates happen under that lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::model::EngineKind;
use crate::provider::TranscriptionBackend;
use crate::transcription::SessionStatus;

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn TranscriptionBackend>>>;

/// `None` until the load finishes.
pub(crate) type LoadOutcome = Option<Result<()>>;

/// A model load in flight. Callers interested in the same load share `done`.
pub(crate) struct InFlightLoad {
    pub model_id: String,
    pub done: watch::Receiver<LoadOutcome>,
}

pub(crate) struct LoadedEngine {
    pub model_id: String,
    pub engine: EngineKind,
    pub backend: SharedBackend,
}

impl LoadedEngine {
    /// Release engine resources. The backend is idle when this is called.
    pub fn unload(self) {
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        backend.unload();
    }
}

#[derive(Default)]
pub(crate) struct HostState {
    pub loaded: Option<LoadedEngine>,
    /// Model whose load is in flight (shown optimistically by observers)
    pub requested: Option<String>,
    /// Set while any load runs; at most one at a time
    pub loading: Option<InFlightLoad>,
    pub session: SessionStatus,
    pub session_cancel: Option<Arc<CancelFlag>>,
    /// Auto-activation suppressed by a running session
    pub pending_activation: Option<String>,
    pub load_errors: HashMap<String, String>,
    pub last_unloaded: Option<String>,
    pub last_activity: Option<Instant>,
}

impl HostState {
    pub fn loaded_id(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.model_id.as_str())
    }

    pub fn loading_id(&self) -> Option<&str> {
        self.loading.as_ref().map(|l| l.model_id.as_str())
    }

    /// Claim the load slot for `id`. The load publishes its outcome through
    /// the returned sender after calling [`end_load`](Self::end_load).
    pub fn begin_load(&mut self, id: &str) -> watch::Sender<LoadOutcome> {
        let (tx, rx) = watch::channel(None);
        self.loading = Some(InFlightLoad {
            model_id: id.to_string(),
            done: rx,
        });
        self.requested = Some(id.to_string());
        self.load_errors.remove(id);
        tx
    }

    pub fn end_load(&mut self) {
        self.loading = None;
        self.requested = None;
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }
}

/// Wait for the outcome of an [`InFlightLoad`].
pub(crate) async fn wait_for_load(mut rx: watch::Receiver<LoadOutcome>) -> Result<()> {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return rx
                .borrow()
                .clone()
                .unwrap_or_else(|| Err(Error::Load("load task ended unexpectedly".to_string())));
        }
    }
}

#[derive(Default)]
pub(crate) struct EngineHost {
    state: Mutex<HostState>,
}

impl EngineHost {
    pub fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

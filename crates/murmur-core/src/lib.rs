//! Local speech-to-text core: model lifecycle and transcription sessions.
//!
//! [`Murmur`] is the command surface. Every state change is published as an
//! [`Event`] on a broadcast bus; observers call [`Murmur::subscribe`] and use
//! the query commands to resynchronize.
//!
//! ```no_run
//! # async fn demo() -> murmur_core::Result<()> {
//! use murmur_core::{Murmur, Settings, TranscriptionOptions};
//!
//! let murmur = Murmur::builder(Settings::default()).build()?;
//! let id = murmur.register_model("https://example.com/m.bin", None)?;
//! murmur.download_model(&id).await?;
//! murmur.set_active_model(&id).await?;
//! let transcript = murmur
//!     .transcribe_file("clip.wav", TranscriptionOptions::default())
//!     .await?;
//! println!("{}", transcript.text);
//! # Ok(())
//! # }
//! ```

pub mod audio;
mod cancel;
pub mod error;
pub mod events;
mod host;
pub mod model;
pub mod progress;
pub mod provider;
pub mod settings;
pub mod transcription;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub use audio::{AudioDecoder, FileDecoder};
pub use cancel::CancelFlag;
pub use error::{Error, Result};
pub use events::{Event, EventBus, ModelStateKind};
pub use model::{
    AssetFetcher, DownloadProgress, EngineKind, HttpFetcher, ModelDescriptor, ModelStatus,
    ModelView,
};
pub use progress::{DownloadStats, ProgressTracker};
pub use provider::{BackendLoader, ChunkOutput, InferenceOptions, LocalLoader, TranscriptionBackend};
pub use settings::{ModelUnloadTimeout, Settings};
pub use transcription::{
    Segment, SessionStatus, Transcript, TranscriptionOptions, WordCorrection, format_timestamp,
    to_plain_text, to_srt,
};

use host::EngineHost;
use model::{Catalog, ModelManager};
use transcription::SessionController;

/// Assembles a [`Murmur`] with optional replacement collaborators.
pub struct MurmurBuilder {
    settings: Settings,
    data_dir: Option<PathBuf>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
    loader: Option<Arc<dyn BackendLoader>>,
    decoder: Option<Arc<dyn AudioDecoder>>,
    persist: bool,
}

impl MurmurBuilder {
    /// Root for `catalog.json` and (by default) the models directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn BackendLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Keep the catalog in memory only.
    pub fn ephemeral(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Build the core. Must be called inside a tokio runtime when the unload
    /// timeout is time-based, since the idle watcher is spawned here.
    pub fn build(self) -> Result<Murmur> {
        let data_dir = self.data_dir.unwrap_or_else(Settings::data_dir);
        let models_dir = self.settings.resolve_models_dir(&data_dir);
        std::fs::create_dir_all(&models_dir)?;

        let catalog = if self.persist {
            Catalog::load(Settings::catalog_path(&data_dir), &models_dir)
        } else {
            Catalog::in_memory(&models_dir)
        };

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(Duration::from_secs(
                self.settings.download_timeout_secs.max(1),
            ))?),
        };
        let loader = self.loader.unwrap_or_else(|| Arc::new(LocalLoader));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(FileDecoder));

        let bus = EventBus::new(self.settings.event_capacity);
        let host = Arc::new(EngineHost::default());
        let models = Arc::new(ModelManager::new(
            catalog,
            fetcher,
            loader,
            host.clone(),
            bus.clone(),
            self.settings.auto_activate,
            self.settings.model_unload_timeout,
        ));
        let sessions = Arc::new(SessionController::new(
            models.clone(),
            host,
            bus.clone(),
            decoder,
            self.settings.chunk_samples(),
            self.settings.word_correction(),
        ));

        let idle_watcher = if tokio::runtime::Handle::try_current().is_ok() {
            models.spawn_idle_watcher()
        } else {
            None
        };

        tracing::debug!("Models directory: {}", models_dir.display());
        Ok(Murmur {
            settings: self.settings,
            models_dir,
            bus,
            models,
            sessions,
            idle_watcher,
        })
    }
}

/// Command surface of the speech-to-text core.
pub struct Murmur {
    settings: Settings,
    models_dir: PathBuf,
    bus: EventBus,
    models: Arc<ModelManager>,
    sessions: Arc<SessionController>,
    idle_watcher: Option<tokio::task::JoinHandle<()>>,
}

impl Murmur {
    pub fn builder(settings: Settings) -> MurmurBuilder {
        MurmurBuilder {
            settings,
            data_dir: None,
            fetcher: None,
            loader: None,
            decoder: None,
            persist: true,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn models_dir(&self) -> &std::path::Path {
        &self.models_dir
    }

    /// New observer of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn list_models(&self) -> Vec<ModelView> {
        self.models.list_models()
    }

    pub fn register_model(&self, url: &str, name: Option<&str>) -> Result<String> {
        self.models.register_model(url, name)
    }

    pub async fn download_model(&self, id: &str) -> Result<()> {
        self.models.download_model(id).await
    }

    pub fn cancel_download(&self, id: &str) -> bool {
        self.models.cancel_download(id)
    }

    pub fn delete_model(&self, id: &str) -> Result<()> {
        self.models.delete_model(id)
    }

    pub async fn set_active_model(&self, id: &str) -> Result<()> {
        self.models.set_active_model(id).await
    }

    pub fn unload_model(&self) -> Result<bool> {
        self.models.unload_model()
    }

    pub fn get_current_model(&self) -> Option<String> {
        self.models.get_current_model()
    }

    pub fn get_requested_model(&self) -> Option<String> {
        self.models.get_requested_model()
    }

    pub fn get_engine_loaded_model(&self) -> Option<String> {
        self.models.get_engine_loaded_model()
    }

    pub async fn transcribe_file(
        &self,
        path: impl Into<PathBuf>,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        self.sessions.transcribe_file(path, options).await
    }

    /// Transcribe live 16kHz mono audio until the sender is dropped.
    pub async fn transcribe_stream(
        &self,
        receiver: mpsc::Receiver<Vec<f32>>,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        self.sessions.transcribe_stream(receiver, options).await
    }

    pub fn cancel_transcription(&self) -> bool {
        self.sessions.cancel()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.sessions.status()
    }

    pub fn is_recording_or_transcribing(&self) -> bool {
        self.sessions.is_busy()
    }
}

impl Drop for Murmur {
    fn drop(&mut self) {
        if let Some(handle) = self.idle_watcher.take() {
            handle.abort();
        }
    }
}

//! Model lifecycle: catalog queries, downloads, activation and removal.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use super::catalog::Catalog;
use super::download::{self, AssetFetcher, Phase, Slot, Ticket, Transfers};
use super::extract::extract_archive_async;
use super::types::{EngineKind, ModelDescriptor, ModelStatus, ModelView};
use super::whisper;
use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, ModelStateKind};
use crate::host::{EngineHost, HostState, LoadOutcome, LoadedEngine, wait_for_load};
use crate::provider::BackendLoader;
use crate::settings::ModelUnloadTimeout;

/// How often the idle watcher checks for an idle engine.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

pub struct ModelManager {
    catalog: Mutex<Catalog>,
    transfers: Arc<Transfers>,
    fetcher: Arc<dyn AssetFetcher>,
    loader: Arc<dyn BackendLoader>,
    host: Arc<EngineHost>,
    bus: EventBus,
    auto_activate: bool,
    unload_timeout: ModelUnloadTimeout,
}

impl ModelManager {
    pub(crate) fn new(
        catalog: Catalog,
        fetcher: Arc<dyn AssetFetcher>,
        loader: Arc<dyn BackendLoader>,
        host: Arc<EngineHost>,
        bus: EventBus,
        auto_activate: bool,
        unload_timeout: ModelUnloadTimeout,
    ) -> Self {
        Self {
            catalog: Mutex::new(catalog),
            transfers: Arc::new(Transfers::default()),
            fetcher,
            loader,
            host,
            bus,
            auto_activate,
            unload_timeout,
        }
    }

    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_catalog(&self, catalog: &Catalog) {
        if let Err(e) = catalog.save() {
            tracing::warn!("Failed to persist model catalog: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All known models with their derived status, built-ins first.
    pub fn list_models(&self) -> Vec<ModelView> {
        let (loaded, loading, errors, last_unloaded) = {
            let host = self.host.lock();
            (
                host.loaded_id().map(str::to_string),
                host.loading_id().map(str::to_string),
                host.load_errors.clone(),
                host.last_unloaded.clone(),
            )
        };

        let catalog = self.catalog();
        catalog
            .list()
            .iter()
            .map(|model| {
                let id = model.id.as_str();
                let is_downloaded = catalog.is_downloaded(id);
                let in_flight = if is_downloaded {
                    None
                } else {
                    self.transfers.phase(id)
                };

                let status = if is_downloaded {
                    if loading.as_deref() == Some(id) {
                        ModelStatus::Loading
                    } else if loaded.as_deref() == Some(id) {
                        ModelStatus::Ready
                    } else if errors.contains_key(id) {
                        ModelStatus::Error
                    } else if last_unloaded.as_deref() == Some(id) {
                        ModelStatus::Unloaded
                    } else {
                        ModelStatus::Downloaded
                    }
                } else {
                    match in_flight {
                        Some((Phase::Downloading, _)) => ModelStatus::Downloading,
                        Some((Phase::Extracting, _)) => ModelStatus::Extracting,
                        None => ModelStatus::None,
                    }
                };

                ModelView {
                    descriptor: model.clone(),
                    status,
                    is_downloaded,
                    is_active: loaded.as_deref() == Some(id),
                    progress: in_flight.and_then(|(_, progress)| progress),
                    error: errors.get(id).cloned(),
                }
            })
            .collect()
    }

    pub fn get_model(&self, id: &str) -> Option<ModelDescriptor> {
        self.catalog().get(id).cloned()
    }

    pub fn is_downloaded(&self, id: &str) -> bool {
        self.catalog().is_downloaded(id)
    }

    /// Selected model: the one being loaded, else the last confirmed one.
    /// Survives idle unloads.
    pub fn get_current_model(&self) -> Option<String> {
        let requested = self.host.lock().requested.clone();
        requested.or_else(|| self.catalog().selected().map(str::to_string))
    }

    /// Model whose load is in flight, if any.
    pub fn get_requested_model(&self) -> Option<String> {
        self.host.lock().requested.clone()
    }

    /// Model actually resident in the engine.
    pub fn get_engine_loaded_model(&self) -> Option<String> {
        self.host.lock().loaded_id().map(str::to_string)
    }

    pub fn loaded_engine(&self) -> Option<EngineKind> {
        self.host.lock().loaded.as_ref().map(|l| l.engine)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Add a model by URL. Registering the same URL twice returns the same id.
    pub fn register_model(&self, url: &str, name: Option<&str>) -> Result<String> {
        let mut catalog = self.catalog();
        let (id, created) = catalog.register(url, name)?;
        if created {
            catalog.save()?;
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------

    /// Download (and extract) a model. Resolves when the model is installed.
    ///
    /// Already-downloaded models return immediately. Concurrent calls for the
    /// same id share one transfer and receive the same outcome.
    pub async fn download_model(self: &Arc<Self>, id: &str) -> Result<()> {
        let model = {
            let catalog = self.catalog();
            let model = catalog.require(id)?.clone();
            if catalog.is_downloaded(id) {
                tracing::debug!("{id} is already downloaded");
                return Ok(());
            }
            model
        };

        match self.transfers.begin(id) {
            Slot::Joined(rx) => {
                tracing::debug!("Joining in-flight download of {id}");
                download::wait(rx).await
            }
            Slot::Started(ticket) => {
                let rx = ticket.subscribe();
                let this = self.clone();
                tokio::spawn(async move { this.run_download(model, ticket).await });
                download::wait(rx).await
            }
        }
    }

    /// Stop an in-flight download. Returns false when nothing was running.
    ///
    /// Extraction is not interruptible: once an archive is being unpacked the
    /// request is refused and the install runs to completion.
    pub fn cancel_download(&self, id: &str) -> bool {
        if matches!(self.transfers.phase(id), Some((Phase::Extracting, _))) {
            tracing::debug!("{id} is extracting, not cancelling");
            return false;
        }
        let cancelled = self.transfers.cancel(id);
        if cancelled {
            tracing::info!("Cancelling download of {id}");
        }
        cancelled
    }

    async fn run_download(self: Arc<Self>, model: ModelDescriptor, ticket: Ticket) {
        if self.is_downloaded(&model.id) {
            ticket.finish(Ok(()));
            return;
        }

        let cancel = ticket.cancel_flag();
        let result = self.install(&model, &cancel).await;

        match &result {
            Ok(path) => {
                {
                    let mut catalog = self.catalog();
                    catalog.mark_downloaded(&model.id, path.clone());
                    self.save_catalog(&catalog);
                }
                self.bus.emit(Event::DownloadComplete {
                    model_id: model.id.clone(),
                });
            }
            Err(Error::Cancelled) => {
                tracing::info!("Download of {} cancelled", model.id);
                self.bus.emit(Event::DownloadCancelled {
                    model_id: model.id.clone(),
                });
            }
            Err(Error::Extraction(_)) => {}
            Err(e) => {
                tracing::warn!("Download of {} failed: {e}", model.id);
                self.bus.emit(Event::DownloadFailed {
                    model_id: model.id.clone(),
                    error: e.to_string(),
                });
            }
        }

        // Claimed before waking the callers, so a caller that goes on to
        // activate or transcribe joins this load instead of racing it.
        if result.is_ok() {
            self.begin_auto_activation(&model.id);
        }
        ticket.finish(result.map(|_| ()));
    }

    /// Fetch the asset and, for archives, extract it. Returns the install path.
    async fn install(&self, model: &ModelDescriptor, cancel: &CancelFlag) -> Result<PathBuf> {
        let (asset, target) = {
            let catalog = self.catalog();
            (catalog.asset_path(model), catalog.install_path(model))
        };

        download::download_asset(
            self.fetcher.as_ref(),
            &self.bus,
            &self.transfers,
            &model.id,
            &model.url,
            &asset,
            cancel,
        )
        .await?;

        if !model.is_archive {
            return Ok(asset);
        }

        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&asset).await;
            return Err(Error::Cancelled);
        }

        self.transfers.set_phase(&model.id, Phase::Extracting);
        self.bus.emit(Event::ExtractionStarted {
            model_id: model.id.clone(),
        });
        tracing::info!("Extracting {}", model.id);

        let result = extract_archive_async(asset.clone(), target.clone()).await;
        let _ = tokio::fs::remove_file(&asset).await;

        match result {
            Ok(()) => {
                self.bus.emit(Event::ExtractionCompleted {
                    model_id: model.id.clone(),
                });
                Ok(target)
            }
            Err(e) => {
                tracing::warn!("Extraction of {} failed: {e}", model.id);
                self.bus.emit(Event::ExtractionFailed {
                    model_id: model.id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    fn installed(&self, id: &str) -> Result<(ModelDescriptor, PathBuf)> {
        let catalog = self.catalog();
        let model = catalog.require(id)?.clone();
        let path = catalog
            .local_path(id)
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::NotDownloaded(id.to_string()))?;
        Ok((model, path))
    }

    /// Load `id` into the engine and make it the active model.
    ///
    /// The previous engine stays loaded until the new one is confirmed, then
    /// both are swapped under the host lock. On failure the previous model
    /// remains active. A call for the model already being loaded waits for
    /// that load; switching to another model mid-load is `Busy`.
    pub async fn set_active_model(self: &Arc<Self>, id: &str) -> Result<()> {
        let (model, path) = self.installed(id)?;
        let done = {
            let mut host = self.host.lock();
            if host.session.is_active() {
                return Err(Error::Busy("a transcription is in progress".to_string()));
            }
            if let Some(loading) = &host.loading {
                if loading.model_id != id {
                    return Err(Error::Busy(format!("model {} is loading", loading.model_id)));
                }
                tracing::debug!("Joining in-flight load of {id}");
                loading.done.clone()
            } else if host.loaded_id() == Some(id) {
                return Ok(());
            } else {
                self.start_load(&mut host, model, path)
            }
        };
        wait_for_load(done).await
    }

    /// Claim the load slot and run the load detached, so a caller going away
    /// can't leave the slot taken.
    fn start_load(
        self: &Arc<Self>,
        host: &mut HostState,
        model: ModelDescriptor,
        path: PathBuf,
    ) -> tokio::sync::watch::Receiver<LoadOutcome> {
        let tx = host.begin_load(&model.id);
        let done = tx.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.load(model, path).await;
            let _ = tx.send(Some(outcome));
        });
        done
    }

    /// Run a load claimed through [`HostState::begin_load`].
    async fn load(&self, model: ModelDescriptor, path: PathBuf) -> Result<()> {
        let id = model.id.clone();
        self.bus.emit(Event::model_state(
            ModelStateKind::LoadingStarted,
            Some(&id),
            Some(&model.display_name),
            None,
        ));
        tracing::info!("Loading {} from {}", model.display_name, path.display());

        let loader = self.loader.clone();
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || loader.load(&model, &path))
            .await
            .map_err(|e| Error::Load(format!("load task failed: {e}")))
            .and_then(|r| r);

        match result {
            Ok(backend) => {
                let previous = {
                    let mut host = self.host.lock();
                    let previous = host.loaded.replace(LoadedEngine {
                        model_id: id.clone(),
                        engine: backend.engine(),
                        backend: Arc::new(Mutex::new(backend)),
                    });
                    host.end_load();
                    host.last_unloaded = None;
                    host.touch();
                    previous
                };
                {
                    let mut catalog = self.catalog();
                    catalog.set_selected(Some(&id));
                    self.save_catalog(&catalog);
                }

                let display_name = self.get_model(&id).map(|m| m.display_name);
                if let Some(previous) = previous {
                    let previous_id = previous.model_id.clone();
                    tokio::task::spawn_blocking(move || previous.unload())
                        .await
                        .ok();
                    self.bus.emit(Event::model_state(
                        ModelStateKind::Unloaded,
                        Some(&previous_id),
                        None,
                        None,
                    ));
                }
                tracing::info!("Loaded {id} in {}ms", started.elapsed().as_millis());
                self.bus.emit(Event::model_state(
                    ModelStateKind::LoadingCompleted,
                    Some(&id),
                    display_name.as_deref(),
                    None,
                ));
                Ok(())
            }
            Err(e) => {
                {
                    let mut host = self.host.lock();
                    host.end_load();
                    host.load_errors.insert(id.clone(), e.to_string());
                }
                tracing::warn!("Failed to load {id}: {e}");
                self.bus.emit(Event::model_state(
                    ModelStateKind::LoadingFailed,
                    Some(&id),
                    None,
                    Some(e.to_string()),
                ));
                Err(e)
            }
        }
    }

    /// Start making a freshly installed model the active one. Returns the
    /// load to wait on, if one was started.
    ///
    /// While a session runs the activation is remembered and retried by
    /// [`session_finished`](Self::session_finished). A load already in flight
    /// wins.
    fn begin_auto_activation(
        self: &Arc<Self>,
        id: &str,
    ) -> Option<tokio::sync::watch::Receiver<LoadOutcome>> {
        if !self.auto_activate {
            return None;
        }
        let (model, path) = self.installed(id).ok()?;
        let mut host = self.host.lock();
        if host.loaded_id() == Some(id) || host.loading.is_some() {
            return None;
        }
        if host.session.is_active() {
            tracing::debug!("Deferring activation of {id} until the session ends");
            host.pending_activation = Some(id.to_string());
            return None;
        }
        tracing::info!("Auto-activating {id}");
        Some(self.start_load(&mut host, model, path))
    }

    /// Called once a session reached its terminal state.
    pub(crate) async fn session_finished(self: &Arc<Self>) {
        let pending = self.host.lock().pending_activation.take();
        if let Some(done) = pending.and_then(|id| self.begin_auto_activation(&id)) {
            let _ = wait_for_load(done).await;
        }
        if self.unload_timeout == ModelUnloadTimeout::Immediately {
            tracing::info!("Immediately unloading model after transcription");
            if let Err(e) = self.unload_model() {
                tracing::warn!("Failed to immediately unload model: {e}");
            }
        }
    }

    /// Make sure an engine is loaded, loading the selected model if needed.
    ///
    /// A load already in flight is waited for. If it fails while another
    /// engine stays resident, that engine is used.
    pub(crate) async fn ensure_loaded(self: &Arc<Self>) -> Result<()> {
        let target = loop {
            let done = {
                let host = self.host.lock();
                match &host.loading {
                    Some(loading) => loading.done.clone(),
                    None if host.loaded.is_some() => return Ok(()),
                    None => break host.requested.clone(),
                }
            };
            tracing::debug!("Waiting for the in-flight model load");
            let outcome = wait_for_load(done).await;
            if outcome.is_err() && self.host.lock().loaded.is_none() {
                return outcome;
            }
        };
        let target = target
            .or_else(|| self.catalog().selected().map(str::to_string))
            .ok_or_else(|| Error::Load("no model selected".to_string()))?;
        tracing::debug!("Loading {target} on demand");
        self.set_active_model(&target).await
    }

    /// Switch to a downloaded Whisper model when the loaded engine cannot
    /// translate. Keeps the current engine if no Whisper model is installed.
    pub(crate) async fn ensure_translation_engine(self: &Arc<Self>) {
        if self.loaded_engine() != Some(EngineKind::Parakeet) {
            return;
        }
        let candidate = {
            let catalog = self.catalog();
            let mut whisper_models: Vec<&ModelDescriptor> = catalog
                .list()
                .iter()
                .filter(|m| m.engine == EngineKind::Whisper && catalog.is_downloaded(&m.id))
                .collect();
            whisper_models.sort_by_key(|m| {
                (
                    m.id != whisper::TRANSLATION_MODEL,
                    std::cmp::Reverse(m.accuracy),
                )
            });
            whisper_models.first().map(|m| m.id.clone())
        };

        match candidate {
            Some(id) => {
                tracing::info!("Switching to {id} for translation");
                if let Err(e) = self.set_active_model(&id).await {
                    tracing::error!("Translation engine switch failed: {e}");
                }
            }
            None => tracing::warn!(
                "Translation requested but no Whisper model is downloaded, transcribing only"
            ),
        }
    }

    // ------------------------------------------------------------------
    // Unload and delete
    // ------------------------------------------------------------------

    /// Unload the engine. Returns whether a model was loaded.
    pub fn unload_model(&self) -> Result<bool> {
        let previous = {
            let mut host = self.host.lock();
            if host.session.is_active() {
                return Err(Error::Busy("a transcription is in progress".to_string()));
            }
            let previous = host.loaded.take();
            if let Some(previous) = &previous {
                host.last_unloaded = Some(previous.model_id.clone());
            }
            previous
        };

        let Some(previous) = previous else {
            return Ok(false);
        };
        let id = previous.model_id.clone();
        let started = std::time::Instant::now();
        previous.unload();
        tracing::info!("Unloaded {id} in {}ms", started.elapsed().as_millis());
        self.bus.emit(Event::model_state(
            ModelStateKind::Unloaded,
            Some(&id),
            None,
            None,
        ));
        Ok(true)
    }

    /// Remove a model's files. Registered models also leave the catalog.
    pub fn delete_model(&self, id: &str) -> Result<()> {
        let model = self.catalog().require(id)?.clone();
        if self.transfers.is_active(id) {
            return Err(Error::Busy(format!("{id} is downloading")));
        }
        {
            let host = self.host.lock();
            if host.loaded_id() == Some(id) {
                return Err(Error::Busy(format!("{id} is the active model")));
            }
            if host.loading_id() == Some(id) {
                return Err(Error::Busy(format!("{id} is loading")));
            }
        }

        let mut catalog = self.catalog();
        if !model.is_custom && !catalog.is_downloaded(id) {
            return Err(Error::NotRemovable(id.to_string()));
        }

        let install = catalog.install_path(&model);
        let asset = catalog.asset_path(&model);
        remove_path(&install)?;
        if asset != install {
            remove_path(&asset)?;
        }

        catalog.clear_downloaded(id);
        if model.is_custom {
            catalog.remove_custom(id);
        }
        catalog.save()?;
        drop(catalog);

        let mut host = self.host.lock();
        host.load_errors.remove(id);
        if host.last_unloaded.as_deref() == Some(id) {
            host.last_unloaded = None;
        }
        tracing::info!("Deleted {id}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Idle unload
    // ------------------------------------------------------------------

    /// Start the background task that unloads an idle engine. Returns `None`
    /// when the configured timeout is not time-based.
    pub(crate) fn spawn_idle_watcher(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let timeout = self.unload_timeout.idle_duration()?;
        let check = IDLE_CHECK_INTERVAL.min(timeout);
        let manager: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(check);
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.unload_if_idle(timeout);
            }
        }))
    }

    fn unload_if_idle(&self, timeout: Duration) -> bool {
        let idle = {
            let host = self.host.lock();
            host.loaded.is_some()
                && host.loading.is_none()
                && !host.session.is_active()
                && host.last_activity.is_some_and(|t| t.elapsed() >= timeout)
        };
        if !idle {
            return false;
        }
        tracing::debug!("Unloading model after {}s of inactivity", timeout.as_secs());
        self.unload_model().unwrap_or(false)
    }
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::download::ProgressFn;
    use crate::provider::{ChunkOutput, InferenceOptions, TranscriptionBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BytesFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl AssetFetcher for BytesFetcher {
        async fn fetch(
            &self,
            _url: &str,
            dest: &Path,
            _cancel: &CancelFlag,
            on_progress: ProgressFn<'_>,
        ) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            on_progress(0, 4);
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(dest, b"ggml").await?;
            on_progress(4, 4);
            Ok(4)
        }
    }

    struct NullBackend(EngineKind);

    impl TranscriptionBackend for NullBackend {
        fn engine(&self) -> EngineKind {
            self.0
        }

        fn transcribe(&mut self, _: Vec<f32>, _: &InferenceOptions) -> Result<ChunkOutput> {
            Ok(ChunkOutput::default())
        }
    }

    struct NullLoader;

    impl BackendLoader for NullLoader {
        fn load(
            &self,
            model: &ModelDescriptor,
            _path: &Path,
        ) -> Result<Box<dyn TranscriptionBackend>> {
            if model.display_name.contains("broken") {
                return Err(Error::Load("corrupt weights".to_string()));
            }
            if model.display_name.contains("slow") {
                std::thread::sleep(Duration::from_millis(150));
            }
            Ok(Box::new(NullBackend(model.engine)))
        }
    }

    fn manager(dir: &Path, auto_activate: bool) -> (Arc<ModelManager>, Arc<BytesFetcher>) {
        let fetcher = Arc::new(BytesFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let manager = ModelManager::new(
            Catalog::in_memory(dir),
            fetcher.clone(),
            Arc::new(NullLoader),
            Arc::new(EngineHost::default()),
            EventBus::new(256),
            auto_activate,
            ModelUnloadTimeout::Never,
        );
        (Arc::new(manager), fetcher)
    }

    fn status(manager: &ModelManager, id: &str) -> ModelStatus {
        manager
            .list_models()
            .into_iter()
            .find(|m| m.descriptor.id == id)
            .map(|m| m.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_download_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        assert_eq!(
            manager.download_model("nope").await,
            Err(Error::NotFound("nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_downloads_share_one_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, fetcher) = manager(dir.path(), false);
        let mut rx = manager.bus.subscribe();

        let (a, b) = tokio::join!(manager.download_model("tiny"), manager.download_model("tiny"));
        a.unwrap();
        b.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let mut completions = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::DownloadComplete { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(status(&manager, "tiny"), ModelStatus::Downloaded);
    }

    #[tokio::test]
    async fn test_download_of_downloaded_model_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, fetcher) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.download_model("tiny").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activation_swaps_engines() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.download_model("base").await.unwrap();
        let mut rx = manager.bus.subscribe();

        manager.set_active_model("tiny").await.unwrap();
        manager.set_active_model("base").await.unwrap();

        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("base"));
        assert_eq!(manager.get_current_model().as_deref(), Some("base"));
        assert_eq!(status(&manager, "base"), ModelStatus::Ready);

        let kinds: Vec<(ModelStateKind, Option<String>)> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                Event::ModelStateChanged {
                    event_type,
                    model_id,
                    ..
                } => Some((event_type, model_id)),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ModelStateKind::LoadingStarted, Some("tiny".to_string())),
                (ModelStateKind::LoadingCompleted, Some("tiny".to_string())),
                (ModelStateKind::LoadingStarted, Some("base".to_string())),
                (ModelStateKind::Unloaded, Some("tiny".to_string())),
                (ModelStateKind::LoadingCompleted, Some("base".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_activation_joins_in_flight_load() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        let slow = manager
            .register_model("https://example.com/slow.bin", Some("slow"))
            .unwrap();
        manager.download_model(&slow).await.unwrap();
        manager.download_model("tiny").await.unwrap();
        let mut rx = manager.bus.subscribe();

        let (first, joined, other) = tokio::join!(
            manager.set_active_model(&slow),
            manager.set_active_model(&slow),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                manager.set_active_model("tiny").await
            },
        );

        first.unwrap();
        joined.unwrap();
        assert!(matches!(other, Err(Error::Busy(_))));
        assert_eq!(manager.get_engine_loaded_model(), Some(slow));

        let loads = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| {
                matches!(
                    e,
                    Event::ModelStateChanged {
                        event_type: ModelStateKind::LoadingStarted,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(loads, 1);
    }

    #[tokio::test]
    async fn test_cancel_refused_while_extracting() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        let Slot::Started(ticket) = manager.transfers.begin("parakeet-v3") else {
            panic!("transfer already running");
        };
        manager.transfers.set_phase("parakeet-v3", Phase::Extracting);
        assert!(!manager.cancel_download("parakeet-v3"));
        assert!(!ticket.cancel_flag().is_cancelled());

        manager.transfers.set_phase("parakeet-v3", Phase::Downloading);
        assert!(manager.cancel_download("parakeet-v3"));
        ticket.finish(Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_activation_requires_download() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        assert_eq!(
            manager.set_active_model("small").await,
            Err(Error::NotDownloaded("small".to_string()))
        );
        assert_eq!(
            manager.set_active_model("ghost").await,
            Err(Error::NotFound("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        let broken = manager
            .register_model("https://example.com/broken.bin", Some("broken"))
            .unwrap();
        manager.download_model("tiny").await.unwrap();
        manager.download_model(&broken).await.unwrap();
        manager.set_active_model("tiny").await.unwrap();

        let err = manager.set_active_model(&broken).await.unwrap_err();

        assert!(matches!(err, Error::Load(_)));
        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("tiny"));
        assert_eq!(manager.get_current_model().as_deref(), Some("tiny"));
        assert_eq!(status(&manager, &broken), ModelStatus::Error);
    }

    #[tokio::test]
    async fn test_auto_activation_after_download() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), true);
        let mut rx = manager.bus.subscribe();

        manager.download_model("tiny").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let Event::ModelStateChanged {
                event_type: ModelStateKind::LoadingCompleted,
                ..
            } = event
            {
                break;
            }
        }
        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("tiny"));
    }

    #[tokio::test]
    async fn test_auto_activation_deferred_during_session() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), true);
        manager.host.lock().session = crate::transcription::SessionStatus::Running;

        manager.download_model("tiny").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.get_engine_loaded_model(), None);
        assert_eq!(
            manager.host.lock().pending_activation.as_deref(),
            Some("tiny")
        );

        manager.host.lock().session = crate::transcription::SessionStatus::Completed;
        manager.session_finished().await;
        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("tiny"));
    }

    #[tokio::test]
    async fn test_busy_during_session() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.host.lock().session = crate::transcription::SessionStatus::Running;
        assert!(matches!(
            manager.set_active_model("tiny").await,
            Err(Error::Busy(_))
        ));
        assert!(matches!(manager.unload_model(), Err(Error::Busy(_))));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        assert_eq!(
            manager.delete_model("small"),
            Err(Error::NotRemovable("small".to_string()))
        );

        manager.download_model("tiny").await.unwrap();
        manager.set_active_model("tiny").await.unwrap();
        assert!(matches!(manager.delete_model("tiny"), Err(Error::Busy(_))));

        manager.unload_model().unwrap();
        manager.delete_model("tiny").unwrap();
        assert_eq!(status(&manager, "tiny"), ModelStatus::None);
        assert!(!dir.path().join("ggml-tiny.bin").exists());
        assert!(manager.get_model("tiny").is_some());
    }

    #[tokio::test]
    async fn test_delete_custom_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        let id = manager
            .register_model("https://example.com/m.bin", None)
            .unwrap();
        manager.download_model(&id).await.unwrap();
        manager.delete_model(&id).unwrap();
        assert!(manager.get_model(&id).is_none());
        assert!(manager.list_models().iter().all(|m| m.descriptor.id != id));
    }

    #[tokio::test]
    async fn test_unload_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.set_active_model("tiny").await.unwrap();

        assert!(manager.unload_model().unwrap());
        assert!(!manager.unload_model().unwrap());
        assert_eq!(status(&manager, "tiny"), ModelStatus::Unloaded);
        assert_eq!(manager.get_engine_loaded_model(), None);
        assert_eq!(manager.get_current_model().as_deref(), Some("tiny"));

        manager.ensure_loaded().await.unwrap();
        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("tiny"));
    }

    #[tokio::test]
    async fn test_idle_unload() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.set_active_model("tiny").await.unwrap();

        assert!(!manager.unload_if_idle(Duration::from_secs(3600)));
        assert!(manager.unload_if_idle(Duration::ZERO));
        assert_eq!(manager.get_engine_loaded_model(), None);
    }

    #[tokio::test]
    async fn test_translation_switch_prefers_whisper() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("parakeet-v3")).unwrap();
        let (manager, _) = manager(dir.path(), false);
        manager.download_model("tiny").await.unwrap();
        manager.download_model("base").await.unwrap();
        manager.set_active_model("parakeet-v3").await.unwrap();

        manager.ensure_translation_engine().await;

        assert_eq!(manager.get_engine_loaded_model().as_deref(), Some("base"));
        assert_eq!(manager.loaded_engine(), Some(EngineKind::Whisper));
    }
}

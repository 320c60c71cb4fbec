//! In-process collaborators for driving `Murmur` without network or models.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use murmur_core::model::ProgressFn;
use murmur_core::provider::SAMPLE_RATE;
use murmur_core::{
    AssetFetcher, AudioDecoder, BackendLoader, CancelFlag, ChunkOutput, EngineKind, Error, Event,
    InferenceOptions, ModelDescriptor, ModelUnloadTimeout, ModelView, Murmur, Result, Segment,
    Settings, TranscriptionBackend,
};

/// Writes a fixed payload instead of downloading.
pub struct StaticFetcher {
    pub payload: Vec<u8>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for StaticFetcher {
    async fn fetch(
        &self,
        _url: &str,
        dest: &Path,
        _cancel: &CancelFlag,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = self.payload.len() as u64;
        on_progress(0, total);
        tokio::fs::write(dest, &self.payload).await?;
        on_progress(total, total);
        Ok(total)
    }
}

/// Fails the first `failures` attempts with a transport error.
pub struct FlakyFetcher {
    pub failures: usize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for FlakyFetcher {
    async fn fetch(
        &self,
        _url: &str,
        dest: &Path,
        _cancel: &CancelFlag,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        on_progress(0, 4);
        tokio::fs::write(dest, b"gg").await?;
        if attempt < self.failures {
            return Err(Error::Network("connection reset by peer".to_string()));
        }
        tokio::fs::write(dest, b"ggml").await?;
        on_progress(4, 4);
        Ok(4)
    }
}

/// Writes part of the asset, then waits until the transfer is cancelled.
#[derive(Default)]
pub struct StallingFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for StallingFetcher {
    async fn fetch(
        &self,
        _url: &str,
        dest: &Path,
        cancel: &CancelFlag,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, b"gg").await?;
        on_progress(0, 1000);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(2),
        }
    }
}

/// Emits one segment per chunk: "word1", "word2", ...
pub struct CountingBackend {
    engine: EngineKind,
    calls: usize,
    delay: Duration,
}

impl TranscriptionBackend for CountingBackend {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    fn transcribe(&mut self, samples: Vec<f32>, _: &InferenceOptions) -> Result<ChunkOutput> {
        self.calls += 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let duration = samples.len() as f64 / SAMPLE_RATE as f64;
        let text = format!(" word{} ", self.calls);
        Ok(ChunkOutput {
            text: text.clone(),
            segments: vec![Segment::new(0.0, duration, text)],
        })
    }
}

/// Backends take `delay` per chunk; loading takes `load_delay`.
#[derive(Default)]
pub struct CountingLoader {
    pub delay: Duration,
    pub load_delay: Duration,
}

impl BackendLoader for CountingLoader {
    fn load(&self, model: &ModelDescriptor, _path: &Path) -> Result<Box<dyn TranscriptionBackend>> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        Ok(Box::new(CountingBackend {
            engine: model.engine,
            calls: 0,
            delay: self.delay,
        }))
    }
}

/// Silence of a fixed length. `missing.wav` is unreadable.
pub struct SilenceDecoder {
    pub seconds: usize,
}

impl AudioDecoder for SilenceDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<f32>> {
        if path.file_name().is_some_and(|n| n == "missing.wav") {
            return Err(Error::SourceUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Ok(vec![0.0; self.seconds * SAMPLE_RATE as usize])
    }
}

pub struct Harness {
    pub murmur: Arc<Murmur>,
    pub fetcher: Arc<StaticFetcher>,
    pub dir: TempDir,
}

pub fn settings(auto_activate: bool) -> Settings {
    Settings {
        chunk_seconds: 1,
        auto_activate,
        model_unload_timeout: ModelUnloadTimeout::Never,
        ..Settings::default()
    }
}

pub fn build(
    dir: &Path,
    settings: Settings,
    fetcher: Arc<dyn AssetFetcher>,
    seconds: usize,
    delay: Duration,
) -> Murmur {
    let loader = CountingLoader {
        delay,
        ..CountingLoader::default()
    };
    build_with(dir, settings, fetcher, loader, seconds)
}

pub fn build_with(
    dir: &Path,
    settings: Settings,
    fetcher: Arc<dyn AssetFetcher>,
    loader: CountingLoader,
    seconds: usize,
) -> Murmur {
    Murmur::builder(settings)
        .data_dir(dir)
        .fetcher(fetcher)
        .loader(Arc::new(loader))
        .decoder(Arc::new(SilenceDecoder { seconds }))
        .build()
        .unwrap()
}

pub fn harness(settings: Settings, seconds: usize, delay: Duration) -> Harness {
    harness_with_payload(settings, seconds, delay, b"ggml".to_vec())
}

pub fn harness_with_payload(
    settings: Settings,
    seconds: usize,
    delay: Duration,
    payload: Vec<u8>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StaticFetcher {
        payload,
        calls: AtomicUsize::new(0),
    });
    let murmur = build(dir.path(), settings, fetcher.clone(), seconds, delay);
    Harness {
        murmur: Arc::new(murmur),
        fetcher,
        dir,
    }
}

/// Register, download and activate a model from `url`.
pub async fn ready_model(murmur: &Murmur, url: &str) -> String {
    let id = murmur.register_model(url, None).unwrap();
    murmur.download_model(&id).await.unwrap();
    murmur.set_active_model(&id).await.unwrap();
    id
}

pub fn view(murmur: &Murmur, id: &str) -> ModelView {
    murmur
        .list_models()
        .into_iter()
        .find(|m| m.descriptor.id == id)
        .unwrap()
}

/// Everything already published.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Wait for the first event matching `pred`.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

//! Asset transfer and in-flight bookkeeping.
//!
//! One transfer runs per model id. A second request for the same id joins the
//! running transfer and receives the same outcome through a `watch` channel.
//! Failed transfers delete their `.part` file; the next request starts from
//! zero and nothing is retried automatically.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use super::types::DownloadProgress;
use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};

/// Progress callback: `(downloaded_bytes, total_bytes)`, total is 0 when unknown.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Emit progress at most every this many bytes (or 1% of the total if smaller).
const PROGRESS_STEP_BYTES: u64 = 500_000;

/// Retrieves a remote asset into a local file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Write the asset at `url` to `dest` and return the number of bytes
    /// written. Implementations check `cancel` between chunks and return
    /// [`Error::Cancelled`] once it is set.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64>;
}

/// Streaming HTTP fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("HTTP {} for {url}", response.status())));
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        on_progress(0, total);
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let chunk = chunk.map_err(|e| Error::Network(format!("download interrupted: {e}")))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_progress(downloaded, total);
        }
        file.flush().await?;

        if total > 0 && downloaded < total {
            return Err(Error::Network(format!(
                "connection closed after {downloaded} of {total} bytes"
            )));
        }
        Ok(downloaded)
    }
}

/// Phase of an in-flight model transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Downloading,
    Extracting,
}

type Outcome = Option<Result<()>>;

struct Job {
    done: watch::Receiver<Outcome>,
    cancel: Arc<CancelFlag>,
    phase: Phase,
    progress: Option<DownloadProgress>,
}

/// Registry of in-flight transfers keyed by model id.
#[derive(Default)]
pub(crate) struct Transfers {
    jobs: Mutex<HashMap<String, Job>>,
}

pub(crate) enum Slot {
    /// A transfer for this id was already running.
    Joined(watch::Receiver<Outcome>),
    /// The caller owns the new transfer and must finish the ticket.
    Started(Ticket),
}

impl Transfers {
    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(self: &Arc<Self>, id: &str) -> Slot {
        let mut jobs = self.jobs();
        if let Some(job) = jobs.get(id) {
            return Slot::Joined(job.done.clone());
        }
        let (tx, rx) = watch::channel(None);
        let cancel = Arc::new(CancelFlag::new());
        jobs.insert(
            id.to_string(),
            Job {
                done: rx.clone(),
                cancel: cancel.clone(),
                phase: Phase::Downloading,
                progress: None,
            },
        );
        Slot::Started(Ticket {
            id: id.to_string(),
            tx,
            done: rx,
            cancel,
            transfers: self.clone(),
            finished: false,
        })
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.jobs().contains_key(id)
    }

    pub fn phase(&self, id: &str) -> Option<(Phase, Option<DownloadProgress>)> {
        self.jobs().get(id).map(|job| (job.phase, job.progress))
    }

    pub fn set_phase(&self, id: &str, phase: Phase) {
        if let Some(job) = self.jobs().get_mut(id) {
            job.phase = phase;
        }
    }

    fn set_progress(&self, id: &str, progress: DownloadProgress) {
        if let Some(job) = self.jobs().get_mut(id) {
            job.progress = Some(progress);
        }
    }

    /// Request cancellation of the transfer for `id`.
    pub fn cancel(&self, id: &str) -> bool {
        match self.jobs().get(id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: &str) {
        self.jobs().remove(id);
    }
}

/// Ownership of one running transfer.
pub(crate) struct Ticket {
    id: String,
    tx: watch::Sender<Outcome>,
    done: watch::Receiver<Outcome>,
    cancel: Arc<CancelFlag>,
    transfers: Arc<Transfers>,
    finished: bool,
}

impl Ticket {
    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Outcome> {
        self.done.clone()
    }

    /// Drop the in-flight entry and wake every waiter with `outcome`.
    pub fn finish(mut self, outcome: Result<()>) {
        self.finished = true;
        self.transfers.remove(&self.id);
        let _ = self.tx.send(Some(outcome));
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.finished {
            self.transfers.remove(&self.id);
            let _ = self.tx.send(Some(Err(Error::Network(
                "download task ended unexpectedly".to_string(),
            ))));
        }
    }
}

/// Wait for a transfer outcome published through [`Ticket::finish`].
pub(crate) async fn wait(mut rx: watch::Receiver<Outcome>) -> Result<()> {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone().unwrap_or_else(|| {
                Err(Error::Network("download task ended unexpectedly".to_string()))
            });
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Download `url` to `dest` for model `id`, publishing throttled
/// `model-download-progress` events. `dest` only appears once complete.
pub(crate) async fn download_asset(
    fetcher: &dyn AssetFetcher,
    bus: &EventBus,
    transfers: &Transfers,
    id: &str,
    url: &str,
    dest: &Path,
    cancel: &CancelFlag,
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(dest);
    if tokio::fs::try_exists(&part).await.unwrap_or(false) {
        tracing::debug!("Discarding stale partial download {}", part.display());
        let _ = tokio::fs::remove_file(&part).await;
    }

    tracing::info!("Downloading {id} from {url}");
    let last_emitted = AtomicU64::new(0);
    let emit = |downloaded: u64, total: u64| {
        let progress = DownloadProgress::new(downloaded, total);
        transfers.set_progress(id, progress);
        bus.emit(Event::DownloadProgress {
            model_id: id.to_string(),
            downloaded_bytes: downloaded,
            total_bytes: total,
            percentage: progress.percentage,
        });
    };
    let on_progress = |downloaded: u64, total: u64| {
        let threshold = if total > 0 {
            (total / 100).clamp(1, PROGRESS_STEP_BYTES)
        } else {
            PROGRESS_STEP_BYTES
        };
        let last = last_emitted.load(Ordering::Relaxed);
        let finished = total > 0 && downloaded >= total;
        if downloaded == 0 || finished || downloaded.saturating_sub(last) >= threshold {
            last_emitted.store(downloaded, Ordering::Relaxed);
            emit(downloaded, total);
        }
    };

    let result = fetcher.fetch(url, &part, cancel, &on_progress).await;
    let result = match result {
        Ok(_) if cancel.is_cancelled() => Err(Error::Cancelled),
        other => other,
    };

    match result {
        Ok(bytes) => {
            tokio::fs::rename(&part, dest).await?;
            tracing::info!("Downloaded {id} ({:.1} MB)", bytes as f64 / 1_000_000.0);
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            Err(e)
        }
    }
}

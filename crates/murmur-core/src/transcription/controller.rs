//! Runs one transcription session at a time over a file or a live stream.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::sync::mpsc;

use super::Segment;
use super::correction::WordCorrection;
use super::session::{SessionStatus, Transcript, TranscriptionOptions, finalize_segments};
use crate::audio::AudioDecoder;
use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::host::{EngineHost, SharedBackend};
use crate::model::{EngineKind, ModelManager};
use crate::provider::{ChunkOutput, SAMPLE_RATE};

/// Label used for stream sessions in events.
pub const LIVE_LABEL: &str = "live";

/// Where session audio comes from.
pub enum AudioSource {
    /// A file decoded up front by the [`AudioDecoder`]
    File(PathBuf),
    /// 16kHz mono samples pushed by the caller; closing the sender ends the session
    Stream(mpsc::Receiver<Vec<f32>>),
}

impl AudioSource {
    pub fn label(&self) -> String {
        match self {
            AudioSource::File(path) => path.to_string_lossy().into_owned(),
            AudioSource::Stream(_) => LIVE_LABEL.to_string(),
        }
    }
}

struct ActiveSession {
    backend: SharedBackend,
    engine: EngineKind,
    cancel: Arc<CancelFlag>,
}

enum Claim {
    Ready(ActiveSession),
    /// A load started after the engine check; wait for it and retry
    LoadPending,
}

enum Feed {
    Samples {
        data: Vec<f32>,
        pos: usize,
    },
    Stream {
        rx: mpsc::Receiver<Vec<f32>>,
        buffer: Vec<f32>,
        closed: bool,
    },
}

impl Feed {
    /// Next chunk of at most `size` samples. `None` once the source is
    /// exhausted or the session is cancelled while waiting for live audio.
    async fn next_chunk(&mut self, size: usize, cancel: &CancelFlag) -> Option<Vec<f32>> {
        match self {
            Feed::Samples { data, pos } => {
                if *pos >= data.len() {
                    return None;
                }
                let end = (*pos + size).min(data.len());
                let chunk = data[*pos..end].to_vec();
                *pos = end;
                Some(chunk)
            }
            Feed::Stream { rx, buffer, closed } => loop {
                if buffer.len() >= size {
                    return Some(buffer.drain(..size).collect());
                }
                if *closed {
                    return if buffer.is_empty() {
                        None
                    } else {
                        Some(std::mem::take(buffer))
                    };
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    received = rx.recv() => match received {
                        Some(samples) => buffer.extend(samples),
                        None => *closed = true,
                    },
                }
            },
        }
    }
}

/// Shift engine output to source time and apply word correction. Text
/// without segments becomes one segment spanning the chunk.
fn chunk_segments(
    output: ChunkOutput,
    offset: f64,
    duration: f64,
    correction: &WordCorrection,
) -> Vec<Segment> {
    let mut batch: Vec<Segment> = output
        .segments
        .into_iter()
        .filter_map(|s| {
            let text = s.text.trim();
            (!text.is_empty())
                .then(|| Segment::new(s.start + offset, s.end + offset, correction.apply(text)))
        })
        .collect();

    if batch.is_empty() {
        let text = output.text.trim();
        if !text.is_empty() {
            batch.push(Segment::new(offset, offset + duration, correction.apply(text)));
        }
    }
    batch
}

pub struct SessionController {
    manager: Arc<ModelManager>,
    host: Arc<EngineHost>,
    bus: EventBus,
    decoder: Arc<dyn AudioDecoder>,
    chunk_samples: usize,
    correction: WordCorrection,
}

impl SessionController {
    pub(crate) fn new(
        manager: Arc<ModelManager>,
        host: Arc<EngineHost>,
        bus: EventBus,
        decoder: Arc<dyn AudioDecoder>,
        chunk_samples: usize,
        correction: WordCorrection,
    ) -> Self {
        Self {
            manager,
            host,
            bus,
            decoder,
            chunk_samples: chunk_samples.max(1),
            correction,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.host.lock().session
    }

    /// True while a session occupies the engine.
    pub fn is_busy(&self) -> bool {
        self.status().is_active()
    }

    pub async fn transcribe_file(
        self: &Arc<Self>,
        path: impl Into<PathBuf>,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        self.transcribe(AudioSource::File(path.into()), options).await
    }

    pub async fn transcribe_stream(
        self: &Arc<Self>,
        receiver: mpsc::Receiver<Vec<f32>>,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        self.transcribe(AudioSource::Stream(receiver), options).await
    }

    /// Run a session to its terminal state.
    ///
    /// Completed sessions return the authoritative transcript. A cancelled
    /// session returns [`Error::Cancelled`] after publishing the segments it
    /// produced in `transcription-cancelled`.
    pub async fn transcribe(
        self: &Arc<Self>,
        source: AudioSource,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        if self.is_busy() {
            return Err(Error::Busy("a transcription is already running".to_string()));
        }
        self.manager.ensure_loaded().await?;
        if options.translate {
            self.manager.ensure_translation_engine().await;
        }

        let session = loop {
            match self.claim()? {
                Claim::Ready(session) => break session,
                Claim::LoadPending => self.manager.ensure_loaded().await?,
            }
        };
        let this = self.clone();
        // The session runs detached so that dropping the caller's future can't
        // leave the engine marked busy.
        tokio::spawn(async move { this.drive(session, source, options).await })
            .await
            .map_err(|e| Error::Transcription(format!("session task failed: {e}")))?
    }

    /// Request cooperative cancellation. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let mut host = self.host.lock();
        if host.session != SessionStatus::Running {
            return false;
        }
        host.session = SessionStatus::Cancelling;
        if let Some(cancel) = &host.session_cancel {
            cancel.cancel();
        }
        tracing::info!("Requesting transcription cancellation");
        true
    }

    fn claim(&self) -> Result<Claim> {
        let mut host = self.host.lock();
        if host.session.is_active() {
            return Err(Error::Busy("a transcription is already running".to_string()));
        }
        if host.loading.is_some() {
            return Ok(Claim::LoadPending);
        }
        let loaded = host
            .loaded
            .as_ref()
            .ok_or_else(|| Error::Load("no model loaded".to_string()))?;
        let session = ActiveSession {
            backend: loaded.backend.clone(),
            engine: loaded.engine,
            cancel: Arc::new(CancelFlag::new()),
        };
        host.session = SessionStatus::Running;
        host.session_cancel = Some(session.cancel.clone());
        host.touch();
        Ok(Claim::Ready(session))
    }

    fn release(&self, status: SessionStatus) {
        let mut host = self.host.lock();
        host.session = status;
        host.session_cancel = None;
        host.touch();
    }

    async fn drive(
        &self,
        session: ActiveSession,
        source: AudioSource,
        options: TranscriptionOptions,
    ) -> Result<Transcript> {
        let label = source.label();
        let mut feed = match source {
            AudioSource::File(path) => {
                let decoder = self.decoder.clone();
                let decoded = tokio::task::spawn_blocking(move || decoder.decode(&path))
                    .await
                    .map_err(|e| Error::SourceUnavailable(format!("decoder task failed: {e}")))
                    .and_then(|r| r);
                match decoded {
                    Ok(data) => Feed::Samples { data, pos: 0 },
                    Err(e) => {
                        tracing::warn!("Cannot read {label}: {e}");
                        self.release(SessionStatus::Idle);
                        self.manager.session_finished().await;
                        return Err(e);
                    }
                }
            }
            AudioSource::Stream(rx) => Feed::Stream {
                rx,
                buffer: Vec::new(),
                closed: false,
            },
        };

        let inference = options.inference();
        if inference.translate && !session.engine.supports_translation() {
            tracing::warn!(
                "{} does not support translation, transcribing only",
                session.engine.display_name()
            );
        }
        tracing::info!(
            "Transcribing {label} (language: {}, translate: {})",
            options.language,
            inference.translate
        );

        let started = std::time::Instant::now();
        let mut collected: Vec<Segment> = Vec::new();
        let mut consumed: usize = 0;

        let outcome: Result<()> = loop {
            if session.cancel.is_cancelled() {
                break Err(Error::Cancelled);
            }
            let Some(chunk) = feed.next_chunk(self.chunk_samples, &session.cancel).await else {
                if session.cancel.is_cancelled() {
                    break Err(Error::Cancelled);
                }
                break Ok(());
            };

            let offset = consumed as f64 / SAMPLE_RATE as f64;
            let duration = chunk.len() as f64 / SAMPLE_RATE as f64;
            consumed += chunk.len();

            let backend = session.backend.clone();
            let opts = inference.clone();
            let output = tokio::task::spawn_blocking(move || {
                let mut backend = backend.lock().unwrap_or_else(PoisonError::into_inner);
                backend.transcribe(chunk, &opts)
            })
            .await
            .map_err(|e| Error::Transcription(format!("inference task failed: {e}")))
            .and_then(|r| r);

            let output = match output {
                Ok(output) => output,
                Err(e) => break Err(e),
            };

            let batch = chunk_segments(output, offset, duration, &self.correction);
            // Checked under the host lock so that nothing is published once
            // `cancel` has returned. A chunk finishing after cancellation is
            // discarded unpublished.
            let published = {
                let _host = self.host.lock();
                if session.cancel.is_cancelled() {
                    false
                } else {
                    if !batch.is_empty() {
                        self.bus.emit(Event::TranscriptionProgress {
                            segments: batch.clone(),
                        });
                    }
                    true
                }
            };
            if !published {
                break Err(Error::Cancelled);
            }
            if !batch.is_empty() {
                tracing::debug!("Chunk at {offset:.1}s produced {} segments", batch.len());
                collected.extend(batch);
            }
        };

        let result = match outcome {
            Ok(()) => {
                let transcript = Transcript::new(label, finalize_segments(collected));
                self.release(SessionStatus::Completed);
                tracing::info!(
                    "Transcription completed in {}ms ({} segments)",
                    started.elapsed().as_millis(),
                    transcript.segments.len()
                );
                self.bus.emit(Event::FileTranscriptionCompleted {
                    path: transcript.path.clone(),
                    segments: transcript.segments.clone(),
                    text: transcript.text.clone(),
                });
                Ok(transcript)
            }
            Err(Error::Cancelled) => {
                self.release(SessionStatus::Cancelled);
                tracing::info!("Transcription of {label} cancelled");
                self.bus.emit(Event::TranscriptionCancelled {
                    path: label,
                    segments: collected,
                });
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.release(SessionStatus::Error);
                tracing::warn!("Transcription of {label} failed: {e}");
                self.bus.emit(Event::TranscriptionFailed {
                    path: label,
                    error: e.to_string(),
                });
                Err(e)
            }
        };

        self.manager.session_finished().await;
        result
    }
}

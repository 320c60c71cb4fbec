//! Download speed smoothing for observers.
//!
//! The tracker is observer-side state: it never feeds back into the core. It
//! can be driven by raw samples ([`ProgressTracker::record`]) or straight from
//! the event stream ([`ProgressTracker::observe`]).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::events::Event;

/// Samples closer together than this are ignored for speed estimation.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Weight of the previous estimate in the moving average.
const SMOOTHING: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadStats {
    pub start: Instant,
    pub last_sample: Instant,
    pub cumulative_bytes: u64,
    /// Smoothed rate in bytes per second. Never negative.
    pub speed: f64,
}

impl DownloadStats {
    fn new(now: Instant, bytes: u64) -> Self {
        Self {
            start: now,
            last_sample: now,
            cumulative_bytes: bytes,
            speed: 0.0,
        }
    }

    fn sample(&mut self, now: Instant, bytes: u64) {
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed <= MIN_SAMPLE_INTERVAL {
            return;
        }

        let delta = bytes as f64 - self.cumulative_bytes as f64;
        let rate = (delta / elapsed.as_secs_f64()).max(0.0);
        self.speed = if self.speed > 0.0 {
            SMOOTHING * self.speed + (1.0 - SMOOTHING) * rate
        } else {
            rate
        };
        self.last_sample = now;
        self.cumulative_bytes = bytes;
    }

    /// Estimated seconds left for `total` bytes, if the rate is known.
    pub fn eta(&self, total: u64) -> Option<Duration> {
        if self.speed <= 0.0 || total <= self.cumulative_bytes {
            return None;
        }
        let remaining = (total - self.cumulative_bytes) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed))
    }
}

/// Per-item speed estimation keyed by model id.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: HashMap<String, DownloadStats>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `bytes` have been received for `id` at `now`.
    pub fn record(&mut self, id: &str, now: Instant, bytes: u64) -> &DownloadStats {
        self.entries
            .entry(id.to_string())
            .and_modify(|stats| stats.sample(now, bytes))
            .or_insert_with(|| DownloadStats::new(now, bytes))
    }

    pub fn get(&self, id: &str) -> Option<&DownloadStats> {
        self.entries.get(id)
    }

    pub fn speed(&self, id: &str) -> f64 {
        self.entries.get(id).map(|s| s.speed).unwrap_or(0.0)
    }

    /// Forget `id`. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Update from a core event, creating and dropping entries as downloads
    /// start and finish.
    pub fn observe(&mut self, event: &Event) {
        self.observe_at(event, Instant::now());
    }

    pub fn observe_at(&mut self, event: &Event, now: Instant) {
        match event {
            Event::DownloadProgress {
                model_id,
                downloaded_bytes,
                ..
            } => {
                self.record(model_id, now, *downloaded_bytes);
            }
            Event::DownloadComplete { model_id }
            | Event::DownloadFailed { model_id, .. }
            | Event::DownloadCancelled { model_id }
            | Event::ExtractionFailed { model_id, .. } => self.remove(model_id),
            _ => {}
        }
    }
}

//! # Live Telemetry View
//!
//! Shared state between the notification task (the only writer) and any
//! number of renderers.
//!
//! Writers go through [`TelemetryFeed::ingest`], which decodes outside the
//! lock and holds it only for the push. Renderers hold a [`TelemetryView`]
//! and either poll [`TelemetryView::snapshot`] or await
//! [`TelemetryView::changed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::buffer::{BufferPolicy, TelemetryBuffer, TelemetrySnapshot};
use super::decoder;
use super::sample::{DecodeMode, TelemetrySample};
use crate::error::DecodeError;

/// Writer side of the telemetry buffer
#[derive(Debug)]
pub struct TelemetryFeed {
    mode: DecodeMode,
    buffer: Mutex<TelemetryBuffer>,
    received: AtomicU64,
    decode_failures: AtomicU64,
    revision: watch::Sender<u64>,
}

impl TelemetryFeed {
    pub fn new(policy: BufferPolicy, mode: DecodeMode) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            mode,
            buffer: Mutex::new(TelemetryBuffer::new(policy, mode)),
            received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            revision,
        })
    }

    /// Decode one notification value and append it
    ///
    /// A decode failure is counted and returned; the buffer is untouched.
    pub fn ingest(&self, raw: &[u8]) -> Result<(), DecodeError> {
        self.received.fetch_add(1, Ordering::Relaxed);

        match decoder::decode(raw, self.mode) {
            Ok(sample) => {
                debug!(?sample.reading, "telemetry sample decoded");
                self.push(sample);
                Ok(())
            }
            Err(e) => {
                let failures = self.decode_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, failures, "dropping undecodable notification");
                Err(e)
            }
        }
    }

    /// Append an already decoded sample
    pub fn push(&self, sample: TelemetrySample) {
        self.lock().push(sample);
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Empty the buffer and zero the counters
    pub fn reset(&self) {
        self.lock().clear();
        self.received.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Read handle for renderers
    pub fn view(self: &Arc<Self>) -> TelemetryView {
        TelemetryView {
            revision: self.revision.subscribe(),
            feed: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read-only handle on the live telemetry buffer
#[derive(Debug, Clone)]
pub struct TelemetryView {
    feed: Arc<TelemetryFeed>,
    revision: watch::Receiver<u64>,
}

impl TelemetryView {
    /// Copy of the buffer contents
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.feed.lock().snapshot()
    }

    pub fn latest(&self) -> Option<TelemetrySample> {
        self.feed.lock().latest().cloned()
    }

    pub fn len(&self) -> usize {
        self.feed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> DecodeMode {
        self.feed.mode
    }

    /// Notifications seen since the last reset, decodable or not
    pub fn received(&self) -> u64 {
        self.feed.received.load(Ordering::Relaxed)
    }

    /// Notifications dropped since the last reset
    pub fn decode_failures(&self) -> u64 {
        self.feed.decode_failures.load(Ordering::Relaxed)
    }

    /// Wait until the buffer changes after the last call
    pub async fn changed(&mut self) {
        // The sender lives inside the feed this view keeps alive
        let _ = self.revision.changed().await;
    }
}

//! Sequential playback queue
//!
//! A single consumer task drains the queue one artifact at a time. The task
//! is spawned by the first enqueue into an idle queue and exits once the
//! queue is empty, so two streams never overlap.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{AudioCache, PlaybackItem};
use crate::{Error, Result};

/// Pause after each artifact so the tail of the stream is not cut off
pub const DEFAULT_TRAILING_DELAY: Duration = Duration::from_millis(250);

/// Audio output device
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the file at `path`, resolving once it has finished
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or played
    async fn play(&self, path: &Path) -> Result<()>;
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<PlaybackItem>,
    running: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    idle: watch::Sender<bool>,
    cache: Arc<AudioCache>,
    sink: Arc<dyn AudioSink>,
    trailing_delay: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn play_one(&self, item: &PlaybackItem) -> Result<()> {
        // Streaming always ignores the persist policy: a fresh render must play
        if !self
            .cache
            .exists_with_override(&item.file_id, item.kind, true)
        {
            return Err(Error::ArtifactMissing(item.file_id.clone()));
        }

        let path = self.cache.artifact_path(&item.file_id, item.kind)?;
        self.sink.play(&path).await
    }
}

/// FIFO of artifacts waiting to be played
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    /// Create an idle queue resolving artifacts through `cache`
    #[must_use]
    pub fn new(cache: Arc<AudioCache>, sink: Arc<dyn AudioSink>) -> Self {
        Self::with_trailing_delay(cache, sink, DEFAULT_TRAILING_DELAY)
    }

    /// Create an idle queue with a custom trailing delay
    #[must_use]
    pub fn with_trailing_delay(
        cache: Arc<AudioCache>,
        sink: Arc<dyn AudioSink>,
        trailing_delay: Duration,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                idle,
                cache,
                sink,
                trailing_delay,
            }),
        }
    }

    /// Append `item`, starting the consumer if the queue was idle
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, item: PlaybackItem) {
        tracing::debug!(file_id = %item.file_id, kind = %item.kind, "enqueued audio");
        self.inner.lock().items.push_back(item);
        self.drain();
    }

    /// Start the consumer if there is work and none is running
    pub fn drain(&self) {
        let start = {
            let mut state = self.inner.lock();
            if state.running || state.items.is_empty() {
                false
            } else {
                state.running = true;
                self.inner.idle.send_replace(false);
                true
            }
        };

        if start {
            tokio::spawn(run_consumer(Arc::clone(&self.inner)));
        }
    }

    /// Resolve once the queue is empty and nothing is playing
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Whether the queue is empty and nothing is playing
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Items waiting to be played, excluding the one currently playing
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().items.len()
    }
}

/// Keeps the queue state honest if the consumer dies mid-item
///
/// A sink that panics or a cancelled task would otherwise leave the queue
/// marked running forever, so nothing could start it again.
struct ConsumerGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = self.inner.lock();
        if state.items.is_empty() {
            tracing::error!("playback consumer died");
        } else if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tracing::error!(pending = state.items.len(), "playback consumer died, restarting");
            handle.spawn(run_consumer(Arc::clone(&self.inner)));
            return;
        } else {
            tracing::error!(pending = state.items.len(), "playback consumer died, dropping queue");
            state.items.clear();
        }
        state.running = false;
        self.inner.idle.send_replace(true);
    }
}

async fn run_consumer(inner: Arc<Inner>) {
    tracing::debug!("playback started");
    let mut guard = ConsumerGuard {
        inner: Arc::clone(&inner),
        armed: true,
    };

    loop {
        let next = {
            let mut state = inner.lock();
            if let Some(item) = state.items.pop_front() {
                item
            } else {
                state.running = false;
                inner.idle.send_replace(true);
                guard.armed = false;
                break;
            }
        };

        match inner.play_one(&next).await {
            Ok(()) => tracing::debug!(file_id = %next.file_id, "playback finished"),
            Err(e) => {
                tracing::warn!(file_id = %next.file_id, kind = %next.kind, error = %e, "playback failed, skipping");
            }
        }

        if !inner.trailing_delay.is_zero() {
            tokio::time::sleep(inner.trailing_delay).await;
        }
    }

    tracing::debug!("playback drained");
}

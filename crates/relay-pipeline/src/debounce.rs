//! Per-channel burst coalescing.
//!
//! Each channel owns one buffer and at most one live timer. Every event
//! restarts the timer; when it fires the buffer is taken and handed to the
//! [`BatchSink`] as one formatted batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use relay_channels::{AttachmentRef, InboundEvent};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// A flushed channel buffer ready for the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub channel_id: String,
    /// Formatted text of every buffered event.
    pub text: String,
    /// Union of all attachment refs, in arrival order.
    pub attachments: Vec<AttachmentRef>,
    /// The last event of the batch; replies thread to it.
    pub reply_to: InboundEvent,
    pub count: usize,
}

/// Receives flushed batches. Each delivery runs on its own task.
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    async fn deliver(&self, batch: Batch);
}

#[derive(Default)]
struct ChannelBuffer {
    entries: Vec<InboundEvent>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    platform: String,
    delay: Duration,
    buffers: DashMap<String, ChannelBuffer>,
    generations: AtomicU64,
    sink: Arc<dyn BatchSink>,
}

/// Owns every channel buffer and its flush timer.
#[derive(Clone)]
pub struct DebounceAggregator {
    inner: Arc<Inner>,
}

impl DebounceAggregator {
    /// `platform` is the human label used in multi-message headers
    /// (e.g. `"Discord"`).
    pub fn new(platform: impl Into<String>, delay: Duration, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform: platform.into(),
                delay,
                buffers: DashMap::new(),
                generations: AtomicU64::new(1),
                sink,
            }),
        }
    }

    /// Buffer `event` and restart its channel's flush timer.
    pub fn on_event(&self, event: InboundEvent) {
        let channel_id = event.channel_id.clone();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);

        let mut buf = self.inner.buffers.entry(channel_id.clone()).or_default();
        buf.entries.push(event);
        buf.generation = generation;
        if let Some(old) = buf.timer.take() {
            old.abort();
        }

        let inner = Arc::clone(&self.inner);
        let delay = self.inner.delay;
        let pending = buf.entries.len();
        buf.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush_generation(&channel_id, generation).await;
        }));
        drop(buf);

        debug!(pending, delay_ms = delay.as_millis() as u64, "debounce timer restarted");
    }

    /// Flush `channel_id` now, cancelling its timer. Returns `false` when
    /// there was nothing buffered.
    pub async fn flush(&self, channel_id: &str) -> bool {
        let Some((_, mut buf)) = self.inner.buffers.remove(channel_id) else {
            return false;
        };
        if let Some(timer) = buf.timer.take() {
            timer.abort();
        }
        self.inner.deliver(channel_id, buf.entries).await
    }

    /// Number of events waiting in `channel_id`'s buffer.
    pub fn pending(&self, channel_id: &str) -> usize {
        self.inner
            .buffers
            .get(channel_id)
            .map(|b| b.entries.len())
            .unwrap_or(0)
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl Inner {
    /// Timer path: only flush if no newer event replaced this timer.
    async fn flush_generation(&self, channel_id: &str, generation: u64) {
        let taken = self
            .buffers
            .remove_if(channel_id, |_, b| b.generation == generation);
        match taken {
            // The handle in `buf.timer` is this task; dropping it does not abort.
            Some((_, buf)) => {
                self.deliver(channel_id, buf.entries).await;
            }
            None => debug!(generation, "stale debounce timer ignored"),
        }
    }

    async fn deliver(&self, channel_id: &str, entries: Vec<InboundEvent>) -> bool {
        let Some(batch) = build_batch(&self.platform, channel_id, entries) else {
            return false;
        };
        info!(channel_id, count = batch.count, "flushing buffered messages");
        self.sink.deliver(batch).await;
        true
    }
}

fn build_batch(platform: &str, channel_id: &str, entries: Vec<InboundEvent>) -> Option<Batch> {
    let text = format_batch(platform, &entries)?;
    let attachments = entries
        .iter()
        .flat_map(|e| e.attachment_refs.iter().cloned())
        .collect();
    let count = entries.len();
    let reply_to = entries.into_iter().last()?;
    Some(Batch {
        channel_id: channel_id.to_string(),
        text,
        attachments,
        reply_to,
        count,
    })
}

/// `"[author]: text"` for one event; a counted header plus one such line per
/// event for several. `None` for an empty buffer.
pub fn format_batch(platform: &str, entries: &[InboundEvent]) -> Option<String> {
    match entries {
        [] => None,
        [only] => Some(format!("[{}]: {}", only.author, only.text)),
        many => {
            let mut out = format!(
                "[{platform} messages - {} messages in quick succession]:",
                many.len()
            );
            for e in many {
                out.push('\n');
                out.push_str(&format!("[{}]: {}", e.author, e.text));
            }
            Some(out)
        }
    }
}

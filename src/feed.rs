//! Latest-preview feed: publish once, read by any number of viewers.
//!
//! The publisher replaces a single "latest frame" slot and never waits for
//! consumers. Each subscriber owns an independent cursor over the strictly
//! increasing sequence numbers: it sees every frame it is fast enough to
//! observe exactly once, silently skips frames it was too slow for, and
//! never replays frames published before it subscribed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::debug;

/// JSON-object metadata attached to a published frame.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One published preview frame. Replaced, never mutated.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Encoded preview image.
    pub image: Bytes,
    /// Header fields, shot time, conditions snapshot.
    pub metadata: Metadata,
    /// Strictly increasing publish counter. Subscribers use this to detect
    /// frames they have already seen.
    pub seq: u64,
}

/// Single-writer, many-reader distribution of the most recent preview.
pub struct PreviewFeed {
    tx: watch::Sender<Option<Arc<PreviewFrame>>>,
    seq: AtomicU64,
}

impl PreviewFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx, seq: AtomicU64::new(0) }
    }

    /// Replace the latest frame and wake all subscribers. Never blocks on
    /// slow or absent consumers; an unread previous frame is simply
    /// overwritten.
    pub fn publish(&self, image: Bytes, metadata: Metadata) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, bytes = image.len(), "publishing preview frame");
        self.tx.send_replace(Some(Arc::new(PreviewFrame { image, metadata, seq })));
    }

    /// A new independent cursor. Starts at the current sequence number, so
    /// it only ever yields frames published after this call.
    pub fn subscribe(&self) -> FeedSubscriber {
        let rx = self.tx.subscribe();
        let last_seen = rx.borrow().as_ref().map(|f| f.seq).unwrap_or(0);
        FeedSubscriber { rx, last_seen }
    }

    /// The most recently published frame, if any.
    pub fn latest(&self) -> Option<Arc<PreviewFrame>> {
        self.tx.borrow().clone()
    }

    /// Metadata of the latest frame, if any.
    pub fn latest_metadata(&self) -> Option<Metadata> {
        self.tx.borrow().as_ref().map(|f| f.metadata.clone())
    }

    /// Total frames published so far.
    pub fn frames_published(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

impl Default for PreviewFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// An independent cursor over the feed. Dropping it loses its position
/// permanently; the feed keeps no history.
pub struct FeedSubscriber {
    rx: watch::Receiver<Option<Arc<PreviewFrame>>>,
    last_seen: u64,
}

impl FeedSubscriber {
    /// Wait for a frame newer than the cursor, yield it, and advance.
    ///
    /// Returns `None` only when the feed itself has been dropped.
    pub async fn next(&mut self) -> Option<Arc<PreviewFrame>> {
        loop {
            let candidate = self.rx.borrow_and_update().clone();
            if let Some(frame) = candidate {
                if frame.seq > self.last_seen {
                    self.last_seen = frame.seq;
                    return Some(frame);
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

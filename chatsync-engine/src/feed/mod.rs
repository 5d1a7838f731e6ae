//! Change feed abstraction.
//!
//! A change feed is an ordered, append-only remote collection with
//! full-snapshot delivery: the initial subscription delivers the complete
//! current collection, and every append re-delivers the full snapshot to all
//! live subscribers, newest-first.
//!
//! Failures after a successful subscribe are delivered through the event
//! stream, never raised synchronously; cancellation is an explicit,
//! idempotent handle safe to call from teardown.

mod memory;

pub use memory::MemoryFeed;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

use chatsync_types::FeedRecord;

/// Change feed errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The store rejected the subscription or write.
    #[error("permission denied")]
    PermissionDenied,

    /// Subscribing failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Appending a record failed.
    #[error("append failed: {0}")]
    Append(String),

    /// The feed is closed.
    #[error("feed closed")]
    Closed,
}

/// An event delivered to a feed subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The full current collection, newest-first.
    Snapshot(Vec<FeedRecord>),
    /// The subscription failed; no further snapshots will arrive.
    Error(FeedError),
}

/// Idempotent cancellation handle for a subscription.
///
/// The first call runs the registered teardown; every later call is a no-op.
/// Clones share the same state, so any copy may be used from a teardown path.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    on_cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CancelHandle {
    /// Create a handle that runs `on_cancel` on the first cancellation.
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                on_cancel: Mutex::new(Some(Box::new(on_cancel))),
            }),
        }
    }

    /// A handle with no teardown (already torn down at creation).
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Cancel. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.inner.on_cancel.lock().unwrap().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Whether cancel has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A live subscription to a change feed.
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancelHandle,
}

impl FeedSubscription {
    /// Build a subscription from its event receiver and cancel handle.
    pub fn new(events: mpsc::Receiver<FeedEvent>, cancel: CancelHandle) -> Self {
        Self { events, cancel }
    }

    /// Receive the next event. `None` once the feed side is gone.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clonable handle for cancelling from elsewhere (e.g. teardown).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// An ordered, append-only remote collection with snapshot delivery.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to the collection.
    ///
    /// On success the subscription's first event is a snapshot of the
    /// complete current collection. Later failures (including permission
    /// denial decided asynchronously) arrive as [`FeedEvent::Error`] on the
    /// stream.
    fn subscribe(&self) -> Result<FeedSubscription, FeedError>;

    /// Append one record. The store resolves any pending server timestamp
    /// at commit, then re-delivers the full snapshot to all subscribers.
    async fn append(&self, record: FeedRecord) -> Result<(), FeedError>;
}

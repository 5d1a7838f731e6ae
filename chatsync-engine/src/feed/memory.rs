//! In-process change feed for development and testing.
//!
//! Backs the feed with a plain `Vec` behind a mutex. Appends resolve pending
//! server timestamps at commit, then broadcast the full snapshot to every
//! live subscriber, matching the remote store's full-snapshot semantics.

use super::{CancelHandle, ChangeFeed, FeedError, FeedEvent, FeedSubscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use chatsync_types::{FeedRecord, ServerTime};

/// Channel capacity per subscriber. Snapshots supersede each other, so a
/// small buffer is enough; a subscriber that falls behind is dropped.
const SUBSCRIBER_BUFFER: usize = 16;

/// In-process change feed.
///
/// Allows injecting failures and inspecting stored records for verification.
#[derive(Default)]
pub struct MemoryFeed {
    inner: Arc<Mutex<MemoryFeedInner>>,
}

#[derive(Default)]
struct MemoryFeedInner {
    records: Vec<FeedRecord>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    fail_next_subscribe: Option<String>,
    fail_next_append: Option<String>,
    deny_subscriptions: bool,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<FeedEvent>,
}

impl MemoryFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a feed pre-populated with records (timestamps resolved).
    pub fn with_records(records: Vec<FeedRecord>) -> Self {
        let feed = Self::new();
        {
            let mut inner = feed.inner.lock().unwrap();
            let now = Utc::now();
            inner.records = records
                .into_iter()
                .map(|r| resolve_at_commit(r, now))
                .collect();
        }
        feed
    }

    /// Cause the next subscribe() to fail synchronously with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_subscribe = Some(error.to_string());
    }

    /// Cause the next append() to fail with the given error.
    pub fn fail_next_append(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_append = Some(error.to_string());
    }

    /// Deny all future subscriptions. The denial is delivered through the
    /// event stream, the way a remote store reports a permission error.
    pub fn deny_subscriptions(&self, deny: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.deny_subscriptions = deny;
    }

    /// All stored records, in append order.
    pub fn records(&self) -> Vec<FeedRecord> {
        let inner = self.inner.lock().unwrap();
        inner.records.clone()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.subscribers.len()
    }
}

impl Clone for MemoryFeed {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn resolve_at_commit(mut record: FeedRecord, now: DateTime<Utc>) -> FeedRecord {
    if record.created_at == ServerTime::Pending {
        record.created_at = ServerTime::Resolved(now);
    }
    record
}

fn snapshot_newest_first(records: &[FeedRecord]) -> Vec<FeedRecord> {
    let mut snapshot = records.to_vec();
    // All stored records are resolved; a stable sort keeps append order
    // for records sharing an instant.
    snapshot.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    snapshot
}

fn sort_key(record: &FeedRecord) -> DateTime<Utc> {
    match record.created_at {
        ServerTime::Resolved(at) => at,
        ServerTime::Pending => DateTime::<Utc>::MAX_UTC,
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    fn subscribe(&self) -> Result<FeedSubscription, FeedError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(FeedError::Subscribe(error));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        if inner.deny_subscriptions {
            // Denial surfaces through the stream, not the subscribe call.
            let _ = tx.try_send(FeedEvent::Error(FeedError::PermissionDenied));
            return Ok(FeedSubscription::new(rx, CancelHandle::noop()));
        }

        let _ = tx.try_send(FeedEvent::Snapshot(snapshot_newest_first(&inner.records)));

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(Subscriber { id, tx });

        let unregister = Arc::clone(&self.inner);
        let cancel = CancelHandle::new(move || {
            let mut inner = unregister.lock().unwrap();
            inner.subscribers.retain(|s| s.id != id);
        });
        Ok(FeedSubscription::new(rx, cancel))
    }

    async fn append(&self, record: FeedRecord) -> Result<(), FeedError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_append.take() {
            return Err(FeedError::Append(error));
        }

        inner.records.push(resolve_at_commit(record, Utc::now()));

        let snapshot = snapshot_newest_first(&inner.records);
        // Drop subscribers whose receiver is gone or hopelessly behind.
        inner.subscribers.retain(|s| {
            !matches!(
                s.tx.try_send(FeedEvent::Snapshot(snapshot.clone())),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
        Ok(())
    }
}

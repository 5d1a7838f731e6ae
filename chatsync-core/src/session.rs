//! Sync session state machine.
//!
//! [`Session`] owns the authoritative newest-first message list and decides,
//! without performing any I/O, how remote snapshots, cached messages and
//! outgoing sends affect it. The engine interprets the outcomes: it persists
//! what [`SnapshotOutcome`] says to persist and appends what
//! [`Session::prepare_send`] hands back.

use chrono::{DateTime, Utc};
use thiserror::Error;

use chatsync_types::{Author, FeedRecord, Message, MessageId};

use crate::connectivity::Connectivity;

/// Maximum number of messages persisted to the local cache.
///
/// The in-memory list is uncapped; only the persisted slice is bounded.
pub const MAX_CACHED_MESSAGES: usize = 200;

/// Where the currently displayed list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No data yet.
    #[default]
    Uninitialized,
    /// Showing the placeholder seed messages.
    Seeded,
    /// Showing the latest remote snapshot.
    RemoteLive,
    /// Showing the locally cached messages (offline).
    CacheLive,
}

/// Errors from [`Session::prepare_send`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Sends are rejected while offline; nothing is queued.
    #[error("cannot send while offline")]
    Offline,
}

/// What the engine should do after a snapshot was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotOutcome {
    /// The list to persist, already capped, or `None` when nothing should be
    /// written (seed fallback is never persisted).
    pub to_persist: Option<Vec<Message>>,
}

/// Placeholder messages shown before any real data arrives.
///
/// Never persisted and never merged with real messages.
fn seed_messages(now: DateTime<Utc>) -> Vec<Message> {
    vec![
        Message::text(
            MessageId::new("seed-welcome"),
            "Hello developer",
            Author::new("bot").with_name("Bot"),
            now,
        ),
        Message::system(
            MessageId::new("seed-entered"),
            "You have entered the chat",
            now,
        ),
    ]
}

/// The sync session - NO I/O, just the message list and its provenance.
#[derive(Debug, Default)]
pub struct Session {
    messages: Vec<Message>,
    phase: Phase,
}

impl Session {
    /// Create an empty, uninitialized session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The authoritative newest-first message list.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Install the seed messages. Only meaningful before any real data; a
    /// call in any later phase is a no-op.
    pub fn seed(&mut self, now: DateTime<Utc>) {
        if self.phase == Phase::Uninitialized {
            self.messages = seed_messages(now);
            self.phase = Phase::Seeded;
        }
    }

    /// Apply a full remote snapshot, replacing the list.
    ///
    /// Records are normalized (pending server timestamps become `now`) and
    /// sorted newest-first with a stable sort, so records sharing an instant
    /// keep their feed delivery order. An empty snapshot falls back to the
    /// seed messages and persists nothing.
    pub fn apply_snapshot(
        &mut self,
        records: Vec<FeedRecord>,
        now: DateTime<Utc>,
    ) -> SnapshotOutcome {
        let mut normalized: Vec<Message> =
            records.into_iter().map(|r| r.resolve(now)).collect();
        normalized.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.phase = Phase::RemoteLive;
        if normalized.is_empty() {
            self.messages = seed_messages(now);
            SnapshotOutcome { to_persist: None }
        } else {
            let capped: Vec<Message> = normalized
                .iter()
                .take(MAX_CACHED_MESSAGES)
                .cloned()
                .collect();
            self.messages = normalized;
            SnapshotOutcome {
                to_persist: Some(capped),
            }
        }
    }

    /// Apply locally cached messages after going offline.
    ///
    /// A non-empty cache replaces the list; an empty cache leaves the current
    /// list untouched so the view never flickers back to the seeds.
    pub fn apply_cache(&mut self, cached: Vec<Message>) {
        if cached.is_empty() {
            return;
        }
        self.messages = cached;
        self.phase = Phase::CacheLive;
    }

    /// Turn an outgoing message into a feed record, or reject it offline.
    ///
    /// The list is never mutated here; the echo of a successful append
    /// arrives through the next snapshot.
    pub fn prepare_send(
        &self,
        message: Message,
        connectivity: Connectivity,
    ) -> Result<FeedRecord, SendError> {
        if !connectivity.is_online() {
            return Err(SendError::Offline);
        }
        Ok(FeedRecord::from_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_types::ServerTime;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn text_msg(id: &str, secs: i64) -> Message {
        Message::text(MessageId::new(id), id.to_string(), Author::new("u1"), at(secs))
    }

    fn record(id: &str, secs: i64) -> FeedRecord {
        let mut rec = FeedRecord::from_message(text_msg(id, 0));
        rec.created_at = ServerTime::Resolved(at(secs));
        rec
    }

    #[test]
    fn new_session_is_empty() {
        let session = Session::new();
        assert_eq!(session.phase(), Phase::Uninitialized);
        assert!(session.messages().is_empty());
    }

    #[test]
    fn seed_installs_two_placeholders() {
        let mut session = Session::new();
        session.seed(at(100));
        assert_eq!(session.phase(), Phase::Seeded);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].text.as_deref(), Some("Hello developer"));
        assert!(session.messages()[1].system);
    }

    #[test]
    fn seed_after_real_data_is_noop() {
        let mut session = Session::new();
        session.apply_snapshot(vec![record("m1", 50)], at(100));
        session.seed(at(200));
        assert_eq!(session.phase(), Phase::RemoteLive);
        assert_eq!(session.messages()[0].id, MessageId::new("m1"));
    }

    #[test]
    fn snapshot_sorts_newest_first() {
        let mut session = Session::new();
        session.apply_snapshot(
            vec![record("old", 10), record("new", 30), record("mid", 20)],
            at(100),
        );
        let ids: Vec<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(session.phase(), Phase::RemoteLive);
    }

    #[test]
    fn equal_timestamps_keep_delivery_order() {
        let mut session = Session::new();
        session.apply_snapshot(
            vec![record("first", 20), record("second", 20), record("third", 20)],
            at(100),
        );
        let ids: Vec<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn pending_timestamps_resolve_to_now() {
        let mut session = Session::new();
        let pending = FeedRecord::from_message(text_msg("p1", 0));
        session.apply_snapshot(vec![pending, record("m1", 50)], at(100));
        // Resolved to now=100, so the pending record sorts first.
        assert_eq!(session.messages()[0].id, MessageId::new("p1"));
        assert_eq!(session.messages()[0].created_at, at(100));
    }

    #[test]
    fn empty_snapshot_falls_back_to_seeds_without_persisting() {
        let mut session = Session::new();
        let outcome = session.apply_snapshot(vec![], at(100));
        assert_eq!(outcome.to_persist, None);
        assert_eq!(session.phase(), Phase::RemoteLive);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(
            session.messages()[0].text.as_deref(),
            Some("Hello developer")
        );
    }

    #[test]
    fn non_empty_snapshot_persists_capped_list() {
        let mut session = Session::new();
        let records: Vec<FeedRecord> = (0..250).map(|i| record(&format!("m{i}"), i)).collect();
        let outcome = session.apply_snapshot(records, at(1000));
        let persisted = outcome.to_persist.unwrap();
        assert_eq!(persisted.len(), MAX_CACHED_MESSAGES);
        // The 200 most recent survive.
        assert_eq!(persisted[0].id, MessageId::new("m249"));
        assert_eq!(persisted[199].id, MessageId::new("m50"));
        // The in-memory list is uncapped.
        assert_eq!(session.messages().len(), 250);
    }

    #[test]
    fn warm_cache_replaces_list() {
        let mut session = Session::new();
        session.seed(at(10));
        session.apply_cache(vec![text_msg("c1", 50), text_msg("c2", 40)]);
        assert_eq!(session.phase(), Phase::CacheLive);
        assert_eq!(session.messages()[0].id, MessageId::new("c1"));
    }

    #[test]
    fn empty_cache_leaves_list_untouched() {
        let mut session = Session::new();
        session.apply_snapshot(vec![record("m1", 50)], at(100));
        session.apply_cache(vec![]);
        assert_eq!(session.phase(), Phase::RemoteLive);
        assert_eq!(session.messages()[0].id, MessageId::new("m1"));
    }

    #[test]
    fn offline_send_is_rejected_without_mutation() {
        let mut session = Session::new();
        session.apply_snapshot(vec![record("m1", 50)], at(100));
        let before = session.messages().to_vec();
        let result = session.prepare_send(text_msg("out", 200), Connectivity::Offline);
        assert_eq!(result, Err(SendError::Offline));
        assert_eq!(session.messages(), before.as_slice());
    }

    #[test]
    fn unknown_connectivity_also_rejects_send() {
        let session = Session::new();
        let result = session.prepare_send(text_msg("out", 200), Connectivity::Unknown);
        assert_eq!(result, Err(SendError::Offline));
    }

    #[test]
    fn online_send_yields_pending_record() {
        let session = Session::new();
        let record = session
            .prepare_send(text_msg("out", 200), Connectivity::Online)
            .unwrap();
        assert_eq!(record.created_at, ServerTime::Pending);
        assert_eq!(record.id, MessageId::new("out"));
        assert!(session.messages().is_empty());
    }
}

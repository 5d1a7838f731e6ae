//! Remote wire records with possibly-pending server timestamps.

use chrono::{DateTime, Utc};

use crate::ids::MessageId;
use crate::message::{Attachment, Author, Message};

/// A server-assigned timestamp that may not have committed yet.
///
/// When a client appends a record, the authoritative `createdAt` is assigned
/// by the store at commit time. Until the committed snapshot arrives, the
/// timestamp is `Pending`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerTime {
    /// The store has committed the write and assigned this instant.
    Resolved(DateTime<Utc>),
    /// The write has not committed; the instant is not yet known.
    Pending,
}

impl ServerTime {
    /// The resolved instant, or `now` if still pending.
    pub fn or(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ServerTime::Resolved(at) => at,
            ServerTime::Pending => now,
        }
    }
}

/// A message as carried on the remote change feed.
///
/// Identical to [`Message`] except the timestamp is a [`ServerTime`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    /// Unique id, possibly provisional.
    pub id: MessageId,
    /// Body text.
    pub text: Option<String>,
    /// Server-assigned creation time.
    pub created_at: ServerTime,
    /// The sender.
    pub author: Option<Author>,
    /// Whether this is a system notice.
    pub system: bool,
    /// Optional image or location payload.
    pub attachment: Option<Attachment>,
}

impl FeedRecord {
    /// Wrap an outgoing message, leaving the server timestamp pending.
    pub fn from_message(msg: Message) -> Self {
        Self {
            id: msg.id,
            text: msg.text,
            created_at: ServerTime::Pending,
            author: msg.author,
            system: msg.system,
            attachment: msg.attachment,
        }
    }

    /// Convert into a [`Message`], substituting `now` for a pending timestamp.
    pub fn resolve(self, now: DateTime<Utc>) -> Message {
        Message {
            id: self.id,
            text: self.text,
            created_at: self.created_at.or(now),
            author: self.author,
            system: self.system,
            attachment: self.attachment,
        }
    }
}

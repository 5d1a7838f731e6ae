//! Identity types for chatsync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that marks a client-generated, provisional message id.
///
/// A message carries a provisional id from the moment a producer builds it
/// until the remote store echoes it back under a store-assigned id.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// A unique identifier for a message.
///
/// Remote-confirmed messages carry the store-assigned id; locally-originated
/// messages carry a client-generated id prefixed with `temp-` until the
/// store's copy replaces them.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a MessageId from a store-assigned id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh provisional id (`temp-<uuid>`).
    pub fn provisional() -> Self {
        Self(format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4()))
    }

    /// Whether this id is client-generated and not yet store-confirmed.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unique identifier for a chat participant.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a UserId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

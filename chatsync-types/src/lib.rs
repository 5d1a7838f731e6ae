//! # chatsync-types
//!
//! Model and wire types for the chatsync message-synchronization core.
//!
//! This crate provides the foundational types used across all chatsync crates:
//! - [`MessageId`], [`UserId`] - Identity types
//! - [`Message`], [`Author`], [`Attachment`], [`GeoPoint`] - The chat message model
//! - [`FeedRecord`], [`ServerTime`] - Remote wire records with possibly-pending
//!   server timestamps
//! - [`RecordError`] - Error type for malformed persisted records
//!
//! The serde representation of [`Message`] is the persisted cache format: a
//! flat JSON object with `_id`, `createdAt` (RFC 3339), optional `user`,
//! `system`, `image` and `location` fields.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod message;
mod record;

pub use error::RecordError;
pub use ids::{MessageId, UserId, PROVISIONAL_PREFIX};
pub use message::{Attachment, Author, GeoPoint, Message, LOCATION_TEXT};
pub use record::{FeedRecord, ServerTime};

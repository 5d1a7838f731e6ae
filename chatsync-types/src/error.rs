//! Error type for malformed persisted records.

use thiserror::Error;

/// Errors raised while decoding a persisted cache record into a [`crate::Message`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// The record has no `_id` field or it is empty.
    #[error("record is missing an id")]
    MissingId,

    /// A location payload carried a coordinate outside the valid range
    /// or a non-finite number.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// The offending latitude.
        latitude: f64,
        /// The offending longitude.
        longitude: f64,
    },
}

//! The chat message model and its persisted cache representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::ids::{MessageId, UserId};

/// Fixed body text for location messages.
pub const LOCATION_TEXT: &str = "My location";

/// A chat participant as carried on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// The participant's id.
    pub id: UserId,
    /// Display name, if known.
    pub name: Option<String>,
    /// Avatar URL, if set.
    pub avatar: Option<String>,
}

impl Author {
    /// Create an author with just an id.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            avatar: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the avatar URL.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// A validated geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, within [-90, 90].
    pub latitude: f64,
    /// Longitude in degrees, within [-180, 180].
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RecordError> {
        let in_range = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if in_range {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(RecordError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }
}

/// Non-text payload carried by a message.
///
/// In practice a message carries at most one attachment; a persisted record
/// holding both an image and a location resolves to the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attachment {
    /// A remote image, referenced by URL.
    Image {
        /// Download URL of the image.
        url: String,
    },
    /// A shared location.
    Location(GeoPoint),
}

/// A single chat message.
///
/// The serde representation is the persisted cache format: a flat JSON object
/// with `_id`, `createdAt` (RFC 3339), and optional `text`, `user`, `system`,
/// `image` and `location` fields. Round-tripping through it reproduces the
/// exact same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CacheRecord", try_from = "CacheRecord")]
pub struct Message {
    /// Unique id, possibly provisional.
    pub id: MessageId,
    /// Body text, absent for bare image messages.
    pub text: Option<String>,
    /// When the message was created (server time once confirmed).
    pub created_at: DateTime<Utc>,
    /// The sender; absent for system messages.
    pub author: Option<Author>,
    /// Whether this is a system notice rather than a user message.
    pub system: bool,
    /// Optional image or location payload.
    pub attachment: Option<Attachment>,
}

impl Message {
    /// Build a plain text message.
    pub fn text(
        id: MessageId,
        text: impl Into<String>,
        author: Author,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text: Some(text.into()),
            created_at,
            author: Some(author),
            system: false,
            attachment: None,
        }
    }

    /// Build an image message referencing an uploaded URL.
    pub fn image(
        id: MessageId,
        url: impl Into<String>,
        author: Author,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text: None,
            created_at,
            author: Some(author),
            system: false,
            attachment: Some(Attachment::Image { url: url.into() }),
        }
    }

    /// Build a location message. The body text is fixed.
    pub fn location(
        id: MessageId,
        point: GeoPoint,
        author: Author,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text: Some(LOCATION_TEXT.to_string()),
            created_at,
            author: Some(author),
            system: false,
            attachment: Some(Attachment::Location(point)),
        }
    }

    /// Build a system notice (no author).
    pub fn system(id: MessageId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: Some(text.into()),
            created_at,
            author: None,
            system: true,
            attachment: None,
        }
    }
}

/// The flat persisted shape of a message.
#[derive(Serialize, Deserialize)]
struct CacheRecord {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<CacheUser>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<CacheLocation>,
}

#[derive(Serialize, Deserialize)]
struct CacheUser {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CacheLocation {
    latitude: f64,
    longitude: f64,
}

impl From<Message> for CacheRecord {
    fn from(msg: Message) -> Self {
        let (image, location) = match msg.attachment {
            Some(Attachment::Image { url }) => (Some(url), None),
            Some(Attachment::Location(point)) => (
                None,
                Some(CacheLocation {
                    latitude: point.latitude,
                    longitude: point.longitude,
                }),
            ),
            None => (None, None),
        };
        Self {
            id: msg.id.as_str().to_string(),
            text: msg.text,
            created_at: msg.created_at,
            user: msg.author.map(|a| CacheUser {
                id: a.id.as_str().to_string(),
                name: a.name,
                avatar: a.avatar,
            }),
            system: msg.system,
            image,
            location,
        }
    }
}

impl TryFrom<CacheRecord> for Message {
    type Error = RecordError;

    fn try_from(rec: CacheRecord) -> Result<Self, Self::Error> {
        if rec.id.is_empty() {
            return Err(RecordError::MissingId);
        }
        // Image wins when a record carries both payloads.
        let attachment = if let Some(url) = rec.image {
            Some(Attachment::Image { url })
        } else if let Some(loc) = rec.location {
            Some(Attachment::Location(GeoPoint::new(
                loc.latitude,
                loc.longitude,
            )?))
        } else {
            None
        };
        Ok(Self {
            id: MessageId::new(rec.id),
            text: rec.text,
            created_at: rec.created_at,
            author: rec.user.map(|u| Author {
                id: UserId::new(u.id),
                name: u.name,
                avatar: u.avatar,
            }),
            system: rec.system,
            attachment,
        })
    }
}

//! Attachment blob upload.
//!
//! Uploading is a separate step before sending: the producer uploads the
//! image bytes, obtains a download URL, and only then builds the message.
//! Upload failures are the caller's to handle; nothing here retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use chatsync_types::UserId;

/// Upload errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The store rejected the write.
    #[error("permission denied")]
    PermissionDenied,

    /// The transfer failed.
    #[error("upload transport error: {0}")]
    Transport(String),
}

/// A collision-resistant storage path for an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPath(String);

impl UploadPath {
    /// Build the path `images/{user_id}-{unix_millis}-{filename}`.
    ///
    /// The uploader id plus upload instant keeps concurrent uploads of the
    /// same filename from colliding.
    pub fn generate(user_id: &UserId, filename: &str, now: DateTime<Utc>) -> Self {
        Self(format!(
            "images/{}-{}-{}",
            user_id,
            now.timestamp_millis(),
            filename
        ))
    }

    /// The raw path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob storage for message attachments.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store `data` under `path` and return its download URL.
    async fn upload(&self, data: &[u8], path: &UploadPath) -> Result<String, UploadError>;
}

/// In-memory uploader for tests.
///
/// Stores blobs in a map and hands back `mem://{path}` URLs.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    inner: Arc<Mutex<MemoryUploaderInner>>,
}

#[derive(Debug, Default)]
struct MemoryUploaderInner {
    blobs: HashMap<String, Vec<u8>>,
    fail_next_upload: Option<String>,
    deny_uploads: bool,
}

impl MemoryUploader {
    /// Create an empty uploader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next upload() to fail with a transport error.
    pub fn fail_next_upload(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_upload = Some(error.to_string());
    }

    /// Deny all future uploads.
    pub fn deny_uploads(&self, deny: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.deny_uploads = deny;
    }

    /// The blob stored under `path`, if any.
    pub fn blob(&self, path: &UploadPath) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.blobs.get(path.as_str()).cloned()
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.blobs.len()
    }
}

impl Clone for MemoryUploader {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, data: &[u8], path: &UploadPath) -> Result<String, UploadError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.deny_uploads {
            return Err(UploadError::PermissionDenied);
        }
        if let Some(error) = inner.fail_next_upload.take() {
            return Err(UploadError::Transport(error));
        }

        inner.blobs.insert(path.as_str().to_string(), data.to_vec());
        Ok(format!("mem://{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_embeds_user_instant_and_filename() {
        let now = Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap();
        let path = UploadPath::generate(&UserId::new("u42"), "photo.png", now);
        assert_eq!(path.as_str(), "images/u42-1700000000123-photo.png");
    }

    #[test]
    fn same_filename_different_instants_do_not_collide() {
        let user = UserId::new("u1");
        let a = UploadPath::generate(&user, "a.png", Utc.timestamp_opt(100, 0).unwrap());
        let b = UploadPath::generate(&user, "a.png", Utc.timestamp_opt(101, 0).unwrap());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn upload_stores_blob_and_returns_url() {
        let uploader = MemoryUploader::new();
        let path = UploadPath::generate(
            &UserId::new("u1"),
            "a.png",
            Utc.timestamp_opt(100, 0).unwrap(),
        );

        let url = uploader.upload(b"bytes", &path).await.unwrap();
        assert_eq!(url, format!("mem://{path}"));
        assert_eq!(uploader.blob(&path), Some(b"bytes".to_vec()));
    }

    #[tokio::test]
    async fn forced_transport_failure_stores_nothing() {
        let uploader = MemoryUploader::new();
        uploader.fail_next_upload("connection reset");
        let path = UploadPath::generate(
            &UserId::new("u1"),
            "a.png",
            Utc.timestamp_opt(100, 0).unwrap(),
        );

        let result = uploader.upload(b"bytes", &path).await;
        assert!(matches!(result, Err(UploadError::Transport(_))));
        assert_eq!(uploader.blob_count(), 0);

        // Next upload works.
        uploader.upload(b"bytes", &path).await.unwrap();
    }

    #[tokio::test]
    async fn denied_upload_is_persistent() {
        let uploader = MemoryUploader::new();
        uploader.deny_uploads(true);
        let path = UploadPath::generate(
            &UserId::new("u1"),
            "a.png",
            Utc.timestamp_opt(100, 0).unwrap(),
        );

        assert_eq!(
            uploader.upload(b"x", &path).await,
            Err(UploadError::PermissionDenied)
        );
        assert_eq!(
            uploader.upload(b"x", &path).await,
            Err(UploadError::PermissionDenied)
        );
    }
}

//! Persisted message cache.
//!
//! The cache is a best-effort mirror of the last successful remote snapshot,
//! stored under a namespaced key. The engine caps the list before saving;
//! stores perform no eviction of their own. A missing key loads as empty and
//! a malformed document is treated as a cache miss, never as a hard error.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use chatsync_types::Message;

/// Cache store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Reading or writing the backing storage failed.
    #[error("cache io error: {0}")]
    Io(String),

    /// Encoding the message list failed.
    #[error("cache encode error: {0}")]
    Encode(String),
}

/// Keyed storage for ordered message lists.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Persist `messages` under `key`, replacing any previous value.
    async fn save(&self, key: &str, messages: &[Message]) -> Result<(), CacheError>;

    /// Load the list stored under `key`. A missing key is `Ok(vec![])`.
    async fn load(&self, key: &str) -> Result<Vec<Message>, CacheError>;
}

/// File-backed cache store: one JSON document per key in a root directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write never leaves a truncated document behind.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    /// Create a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn save(&self, key: &str, messages: &[Message]) -> Result<(), CacheError> {
        let json =
            serde_json::to_vec(messages).map_err(|e| CacheError::Encode(e.to_string()))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        tracing::debug!(key, count = messages.len(), "cache saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<Message>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(CacheError::Io(e.to_string())),
        };

        match serde_json::from_slice(&bytes) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                // A document we cannot decode is a cache miss, not a failure.
                tracing::warn!(key, error = %e, "discarding malformed cache document");
                Ok(vec![])
            }
        }
    }
}

/// In-memory cache store for tests.
///
/// Allows injecting failures and inspecting what was saved.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    inner: Arc<Mutex<MemoryCacheInner>>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Vec<Message>>,
    save_count: u64,
    fail_next_save: Option<String>,
    fail_next_load: Option<String>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key.
    pub fn insert(&self, key: &str, messages: Vec<Message>) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(key.to_string(), messages);
    }

    /// What is currently stored under `key`, if anything.
    pub fn stored(&self, key: &str) -> Option<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(key).cloned()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.save_count
    }

    /// Cause the next save() to fail with the given error.
    pub fn fail_next_save(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_save = Some(error.to_string());
    }

    /// Cause the next load() to fail with the given error.
    pub fn fail_next_load(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_load = Some(error.to_string());
    }
}

impl Clone for MemoryCacheStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn save(&self, key: &str, messages: &[Message]) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_save.take() {
            return Err(CacheError::Io(error));
        }

        inner.entries.insert(key.to_string(), messages.to_vec());
        inner.save_count += 1;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<Message>, CacheError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_load.take() {
            return Err(CacheError::Io(error));
        }

        Ok(inner.entries.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_types::{Author, GeoPoint, MessageId};
    use chrono::{TimeZone, Utc};

    fn sample_messages() -> Vec<Message> {
        let at = |secs: i64| Utc.timestamp_opt(secs, 250_000_000).unwrap();
        vec![
            Message::image(
                MessageId::new("m3"),
                "https://example.com/a.png",
                Author::new("u1").with_name("Ada"),
                at(30),
            ),
            Message::location(
                MessageId::new("m2"),
                GeoPoint::new(48.85, 2.35).unwrap(),
                Author::new("u2"),
                at(20),
            ),
            Message::text(MessageId::new("m1"), "hello", Author::new("u1"), at(10)),
        ]
    }

    #[tokio::test]
    async fn file_store_round_trips_ordered_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let messages = sample_messages();

        store.save("chat_messages", &messages).await.unwrap();
        let loaded = store.load("chat_messages").await.unwrap();

        assert_eq!(loaded, messages);
        // Exact instants survive, sub-second precision included.
        assert_eq!(loaded[0].created_at, messages[0].created_at);
    }

    #[tokio::test]
    async fn file_store_missing_key_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        let loaded = store.load("never_saved").await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn file_store_corrupt_document_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        tokio::fs::write(dir.path().join("chat_messages.json"), b"{not json]")
            .await
            .unwrap();

        let loaded = store.load("chat_messages").await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn file_store_save_replaces_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let messages = sample_messages();

        store.save("chat_messages", &messages).await.unwrap();
        store.save("chat_messages", &messages[..1]).await.unwrap();

        let loaded = store.load("chat_messages").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn file_store_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.save("chat_messages", &sample_messages()).await.unwrap();

        let mut names = vec![];
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["chat_messages.json"]);
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryCacheStore::new();
        let messages = sample_messages();

        store.save("k", &messages).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), messages);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn memory_store_forced_failures_are_one_shot() {
        let store = MemoryCacheStore::new();
        store.fail_next_save("disk full");
        assert!(store.save("k", &[]).await.is_err());
        store.save("k", &[]).await.unwrap();

        store.fail_next_load("read error");
        assert!(store.load("k").await.is_err());
        assert!(store.load("k").await.is_ok());
    }
}

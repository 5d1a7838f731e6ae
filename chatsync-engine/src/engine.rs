//! The sync engine event loop.
//!
//! `SyncEngine` glues the pieces together on a tokio task: it watches the
//! connectivity monitor, keeps exactly one live data source (the change feed
//! while online, the cache after going offline), runs snapshots through the
//! pure session state machine, publishes the resulting list on a `watch`
//! channel for renderers, and persists non-seed snapshots in the background.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use chatsync_core::{Connectivity, Session, MAX_CACHED_MESSAGES};
use chatsync_types::Message;

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::feed::{ChangeFeed, FeedError, FeedEvent, FeedSubscription};

/// Errors from [`SyncEngine::send`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Sends are rejected while offline; nothing is queued.
    #[error("cannot send while offline")]
    Offline,

    /// The feed rejected the append. Not retried; the list is untouched.
    #[error(transparent)]
    Feed(#[from] FeedError),
}

impl From<chatsync_core::SendError> for SendError {
    fn from(err: chatsync_core::SendError) -> Self {
        match err {
            chatsync_core::SendError::Offline => SendError::Offline,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Namespaced key the message cache is stored under.
    pub cache_key: String,
    /// Maximum number of messages persisted per save.
    pub cache_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_key: "chat_messages".to_string(),
            cache_cap: MAX_CACHED_MESSAGES,
        }
    }
}

impl EngineConfig {
    /// Override the cache key.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    /// Override the persistence cap.
    pub fn with_cache_cap(mut self, cap: usize) -> Self {
        self.cache_cap = cap;
        self
    }
}

/// The message-synchronization engine.
///
/// Owns the authoritative message list. Renderers read it through
/// [`SyncEngine::messages`] or [`SyncEngine::subscribe_messages`] and must
/// not mutate it; the only write path is [`SyncEngine::send`].
pub struct SyncEngine {
    feed: Arc<dyn ChangeFeed>,
    session: Arc<Mutex<Session>>,
    state_rx: watch::Receiver<Connectivity>,
    messages_rx: watch::Receiver<Vec<Message>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Start the engine on a tokio task.
    ///
    /// The list starts out seeded with the placeholder messages; real data
    /// replaces them as soon as the first source delivers.
    pub fn spawn(
        feed: Arc<dyn ChangeFeed>,
        cache: Arc<dyn CacheStore>,
        monitor: &ConnectivityMonitor,
        config: EngineConfig,
    ) -> Self {
        let mut session = Session::new();
        session.seed(Utc::now());
        let (messages_tx, messages_rx) = watch::channel(session.messages().to_vec());
        let session = Arc::new(Mutex::new(session));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_rx = monitor.subscribe_state();

        let task = tokio::spawn(run_loop(
            Arc::clone(&feed),
            cache,
            Arc::clone(&session),
            monitor.subscribe_state(),
            messages_tx,
            shutdown_rx,
            config,
        ));

        Self {
            feed,
            session,
            state_rx,
            messages_rx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// The current newest-first message list.
    pub fn messages(&self) -> Vec<Message> {
        self.messages_rx.borrow().clone()
    }

    /// Watch the message list for changes.
    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages_rx.clone()
    }

    /// Whether sends are currently possible.
    pub fn is_online(&self) -> bool {
        self.state_rx.borrow().is_online()
    }

    /// Send a message.
    ///
    /// Rejected with [`SendError::Offline`] when not online. On success the
    /// record is appended with a pending server timestamp; the local list is
    /// not touched until the echo arrives in the next snapshot.
    pub async fn send(&self, message: Message) -> Result<(), SendError> {
        let record = {
            let session = self.session.lock().await;
            session.prepare_send(message, *self.state_rx.borrow())?
        };
        self.feed.append(record).await.map_err(|e| {
            tracing::warn!(error = %e, "send append failed");
            SendError::Feed(e)
        })
    }

    /// Stop the event loop and tear down the live subscription.
    ///
    /// In-flight saves and appends run to completion against their own
    /// handles; they never touch engine state afterwards.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn run_loop(
    feed: Arc<dyn ChangeFeed>,
    cache: Arc<dyn CacheStore>,
    session: Arc<Mutex<Session>>,
    mut state_rx: watch::Receiver<Connectivity>,
    messages_tx: watch::Sender<Vec<Message>>,
    mut shutdown_rx: watch::Receiver<bool>,
    config: EngineConfig,
) {
    let mut subscription: Option<FeedSubscription> = None;

    // The monitor may already have resolved before the engine started.
    let initial = *state_rx.borrow_and_update();
    if initial != Connectivity::Unknown {
        activate(
            initial,
            &feed,
            &cache,
            &session,
            &messages_tx,
            &config,
            &mut subscription,
        )
        .await;
    }

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                activate(
                    state,
                    &feed,
                    &cache,
                    &session,
                    &messages_tx,
                    &config,
                    &mut subscription,
                )
                .await;
            }
            event = next_event(&mut subscription) => {
                match event {
                    Some(FeedEvent::Snapshot(records)) => {
                        let to_persist = {
                            let mut session = session.lock().await;
                            let outcome = session.apply_snapshot(records, Utc::now());
                            messages_tx.send_replace(session.messages().to_vec());
                            outcome.to_persist
                        };
                        if let Some(mut messages) = to_persist {
                            messages.truncate(config.cache_cap);
                            let cache = Arc::clone(&cache);
                            let key = config.cache_key.clone();
                            tokio::spawn(async move {
                                if let Err(e) = cache.save(&key, &messages).await {
                                    tracing::warn!(error = %e, "cache save failed");
                                }
                            });
                        }
                    }
                    Some(FeedEvent::Error(e)) => {
                        tracing::warn!(error = %e, "feed subscription failed");
                        subscription = None;
                    }
                    None => {
                        tracing::debug!("feed subscription closed");
                        subscription = None;
                    }
                }
            }
        }
    }

    if let Some(sub) = subscription.take() {
        sub.cancel();
    }
    tracing::debug!("sync engine stopped");
}

/// Switch to the data source for `state`, tearing the previous one down
/// first so there are never two live sources.
async fn activate(
    state: Connectivity,
    feed: &Arc<dyn ChangeFeed>,
    cache: &Arc<dyn CacheStore>,
    session: &Arc<Mutex<Session>>,
    messages_tx: &watch::Sender<Vec<Message>>,
    config: &EngineConfig,
    subscription: &mut Option<FeedSubscription>,
) {
    if let Some(sub) = subscription.take() {
        sub.cancel();
    }

    match state {
        Connectivity::Online => match feed.subscribe() {
            Ok(sub) => {
                tracing::debug!("subscribed to change feed");
                *subscription = Some(sub);
            }
            Err(e) => {
                // Keep showing the last list; a later flip retries.
                tracing::warn!(error = %e, "feed subscribe failed");
            }
        },
        Connectivity::Offline => {
            let cached = match cache.load(&config.cache_key).await {
                Ok(cached) => cached,
                Err(e) => {
                    tracing::warn!(error = %e, "cache load failed");
                    vec![]
                }
            };
            tracing::debug!(count = cached.len(), "falling back to cached messages");
            let mut session = session.lock().await;
            session.apply_cache(cached);
            messages_tx.send_replace(session.messages().to_vec());
        }
        Connectivity::Unknown => {}
    }
}

async fn next_event(subscription: &mut Option<FeedSubscription>) -> Option<FeedEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

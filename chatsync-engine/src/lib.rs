//! # chatsync-engine
//!
//! The async engine for chatsync: change feed, cache store, uploader,
//! connectivity monitor and the sync engine that ties them together.
//!
//! This crate performs the actual I/O. All decisions about the message list
//! are delegated to the pure state machines in `chatsync-core`; this crate
//! interprets their outcomes on a tokio runtime.
//!
//! ## Components
//!
//! - [`ChangeFeed`] - pluggable remote feed with full-snapshot delivery;
//!   [`MemoryFeed`] is the in-process implementation.
//! - [`CacheStore`] - persisted message cache; [`FileCacheStore`] writes one
//!   JSON document per key, [`MemoryCacheStore`] backs tests.
//! - [`Uploader`] - attachment blob upload; [`MemoryUploader`] for tests.
//! - [`ConnectivityMonitor`] - turns raw reachability samples into coalesced
//!   state plus a self-clearing transition notice.
//! - [`SyncEngine`] - the event loop: exactly one live data source at a time,
//!   snapshot → publish → persist, offline fallback to cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod connectivity;
pub mod engine;
pub mod feed;
pub mod upload;

pub use cache::{CacheError, CacheStore, FileCacheStore, MemoryCacheStore};
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor};
pub use engine::{EngineConfig, SendError, SyncEngine};
pub use feed::{CancelHandle, ChangeFeed, FeedError, FeedEvent, FeedSubscription, MemoryFeed};
pub use upload::{MemoryUploader, UploadError, UploadPath, Uploader};

//! # chatsync-core
//!
//! Pure logic for chatsync (no I/O, instant tests).
//!
//! This crate implements the state machines for the message-synchronization
//! core without any network or disk I/O:
//!
//! - [`ConnectivityTracker`] turns raw reachability samples into coalesced
//!   state transitions, and [`NoticeBoard`] manages the transition banner with
//!   generation-guarded clearing.
//! - [`Session`] owns the authoritative message list and decides how remote
//!   snapshots, cached messages and outgoing sends affect it.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//!
//! The actual I/O (change feed, cache files, timers) is performed by
//! `chatsync-engine`, which interprets the outcomes these state machines
//! produce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connectivity;
pub mod session;

pub use connectivity::{
    ClearToken, Connectivity, ConnectivityTracker, Notice, NoticeBoard, Observation, Transition,
    DEFAULT_NOTICE_DWELL, MAX_NOTICE_DWELL, MIN_NOTICE_DWELL,
};
pub use session::{Phase, SendError, Session, SnapshotOutcome, MAX_CACHED_MESSAGES};

//! Connectivity tracking and transition notices.
//!
//! This module provides a pure, side-effect-free tracker for reachability
//! samples. The tracker takes raw boolean observations and produces coalesced
//! state transitions; the host (chatsync-engine) is responsible for the
//! timers and channels built on top of it.

use std::time::Duration;

/// Default dwell time before a transition notice auto-clears.
pub const DEFAULT_NOTICE_DWELL: Duration = Duration::from_secs(5);

/// Minimum accepted notice dwell.
pub const MIN_NOTICE_DWELL: Duration = Duration::from_secs(3);

/// Maximum accepted notice dwell.
pub const MAX_NOTICE_DWELL: Duration = Duration::from_secs(10);

/// Reachability state as tracked by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No observation has been made yet.
    #[default]
    Unknown,
    /// The network is reachable.
    Online,
    /// The network is unreachable.
    Offline,
}

impl Connectivity {
    /// Whether the network is known to be reachable.
    pub fn is_online(self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// A genuine state flip, after the baseline is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Reachability came back.
    Restored,
    /// Reachability was lost.
    Lost,
}

/// The outcome of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The state after the observation.
    pub state: Connectivity,
    /// A transition, if this observation flipped the state. The first
    /// observation establishes the baseline and never yields one.
    pub transition: Option<Transition>,
}

/// Coalescing reachability tracker - NO I/O, just state transitions.
///
/// The first observation sets the baseline silently; repeated identical
/// observations are coalesced; only genuine flips yield a transition.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityTracker {
    state: Connectivity,
}

impl ConnectivityTracker {
    /// Create a tracker in the `Unknown` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> Connectivity {
        self.state
    }

    /// Feed one raw reachability sample.
    pub fn observe(&mut self, online: bool) -> Observation {
        let next = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let transition = match (self.state, next) {
            (Connectivity::Unknown, _) => None,
            (Connectivity::Offline, Connectivity::Online) => Some(Transition::Restored),
            (Connectivity::Online, Connectivity::Offline) => Some(Transition::Lost),
            _ => None,
        };
        self.state = next;
        Observation {
            state: next,
            transition,
        }
    }
}

/// A user-facing banner describing a connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    /// The transition that produced this notice.
    pub transition: Transition,
}

impl Notice {
    /// Banner text for this notice.
    pub fn text(&self) -> &'static str {
        match self.transition {
            Transition::Restored => "Connection restored",
            Transition::Lost => "Connection lost",
        }
    }
}

/// Token returned by [`NoticeBoard::post`], valid for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearToken(u64);

/// Holds the current transition notice and guards delayed clears.
///
/// Each post bumps a generation counter; a clear only takes effect when its
/// token matches the current generation. A dwell timer armed for an older
/// notice can therefore never clear a newer one.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    current: Option<Notice>,
    generation: u64,
}

impl NoticeBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently displayed notice, if any.
    pub fn current(&self) -> Option<Notice> {
        self.current
    }

    /// Post a notice for a transition, superseding any existing one.
    ///
    /// Returns the token the host must present to clear this notice.
    pub fn post(&mut self, transition: Transition) -> ClearToken {
        self.generation += 1;
        self.current = Some(Notice { transition });
        ClearToken(self.generation)
    }

    /// Clear the notice if `token` is still current. Returns whether the
    /// board changed.
    pub fn clear(&mut self, token: ClearToken) -> bool {
        if token.0 == self.generation && self.current.is_some() {
            self.current = None;
            true
        } else {
            false
        }
    }
}

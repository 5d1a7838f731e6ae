//! Connectivity monitor runtime.
//!
//! Wraps the pure [`ConnectivityTracker`] in a tokio task: raw reachability
//! samples go in through a [`ConnectivityHandle`], coalesced state and a
//! self-clearing transition notice come out as `watch` channels.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use chatsync_core::{
    ClearToken, Connectivity, ConnectivityTracker, Notice, NoticeBoard, DEFAULT_NOTICE_DWELL,
    MAX_NOTICE_DWELL, MIN_NOTICE_DWELL,
};

/// Publisher side of the monitor: hosts push raw reachability samples here.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    tx: watch::Sender<Option<bool>>,
}

impl ConnectivityHandle {
    /// Report the current reachability. Duplicate reports are coalesced.
    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(Some(online));
    }
}

/// Consumer side: coalesced connectivity state plus the transition notice.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state_rx: watch::Receiver<Connectivity>,
    notice_rx: watch::Receiver<Option<Notice>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the default notice dwell.
    pub fn channel() -> (ConnectivityHandle, Self) {
        Self::channel_with_dwell(DEFAULT_NOTICE_DWELL)
    }

    /// Create a monitor whose transition notices auto-clear after `dwell`,
    /// clamped to the accepted range.
    pub fn channel_with_dwell(dwell: Duration) -> (ConnectivityHandle, Self) {
        let dwell = dwell.clamp(MIN_NOTICE_DWELL, MAX_NOTICE_DWELL);
        let (raw_tx, raw_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(Connectivity::Unknown);
        let (notice_tx, notice_rx) = watch::channel(None);

        tokio::spawn(run(raw_rx, state_tx, notice_tx, dwell));

        (
            ConnectivityHandle { tx: raw_tx },
            Self {
                state_rx,
                notice_rx,
            },
        )
    }

    /// Current connectivity state.
    pub fn state(&self) -> Connectivity {
        *self.state_rx.borrow()
    }

    /// Whether the network is known to be reachable.
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// The currently displayed transition notice, if any.
    pub fn notice(&self) -> Option<Notice> {
        *self.notice_rx.borrow()
    }

    /// Watch coalesced connectivity state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<Connectivity> {
        self.state_rx.clone()
    }

    /// Watch the transition notice (posted on flips, cleared after dwell).
    pub fn subscribe_notices(&self) -> watch::Receiver<Option<Notice>> {
        self.notice_rx.clone()
    }
}

async fn run(
    mut samples: watch::Receiver<Option<bool>>,
    state_tx: watch::Sender<Connectivity>,
    notice_tx: watch::Sender<Option<Notice>>,
    dwell: Duration,
) {
    let mut tracker = ConnectivityTracker::new();
    let mut board = NoticeBoard::new();
    let mut pending_clear: Option<(ClearToken, Instant)> = None;

    loop {
        let deadline = pending_clear.map(|(_, at)| at);
        tokio::select! {
            changed = samples.changed() => {
                if changed.is_err() {
                    // Publisher gone; nothing further to track.
                    break;
                }
                let Some(online) = *samples.borrow_and_update() else {
                    continue;
                };
                let observation = tracker.observe(online);
                state_tx.send_if_modified(|state| {
                    if *state == observation.state {
                        false
                    } else {
                        *state = observation.state;
                        true
                    }
                });
                if let Some(transition) = observation.transition {
                    tracing::debug!(?transition, "connectivity transition");
                    let token = board.post(transition);
                    notice_tx.send_replace(board.current());
                    // A newer transition replaces the pending clear.
                    pending_clear = Some((token, Instant::now() + dwell));
                }
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                if let Some((token, _)) = pending_clear.take() {
                    if board.clear(token) {
                        notice_tx.send_replace(None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_core::Transition;

    #[tokio::test(start_paused = true)]
    async fn first_sample_sets_state_without_notice() {
        let (handle, monitor) = ConnectivityMonitor::channel();
        let mut state = monitor.subscribe_state();

        handle.set_online(true);
        state.wait_for(|s| *s == Connectivity::Online).await.unwrap();

        assert!(monitor.is_online());
        assert_eq!(monitor.notice(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn flip_posts_notice_and_dwell_clears_it() {
        let (handle, monitor) = ConnectivityMonitor::channel();
        let mut state = monitor.subscribe_state();
        let mut notices = monitor.subscribe_notices();

        handle.set_online(true);
        state.wait_for(|s| *s == Connectivity::Online).await.unwrap();

        handle.set_online(false);
        let notice = notices.wait_for(|n| n.is_some()).await.unwrap().unwrap();
        assert_eq!(notice.transition, Transition::Lost);
        assert_eq!(monitor.state(), Connectivity::Offline);

        // The dwell elapses and the notice clears on its own.
        notices.wait_for(|n| n.is_none()).await.unwrap();
        assert_eq!(monitor.notice(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_transition_outlives_stale_dwell_timer() {
        let (handle, monitor) = ConnectivityMonitor::channel_with_dwell(MIN_NOTICE_DWELL);
        let mut state = monitor.subscribe_state();
        let mut notices = monitor.subscribe_notices();

        handle.set_online(true);
        state.wait_for(|s| *s == Connectivity::Online).await.unwrap();

        handle.set_online(false);
        notices
            .wait_for(|n| n.map(|n| n.transition) == Some(Transition::Lost))
            .await
            .unwrap();

        // Flip back before the first dwell elapses.
        tokio::time::advance(Duration::from_secs(1)).await;
        handle.set_online(true);
        notices
            .wait_for(|n| n.map(|n| n.transition) == Some(Transition::Restored))
            .await
            .unwrap();

        // Past the first notice's deadline: the restored notice must survive
        // until its own dwell elapses.
        tokio::time::advance(MIN_NOTICE_DWELL - Duration::from_secs(1)).await;
        assert_eq!(
            monitor.notice().map(|n| n.transition),
            Some(Transition::Restored)
        );

        notices.wait_for(|n| n.is_none()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_samples_do_not_repost() {
        let (handle, monitor) = ConnectivityMonitor::channel();
        let mut state = monitor.subscribe_state();

        handle.set_online(true);
        state.wait_for(|s| *s == Connectivity::Online).await.unwrap();

        handle.set_online(true);
        tokio::task::yield_now().await;

        assert_eq!(monitor.notice(), None);
        assert_eq!(monitor.state(), Connectivity::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_is_clamped_into_range() {
        let (handle, monitor) = ConnectivityMonitor::channel_with_dwell(Duration::from_millis(1));
        let mut state = monitor.subscribe_state();
        let mut notices = monitor.subscribe_notices();

        handle.set_online(true);
        state.wait_for(|s| *s == Connectivity::Online).await.unwrap();
        handle.set_online(false);
        notices.wait_for(|n| n.is_some()).await.unwrap();

        // Well before the minimum dwell, the notice is still up.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.notice().is_some());
    }
}

//! What we currently believe about the peer's reachability.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceState {
    #[default]
    Offline,
    Online,
}

impl PresenceState {
    pub fn is_online(self) -> bool {
        self == PresenceState::Online
    }
}

/// The text shown to the user. Kept apart from the `!acknowledgement` wire literal.
impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Offline => f.write_str("Offline"),
            PresenceState::Online => f.write_str("Online"),
        }
    }
}

/// Shared presence state.
///
/// The receiver marks the peer online when an acknowledgement arrives; the sender owns the
/// `!status` rounds and is the only one that puts the state back to offline. Rounds watch the
/// state through a watch channel, so a round settles the moment the acknowledgement lands.
#[derive(Debug)]
pub struct PresenceTracker {
    state: watch::Sender<PresenceState>,
}

impl PresenceTracker {
    pub fn new() -> PresenceTracker {
        let (state, _) = watch::channel(PresenceState::Offline);
        PresenceTracker { state }
    }

    pub fn current(&self) -> PresenceState {
        *self.state.borrow()
    }

    pub fn mark_online(&self) {
        self.state.send_replace(PresenceState::Online);
    }

    /// Puts the state back to offline, returning what it was.
    pub fn reset(&self) -> PresenceState {
        self.state.send_replace(PresenceState::Offline)
    }

    /// Starts a `!status` round that lasts at most `timeout`.
    ///
    /// The state is reset first, so only an acknowledgement that lands after this call can
    /// settle the round. Acknowledgements carry no round number: one that answers an earlier,
    /// already expired round still settles the round that is open when it arrives.
    pub fn begin_round(&self, timeout: Duration) -> PresenceRound {
        self.reset();
        PresenceRound {
            changes: self.state.subscribe(),
            deadline: Box::pin(sleep(timeout)),
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        PresenceTracker::new()
    }
}

/// An open `!status` round: waiting for the peer to be marked online, up to a deadline.
#[derive(Debug)]
pub struct PresenceRound {
    changes: watch::Receiver<PresenceState>,
    deadline: Pin<Box<Sleep>>,
}

impl PresenceRound {
    /// Resolves to `Online` once the peer is marked online, or to `Offline` at the deadline.
    ///
    /// Cancel safe: the deadline lives in the round, so dropping this future and calling it
    /// again keeps the original deadline.
    pub async fn settle(&mut self) -> PresenceState {
        let changes = &mut self.changes;
        let deadline = &mut self.deadline;
        tokio::select! {
            biased;
            acknowledged = async { changes.wait_for(|s| s.is_online()).await.is_ok() } => {
                if acknowledged {
                    PresenceState::Online
                } else {
                    PresenceState::Offline
                }
            }
            () = deadline => PresenceState::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn starts_offline() {
        let presence = PresenceTracker::new();
        assert_eq!(presence.current(), PresenceState::Offline);
        assert_eq!(presence.current().to_string(), "Offline");
    }

    #[test]
    fn reset_reports_previous_state() {
        let presence = PresenceTracker::new();
        presence.mark_online();
        assert_eq!(presence.current().to_string(), "Online");
        assert_eq!(presence.reset(), PresenceState::Online);
        assert_eq!(presence.reset(), PresenceState::Offline);
    }

    #[tokio::test]
    async fn round_ignores_earlier_acknowledgements() {
        let presence = PresenceTracker::new();
        presence.mark_online();

        let mut round = presence.begin_round(Duration::from_millis(20));
        assert_eq!(presence.current(), PresenceState::Offline);
        assert_eq!(round.settle().await, PresenceState::Offline);
    }

    #[tokio::test]
    async fn round_sees_concurrent_acknowledgement() {
        let presence = Arc::new(PresenceTracker::new());
        let mut round = presence.begin_round(Duration::from_secs(5));
        let receiver = {
            let presence = presence.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                presence.mark_online();
            })
        };

        assert_eq!(round.settle().await, PresenceState::Online);
        receiver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_acknowledgement_settles_the_open_round() {
        let presence = PresenceTracker::new();
        let mut first = presence.begin_round(Duration::from_millis(100));
        assert_eq!(first.settle().await, PresenceState::Offline);

        // The answer to the first round shows up while the second one is open.
        let mut second = presence.begin_round(Duration::from_secs(1));
        presence.mark_online();
        assert_eq!(second.settle().await, PresenceState::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn round_times_out_offline() {
        let presence = PresenceTracker::new();
        let mut round = presence.begin_round(Duration::from_secs(1));
        assert_eq!(round.settle().await, PresenceState::Offline);
        assert_eq!(presence.current(), PresenceState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn round_keeps_its_deadline_across_polls() {
        let presence = PresenceTracker::new();
        let mut round = presence.begin_round(Duration::from_secs(1));

        let early = tokio::time::timeout(Duration::from_millis(600), round.settle()).await;
        assert!(early.is_err());

        // Only the remaining 400ms are left to wait.
        let start = tokio::time::Instant::now();
        assert_eq!(round.settle().await, PresenceState::Offline);
        assert!(start.elapsed() <= Duration::from_millis(400));
    }
}

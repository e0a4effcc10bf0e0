//! Tracks whether the server connection came up, stayed up, or never arrived.

use std::time::{Duration, Instant};

/// Connection progress as seen from one client tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Still waiting for the first `Connected` status.
    Connecting,
    Connected,
    /// Was connected earlier and is not anymore.
    Lost,
    /// The first connection did not arrive within the timeout.
    TimedOut,
}

/// Classifies the session's connection flag tick by tick.
#[derive(Debug)]
pub struct LinkWatch {
    started: Instant,
    timeout: Duration,
    was_connected: bool,
}

impl LinkWatch {
    /// Starts waiting at `started` for at most `timeout`.
    pub fn new(started: Instant, timeout: Duration) -> Self {
        Self {
            started,
            timeout,
            was_connected: false,
        }
    }

    /// Classifies the session's connection flag at `now`.
    pub fn observe(&mut self, connected: bool, now: Instant) -> LinkState {
        if connected {
            self.was_connected = true;
            LinkState::Connected
        } else if self.was_connected {
            LinkState::Lost
        } else if now.duration_since(self.started) >= self.timeout {
            LinkState::TimedOut
        } else {
            LinkState::Connecting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_no_connection_times_out() {
        let start = Instant::now();
        let mut watch = LinkWatch::new(start, TIMEOUT);
        assert_eq!(watch.observe(false, start), LinkState::Connecting);
        assert_eq!(
            watch.observe(false, start + Duration::from_secs(4)),
            LinkState::Connecting
        );
        assert_eq!(watch.observe(false, start + TIMEOUT), LinkState::TimedOut);
    }

    #[test]
    fn test_drop_after_connect_is_lost() {
        let start = Instant::now();
        let mut watch = LinkWatch::new(start, TIMEOUT);
        assert_eq!(
            watch.observe(true, start + Duration::from_secs(1)),
            LinkState::Connected
        );
        assert_eq!(
            watch.observe(true, start + Duration::from_secs(60)),
            LinkState::Connected
        );
        assert_eq!(
            watch.observe(false, start + Duration::from_secs(61)),
            LinkState::Lost
        );
    }
}

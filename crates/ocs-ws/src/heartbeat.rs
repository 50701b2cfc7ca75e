//! Heartbeat management for the streaming session.
//!
//! The broker expects a WebSocket ping carrying `{"t":"h"}` at a fixed
//! interval. A ping that goes unanswered for longer than the timeout marks
//! the connection dead so the reconnect loop can take over.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Payload carried by every heartbeat ping frame.
pub const HEARTBEAT_PAYLOAD: &[u8] = br#"{"t":"h"}"#;

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    waiting_for_pong: bool,
}

/// Heartbeat manager for transport connection health.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Mutex::new(HeartbeatState {
                last_ping: None,
                last_pong: None,
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset state (called on every new connection).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_ping = None;
        state.last_pong = None;
        state.waiting_for_pong = false;
    }

    pub fn record_ping(&self) {
        let mut state = self.state.lock();
        state.last_ping = Some(Instant::now());
        state.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.last_pong = Some(now);
        state.waiting_for_pong = false;

        if let Some(ping) = state.last_ping {
            debug!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Received pong");
        }
    }

    /// True when a ping has been outstanding longer than the timeout.
    pub fn is_timed_out(&self) -> bool {
        let state = self.state.lock();
        match (state.waiting_for_pong, state.last_ping) {
            (true, Some(ping)) => ping.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// True when the next ping is due.
    ///
    /// Pings go out on a fixed cadence regardless of inbound traffic; the
    /// broker treats a silent client as gone.
    pub fn should_send_heartbeat(&self) -> bool {
        let state = self.state.lock();
        if state.waiting_for_pong {
            return false;
        }
        match state.last_ping {
            Some(ping) => ping.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Period of the session loop's heartbeat ticker.
    ///
    /// Half the ping interval, so a due ping goes out at most half an
    /// interval late and a missed pong is noticed promptly.
    pub fn check_interval(&self) -> Duration {
        (self.interval / 2).max(MIN_CHECK_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_initial_state() {
        let hb = HeartbeatManager::new(3000, 10000);
        assert!(!hb.is_timed_out());
        assert!(hb.should_send_heartbeat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence() {
        let hb = HeartbeatManager::new(3000, 10000);

        hb.record_ping();
        assert!(!hb.should_send_heartbeat());

        hb.record_pong();
        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(!hb.should_send_heartbeat());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(hb.should_send_heartbeat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout() {
        let hb = HeartbeatManager::new(3000, 10000);

        hb.record_ping();
        tokio::time::advance(Duration::from_millis(10000)).await;
        assert!(!hb.is_timed_out());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(hb.is_timed_out());

        hb.record_pong();
        assert!(!hb.is_timed_out());
    }

    #[test]
    fn test_check_interval() {
        assert_eq!(
            HeartbeatManager::new(3000, 10000).check_interval(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            HeartbeatManager::new(0, 10000).check_interval(),
            MIN_CHECK_INTERVAL
        );
    }
}

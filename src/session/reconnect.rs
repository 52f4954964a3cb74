//! Connection lifecycle and reconnection backoff.
//!
//! One [`Reconnector`] owns the process-wide connection state and the
//! exponential backoff schedule. The link's event loop feeds it open/close
//! events and obeys the [`ReconnectDecision`] it returns.
//!
//! # State machine
//!
//! ```text
//! Disconnected → Connecting → Connected
//! Connected → Reconnecting → Connecting        (unexpected close)
//! Reconnecting → Disconnected                  (attempts exhausted, dormant)
//! ```
//!
//! A manual `disconnect()` forces the attempt counter to the maximum so no
//! automatic attempt can follow; a manual `reconnect()` resets it to zero and
//! connects immediately regardless of any pending backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of consecutive reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default backoff base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default backoff delay cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Backoff growth factor per attempt.
const BACKOFF_FACTOR: f64 = 1.5;

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection lifecycle state, exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt pending.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The link is open; the queue may flush.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
}

// ============================================================================
// ReconnectDecision
// ============================================================================

/// What the event loop should do after a connection loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait the given delay, then attempt to reconnect.
    Retry(Duration),
    /// Attempts exhausted; stay dormant until a manual reconnect.
    GiveUp,
}

// ============================================================================
// Reconnector
// ============================================================================

/// Owns connection-lifecycle state, backoff, and attempt limits.
#[derive(Debug)]
pub struct Reconnector {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Reconnector {
    /// Creates a reconnector with the given limits.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful open.
    #[inline]
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured attempt limit.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay for a 1-indexed attempt number.
    ///
    /// `min(base · 1.5^(n−1), max)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base_delay.as_millis() as f64 * BACKOFF_FACTOR.powi(exponent as i32);
        Duration::from_millis((scaled as u64).min(self.max_delay.as_millis() as u64))
    }

    /// Records the start of a connection attempt.
    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Records a successful open: counter and delay schedule reset.
    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// Records a connection loss (failed open or unexpected close) and
    /// decides whether to retry.
    pub fn on_closed(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            self.state = ConnectionState::Disconnected;
            return ReconnectDecision::GiveUp;
        }

        self.attempts += 1;
        self.state = ConnectionState::Reconnecting;
        ReconnectDecision::Retry(self.delay_for_attempt(self.attempts))
    }

    /// Manual disconnect: pins the counter at the maximum so no automatic
    /// attempt can follow.
    pub fn force_dormant(&mut self) {
        self.attempts = self.max_attempts;
        self.state = ConnectionState::Disconnected;
    }

    /// Manual reconnect: clears the counter for an immediate attempt.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.state = ConnectionState::Disconnected;
    }

    /// Returns `true` once attempts are exhausted and the link is dormant.
    #[inline]
    #[must_use]
    pub fn is_dormant(&self) -> bool {
        self.state == ConnectionState::Disconnected && self.attempts >= self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_with_defaults() {
        let reconnector = Reconnector::default();

        assert_eq!(reconnector.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(reconnector.delay_for_attempt(2), Duration::from_millis(1500));
        assert_eq!(reconnector.delay_for_attempt(3), Duration::from_millis(2250));
        assert_eq!(reconnector.delay_for_attempt(4), Duration::from_millis(3375));
        assert_eq!(reconnector.delay_for_attempt(5), Duration::from_millis(5062));
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let reconnector = Reconnector::default();

        // 1000 * 1.5^20 is far beyond the 30s cap.
        assert_eq!(
            reconnector.delay_for_attempt(21),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut reconnector = Reconnector::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        assert!(matches!(reconnector.on_closed(), ReconnectDecision::Retry(_)));
        assert!(matches!(reconnector.on_closed(), ReconnectDecision::Retry(_)));
        assert!(matches!(reconnector.on_closed(), ReconnectDecision::Retry(_)));
        assert_eq!(reconnector.on_closed(), ReconnectDecision::GiveUp);

        assert!(reconnector.is_dormant());
        assert_eq!(reconnector.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_resets_counter() {
        let mut reconnector = Reconnector::default();

        let _ = reconnector.on_closed();
        let _ = reconnector.on_closed();
        assert_eq!(reconnector.attempts(), 2);

        reconnector.on_open();
        assert_eq!(reconnector.attempts(), 0);
        assert_eq!(reconnector.state(), ConnectionState::Connected);

        // First retry after a fresh open starts the schedule over.
        assert_eq!(
            reconnector.on_closed(),
            ReconnectDecision::Retry(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_force_dormant_blocks_retries() {
        let mut reconnector = Reconnector::default();
        reconnector.force_dormant();

        assert!(reconnector.is_dormant());
        assert_eq!(reconnector.on_closed(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_reset_reenables_retries() {
        let mut reconnector = Reconnector::default();
        reconnector.force_dormant();
        reconnector.reset();

        assert!(!reconnector.is_dormant());
        assert_eq!(
            reconnector.on_closed(),
            ReconnectDecision::Retry(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_state_transitions() {
        let mut reconnector = Reconnector::default();
        assert_eq!(reconnector.state(), ConnectionState::Disconnected);

        reconnector.on_connecting();
        assert_eq!(reconnector.state(), ConnectionState::Connecting);

        reconnector.on_open();
        assert_eq!(reconnector.state(), ConnectionState::Connected);

        let _ = reconnector.on_closed();
        assert_eq!(reconnector.state(), ConnectionState::Reconnecting);
    }
}

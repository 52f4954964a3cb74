//! Millisecond clock abstraction.
//!
//! The throttle/threshold gate in the event registry compares elapsed wall
//! time against per-channel intervals. Injecting the clock keeps that logic
//! testable without real waits.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Clock
// ============================================================================

/// Source of millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds.
    ///
    /// The epoch is arbitrary; only differences matter. Must be monotonic
    /// non-decreasing and never return 0, which the registry reserves for
    /// "never updated".
    fn now_ms(&self) -> u64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

// ============================================================================
// SystemClock
// ============================================================================

/// Wall-clock [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1)
            .max(1)
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// Hand-advanced [`Clock`] for tests.
#[cfg(test)]
pub(crate) mod manual {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::Clock;

    /// Test clock that only moves when told to.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now_ms: AtomicU64,
    }

    impl ManualClock {
        /// Creates a clock at the given timestamp.
        pub fn at(now_ms: u64) -> Self {
            Self {
                now_ms: AtomicU64::new(now_ms),
            }
        }

        /// Advances the clock by `delta_ms`.
        pub fn advance(&self, delta_ms: u64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::manual::ManualClock;
    use super::*;

    #[test]
    fn test_system_clock_nonzero() {
        let clock = SystemClock;
        assert!(clock.now_ms() > 0);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
    }
}

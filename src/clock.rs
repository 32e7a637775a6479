//! Clock seam for the ingress pipeline and statistics.
//!
//! Production code uses [`SystemClock`]; tests drive [`SimulatedClock`] to
//! make arrival timestamps and log throttling deterministic.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the UNIX epoch
    fn now_ms(&self) -> i64;
}

/// Real-time clock backed by the system time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now_ms: AtomicI64,
}

impl SimulatedClock {
    /// Create a simulated clock starting at the given time
    pub fn new(start_ms: i64) -> Self {
        Self { now_ms: AtomicI64::new(start_ms) }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// The default clock used when a config does not supply one
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_advances() {
        let clock = SimulatedClock::new(1000);
        assert_eq!(clock.now_ms(), 1000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1250);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // Anything after 2020 is a sane system clock.
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}

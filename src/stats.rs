//! Call-wide statistics.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::process::Module;

/// Snapshot returned by [`crate::Call::get_stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Estimated available send bandwidth
    pub send_bandwidth_bps: u32,

    /// Latest receive-side bandwidth estimate
    pub recv_bandwidth_bps: u32,

    /// Time packets currently spend queued in the pacer
    pub pacer_delay_ms: i64,

    /// Round-trip time of a video send stream, -1 when unknown
    pub rtt_ms: i64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self { rtt_ms: -1, ..Default::default() }
    }
}

/// How long an RTT report stays relevant
const RTT_WINDOW_MS: i64 = 1500;

/// Aggregates round-trip-time reports from all streams on the shared
/// periodic-work runner. Streams push reports as RTCP arrives; consumers
/// read the windowed average.
pub struct CallStats {
    clock: Arc<dyn Clock>,
    inner: Mutex<CallStatsInner>,
}

struct CallStatsInner {
    reports: VecDeque<RttReport>,
    avg_rtt_ms: i64,
    max_rtt_ms: i64,
}

#[derive(Debug, Clone, Copy)]
struct RttReport {
    received_ms: i64,
    rtt_ms: i64,
}

impl CallStats {
    /// Create call stats backed by the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(CallStatsInner {
                reports: VecDeque::new(),
                avg_rtt_ms: -1,
                max_rtt_ms: -1,
            }),
        }
    }

    /// Record an RTT observation from a stream
    pub fn on_rtt_report(&self, rtt_ms: i64) {
        if rtt_ms <= 0 {
            return;
        }
        let now_ms = self.clock.now_ms();
        if let Ok(mut inner) = self.inner.lock() {
            inner.reports.push_back(RttReport { received_ms: now_ms, rtt_ms });
            inner.recompute(now_ms);
        }
    }

    /// Windowed average RTT, -1 while no reports are live
    pub fn avg_rtt_ms(&self) -> i64 {
        self.inner.lock().map(|inner| inner.avg_rtt_ms).unwrap_or(-1)
    }

    /// Windowed maximum RTT, -1 while no reports are live
    pub fn max_rtt_ms(&self) -> i64 {
        self.inner.lock().map(|inner| inner.max_rtt_ms).unwrap_or(-1)
    }
}

impl CallStatsInner {
    fn recompute(&mut self, now_ms: i64) {
        while let Some(front) = self.reports.front() {
            if now_ms - front.received_ms > RTT_WINDOW_MS {
                self.reports.pop_front();
            } else {
                break;
            }
        }
        if self.reports.is_empty() {
            self.avg_rtt_ms = -1;
            self.max_rtt_ms = -1;
            return;
        }
        let sum: i64 = self.reports.iter().map(|r| r.rtt_ms).sum();
        self.avg_rtt_ms = sum / self.reports.len() as i64;
        self.max_rtt_ms = self.reports.iter().map(|r| r.rtt_ms).max().unwrap_or(-1);
    }
}

impl Module for CallStats {
    fn process(&self) {
        let now_ms = self.clock.now_ms();
        if let Ok(mut inner) = self.inner.lock() {
            inner.recompute(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    #[test]
    fn test_rtt_window_expiry() {
        let clock = Arc::new(SimulatedClock::new(10_000));
        let stats = CallStats::new(clock.clone());

        stats.on_rtt_report(100);
        stats.on_rtt_report(300);
        assert_eq!(stats.avg_rtt_ms(), 200);
        assert_eq!(stats.max_rtt_ms(), 300);

        clock.advance_ms(RTT_WINDOW_MS + 1);
        stats.process();
        assert_eq!(stats.avg_rtt_ms(), -1);
        assert_eq!(stats.max_rtt_ms(), -1);
    }

    #[test]
    fn test_non_positive_rtt_ignored() {
        let stats = CallStats::new(Arc::new(SimulatedClock::new(0)));
        stats.on_rtt_report(0);
        stats.on_rtt_report(-5);
        assert_eq!(stats.avg_rtt_ms(), -1);
    }
}

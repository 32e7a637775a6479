//! Shared congestion controller.
//!
//! One controller serves every stream in the call: send streams consume the
//! send-side bandwidth estimate, receive ingress pipelines feed the remote
//! (receive-side) estimator. Only the coordination surface lives here; the
//! estimation strategy itself is deliberately plain windowed throughput and
//! can be swapped behind [`RemoteBitrateEstimator`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::packet::RtpHeader;
use crate::types::{NetworkState, RtpSsrc, SentPacket};

/// Receive-side bandwidth estimator fed by every receive stream
pub trait RemoteBitrateEstimator: Send + Sync {
    /// Feed one inbound packet
    fn incoming_packet(
        &self,
        arrival_time_ms: i64,
        payload_size: usize,
        header: &RtpHeader,
        was_in_order: bool,
    );

    /// Latest estimate as (contributing SSRCs, bitrate), or `None` before
    /// enough packets have arrived
    fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)>;
}

/// Window over which incoming throughput is measured
const RATE_WINDOW_MS: i64 = 1000;

/// Windowed-throughput implementation of [`RemoteBitrateEstimator`]
#[derive(Default)]
pub struct RemoteRateEstimator {
    inner: Mutex<RateWindow>,
}

#[derive(Default)]
struct RateWindow {
    samples: VecDeque<(i64, usize)>,
    ssrcs: Vec<RtpSsrc>,
}

impl RemoteRateEstimator {
    /// Create an empty estimator
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteBitrateEstimator for RemoteRateEstimator {
    fn incoming_packet(
        &self,
        arrival_time_ms: i64,
        payload_size: usize,
        header: &RtpHeader,
        _was_in_order: bool,
    ) {
        let Ok(mut window) = self.inner.lock() else { return };
        window.samples.push_back((arrival_time_ms, payload_size));
        while let Some(&(t, _)) = window.samples.front() {
            if arrival_time_ms - t > RATE_WINDOW_MS {
                window.samples.pop_front();
            } else {
                break;
            }
        }
        if !window.ssrcs.contains(&header.ssrc) {
            window.ssrcs.push(header.ssrc);
        }
    }

    fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)> {
        let window = self.inner.lock().ok()?;
        let (&(first, _), &(last, _)) = (window.samples.front()?, window.samples.back()?);
        let span_ms = (last - first).max(1);
        let total_bytes: usize = window.samples.iter().map(|&(_, size)| size).sum();
        let bitrate = (total_bytes as u64 * 8 * 1000 / span_ms as u64) as u32;
        Some((window.ssrcs.clone(), bitrate))
    }
}

/// Congestion controller shared by all streams of a call
pub struct CongestionController {
    remote_estimator: Arc<RemoteRateEstimator>,
    inner: Mutex<SendSide>,
    bwe_config_updates: AtomicUsize,
}

struct SendSide {
    min_bitrate_bps: i32,
    max_bitrate_bps: i32,
    bitrate_bps: u32,
    network_state: NetworkState,
    pacer_delay_ms: i64,
    last_send_time_ms: Option<i64>,
}

impl CongestionController {
    /// Create a controller with no bitrate envelope configured yet
    pub fn new() -> Self {
        Self {
            remote_estimator: Arc::new(RemoteRateEstimator::new()),
            inner: Mutex::new(SendSide {
                min_bitrate_bps: 0,
                max_bitrate_bps: -1,
                bitrate_bps: 0,
                network_state: NetworkState::Up,
                pacer_delay_ms: 0,
                last_send_time_ms: None,
            }),
            bwe_config_updates: AtomicUsize::new(0),
        }
    }

    /// Reconfigure the bandwidth-estimation envelope. A non-positive
    /// `start_bitrate_bps` keeps the current estimate.
    pub fn set_bwe_bitrates(&self, min_bitrate_bps: i32, start_bitrate_bps: i32, max_bitrate_bps: i32) {
        self.bwe_config_updates.fetch_add(1, Ordering::SeqCst);
        let Ok(mut inner) = self.inner.lock() else { return };
        inner.min_bitrate_bps = min_bitrate_bps.max(0);
        inner.max_bitrate_bps = max_bitrate_bps;
        if start_bitrate_bps > 0 {
            inner.bitrate_bps = start_bitrate_bps as u32;
        }
        inner.clamp_bitrate();
        debug!(
            min_bitrate_bps,
            start_bitrate_bps, max_bitrate_bps, "Reconfigured bandwidth estimator"
        );
    }

    /// Propagate a network state transition
    pub fn signal_network_state(&self, state: NetworkState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.network_state = state;
        }
    }

    /// Account a packet handed to the transport; keeps the pacer queue
    /// delay measurement fresh.
    pub fn on_sent_packet(&self, sent: SentPacket) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(last) = inner.last_send_time_ms {
                inner.pacer_delay_ms = (sent.send_time_ms - last).max(0);
            }
            inner.last_send_time_ms = Some(sent.send_time_ms);
        }
    }

    /// Current send-side bandwidth estimate
    pub fn available_send_bandwidth(&self) -> u32 {
        self.inner.lock().map(|inner| inner.bitrate_bps).unwrap_or(0)
    }

    /// The receive-side estimator shared by all receive streams. The
    /// single-stream flag picks the estimation mode; the default estimator
    /// behaves identically in both.
    pub fn remote_bitrate_estimator(&self, _single_stream: bool) -> Arc<dyn RemoteBitrateEstimator> {
        self.remote_estimator.clone()
    }

    /// Time packets spend queued in the pacer
    pub fn pacer_queuing_delay_ms(&self) -> i64 {
        self.inner.lock().map(|inner| inner.pacer_delay_ms).unwrap_or(0)
    }

    /// Last observed network state
    pub fn network_state(&self) -> NetworkState {
        self.inner
            .lock()
            .map(|inner| inner.network_state)
            .unwrap_or(NetworkState::Up)
    }

    /// Number of times the estimator has been reconfigured
    pub fn bwe_config_update_count(&self) -> usize {
        self.bwe_config_updates.load(Ordering::SeqCst)
    }
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SendSide {
    fn clamp_bitrate(&mut self) {
        if self.bitrate_bps < self.min_bitrate_bps as u32 {
            self.bitrate_bps = self.min_bitrate_bps as u32;
        }
        if self.max_bitrate_bps > 0 && self.bitrate_bps > self.max_bitrate_bps as u32 {
            self.bitrate_bps = self.max_bitrate_bps as u32;
        }
    }
}

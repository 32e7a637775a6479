//! Video send stream handle.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::packet::{NtpTimestamp, RtcpReport, RtcpReportIter};
use crate::stats::CallStats;
use crate::types::{NetworkState, RtpSsrc, RtpState, RtpStateMap};

/// Configuration of a video send stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSendConfig {
    /// SSRCs the stream sends on, one per simulcast layer
    pub ssrcs: Vec<RtpSsrc>,
}

/// Encoder parameters handed through to the encoder at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoderConfig {
    /// Number of simulcast substreams the encoder produces
    pub number_of_streams: usize,

    /// Bitrate floor the encoder should not undershoot; 0 for none
    pub min_transmit_bitrate_bps: i32,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self { number_of_streams: 1, min_transmit_bitrate_bps: 0 }
    }
}

/// Outbound video stream.
///
/// Carries the per-SSRC RTP sender state so sequencing survives stream
/// churn, and derives its round-trip time from inbound receiver reports.
pub struct VideoSendStream {
    config: VideoSendConfig,
    encoder_config: VideoEncoderConfig,
    rtp_states: Mutex<RtpStateMap>,
    call_stats: Arc<CallStats>,
    sending: AtomicBool,
    last_rtt_ms: AtomicI64,
    network_states: Mutex<Vec<NetworkState>>,
}

impl VideoSendStream {
    /// Create the stream, resuming RTP state for any of its SSRCs present
    /// in `suspended_states`.
    pub(crate) fn new(
        config: VideoSendConfig,
        encoder_config: VideoEncoderConfig,
        suspended_states: &RtpStateMap,
        call_stats: Arc<CallStats>,
    ) -> Self {
        debug!(ssrcs = ?config.ssrcs, "Creating video send stream");
        let rtp_states = config
            .ssrcs
            .iter()
            .map(|&ssrc| {
                let state = suspended_states.get(&ssrc).copied().unwrap_or_default();
                (ssrc, state)
            })
            .collect();
        Self {
            config,
            encoder_config,
            rtp_states: Mutex::new(rtp_states),
            call_stats,
            sending: AtomicBool::new(false),
            last_rtt_ms: AtomicI64::new(0),
            network_states: Mutex::new(Vec::new()),
        }
    }

    /// Stream configuration, including the SSRC list
    pub fn config(&self) -> &VideoSendConfig {
        &self.config
    }

    /// Encoder parameters the stream was created with
    pub fn encoder_config(&self) -> &VideoEncoderConfig {
        &self.encoder_config
    }

    /// Begin sending
    pub fn start(&self) {
        self.sending.store(true, Ordering::SeqCst);
    }

    /// Stop sending
    pub fn stop(&self) {
        self.sending.store(false, Ordering::SeqCst);
    }

    /// Whether the stream is sending
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Snapshot of the per-SSRC RTP sender states
    pub fn get_rtp_states(&self) -> RtpStateMap {
        self.rtp_states.lock().map(|states| states.clone()).unwrap_or_default()
    }

    /// Replace the state of one SSRC; the RTP sender calls this as
    /// sequencing advances.
    pub fn set_rtp_state(&self, ssrc: RtpSsrc, state: RtpState) {
        if let Ok(mut states) = self.rtp_states.lock() {
            states.insert(ssrc, state);
        }
    }

    /// Round-trip time from the latest receiver report, 0 before any
    pub fn get_rtt(&self) -> i64 {
        self.last_rtt_ms.load(Ordering::SeqCst)
    }

    /// Offer an RTCP packet. Returns true when a report block targets one
    /// of this stream's SSRCs.
    pub fn deliver_rtcp(&self, packet: &[u8]) -> bool {
        let now = NtpTimestamp::now();
        let mut delivered = false;
        for report in RtcpReportIter::new(packet) {
            let blocks = match &report {
                RtcpReport::SenderReport { report_blocks, .. } => report_blocks,
                RtcpReport::ReceiverReport { report_blocks, .. } => report_blocks,
                RtcpReport::Other { .. } => continue,
            };
            for block in blocks {
                if !self.config.ssrcs.contains(&block.ssrc) {
                    continue;
                }
                delivered = true;
                if let Some(rtt_ms) = block.round_trip_ms(now) {
                    if rtt_ms > 0 {
                        self.last_rtt_ms.store(rtt_ms, Ordering::SeqCst);
                        self.call_stats.on_rtt_report(rtt_ms);
                    }
                }
            }
        }
        delivered
    }

    /// Observe a network state transition
    pub fn signal_network_state(&self, state: NetworkState) {
        if let Ok(mut states) = self.network_states.lock() {
            states.push(state);
        }
    }

    /// Every network state the stream has observed, oldest first
    pub fn observed_network_states(&self) -> Vec<NetworkState> {
        self.network_states.lock().map(|states| states.clone()).unwrap_or_default()
    }
}

//! Receive-side stream statistics.
//!
//! One statistician per inbound SSRC: packet/byte counters, in-order
//! tracking, and the retransmit-of-old-packet heuristic the ingress
//! pipeline uses when RTX is not negotiated.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::packet::RtpHeader;
use crate::types::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// Reordering allowance before an old sequence number is treated as a
/// wrap-around rather than a late packet
pub const DEFAULT_MAX_REORDERING_THRESHOLD: u16 = 50;

/// Cumulative counters for one inbound SSRC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDataCounters {
    /// Packets received, including retransmissions
    pub packets: u64,

    /// Total bytes received, headers included
    pub bytes: u64,

    /// Packets classified as retransmissions
    pub retransmitted_packets: u64,

    /// FEC packets received
    pub fec_packets: u64,
}

/// Per-SSRC receive statistics
#[derive(Debug)]
pub struct StreamStatistician {
    counters: StreamDataCounters,
    received_seq_max: RtpSequenceNumber,
    last_received_timestamp: RtpTimestamp,
    last_receive_time_ms: i64,
    jitter_q4: u32,
    max_reordering_threshold: u16,
    has_received: bool,
}

impl StreamStatistician {
    fn new(max_reordering_threshold: u16) -> Self {
        Self {
            counters: StreamDataCounters::default(),
            received_seq_max: 0,
            last_received_timestamp: 0,
            last_receive_time_ms: 0,
            jitter_q4: 0,
            max_reordering_threshold,
            has_received: false,
        }
    }

    /// Cumulative counters
    pub fn counters(&self) -> StreamDataCounters {
        self.counters
    }

    /// Whether `sequence_number` advances the stream.
    ///
    /// Sequence numbers far behind the highest received one are assumed to
    /// be a wrap-around and count as in order.
    pub fn is_packet_in_order(&self, sequence_number: RtpSequenceNumber) -> bool {
        if !self.has_received {
            return true;
        }
        if is_newer_sequence_number(sequence_number, self.received_seq_max) {
            return true;
        }
        self.received_seq_max.wrapping_sub(sequence_number) > self.max_reordering_threshold
    }

    /// Heuristic for "this out-of-order packet is a retransmission, not a
    /// reordering": its media timestamp lags further behind the newest one
    /// than the transit time plus an RTT-derived allowance can explain.
    pub fn is_retransmit_of_old_packet(
        &self,
        header: &RtpHeader,
        min_rtt_ms: i64,
        now_ms: i64,
    ) -> bool {
        if self.is_packet_in_order(header.sequence_number) {
            return false;
        }
        let frequency_khz = if header.payload_type_frequency >= 1000 {
            header.payload_type_frequency / 1000
        } else {
            90
        };
        let time_diff_ms = now_ms - self.last_receive_time_ms;
        // Negative for packets whose media time predates the newest one.
        let rtp_diff = header.timestamp.wrapping_sub(self.last_received_timestamp) as i32;
        let rtp_time_diff_ms = rtp_diff as i64 / frequency_khz as i64;

        let max_delay_ms = if min_rtt_ms == 0 {
            // No RTT yet; allow twice the jitter standard deviation.
            let jitter_std = ((self.jitter_q4 >> 4) as f64).sqrt();
            ((2.0 * jitter_std) as i64).max(1)
        } else {
            min_rtt_ms / 3 + 1
        };
        time_diff_ms > rtp_time_diff_ms + max_delay_ms
    }

    fn update(&mut self, header: &RtpHeader, packet_length: usize, retransmitted: bool, now_ms: i64) {
        self.counters.packets += 1;
        self.counters.bytes += packet_length as u64;
        if retransmitted {
            self.counters.retransmitted_packets += 1;
        }

        let in_order = self.is_packet_in_order(header.sequence_number);
        if !retransmitted && in_order && self.has_received {
            self.update_jitter(header, now_ms);
        }
        if in_order || !self.has_received {
            self.received_seq_max = header.sequence_number;
            self.last_received_timestamp = header.timestamp;
            self.last_receive_time_ms = now_ms;
        }
        self.has_received = true;
    }

    /// RFC 3550 interarrival jitter, kept in Q4 units
    fn update_jitter(&mut self, header: &RtpHeader, now_ms: i64) {
        let frequency_khz = if header.payload_type_frequency >= 1000 {
            header.payload_type_frequency / 1000
        } else {
            return;
        };
        let receive_diff_ms = now_ms - self.last_receive_time_ms;
        let timestamp_diff =
            header.timestamp.wrapping_sub(self.last_received_timestamp) as i32 as i64;
        let transit_diff =
            (receive_diff_ms * frequency_khz as i64 - timestamp_diff).unsigned_abs() as u32;
        let jitter_diff_q4 = (transit_diff << 4) as i32 - self.jitter_q4 as i32;
        self.jitter_q4 = (self.jitter_q4 as i32 + ((jitter_diff_q4 + 8) >> 4)).max(0) as u32;
    }
}

/// Registry of statisticians, one per inbound SSRC
pub struct ReceiveStatistics {
    clock: Arc<dyn Clock>,
    statisticians: HashMap<RtpSsrc, StreamStatistician>,
    max_reordering_threshold: u16,
}

impl ReceiveStatistics {
    /// Create an empty statistics registry
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            statisticians: HashMap::new(),
            max_reordering_threshold: DEFAULT_MAX_REORDERING_THRESHOLD,
        }
    }

    /// Record an inbound packet
    pub fn incoming_packet(&mut self, header: &RtpHeader, packet_length: usize, retransmitted: bool) {
        let now_ms = self.clock.now_ms();
        let threshold = self.max_reordering_threshold;
        self.statisticians
            .entry(header.ssrc)
            .or_insert_with(|| StreamStatistician::new(threshold))
            .update(header, packet_length, retransmitted, now_ms);
    }

    /// Record an inbound FEC packet
    pub fn fec_packet_received(&mut self, header: &RtpHeader, _packet_length: usize) {
        if let Some(statistician) = self.statisticians.get_mut(&header.ssrc) {
            statistician.counters.fec_packets += 1;
        }
    }

    /// Statistician for an SSRC, if any packet has been seen on it
    pub fn statistician(&self, ssrc: RtpSsrc) -> Option<&StreamStatistician> {
        self.statisticians.get(&ssrc)
    }

    /// Adjust the reordering allowance; larger when NACK retransmissions
    /// are expected
    pub fn set_max_reordering_threshold(&mut self, threshold: u16) {
        self.max_reordering_threshold = threshold;
        for statistician in self.statisticians.values_mut() {
            statistician.max_reordering_threshold = threshold;
        }
    }
}

fn is_newer_sequence_number(value: RtpSequenceNumber, prev: RtpSequenceNumber) -> bool {
    value != prev && value.wrapping_sub(prev) < 0x8000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    fn header(ssrc: RtpSsrc, seq: RtpSequenceNumber, timestamp: RtpTimestamp) -> RtpHeader {
        RtpHeader {
            marker: false,
            payload_type: 96,
            sequence_number: seq,
            timestamp,
            ssrc,
            csrc_count: 0,
            header_length: 12,
            padding_length: 0,
            payload_type_frequency: 90_000,
            extensions: Default::default(),
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let clock = Arc::new(SimulatedClock::new(0));
        let mut stats = ReceiveStatistics::new(clock);
        stats.incoming_packet(&header(1, 1, 0), 100, false);
        stats.incoming_packet(&header(1, 2, 3000), 200, true);

        let counters = stats.statistician(1).unwrap().counters();
        assert_eq!(counters.packets, 2);
        assert_eq!(counters.bytes, 300);
        assert_eq!(counters.retransmitted_packets, 1);
        assert!(stats.statistician(2).is_none());
    }

    #[test]
    fn test_in_order_tracking() {
        let clock = Arc::new(SimulatedClock::new(0));
        let mut stats = ReceiveStatistics::new(clock);
        stats.incoming_packet(&header(1, 100, 0), 100, false);

        let statistician = stats.statistician(1).unwrap();
        assert!(statistician.is_packet_in_order(101));
        assert!(!statistician.is_packet_in_order(99));
        assert!(!statistician.is_packet_in_order(100));
        // Far-behind sequence numbers read as wrap-around.
        assert!(statistician.is_packet_in_order(100u16.wrapping_sub(200)));
    }

    #[test]
    fn test_sequence_wrap_is_in_order() {
        let clock = Arc::new(SimulatedClock::new(0));
        let mut stats = ReceiveStatistics::new(clock);
        stats.incoming_packet(&header(1, u16::MAX, 0), 100, false);
        assert!(stats.statistician(1).unwrap().is_packet_in_order(0));
    }

    #[test]
    fn test_retransmit_of_old_packet() {
        let clock = Arc::new(SimulatedClock::new(0));
        let mut stats = ReceiveStatistics::new(clock.clone());
        stats.incoming_packet(&header(1, 100, 90_000), 100, false);

        // Arrives much later with an old timestamp: a late retransmission.
        clock.advance_ms(400);
        let old = header(1, 90, 0);
        assert!(stats
            .statistician(1)
            .unwrap()
            .is_retransmit_of_old_packet(&old, 90, clock.now_ms()));

        // An in-order packet is never a retransmit.
        let fresh = header(1, 101, 95_000);
        assert!(!stats
            .statistician(1)
            .unwrap()
            .is_retransmit_of_old_packet(&fresh, 90, clock.now_ms()));
    }

    #[test]
    fn test_fec_counter() {
        let clock = Arc::new(SimulatedClock::new(0));
        let mut stats = ReceiveStatistics::new(clock);
        stats.incoming_packet(&header(1, 1, 0), 100, false);
        stats.fec_packet_received(&header(1, 2, 0), 120);
        assert_eq!(stats.statistician(1).unwrap().counters().fec_packets, 1);
    }
}

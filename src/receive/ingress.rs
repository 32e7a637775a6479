//! Receive-side RTP ingress pipeline.
//!
//! Every receive stream owns one [`RtpStreamIngress`]. Packets routed to
//! the stream pass through here: header parse, bandwidth-estimator feed,
//! RED/ULPFEC and RTX unwrapping, receive statistics, and finally the
//! depacketized payload handoff with an NTP-estimated capture time.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::congestion::RemoteBitrateEstimator;
use crate::error::Result;
use crate::packet::{
    NtpTimestamp, RtpExtensionType, RtpHeader, RtpHeaderParser, VIDEO_PAYLOAD_TYPE_FREQUENCY,
};
use crate::types::{PacketTime, PayloadType, RtpSsrc, RtpTimestamp};

use super::fec::{FecPacketCounter, FecReceiver, UlpfecReceiver};
use super::ntp::RemoteNtpEstimator;
use super::payload_registry::{PayloadSpecifics, RtpPayloadRegistry};
use super::statistics::{ReceiveStatistics, StreamDataCounters};

/// Largest packet the RTX restore slot accepts
const RESTORED_PACKET_MAX_SIZE: usize = 1500;

/// Minimum spacing of the diagnostic header log, per stream
const PACKET_LOG_INTERVAL_MS: i64 = 10_000;

/// Header attached to a depacketized payload on handoff
#[derive(Debug, Clone)]
pub struct MediaPayloadHeader {
    /// The parsed RTP header of the carrying packet
    pub rtp: RtpHeader,

    /// NTP-synchronized wall-clock time of the media timestamp, once the
    /// remote-NTP estimator has an anchor
    pub ntp_time_ms: Option<i64>,

    /// Codec metadata from the payload registry
    pub specifics: PayloadSpecifics,

    /// Whether the packet advanced the stream in order
    pub in_order: bool,
}

/// Consumer of depacketized media payloads (the decoder boundary).
///
/// Payloads are handed over as owned [`Bytes`] so the sink can keep them
/// past the call without copying again.
pub trait MediaSink: Send + Sync {
    /// Hand over one payload. An error rejects the packet.
    fn on_payload(&self, payload: Bytes, header: &MediaPayloadHeader) -> Result<()>;
}

/// Media sink that accepts and discards everything
#[derive(Debug, Default)]
pub struct NullMediaSink;

impl MediaSink for NullMediaSink {
    fn on_payload(&self, _payload: Bytes, _header: &MediaPayloadHeader) -> Result<()> {
        Ok(())
    }
}

/// Round-trip-time source for a receive stream's RTCP ingress.
///
/// The measurement belongs to the stream's own RTCP exchange (the RTCP
/// module boundary, out of scope here), so it enters through a seam like
/// the clock and the event log.
pub trait RttProvider: Send + Sync {
    /// Current round-trip time for the given remote source in
    /// milliseconds; 0 while no measurement exists yet.
    fn rtt_ms(&self, remote_ssrc: RtpSsrc) -> i64;
}

/// Per-stream receive pipeline
pub struct RtpStreamIngress {
    clock: Arc<dyn Clock>,
    remote_ssrc: RtpSsrc,
    header_parser: Mutex<RtpHeaderParser>,
    payload_registry: Mutex<RtpPayloadRegistry>,
    receive_statistics: Mutex<ReceiveStatistics>,
    fec_receiver: Mutex<Box<dyn FecReceiver>>,
    remote_bitrate_estimator: Arc<dyn RemoteBitrateEstimator>,
    ntp_estimator: Mutex<RemoteNtpEstimator>,
    media_sink: Arc<dyn MediaSink>,
    receiving: AtomicBool,
    /// Single-slot scratch buffer for RTX restoration. Holding the lock is
    /// owning the slot; a failed try-lock drops the packet.
    restored_packet: Mutex<Box<[u8; RESTORED_PACKET_MAX_SIZE]>>,
    last_packet_log_ms: AtomicI64,
    rtt_ms: AtomicI64,
}

impl RtpStreamIngress {
    /// Create the pipeline for one receive stream
    pub fn new(
        clock: Arc<dyn Clock>,
        remote_ssrc: RtpSsrc,
        remote_bitrate_estimator: Arc<dyn RemoteBitrateEstimator>,
        media_sink: Arc<dyn MediaSink>,
    ) -> Self {
        Self {
            receive_statistics: Mutex::new(ReceiveStatistics::new(clock.clone())),
            clock,
            remote_ssrc,
            header_parser: Mutex::new(RtpHeaderParser::new()),
            payload_registry: Mutex::new(RtpPayloadRegistry::new()),
            fec_receiver: Mutex::new(Box::new(UlpfecReceiver::new())),
            remote_bitrate_estimator,
            ntp_estimator: Mutex::new(RemoteNtpEstimator::new()),
            media_sink,
            receiving: AtomicBool::new(false),
            restored_packet: Mutex::new(Box::new([0u8; RESTORED_PACKET_MAX_SIZE])),
            last_packet_log_ms: AtomicI64::new(-1),
            rtt_ms: AtomicI64::new(0),
        }
    }

    /// The primary SSRC this pipeline receives
    pub fn remote_ssrc(&self) -> RtpSsrc {
        self.remote_ssrc
    }

    /// Begin accepting packets
    pub fn start_receive(&self) {
        self.receiving.store(true, Ordering::SeqCst);
    }

    /// Stop accepting packets
    pub fn stop_receive(&self) {
        self.receiving.store(false, Ordering::SeqCst);
    }

    /// Whether the pipeline currently accepts packets
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::SeqCst)
    }

    /// Register a receive codec, evicting any payload type previously
    /// registered for the same codec parameters.
    pub fn set_receive_codec(
        &self,
        payload_type: PayloadType,
        name: &str,
        specifics: PayloadSpecifics,
    ) -> Result<()> {
        let mut registry = lock(&self.payload_registry);
        let (frequency, channels) = match specifics {
            PayloadSpecifics::Audio { frequency, channels } => (frequency, channels),
            PayloadSpecifics::Video { .. } => (VIDEO_PAYLOAD_TYPE_FREQUENCY, 0),
        };
        if let Some(old) = registry.receive_payload_type(name, frequency, channels) {
            registry.deregister_receive_payload(old);
        }
        registry.register_receive_payload(payload_type, name, specifics)
    }

    /// Map an RTX payload type to the media payload type it retransmits
    pub fn set_rtx_payload_type(&self, payload_type: PayloadType, associated: PayloadType) {
        lock(&self.payload_registry).set_rtx_payload_type(payload_type, associated);
    }

    /// Configure the SSRC retransmissions arrive on
    pub fn set_rtx_ssrc(&self, ssrc: RtpSsrc) {
        lock(&self.payload_registry).set_rtx_ssrc(ssrc);
    }

    /// The configured RTX SSRC, if any
    pub fn rtx_ssrc(&self) -> Option<RtpSsrc> {
        lock(&self.payload_registry).rtx_ssrc()
    }

    /// Prefer the RTX payload-type mapping when restoring packets
    pub fn set_use_rtx_payload_mapping_on_restore(&self, enabled: bool) {
        lock(&self.payload_registry).set_use_rtx_payload_mapping_on_restore(enabled);
    }

    /// Whether a ULPFEC payload type has been registered
    pub fn is_fec_enabled(&self) -> bool {
        lock(&self.payload_registry).ulpfec_payload_type().is_some()
    }

    /// Adjust the reordering allowance; retransmissions widen it
    pub fn set_nack_status(&self, enabled: bool, max_reordering_threshold: u16) {
        let threshold = if enabled {
            max_reordering_threshold
        } else {
            super::statistics::DEFAULT_MAX_REORDERING_THRESHOLD
        };
        lock(&self.receive_statistics).set_max_reordering_threshold(threshold);
    }

    /// Enable parsing of a header extension
    pub fn register_extension(&self, extension: RtpExtensionType, id: u8) -> bool {
        lock(&self.header_parser).register_extension(extension, id)
    }

    /// Disable parsing of a header extension
    pub fn deregister_extension(&self, extension: RtpExtensionType) {
        lock(&self.header_parser).deregister_extension(extension);
    }

    /// Receive-statistics counters for an SSRC
    pub fn stream_counters(&self, ssrc: RtpSsrc) -> Option<StreamDataCounters> {
        lock(&self.receive_statistics)
            .statistician(ssrc)
            .map(|statistician| statistician.counters())
    }

    /// Counters of the FEC receiver
    pub fn fec_packet_counter(&self) -> FecPacketCounter {
        lock(&self.fec_receiver).packet_counter()
    }

    /// Feed the round-trip time and, when present, a sender report's
    /// NTP/RTP timestamp pair into the remote-NTP estimator. Without a
    /// valid RTT the anchor is left untouched.
    pub fn update_rtcp_timing(
        &self,
        rtt_ms: i64,
        sender_info: Option<(NtpTimestamp, RtpTimestamp)>,
    ) {
        if rtt_ms <= 0 {
            return;
        }
        self.rtt_ms.store(rtt_ms, Ordering::SeqCst);
        if let Some((ntp, rtp_timestamp)) = sender_info {
            lock(&self.ntp_estimator).update_rtcp_timestamp(
                rtt_ms,
                ntp.seconds,
                ntp.fraction,
                rtp_timestamp,
            );
        }
    }

    /// Deliver one RTP packet to the pipeline. Returns whether the packet
    /// was accepted.
    pub fn received_rtp_packet(&self, packet: &[u8], packet_time: PacketTime) -> bool {
        if !self.is_receiving() {
            return false;
        }
        let mut header = match lock(&self.header_parser).parse(packet) {
            Ok(header) => header,
            Err(_) => return false,
        };
        let payload_length = packet.len() - header.header_length;

        let now_ms = self.clock.now_ms();
        let arrival_time_ms = match packet_time.timestamp_us {
            Some(timestamp_us) => (timestamp_us + 500) / 1000,
            None => now_ms,
        };

        let last_log = self.last_packet_log_ms.load(Ordering::Relaxed);
        if now_ms - last_log > PACKET_LOG_INTERVAL_MS {
            debug!(
                ssrc = header.ssrc,
                payload_type = header.payload_type,
                timestamp = header.timestamp,
                sequence_number = header.sequence_number,
                arrival_time_ms,
                "Packet received"
            );
            self.last_packet_log_ms.store(now_ms, Ordering::Relaxed);
        }

        self.remote_bitrate_estimator
            .incoming_packet(arrival_time_ms, payload_length, &header, true);
        header.payload_type_frequency = VIDEO_PAYLOAD_TYPE_FREQUENCY;

        let in_order = self.is_packet_in_order(&header);
        lock(&self.payload_registry).set_incoming_payload_type(&header);
        let accepted = self.receive_packet(packet, &header, in_order);

        // Statistics update after the payload path so a payload-type driven
        // reset still counts this packet.
        let retransmitted = self.is_packet_retransmitted(&header, in_order, now_ms);
        lock(&self.receive_statistics).incoming_packet(&header, packet.len(), retransmitted);
        accepted
    }

    /// Re-enter a packet produced by FEC recovery or RTX restoration.
    pub fn on_recovered_packet(&self, packet: &[u8]) -> bool {
        let mut header = match lock(&self.header_parser).parse(packet) {
            Ok(header) => header,
            Err(_) => return false,
        };
        header.payload_type_frequency = VIDEO_PAYLOAD_TYPE_FREQUENCY;
        let in_order = self.is_packet_in_order(&header);
        self.receive_packet(packet, &header, in_order)
    }

    fn receive_packet(&self, packet: &[u8], header: &RtpHeader, in_order: bool) -> bool {
        if lock(&self.payload_registry).is_encapsulated(header) {
            return self.handle_encapsulating_header(packet, header);
        }
        let Some(specifics) = lock(&self.payload_registry).payload_specifics(header.payload_type)
        else {
            return false;
        };
        let payload = &packet[header.header_length..packet.len() - header.padding_length];
        self.on_received_payload_data(payload, header, specifics, in_order)
    }

    fn handle_encapsulating_header(&self, packet: &[u8], header: &RtpHeader) -> bool {
        let (is_red, ulpfec_payload_type) = {
            let registry = lock(&self.payload_registry);
            (registry.is_red(header), registry.ulpfec_payload_type())
        };
        if is_red {
            if let Some(fec_pt) = ulpfec_payload_type {
                if packet.get(header.header_length) == Some(&fec_pt) {
                    lock(&self.receive_statistics).fec_packet_received(header, packet.len());
                    // Tell the upper layer about the FEC packet so it does
                    // not get NACKed.
                    self.notify_receiver_of_fec_packet(header);
                }
            }
            let recovered = {
                let mut fec = lock(&self.fec_receiver);
                if fec
                    .add_received_red_packet(header, packet, ulpfec_payload_type)
                    .is_err()
                {
                    return false;
                }
                match fec.process_received_fec() {
                    Ok(recovered) => recovered,
                    Err(_) => return false,
                }
            };
            for recovered_packet in recovered {
                self.on_recovered_packet(&recovered_packet);
            }
            return true;
        }

        // RTX.
        if header.header_length + header.padding_length == packet.len() {
            // Empty keepalive, drop silently before parsing the RTX header.
            return true;
        }
        if packet.len() > RESTORED_PACKET_MAX_SIZE {
            return false;
        }
        let Ok(mut restored) = self.restored_packet.try_lock() else {
            warn!("Multiple RTX headers detected, dropping packet");
            return false;
        };
        let restored_length = {
            let registry = lock(&self.payload_registry);
            registry.restore_original_packet(&mut restored[..], packet, self.remote_ssrc, header)
        };
        match restored_length {
            // The slot stays held across the recursive delivery; a second
            // RTX packet arriving meanwhile fails the try-lock above.
            Some(length) => self.on_recovered_packet(&restored[..length]),
            None => {
                warn!("Incoming RTX packet: invalid RTP header");
                false
            }
        }
    }

    /// Fake an empty media packet so the upper layer learns about the FEC
    /// packet's sequence number.
    fn notify_receiver_of_fec_packet(&self, header: &RtpHeader) {
        let (last_media_payload_type, specifics) = {
            let registry = lock(&self.payload_registry);
            let Some(payload_type) = registry.last_received_media_payload_type() else {
                warn!("Failed to get last media payload type");
                return;
            };
            (payload_type, registry.payload_specifics(payload_type))
        };
        let Some(specifics) = specifics else {
            warn!("Failed to get payload specifics");
            return;
        };
        let mut fec_header = header.clone();
        fec_header.payload_type = last_media_payload_type;
        fec_header.padding_length = 0;
        self.on_received_payload_data(&[], &fec_header, specifics, true);
    }

    fn on_received_payload_data(
        &self,
        payload: &[u8],
        header: &RtpHeader,
        specifics: PayloadSpecifics,
        in_order: bool,
    ) -> bool {
        let ntp_time_ms = lock(&self.ntp_estimator).estimate(header.timestamp);
        let payload_header = MediaPayloadHeader {
            rtp: header.clone(),
            ntp_time_ms,
            specifics,
            in_order,
        };
        self.media_sink
            .on_payload(Bytes::copy_from_slice(payload), &payload_header)
            .is_ok()
    }

    fn is_packet_in_order(&self, header: &RtpHeader) -> bool {
        let statistics = lock(&self.receive_statistics);
        match statistics.statistician(header.ssrc) {
            Some(statistician) => statistician.is_packet_in_order(header.sequence_number),
            None => false,
        }
    }

    fn is_packet_retransmitted(&self, header: &RtpHeader, in_order: bool, now_ms: i64) -> bool {
        if lock(&self.payload_registry).rtx_enabled() {
            // Retransmissions arrive on their own SSRC when RTX is on.
            return false;
        }
        let min_rtt_ms = self.rtt_ms.load(Ordering::SeqCst);
        let statistics = lock(&self.receive_statistics);
        let Some(statistician) = statistics.statistician(header.ssrc) else {
            return false;
        };
        !in_order && statistician.is_retransmit_of_old_packet(header, min_rtt_ms, now_ms)
    }
}

impl Drop for RtpStreamIngress {
    fn drop(&mut self) {
        let counter = self.fec_packet_counter();
        if counter.num_packets > 0 {
            debug!(
                ssrc = self.remote_ssrc,
                num_packets = counter.num_packets,
                num_fec_packets = counter.num_fec_packets,
                num_recovered_packets = counter.num_recovered_packets,
                "FEC receiver counters at teardown"
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::receive::VideoCodecType;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        payloads: StdMutex<Vec<(Vec<u8>, MediaPayloadHeader)>>,
    }

    impl MediaSink for RecordingSink {
        fn on_payload(&self, payload: Bytes, header: &MediaPayloadHeader) -> Result<()> {
            self.payloads.lock().unwrap().push((payload.to_vec(), header.clone()));
            Ok(())
        }
    }

    struct NullEstimator;

    impl RemoteBitrateEstimator for NullEstimator {
        fn incoming_packet(&self, _: i64, _: usize, _: &RtpHeader, _: bool) {}

        fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)> {
            None
        }
    }

    fn build_ingress(remote_ssrc: RtpSsrc) -> (Arc<RtpStreamIngress>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let ingress = Arc::new(RtpStreamIngress::new(
            Arc::new(SimulatedClock::new(100_000)),
            remote_ssrc,
            Arc::new(NullEstimator),
            sink.clone(),
        ));
        ingress
            .set_receive_codec(
                96,
                "VP8",
                PayloadSpecifics::Video { codec: VideoCodecType::Vp8, max_bitrate: 0 },
            )
            .unwrap();
        ingress.start_receive();
        (ingress, sink)
    }

    fn media_packet(ssrc: RtpSsrc, payload_type: PayloadType, seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; 12];
        packet[0] = 0x80;
        packet[1] = payload_type;
        packet[2..4].copy_from_slice(&seq.to_be_bytes());
        packet[4..8].copy_from_slice(&90_000u32.to_be_bytes());
        packet[8..12].copy_from_slice(&ssrc.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn test_gate_rejects_when_not_receiving() {
        let (ingress, sink) = build_ingress(0xA);
        ingress.stop_receive();
        let packet = media_packet(0xA, 96, 1, &[1, 2]);
        assert!(!ingress.received_rtp_packet(&packet, PacketTime::not_set()));
        assert!(sink.payloads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_media_payload_reaches_sink() {
        let (ingress, sink) = build_ingress(0xA);
        let packet = media_packet(0xA, 96, 1, &[1, 2, 3]);
        assert!(ingress.received_rtp_packet(&packet, PacketTime::not_set()));

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let (payload, header) = &payloads[0];
        assert_eq!(payload, &[1, 2, 3]);
        assert_eq!(header.rtp.ssrc, 0xA);
        assert_eq!(header.ntp_time_ms, None);
        assert!(matches!(header.specifics, PayloadSpecifics::Video { .. }));
    }

    #[test]
    fn test_unknown_payload_type_rejected() {
        let (ingress, sink) = build_ingress(0xA);
        let packet = media_packet(0xA, 111, 1, &[1]);
        assert!(!ingress.received_rtp_packet(&packet, PacketTime::not_set()));
        assert!(sink.payloads.lock().unwrap().is_empty());
        // The packet still counts in receive statistics.
        assert_eq!(ingress.stream_counters(0xA).unwrap().packets, 1);
    }

    #[test]
    fn test_rtx_keepalive_dropped_silently() {
        let (ingress, sink) = build_ingress(0xA);
        ingress.set_rtx_ssrc(0xB);
        // Header-only packet on the RTX SSRC.
        let packet = media_packet(0xB, 97, 1, &[]);
        assert!(ingress.received_rtp_packet(&packet, PacketTime::not_set()));
        assert!(sink.payloads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rtx_restoration_reenters_media() {
        let (ingress, sink) = build_ingress(0xA);
        ingress.set_rtx_ssrc(0xB);
        ingress.set_rtx_payload_type(97, 96);
        ingress.set_use_rtx_payload_mapping_on_restore(true);

        // RTX payload: original sequence number 7, then media bytes.
        let mut rtx_payload = 7u16.to_be_bytes().to_vec();
        rtx_payload.extend_from_slice(&[0xAB, 0xCD]);
        let packet = media_packet(0xB, 97, 1, &rtx_payload);
        assert!(ingress.received_rtp_packet(&packet, PacketTime::not_set()));

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let (payload, header) = &payloads[0];
        assert_eq!(payload, &[0xAB, 0xCD]);
        assert_eq!(header.rtp.ssrc, 0xA);
        assert_eq!(header.rtp.sequence_number, 7);
        assert_eq!(header.rtp.payload_type, 96);
    }

    #[test]
    fn test_red_primary_block_delivered_and_fec_counted() {
        let (ingress, sink) = build_ingress(0xA);
        ingress
            .set_receive_codec(
                116,
                "red",
                PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 },
            )
            .unwrap();
        ingress
            .set_receive_codec(
                117,
                "ulpfec",
                PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 },
            )
            .unwrap();

        // Establish a last-received media payload type first.
        let media = media_packet(0xA, 96, 1, &[1]);
        assert!(ingress.received_rtp_packet(&media, PacketTime::not_set()));

        // RED packet carrying media payload type 96.
        let mut red_payload = vec![96u8];
        red_payload.extend_from_slice(&[5, 6, 7]);
        let red = media_packet(0xA, 116, 2, &red_payload);
        assert!(ingress.received_rtp_packet(&red, PacketTime::not_set()));

        // RED packet carrying a ULPFEC payload: notification with an empty
        // payload, no media delivery.
        let mut fec_payload = vec![117u8];
        fec_payload.extend_from_slice(&[9, 9, 9]);
        let red_fec = media_packet(0xA, 116, 3, &fec_payload);
        assert!(ingress.received_rtp_packet(&red_fec, PacketTime::not_set()));

        let payloads = sink.payloads.lock().unwrap();
        // media, RED-unwrapped media, empty FEC notification.
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[1].0, vec![5, 6, 7]);
        assert_eq!(payloads[1].1.rtp.payload_type, 96);
        assert!(payloads[2].0.is_empty());
        assert_eq!(payloads[2].1.rtp.payload_type, 96);

        assert_eq!(ingress.fec_packet_counter().num_fec_packets, 1);
        assert_eq!(ingress.stream_counters(0xA).unwrap().fec_packets, 1);
    }

    #[test]
    fn test_arrival_time_rounding_feeds_estimator() {
        struct CapturingEstimator {
            arrivals: StdMutex<Vec<i64>>,
        }

        impl RemoteBitrateEstimator for CapturingEstimator {
            fn incoming_packet(&self, arrival_time_ms: i64, _: usize, _: &RtpHeader, _: bool) {
                self.arrivals.lock().unwrap().push(arrival_time_ms);
            }

            fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)> {
                None
            }
        }

        let estimator = Arc::new(CapturingEstimator { arrivals: StdMutex::new(Vec::new()) });
        let ingress = RtpStreamIngress::new(
            Arc::new(SimulatedClock::new(55_000)),
            0xA,
            estimator.clone(),
            Arc::new(NullMediaSink),
        );
        ingress.start_receive();

        let packet = media_packet(0xA, 96, 1, &[1]);
        // 1_234_567 us rounds to 1235 ms.
        ingress.received_rtp_packet(&packet, PacketTime::with_timestamp_us(1_234_567));
        // Absent capture time falls back to the clock.
        ingress.received_rtp_packet(&packet, PacketTime::not_set());

        let arrivals = estimator.arrivals.lock().unwrap();
        assert_eq!(arrivals.as_slice(), &[1235, 55_000]);
    }

    #[test]
    fn test_ntp_time_attached_after_anchor() {
        let (ingress, sink) = build_ingress(0xA);
        ingress.update_rtcp_timing(
            100,
            Some((NtpTimestamp::from_parts(2_208_988_800, 0), 90_000)),
        );

        let packet = media_packet(0xA, 96, 1, &[1]);
        assert!(ingress.received_rtp_packet(&packet, PacketTime::not_set()));
        let payloads = sink.payloads.lock().unwrap();
        // Anchor at unix 0 + rtt/2, same RTP timestamp as the packet.
        assert_eq!(payloads[0].1.ntp_time_ms, Some(50));
    }

    #[test]
    fn test_rtcp_timing_ignored_without_rtt() {
        let (ingress, sink) = build_ingress(0xA);
        ingress.update_rtcp_timing(0, Some((NtpTimestamp::from_parts(2_208_988_800, 0), 90_000)));

        let packet = media_packet(0xA, 96, 1, &[1]);
        assert!(ingress.received_rtp_packet(&packet, PacketTime::not_set()));
        assert_eq!(sink.payloads.lock().unwrap()[0].1.ntp_time_ms, None);
    }
}

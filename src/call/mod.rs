//! The call orchestrator.
//!
//! Owns the stream registries, dispatches inbound packets by SSRC, fans
//! network state out to every live stream, governs the bitrate envelope,
//! and carries per-SSRC RTP sender state across video send stream churn.
//!
//! Concurrency contract: all `create_*` / `destroy_*` /
//! [`Call::set_bitrate_config`] / [`Call::signal_network_state`] calls
//! belong to the thread that created the call; [`Call::deliver_packet`]
//! and [`Call::on_sent_packet`] may run concurrently from the network
//! thread. The network-enabled mutex orders ahead of either registry lock
//! so no stream can miss a transition during its own creation.

mod registry;
mod sync;

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use tracing::{debug, info};

use crate::audio::{
    AudioReceiveConfig, AudioReceiveStream, AudioSendConfig, AudioSendStream, VoiceEngine,
};
use crate::clock::Clock;
use crate::config::{assert_valid_bitrate_config, BitrateConfig, CallConfig};
use crate::congestion::CongestionController;
use crate::event_log::EventLog;
use crate::packet::{RtpHeaderParser, RTP_MIN_HEADER_LEN};
use crate::process::ProcessRunner;
use crate::stats::{CallStats, Stats};
use crate::types::{DeliveryStatus, MediaType, NetworkState, PacketTime, SentPacket};
use crate::video::{VideoEncoderConfig, VideoReceiveConfig, VideoReceiveStream, VideoSendConfig, VideoSendStream};
use crate::types::RtpStateMap;

use registry::{ReceiveRegistry, SendRegistry};
use sync::configure_sync;

/// Asserts that configuration-side entry points stay on one thread.
struct ThreadChecker {
    thread_id: ThreadId,
}

impl ThreadChecker {
    fn new() -> Self {
        Self { thread_id: thread::current().id() }
    }

    fn check(&self) {
        assert_eq!(
            self.thread_id,
            thread::current().id(),
            "configuration API called off the configuration thread"
        );
    }
}

/// Central dispatch and lifecycle core of a conferencing endpoint.
///
/// Streams returned by the `create_*` methods are owned by the caller; the
/// call keeps them indexed until the matching `destroy_*` call. All
/// registries must be empty when the call is dropped.
pub struct Call {
    num_cpu_cores: usize,
    process_runner: ProcessRunner,
    call_stats: Arc<CallStats>,
    congestion_controller: Arc<CongestionController>,
    bitrate_config: Mutex<BitrateConfig>,
    voice_engine: Option<Arc<dyn VoiceEngine>>,
    event_log: Option<Arc<dyn EventLog>>,
    clock: Arc<dyn Clock>,
    configuration_thread: ThreadChecker,

    /// Ordered ahead of both registry locks so network transitions and
    /// stream creation observe a consistent state.
    network_enabled: Mutex<bool>,
    receive: RwLock<ReceiveRegistry>,
    send: RwLock<SendRegistry>,
    suspended_video_send_ssrcs: Mutex<RtpStateMap>,
}

impl Call {
    /// Create a call from its configuration. Must run inside a tokio
    /// runtime; the periodic-work runner starts immediately.
    pub fn new(config: CallConfig) -> Self {
        assert_valid_bitrate_config(&config.bitrate_config);

        let num_cpu_cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let call_stats = Arc::new(CallStats::new(config.clock.clone()));
        let congestion_controller = Arc::new(CongestionController::new());
        let event_log = config.voice_engine.as_ref().and_then(|engine| engine.event_log());

        let mut process_runner = ProcessRunner::new();
        process_runner.register_module(call_stats.clone());
        process_runner.start();

        congestion_controller.set_bwe_bitrates(
            config.bitrate_config.min_bitrate_bps,
            config.bitrate_config.start_bitrate_bps,
            config.bitrate_config.max_bitrate_bps,
        );
        info!(num_cpu_cores, "Call created");

        Self {
            num_cpu_cores,
            process_runner,
            call_stats,
            congestion_controller,
            bitrate_config: Mutex::new(config.bitrate_config),
            voice_engine: config.voice_engine,
            event_log,
            clock: config.clock,
            configuration_thread: ThreadChecker::new(),
            network_enabled: Mutex::new(true),
            receive: RwLock::new(ReceiveRegistry::default()),
            send: RwLock::new(SendRegistry::default()),
            suspended_video_send_ssrcs: Mutex::new(RtpStateMap::new()),
        }
    }

    /// CPU cores detected at construction, handed to video encoders
    pub fn num_cpu_cores(&self) -> usize {
        self.num_cpu_cores
    }

    /// The shared congestion controller
    pub fn congestion_controller(&self) -> &Arc<CongestionController> {
        &self.congestion_controller
    }

    /// The shared call statistics module
    pub fn call_stats(&self) -> &Arc<CallStats> {
        &self.call_stats
    }

    /// Create an audio send stream on `config.ssrc`. Panics if the SSRC is
    /// already registered.
    pub fn create_audio_send_stream(&self, config: AudioSendConfig) -> Arc<AudioSendStream> {
        self.configuration_thread.check();
        let stream = Arc::new(AudioSendStream::new(config));
        {
            let network_enabled = lock(&self.network_enabled);
            let mut send = write(&self.send);
            send.insert_audio(stream.config().ssrc, stream.clone());
            if !*network_enabled {
                stream.signal_network_state(NetworkState::Down);
            }
        }
        stream
    }

    /// Stop and unregister an audio send stream.
    pub fn destroy_audio_send_stream(&self, stream: Arc<AudioSendStream>) {
        self.configuration_thread.check();
        stream.stop();
        let mut send = write(&self.send);
        send.remove_audio(&stream);
    }

    /// Create an audio receive stream on `config.remote_ssrc` and run the
    /// sync resolver for its group.
    pub fn create_audio_receive_stream(&self, config: AudioReceiveConfig) -> Arc<AudioReceiveStream> {
        self.configuration_thread.check();
        let stream = Arc::new(AudioReceiveStream::new(
            config,
            self.congestion_controller.remote_bitrate_estimator(false),
            self.voice_engine.clone(),
            self.clock.clone(),
        ));
        {
            let mut receive = write(&self.receive);
            receive.insert_audio(stream.config().remote_ssrc, stream.clone());
            let sync_group = stream.config().sync_group.clone();
            configure_sync(&mut receive, self.voice_engine.as_ref(), &sync_group);
        }
        stream
    }

    /// Stop and unregister an audio receive stream; when it anchored its
    /// sync group the group is re-elected.
    pub fn destroy_audio_receive_stream(&self, stream: Arc<AudioReceiveStream>) {
        self.configuration_thread.check();
        stream.stop();
        let mut receive = write(&self.receive);
        receive.remove_audio(&stream);
        let sync_group = stream.config().sync_group.clone();
        let was_anchor = receive
            .sync_groups
            .get(&sync_group)
            .map(|anchor| Arc::ptr_eq(anchor, &stream))
            .unwrap_or(false);
        if was_anchor {
            receive.sync_groups.remove(&sync_group);
            configure_sync(&mut receive, self.voice_engine.as_ref(), &sync_group);
        }
    }

    /// Create a video send stream over `config.ssrcs`, resuming suspended
    /// RTP state for any SSRC a destroyed stream left behind.
    pub fn create_video_send_stream(
        &self,
        config: VideoSendConfig,
        encoder_config: VideoEncoderConfig,
    ) -> Arc<VideoSendStream> {
        self.configuration_thread.check();
        let suspended = lock(&self.suspended_video_send_ssrcs).clone();
        let stream = Arc::new(VideoSendStream::new(
            config,
            encoder_config,
            &suspended,
            self.call_stats.clone(),
        ));

        let network_enabled = lock(&self.network_enabled);
        let mut send = write(&self.send);
        send.insert_video(stream.clone());

        if let Some(event_log) = &self.event_log {
            event_log.log_video_send_stream_config(stream.config());
        }
        if !*network_enabled {
            stream.signal_network_state(NetworkState::Down);
        }
        stream
    }

    /// Stop and unregister a video send stream, merging its RTP state
    /// snapshot into the suspended-SSRC map for successors.
    pub fn destroy_video_send_stream(&self, stream: Arc<VideoSendStream>) {
        self.configuration_thread.check();
        stream.stop();
        {
            let mut send = write(&self.send);
            send.remove_video(&stream);
        }
        let rtp_states = stream.get_rtp_states();
        let mut suspended = lock(&self.suspended_video_send_ssrcs);
        for (ssrc, state) in rtp_states {
            suspended.insert(ssrc, state);
        }
    }

    /// Create a video receive stream on `config.remote_ssrc`. The first
    /// RTX map entry's SSRC indexes the same stream.
    pub fn create_video_receive_stream(&self, config: VideoReceiveConfig) -> Arc<VideoReceiveStream> {
        self.configuration_thread.check();
        let stream = Arc::new(VideoReceiveStream::new(
            config,
            self.congestion_controller.remote_bitrate_estimator(false),
            self.clock.clone(),
        ));

        let network_enabled = lock(&self.network_enabled);
        let mut receive = write(&self.receive);
        let rtx_ssrc = stream.config().rtx.values().next().map(|rtx| rtx.ssrc);
        receive.insert_video(stream.clone(), rtx_ssrc);
        let sync_group = stream.config().sync_group.clone();
        configure_sync(&mut receive, self.voice_engine.as_ref(), &sync_group);

        if !*network_enabled {
            stream.signal_network_state(NetworkState::Down);
        }
        if let Some(event_log) = &self.event_log {
            event_log.log_video_receive_stream_config(stream.config());
        }
        stream
    }

    /// Stop and unregister a video receive stream (both its SSRC keys),
    /// then re-run the sync resolver for its group.
    pub fn destroy_video_receive_stream(&self, stream: Arc<VideoReceiveStream>) {
        self.configuration_thread.check();
        stream.stop();
        let mut receive = write(&self.receive);
        receive.remove_video(&stream);
        let sync_group = stream.config().sync_group.clone();
        configure_sync(&mut receive, self.voice_engine.as_ref(), &sync_group);
    }

    /// Classify and dispatch one inbound packet.
    pub fn deliver_packet(
        &self,
        media_type: MediaType,
        packet: &[u8],
        packet_time: PacketTime,
    ) -> DeliveryStatus {
        if RtpHeaderParser::is_rtcp(packet) {
            return self.deliver_rtcp(media_type, packet);
        }
        self.deliver_rtp(media_type, packet, packet_time)
    }

    fn deliver_rtcp(&self, media_type: MediaType, packet: &[u8]) -> DeliveryStatus {
        let mut rtcp_delivered = false;
        if media_type == MediaType::Any || media_type == MediaType::Video {
            let receive = read(&self.receive);
            for stream in &receive.video_streams {
                if stream.deliver_rtcp(packet) {
                    rtcp_delivered = true;
                    if let Some(event_log) = &self.event_log {
                        event_log.log_rtcp_packet(true, media_type, packet);
                    }
                }
            }
        }
        if media_type == MediaType::Any || media_type == MediaType::Video {
            let send = read(&self.send);
            for stream in &send.video_streams {
                if stream.deliver_rtcp(packet) {
                    rtcp_delivered = true;
                    if let Some(event_log) = &self.event_log {
                        event_log.log_rtcp_packet(false, media_type, packet);
                    }
                }
            }
        }
        if rtcp_delivered {
            DeliveryStatus::Ok
        } else {
            DeliveryStatus::PacketError
        }
    }

    fn deliver_rtp(
        &self,
        media_type: MediaType,
        packet: &[u8],
        packet_time: PacketTime,
    ) -> DeliveryStatus {
        if packet.len() < RTP_MIN_HEADER_LEN {
            return DeliveryStatus::PacketError;
        }
        let Some(ssrc) = RtpHeaderParser::read_ssrc(packet) else {
            return DeliveryStatus::PacketError;
        };

        let receive = read(&self.receive);
        if media_type == MediaType::Any || media_type == MediaType::Audio {
            if let Some(stream) = receive.audio_by_ssrc.get(&ssrc) {
                let status = if stream.deliver_rtp(packet, packet_time) {
                    DeliveryStatus::Ok
                } else {
                    DeliveryStatus::PacketError
                };
                if status == DeliveryStatus::Ok {
                    if let Some(event_log) = &self.event_log {
                        event_log.log_rtp_header(true, media_type, packet);
                    }
                }
                return status;
            }
        }
        if media_type == MediaType::Any || media_type == MediaType::Video {
            if let Some(stream) = receive.video_by_ssrc.get(&ssrc) {
                let status = if stream.deliver_rtp(packet, packet_time) {
                    DeliveryStatus::Ok
                } else {
                    DeliveryStatus::PacketError
                };
                if status == DeliveryStatus::Ok {
                    if let Some(event_log) = &self.event_log {
                        event_log.log_rtp_header(true, media_type, packet);
                    }
                }
                return status;
            }
        }
        DeliveryStatus::UnknownSsrc
    }

    /// Update the bitrate envelope. A triple equal to the stored one (with
    /// a non-positive start matching anything) is a no-op so encoders are
    /// not needlessly reconfigured.
    pub fn set_bitrate_config(&self, bitrate_config: BitrateConfig) {
        self.configuration_thread.check();
        assert!(bitrate_config.min_bitrate_bps >= 0, "min_bitrate_bps must be >= 0");
        if bitrate_config.max_bitrate_bps != -1 {
            assert!(bitrate_config.max_bitrate_bps > 0, "max_bitrate_bps must be -1 or > 0");
        }
        let mut stored = lock(&self.bitrate_config);
        if stored.min_bitrate_bps == bitrate_config.min_bitrate_bps
            && (bitrate_config.start_bitrate_bps <= 0
                || stored.start_bitrate_bps == bitrate_config.start_bitrate_bps)
            && stored.max_bitrate_bps == bitrate_config.max_bitrate_bps
        {
            // Nothing new to set, avoid encoder reconfigurations.
            return;
        }
        *stored = bitrate_config;
        self.congestion_controller.set_bwe_bitrates(
            bitrate_config.min_bitrate_bps,
            bitrate_config.start_bitrate_bps,
            bitrate_config.max_bitrate_bps,
        );
    }

    /// Currently stored bitrate envelope
    pub fn bitrate_config(&self) -> BitrateConfig {
        *lock(&self.bitrate_config)
    }

    /// Broadcast a network state transition to the congestion controller
    /// and every live stream under one consistent snapshot.
    pub fn signal_network_state(&self, state: NetworkState) {
        self.configuration_thread.check();
        // Held for the whole fan-out so streams created concurrently with
        // the transition observe a consistent state.
        let mut network_enabled = lock(&self.network_enabled);
        *network_enabled = state == NetworkState::Up;
        self.congestion_controller.signal_network_state(state);
        {
            let send = read(&self.send);
            for stream in send.audio_by_ssrc.values() {
                stream.signal_network_state(state);
            }
            for stream in send.video_by_ssrc.values() {
                stream.signal_network_state(state);
            }
        }
        {
            let receive = read(&self.receive);
            for stream in receive.video_by_ssrc.values() {
                stream.signal_network_state(state);
            }
        }
        debug!(?state, "Network state broadcast");
    }

    /// Forward transport send notifications to the congestion controller.
    pub fn on_sent_packet(&self, sent: SentPacket) {
        self.congestion_controller.on_sent_packet(sent);
    }

    /// Sample call-wide statistics.
    pub fn get_stats(&self) -> Stats {
        let mut stats = Stats::new();
        stats.send_bandwidth_bps = self.congestion_controller.available_send_bandwidth();
        if let Some((_, recv_bandwidth)) = self
            .congestion_controller
            .remote_bitrate_estimator(false)
            .latest_estimate()
        {
            stats.recv_bandwidth_bps = recv_bandwidth;
        }
        stats.pacer_delay_ms = self.congestion_controller.pacer_queuing_delay_ms();
        {
            let send = read(&self.send);
            for stream in &send.video_streams {
                let rtt_ms = stream.get_rtt();
                if rtt_ms > 0 {
                    stats.rtt_ms = rtt_ms;
                }
            }
        }
        stats
    }

    /// The elected audio anchor of a sync group, if any
    pub fn sync_group_anchor(&self, sync_group: &str) -> Option<Arc<AudioReceiveStream>> {
        read(&self.receive).sync_groups.get(sync_group).cloned()
    }

    /// Suspended RTP sender states left behind by destroyed video send
    /// streams
    pub fn suspended_video_send_states(&self) -> RtpStateMap {
        lock(&self.suspended_video_send_ssrcs).clone()
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        // Destroying the call with live streams is a client contract
        // violation, not a recoverable condition.
        {
            let send = read(&self.send);
            assert!(send.audio_by_ssrc.is_empty(), "audio send streams alive at call teardown");
            assert!(send.video_by_ssrc.is_empty(), "video send streams alive at call teardown");
            assert!(send.video_streams.is_empty(), "video send streams alive at call teardown");
        }
        {
            let receive = read(&self.receive);
            assert!(
                receive.audio_by_ssrc.is_empty(),
                "audio receive streams alive at call teardown"
            );
            assert!(
                receive.video_by_ssrc.is_empty(),
                "video receive streams alive at call teardown"
            );
            assert!(
                receive.video_streams.is_empty(),
                "video receive streams alive at call teardown"
            );
        }
        let call_stats: Arc<dyn crate::process::Module> = self.call_stats.clone();
        self.process_runner.deregister_module(&call_stats);
        self.process_runner.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

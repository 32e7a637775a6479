//! SSRC-indexed stream registries.
//!
//! Two registries, one per lock domain: receive-side (audio + video receive
//! streams, sync-group anchors) and send-side (audio + video send streams).
//! Uniqueness within each index is a hard invariant; inserting a duplicate
//! SSRC or destroying an unknown stream is a programming error and panics.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::{AudioReceiveStream, AudioSendStream};
use crate::types::RtpSsrc;
use crate::video::{VideoReceiveStream, VideoSendStream};

/// Receive-side registry, guarded by the call's receive lock
#[derive(Default)]
pub(crate) struct ReceiveRegistry {
    pub audio_by_ssrc: HashMap<RtpSsrc, Arc<AudioReceiveStream>>,
    pub video_by_ssrc: HashMap<RtpSsrc, Arc<VideoReceiveStream>>,
    /// Video receive streams in creation order; the sync resolver iterates
    /// this to elect the bound A/V pair.
    pub video_streams: Vec<Arc<VideoReceiveStream>>,
    /// Sync-group name -> elected audio anchor
    pub sync_groups: HashMap<String, Arc<AudioReceiveStream>>,
}

impl ReceiveRegistry {
    pub fn insert_audio(&mut self, ssrc: RtpSsrc, stream: Arc<AudioReceiveStream>) {
        let previous = self.audio_by_ssrc.insert(ssrc, stream);
        assert!(previous.is_none(), "duplicate audio receive SSRC {}", ssrc);
    }

    pub fn remove_audio(&mut self, stream: &Arc<AudioReceiveStream>) {
        let removed = self.audio_by_ssrc.remove(&stream.config().remote_ssrc);
        assert!(removed.is_some(), "destroying unregistered audio receive stream");
    }

    pub fn insert_video(
        &mut self,
        stream: Arc<VideoReceiveStream>,
        rtx_ssrc: Option<RtpSsrc>,
    ) {
        let remote_ssrc = stream.config().remote_ssrc;
        let previous = self.video_by_ssrc.insert(remote_ssrc, stream.clone());
        assert!(previous.is_none(), "duplicate video receive SSRC {}", remote_ssrc);
        if let Some(rtx_ssrc) = rtx_ssrc {
            let previous = self.video_by_ssrc.insert(rtx_ssrc, stream.clone());
            assert!(previous.is_none(), "duplicate video receive RTX SSRC {}", rtx_ssrc);
        }
        self.video_streams.push(stream);
    }

    /// Remove every SSRC entry mapping to `stream` (one or two, the RTX
    /// SSRC indexes the same stream) and drop it from the set view.
    pub fn remove_video(&mut self, stream: &Arc<VideoReceiveStream>) {
        let before = self.video_by_ssrc.len();
        self.video_by_ssrc.retain(|_, indexed| !Arc::ptr_eq(indexed, stream));
        assert!(
            self.video_by_ssrc.len() < before,
            "destroying unregistered video receive stream"
        );
        self.video_streams.retain(|indexed| !Arc::ptr_eq(indexed, stream));
    }

    pub fn is_empty(&self) -> bool {
        self.audio_by_ssrc.is_empty()
            && self.video_by_ssrc.is_empty()
            && self.video_streams.is_empty()
    }
}

/// Send-side registry, guarded by the call's send lock
#[derive(Default)]
pub(crate) struct SendRegistry {
    pub audio_by_ssrc: HashMap<RtpSsrc, Arc<AudioSendStream>>,
    pub video_by_ssrc: HashMap<RtpSsrc, Arc<VideoSendStream>>,
    /// Video send streams in creation order, for RTCP fan-out
    pub video_streams: Vec<Arc<VideoSendStream>>,
}

impl SendRegistry {
    pub fn insert_audio(&mut self, ssrc: RtpSsrc, stream: Arc<AudioSendStream>) {
        let previous = self.audio_by_ssrc.insert(ssrc, stream);
        assert!(previous.is_none(), "duplicate audio send SSRC {}", ssrc);
    }

    pub fn remove_audio(&mut self, stream: &Arc<AudioSendStream>) {
        let removed = self.audio_by_ssrc.remove(&stream.config().ssrc);
        assert!(removed.is_some(), "destroying unregistered audio send stream");
    }

    /// Index a video send stream under every one of its SSRCs (simulcast
    /// layers each have their own).
    pub fn insert_video(&mut self, stream: Arc<VideoSendStream>) {
        for &ssrc in &stream.config().ssrcs {
            let previous = self.video_by_ssrc.insert(ssrc, stream.clone());
            assert!(previous.is_none(), "duplicate video send SSRC {}", ssrc);
        }
        self.video_streams.push(stream);
    }

    pub fn remove_video(&mut self, stream: &Arc<VideoSendStream>) {
        let before = self.video_by_ssrc.len();
        self.video_by_ssrc.retain(|_, indexed| !Arc::ptr_eq(indexed, stream));
        assert!(
            self.video_by_ssrc.len() < before,
            "destroying unregistered video send stream"
        );
        self.video_streams.retain(|indexed| !Arc::ptr_eq(indexed, stream));
    }

    pub fn is_empty(&self) -> bool {
        self.audio_by_ssrc.is_empty()
            && self.video_by_ssrc.is_empty()
            && self.video_streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSendConfig;
    use crate::clock::SimulatedClock;
    use crate::stats::CallStats;
    use crate::video::{VideoEncoderConfig, VideoReceiveConfig, VideoSendConfig};
    use crate::congestion::{RemoteBitrateEstimator, RemoteRateEstimator};

    fn video_receive(remote_ssrc: RtpSsrc) -> Arc<VideoReceiveStream> {
        let estimator: Arc<dyn RemoteBitrateEstimator> = Arc::new(RemoteRateEstimator::new());
        Arc::new(VideoReceiveStream::new(
            VideoReceiveConfig { remote_ssrc, ..Default::default() },
            estimator,
            Arc::new(SimulatedClock::new(0)),
        ))
    }

    fn video_send(ssrcs: Vec<RtpSsrc>) -> Arc<VideoSendStream> {
        Arc::new(VideoSendStream::new(
            VideoSendConfig { ssrcs },
            VideoEncoderConfig::default(),
            &HashMap::new(),
            Arc::new(CallStats::new(Arc::new(SimulatedClock::new(0)))),
        ))
    }

    #[test]
    fn test_video_receive_rtx_indexes_same_stream() {
        let mut registry = ReceiveRegistry::default();
        let stream = video_receive(0xA);
        registry.insert_video(stream.clone(), Some(0xB));

        assert!(Arc::ptr_eq(&registry.video_by_ssrc[&0xA], &registry.video_by_ssrc[&0xB]));
        assert_eq!(registry.video_streams.len(), 1);

        registry.remove_video(&stream);
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate video receive SSRC")]
    fn test_duplicate_video_receive_ssrc_panics() {
        let mut registry = ReceiveRegistry::default();
        registry.insert_video(video_receive(0xA), None);
        registry.insert_video(video_receive(0xA), None);
    }

    #[test]
    #[should_panic(expected = "destroying unregistered video receive stream")]
    fn test_remove_unknown_video_receive_panics() {
        let mut registry = ReceiveRegistry::default();
        registry.remove_video(&video_receive(0xA));
    }

    #[test]
    fn test_simulcast_send_indexing() {
        let mut registry = SendRegistry::default();
        let stream = video_send(vec![100, 101, 102]);
        registry.insert_video(stream.clone());
        assert_eq!(registry.video_by_ssrc.len(), 3);
        for ssrc in [100, 101, 102] {
            assert!(Arc::ptr_eq(&registry.video_by_ssrc[&ssrc], &stream));
        }

        registry.remove_video(&stream);
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate audio send SSRC")]
    fn test_duplicate_audio_send_ssrc_panics() {
        let mut registry = SendRegistry::default();
        registry.insert_audio(7, Arc::new(AudioSendStream::new(AudioSendConfig { ssrc: 7 })));
        registry.insert_audio(7, Arc::new(AudioSendStream::new(AudioSendConfig { ssrc: 7 })));
    }
}

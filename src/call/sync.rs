//! Lip-sync pairing within sync groups.

use std::sync::Arc;

use tracing::warn;

use crate::audio::VoiceEngine;

use super::registry::ReceiveRegistry;

/// Re-elect the audio anchor of `sync_group` and bind or unbind every video
/// receive stream in the group. At most one A/V pair per group is synced;
/// later video streams are explicitly unbound.
///
/// Must run under the receive registry's exclusive lock.
pub(crate) fn configure_sync(
    registry: &mut ReceiveRegistry,
    voice_engine: Option<&Arc<dyn VoiceEngine>>,
    sync_group: &str,
) {
    let Some(voice_engine) = voice_engine else { return };
    if sync_group.is_empty() {
        return;
    }

    let mut sync_audio_stream = registry.sync_groups.get(sync_group).cloned();
    if sync_audio_stream.is_none() {
        // No elected anchor; scan for a candidate.
        for stream in registry.audio_by_ssrc.values() {
            if stream.config().sync_group != sync_group {
                continue;
            }
            if sync_audio_stream.is_some() {
                warn!(
                    sync_group,
                    "Attempting to sync more than one audio stream within the same \
                     sync group. This is not supported in the current implementation."
                );
                break;
            }
            sync_audio_stream = Some(stream.clone());
        }
    }
    if let Some(anchor) = &sync_audio_stream {
        registry.sync_groups.insert(sync_group.to_string(), anchor.clone());
    }

    let mut num_synced_streams = 0;
    for video_stream in &registry.video_streams {
        if video_stream.config().sync_group != sync_group {
            continue;
        }
        num_synced_streams += 1;
        if num_synced_streams > 1 {
            warn!(
                sync_group,
                "Attempting to sync more than one audio/video pair within the same \
                 sync group. This is not supported in the current implementation."
            );
        }
        // Only the first A/V pair within the group is synced.
        match &sync_audio_stream {
            Some(anchor) if num_synced_streams == 1 => {
                video_stream.set_sync_channel(voice_engine, anchor.config().voe_channel_id);
            }
            _ => video_stream.set_sync_channel(voice_engine, -1),
        }
    }
}

//! Audio streams and the voice-engine seam.
//!
//! The call does not process audio media itself: inbound audio RTP is
//! handed to the voice engine's channel for the stream, and audio RTCP
//! never passes through the call at all.

pub mod receive;
pub mod send;

use std::sync::Arc;

use crate::event_log::EventLog;
use crate::types::PacketTime;

pub use receive::{AudioReceiveConfig, AudioReceiveStream};
pub use send::{AudioSendConfig, AudioSendStream};

/// Voice engine boundary.
///
/// The engine owns audio channels; the call only routes packets to them
/// and keeps the engine alive for its own lifetime.
pub trait VoiceEngine: Send + Sync {
    /// Deliver an inbound RTP packet to a channel. Returns whether the
    /// channel accepted it.
    fn received_rtp_packet(&self, channel_id: i32, packet: &[u8], packet_time: PacketTime) -> bool;

    /// The event log kept by the engine, if any
    fn event_log(&self) -> Option<Arc<dyn EventLog>> {
        None
    }
}

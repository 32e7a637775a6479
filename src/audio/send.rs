//! Audio send stream handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::types::{NetworkState, RtpSsrc};

/// Configuration of an audio send stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSendConfig {
    /// SSRC the stream sends on
    pub ssrc: RtpSsrc,
}

/// Outbound audio stream.
///
/// The encoder and RTP sender live in the voice engine; the call-side
/// handle carries lifecycle and network state.
pub struct AudioSendStream {
    config: AudioSendConfig,
    sending: AtomicBool,
    network_states: Mutex<Vec<NetworkState>>,
}

impl AudioSendStream {
    pub(crate) fn new(config: AudioSendConfig) -> Self {
        debug!(ssrc = config.ssrc, "Creating audio send stream");
        Self {
            config,
            sending: AtomicBool::new(false),
            network_states: Mutex::new(Vec::new()),
        }
    }

    /// Stream configuration
    pub fn config(&self) -> &AudioSendConfig {
        &self.config
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_and_network_observation() {
        let stream = AudioSendStream::new(AudioSendConfig { ssrc: 7 });
        assert!(!stream.is_sending());
        stream.start();
        assert!(stream.is_sending());
        stream.stop();
        assert!(!stream.is_sending());

        stream.signal_network_state(NetworkState::Down);
        stream.signal_network_state(NetworkState::Up);
        assert_eq!(
            stream.observed_network_states(),
            vec![NetworkState::Down, NetworkState::Up]
        );
    }
}

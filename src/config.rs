//! Call-level configuration.

use std::sync::Arc;

use crate::audio::VoiceEngine;
use crate::clock::{default_clock, Clock};

/// Default start bitrate used when the application does not provide one
pub const DEFAULT_START_BITRATE_BPS: i32 = 300_000;

/// Target bitrate envelope handed to the congestion controller.
///
/// `max_bitrate_bps == -1` means unbounded. A non-positive
/// `start_bitrate_bps` in a later [`crate::Call::set_bitrate_config`] call
/// means "keep the current start bitrate".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateConfig {
    /// Minimum bitrate, must be >= 0
    pub min_bitrate_bps: i32,

    /// Initial estimate, must be >= the minimum when positive
    pub start_bitrate_bps: i32,

    /// Maximum bitrate, -1 for unbounded, otherwise > 0
    pub max_bitrate_bps: i32,
}

impl Default for BitrateConfig {
    fn default() -> Self {
        Self {
            min_bitrate_bps: 0,
            start_bitrate_bps: DEFAULT_START_BITRATE_BPS,
            max_bitrate_bps: -1,
        }
    }
}

/// Top-level call configuration
#[derive(Clone)]
pub struct CallConfig {
    /// Bitrate envelope applied at construction
    pub bitrate_config: BitrateConfig,

    /// Voice engine shared with audio streams. Held alive for the lifetime
    /// of the call; also the source of the event log.
    pub voice_engine: Option<Arc<dyn VoiceEngine>>,

    /// Clock used by the ingress pipelines and statistics
    pub clock: Arc<dyn Clock>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            bitrate_config: BitrateConfig::default(),
            voice_engine: None,
            clock: default_clock(),
        }
    }
}

impl std::fmt::Debug for CallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallConfig")
            .field("bitrate_config", &self.bitrate_config)
            .field("voice_engine", &self.voice_engine.is_some())
            .finish()
    }
}

/// Panics when the bitrate envelope violates the construction contract.
/// Misconfiguration here is a programming error, not a runtime condition.
pub(crate) fn assert_valid_bitrate_config(config: &BitrateConfig) {
    assert!(config.min_bitrate_bps >= 0, "min_bitrate_bps must be >= 0");
    assert!(
        config.start_bitrate_bps >= config.min_bitrate_bps,
        "start_bitrate_bps must be >= min_bitrate_bps"
    );
    if config.max_bitrate_bps != -1 {
        assert!(
            config.max_bitrate_bps >= config.start_bitrate_bps,
            "max_bitrate_bps must be >= start_bitrate_bps"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bitrate_config() {
        let config = BitrateConfig::default();
        assert_eq!(config.start_bitrate_bps, DEFAULT_START_BITRATE_BPS);
        assert_eq!(config.max_bitrate_bps, -1);
        assert_valid_bitrate_config(&config);
    }

    #[test]
    #[should_panic(expected = "min_bitrate_bps")]
    fn test_negative_min_bitrate_panics() {
        assert_valid_bitrate_config(&BitrateConfig {
            min_bitrate_bps: -1,
            start_bitrate_bps: 300_000,
            max_bitrate_bps: -1,
        });
    }

    #[test]
    #[should_panic(expected = "max_bitrate_bps")]
    fn test_max_below_start_panics() {
        assert_valid_bitrate_config(&BitrateConfig {
            min_bitrate_bps: 0,
            start_bitrate_bps: 300_000,
            max_bitrate_bps: 100_000,
        });
    }
}

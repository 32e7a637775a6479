//! Remote-NTP time estimation.
//!
//! Maps RTP media timestamps to the sender's NTP wall clock using RTCP
//! sender reports and the measured round-trip time: the sender's timestamp
//! pair anchors the mapping, half the RTT shifts it to receive time.

use tracing::debug;

use crate::packet::{NtpTimestamp, VIDEO_PAYLOAD_TYPE_FREQUENCY};
use crate::types::RtpTimestamp;

/// Estimator of sender wall-clock time for received RTP timestamps
#[derive(Debug, Default)]
pub struct RemoteNtpEstimator {
    anchor: Option<Anchor>,
    frequency: u32,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    ntp_ms: i64,
    rtp_timestamp: RtpTimestamp,
}

impl RemoteNtpEstimator {
    /// Create an estimator for the standard video clock rate
    pub fn new() -> Self {
        Self { anchor: None, frequency: VIDEO_PAYLOAD_TYPE_FREQUENCY }
    }

    /// Refine the mapping with the timestamp pair of a sender report and
    /// the current round-trip time.
    pub fn update_rtcp_timestamp(
        &mut self,
        rtt_ms: i64,
        ntp_secs: u32,
        ntp_frac: u32,
        rtp_timestamp: RtpTimestamp,
    ) {
        let sender_ntp_ms = NtpTimestamp::from_parts(ntp_secs, ntp_frac).to_unix_ms();
        // The report needed half a round trip to get here.
        let ntp_ms = sender_ntp_ms + rtt_ms / 2;
        self.anchor = Some(Anchor { ntp_ms, rtp_timestamp });
        debug!(rtt_ms, rtp_timestamp, "Updated remote NTP anchor");
    }

    /// Estimate the NTP-synchronized wall-clock milliseconds for an RTP
    /// timestamp. `None` until a sender report has anchored the mapping.
    pub fn estimate(&self, rtp_timestamp: RtpTimestamp) -> Option<i64> {
        let anchor = self.anchor?;
        let diff = rtp_timestamp.wrapping_sub(anchor.rtp_timestamp) as i32;
        let diff_ms = diff as i64 * 1000 / self.frequency as i64;
        Some(anchor.ntp_ms + diff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_estimate_before_anchor() {
        let estimator = RemoteNtpEstimator::new();
        assert_eq!(estimator.estimate(90_000), None);
    }

    #[test]
    fn test_estimate_follows_rtp_clock() {
        let mut estimator = RemoteNtpEstimator::new();
        // NTP seconds exactly at the UNIX epoch offset => unix time 0,
        // plus 100 ms of one-way delay.
        estimator.update_rtcp_timestamp(200, 2_208_988_800, 0, 90_000);

        // One second of media time later.
        assert_eq!(estimator.estimate(180_000), Some(100 + 1000));
        // One second earlier, wrapping backwards.
        assert_eq!(estimator.estimate(0), Some(100 - 1000));
    }
}

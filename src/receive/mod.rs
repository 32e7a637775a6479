//! Receive-side ingress pipeline and its collaborators.

pub mod fec;
pub mod ingress;
pub mod ntp;
pub mod payload_registry;
pub mod statistics;

pub use fec::{FecPacketCounter, FecReceiver, UlpfecReceiver};
pub use ingress::{MediaPayloadHeader, MediaSink, NullMediaSink, RtpStreamIngress, RttProvider};
pub use ntp::RemoteNtpEstimator;
pub use payload_registry::{PayloadSpecifics, RtpPayloadRegistry, VideoCodecType};
pub use statistics::{ReceiveStatistics, StreamDataCounters, StreamStatistician};

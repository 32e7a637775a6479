//! Error handling for the call multiplexer
//!
//! Packet-boundary outcomes are not errors: they are reported through
//! [`crate::types::DeliveryStatus`]. The error type here covers collaborator
//! and configuration failures surfaced by the non-hot-path APIs.

use thiserror::Error;

/// Result type alias for call-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for call-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid call or stream configuration
    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },

    /// A packet could not be parsed
    #[error("Packet parse failed: {reason}")]
    PacketParse { reason: String },

    /// Payload type is not registered with the receiver
    #[error("Unknown payload type: {payload_type}")]
    UnknownPayloadType { payload_type: u8 },

    /// The RED/FEC receiver rejected a packet
    #[error("FEC processing failed: {reason}")]
    FecError { reason: String },

    /// A media sink rejected a depacketized payload
    #[error("Media sink rejected payload: {reason}")]
    MediaSink { reason: String },
}

impl Error {
    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig { details: details.into() }
    }

    /// Create a new packet parse error
    pub fn packet_parse(reason: impl Into<String>) -> Self {
        Self::PacketParse { reason: reason.into() }
    }

    /// Create a new FEC error
    pub fn fec(reason: impl Into<String>) -> Self {
        Self::FecError { reason: reason.into() }
    }

    /// Create a new media sink error
    pub fn media_sink(reason: impl Into<String>) -> Self {
        Self::MediaSink { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownPayloadType { payload_type: 96 };
        assert!(format!("{}", err).contains("96"));

        let err = Error::invalid_config("min above start");
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}

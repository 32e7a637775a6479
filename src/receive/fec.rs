//! RED/ULPFEC receiver seam.
//!
//! The ingress pipeline feeds RED-encapsulated packets here and re-enters
//! whatever the receiver yields through its recovered-packet path. The
//! default implementation unwraps RFC 2198 blocks and accounts FEC
//! payloads; loss reconstruction itself sits behind the trait so a full
//! decoder can be dropped in.

use crate::error::{Error, Result};
use crate::packet::RtpHeader;
use crate::types::PayloadType;

/// Counters kept by a FEC receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FecPacketCounter {
    /// RED packets received
    pub num_packets: u64,

    /// FEC payloads among them
    pub num_fec_packets: u64,

    /// Packets handed back through the recovered path
    pub num_recovered_packets: u64,
}

/// Receiver for RED-encapsulated packets
pub trait FecReceiver: Send {
    /// Feed one RED packet
    fn add_received_red_packet(
        &mut self,
        header: &RtpHeader,
        packet: &[u8],
        ulpfec_payload_type: Option<PayloadType>,
    ) -> Result<()>;

    /// Process buffered packets; returns full RTP packets to re-enter the
    /// receive pipeline
    fn process_received_fec(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Current counters
    fn packet_counter(&self) -> FecPacketCounter;
}

/// Default ULPFEC receiver: RED unwrapping and FEC accounting
#[derive(Debug, Default)]
pub struct UlpfecReceiver {
    pending: Vec<Vec<u8>>,
    counter: FecPacketCounter,
}

impl UlpfecReceiver {
    /// Create an empty receiver
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a plain RTP packet for one RED block
    fn rebuild_packet(header: &RtpHeader, packet: &[u8], payload_type: PayloadType, block: &[u8]) -> Vec<u8> {
        let mut rebuilt = Vec::with_capacity(header.header_length + block.len());
        rebuilt.extend_from_slice(&packet[..header.header_length]);
        rebuilt[0] &= !0x20; // padding already stripped
        rebuilt[1] = (rebuilt[1] & 0x80) | (payload_type & 0x7f);
        rebuilt.extend_from_slice(block);
        rebuilt
    }
}

impl FecReceiver for UlpfecReceiver {
    fn add_received_red_packet(
        &mut self,
        header: &RtpHeader,
        packet: &[u8],
        ulpfec_payload_type: Option<PayloadType>,
    ) -> Result<()> {
        self.counter.num_packets += 1;

        let payload_end = packet.len() - header.padding_length;
        if header.header_length >= payload_end {
            return Err(Error::fec("RED packet without payload"));
        }
        let red_payload = &packet[header.header_length..payload_end];

        // Walk the RFC 2198 block headers: 4 bytes per redundant block,
        // one byte for the final (primary) block.
        let mut block_headers = Vec::new();
        let mut offset = 0;
        loop {
            let byte = *red_payload
                .get(offset)
                .ok_or_else(|| Error::fec("truncated RED header"))?;
            let payload_type = byte & 0x7f;
            if byte & 0x80 == 0 {
                block_headers.push((payload_type, None));
                offset += 1;
                break;
            }
            let length_bytes = red_payload
                .get(offset + 2..offset + 4)
                .ok_or_else(|| Error::fec("truncated RED block header"))?;
            let block_length =
                ((length_bytes[0] as usize & 0x03) << 8) | length_bytes[1] as usize;
            block_headers.push((payload_type, Some(block_length)));
            offset += 4;
        }

        let mut data = &red_payload[offset..];
        for (index, (payload_type, block_length)) in block_headers.iter().enumerate() {
            let block = match block_length {
                Some(len) => {
                    if data.len() < *len {
                        return Err(Error::fec("RED block exceeds payload"));
                    }
                    let (block, rest) = data.split_at(*len);
                    data = rest;
                    block
                }
                // The primary block runs to the end of the payload.
                None => std::mem::take(&mut data),
            };
            if Some(*payload_type) == ulpfec_payload_type {
                self.counter.num_fec_packets += 1;
                continue;
            }
            // Redundant media blocks carry earlier timestamps the rebuilt
            // header cannot express; only the primary block is re-emitted.
            if index + 1 < block_headers.len() {
                continue;
            }
            self.pending
                .push(Self::rebuild_packet(header, packet, *payload_type, block));
        }
        Ok(())
    }

    fn process_received_fec(&mut self) -> Result<Vec<Vec<u8>>> {
        let recovered = std::mem::take(&mut self.pending);
        self.counter.num_recovered_packets += recovered.len() as u64;
        Ok(recovered)
    }

    fn packet_counter(&self) -> FecPacketCounter {
        self.counter
    }
}

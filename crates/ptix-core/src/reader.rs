//! Paginated structured reads.
//!
//! Each page request is `preamble ++ [seq_hi, seq_lo]`; the device answers
//! with an ACK carrying the page, and with anything else once the data runs
//! out.

use std::time::Duration;

use tracing::{debug, trace};

use crate::protocol::{Packet, PacketType};
use crate::transport::PrinterPort;

/// Reads a structured record page by page.
pub struct StructuredReader<'a, P: PrinterPort + ?Sized> {
    port: &'a mut P,
    timeout: Duration,
}

impl<'a, P: PrinterPort + ?Sized> StructuredReader<'a, P> {
    pub fn new(port: &'a mut P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Request pages until the device stops acknowledging.
    ///
    /// Zero pages is a valid, empty result.
    pub fn read(&mut self, preamble: &[u8]) -> Packet {
        let mut data = Vec::new();
        let mut sequence: u16 = 0;
        let mut pages = 0usize;

        loop {
            let mut request = self.port.empty();
            request.append(preamble);
            request.append(&sequence.to_be_bytes());

            if !self.port.write(&request) {
                debug!(sequence, "Structured read request not sent");
                break;
            }
            let response = self.port.read(self.timeout);
            let kind = response.validated_type();
            if kind != PacketType::PositiveAck {
                trace!(sequence, response = %kind, "Structured read finished");
                break;
            }

            data.extend_from_slice(response.extract_payload().as_bytes());
            pages += 1;
            sequence = sequence.wrapping_add(1);
        }

        debug!(pages, bytes = data.len(), "Structured read complete");
        let mut result = self.port.empty();
        result.append(&data);
        result
    }
}

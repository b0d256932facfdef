//! Mock printer port for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::PrinterPort;
use crate::protocol::constants::{
    CONTROL_ACK, CONTROL_NAK, CONTROL_SEQUENCE_ERROR, PTIX_PRODUCT_ID, PTIX_VENDOR_ID,
};
use crate::protocol::Packet;

/// Mock port for unit testing protocol logic.
///
/// Clones share queues and logs, so a test can keep a handle while the
/// printer under test owns another.
#[derive(Clone)]
pub struct MockPort {
    /// Queued raw responses returned on read.
    responses: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Response used once the queue is empty. `None` means timeout.
    fallback: Arc<Mutex<Option<Vec<u8>>>>,
    /// Captured writes, packaged.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Number of read calls.
    reads: Arc<Mutex<usize>>,
    /// Whether the device is "connected".
    connected: Arc<Mutex<bool>>,
    open: bool,
    vid: u16,
    pid: u16,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(None)),
            write_log: Arc::new(Mutex::new(Vec::new())),
            reads: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
            open: true,
            vid: PTIX_VENDOR_ID,
            pid: PTIX_PRODUCT_ID,
        }
    }

    /// Framed positive acknowledgement carrying `payload`.
    pub fn ack_frame(payload: &[u8]) -> Vec<u8> {
        let mut packet = Packet::from_bytes(&[CONTROL_ACK]);
        packet.append(payload);
        packet.packaged().into_bytes()
    }

    /// Framed negative acknowledgement.
    pub fn nak_frame() -> Vec<u8> {
        Packet::from_bytes(&[CONTROL_NAK]).packaged().into_bytes()
    }

    /// Framed sequence error.
    pub fn sequence_error_frame() -> Vec<u8> {
        Packet::from_bytes(&[CONTROL_SEQUENCE_ERROR])
            .packaged()
            .into_bytes()
    }

    /// Queue a raw response to be returned on the next read.
    pub fn queue_response(&self, raw: &[u8]) {
        self.responses.lock().unwrap().push_back(raw.to_vec());
    }

    /// Queue a positive acknowledgement carrying `payload`.
    pub fn queue_ack(&self, payload: &[u8]) {
        self.queue_response(&Self::ack_frame(payload));
    }

    /// Queue a read timeout.
    pub fn queue_timeout(&self) {
        self.queue_response(&[]);
    }

    /// Answer every unqueued read with `raw`.
    pub fn respond_always(&self, raw: &[u8]) {
        *self.fallback.lock().unwrap() = Some(raw.to_vec());
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Number of reads performed.
    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl PrinterPort for MockPort {
    fn open(&mut self) -> bool {
        self.open = self.connected();
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open && self.connected()
    }

    fn write(&mut self, packet: &Packet) -> bool {
        if !self.is_open() {
            return false;
        }
        let framed = packet.clone().packaged();
        if !framed.is_packaged() {
            return false;
        }
        self.write_log.lock().unwrap().push(framed.into_bytes());
        true
    }

    fn read(&mut self, _timeout: Duration) -> Packet {
        *self.reads.lock().unwrap() += 1;
        if !self.is_open() {
            return Packet::new();
        }
        let queued = self.responses.lock().unwrap().pop_front();
        match queued.or_else(|| self.fallback.lock().unwrap().clone()) {
            Some(raw) => Packet::from(raw),
            None => Packet::new(),
        }
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

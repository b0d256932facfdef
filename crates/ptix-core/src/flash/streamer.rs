//! Flash stream state machine.
//!
//! Sends a prepared packet queue one round-trip at a time, retrying on
//! anything but a positive acknowledgement. Retries are counted across the
//! whole operation; once they exceed the limit the stream gives up. After the
//! queue drains the device's expected and actual image checksums are compared.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use super::packetizer::skip_to_next_block;
use super::{FlashState, FlashTracker};
use crate::events::{LogLevel, Phase, PtixEvent, PtixObserver};
use crate::parsers::ParserRegistry;
use crate::protocol::constants::{
    CHECKSUM_SUBCOMMAND, Command, DEFAULT_RETRY_LIMIT, FLASH_TIMEOUT_MS,
};
use crate::protocol::{Packet, PacketType};
use crate::status::ReturnCode;
use crate::transport::PrinterPort;

/// Operation name used in progress events.
pub const FLASH_OPERATION: &str = "flash";

/// Streams a packet queue to the device.
pub struct FlashStreamer<'a, P: PrinterPort + ?Sized, O: PtixObserver + ?Sized> {
    port: &'a mut P,
    observer: &'a O,
    retry_limit: u32,
    timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
    tracker: Option<FlashTracker>,
}

impl<'a, P: PrinterPort + ?Sized, O: PtixObserver + ?Sized> FlashStreamer<'a, P, O> {
    pub fn new(port: &'a mut P, observer: &'a O) -> Self {
        Self {
            port,
            observer,
            retry_limit: DEFAULT_RETRY_LIMIT,
            timeout: Duration::from_millis(FLASH_TIMEOUT_MS),
            cancel: None,
            tracker: None,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort at the next round-trip once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Counters from the last `stream` call.
    pub fn tracker(&self) -> Option<&FlashTracker> {
        self.tracker.as_ref()
    }

    /// Send every packet in `packets`, then verify the device checksums.
    #[instrument(skip(self, packets), fields(packets = packets.len()))]
    pub fn stream(&mut self, packets: Vec<Packet>) -> ReturnCode {
        if packets.is_empty() {
            warn!("Flash requested with an empty packet queue");
            return ReturnCode::InvalidRequestPayload;
        }

        let total = packets.len();
        let mut queue = VecDeque::from(packets);
        let mut tracker = FlashTracker::new(self.retry_limit);
        self.phase(Phase::Idle, Phase::Flashing);
        self.log(LogLevel::Info, format!("Flashing {} packets", total));

        let mut current = queue.pop_front();
        let mut state = FlashState::Next;
        let mut acked = 0usize;

        while !state.is_terminal() {
            if self.cancelled() {
                self.log(LogLevel::Warn, "Flash cancelled".to_string());
                return self.finish(tracker, FlashState::Giveup, ReturnCode::OperationAborted);
            }

            if state == FlashState::SkipThisBlock {
                match skip_to_next_block(&mut queue) {
                    Ok(Some(packet)) => {
                        current = Some(packet);
                        state = FlashState::Next;
                    }
                    Ok(None) => {
                        current = None;
                        state = FlashState::Success;
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Packet queue is inconsistent");
                        self.log(LogLevel::Error, format!("Flash aborted: {}", e));
                        return self.finish(
                            tracker,
                            FlashState::Giveup,
                            ReturnCode::OperationAborted,
                        );
                    }
                }
            }

            let Some(packet) = current.as_ref() else {
                state = FlashState::Success;
                continue;
            };

            let response = self.round_trip(packet);
            match response.validated_type() {
                PacketType::PositiveAck => {
                    tracker.record_sent(packet.len());
                    acked += 1;
                    self.observer.on_event(&PtixEvent::Progress {
                        operation: FLASH_OPERATION.to_string(),
                        fraction: acked as f64 / total as f64,
                    });
                    current = queue.pop_front();
                    state = if current.is_some() {
                        FlashState::Next
                    } else {
                        FlashState::Success
                    };
                }
                PacketType::Timeout => {
                    tracker.record_timeout();
                    state = FlashState::Retry;
                    self.log(
                        LogLevel::Warn,
                        format!("Timeout on packet {}/{}, retrying", acked + 1, total),
                    );
                }
                other => {
                    tracker.record_retry();
                    state = FlashState::Retry;
                    self.log(
                        LogLevel::Warn,
                        format!("{} on packet {}/{}, retrying", other, acked + 1, total),
                    );
                }
            }
            tracker.set_state(state);

            if tracker.budget_exhausted() {
                error!(
                    retries = tracker.retries(),
                    limit = tracker.retry_limit(),
                    "Retry budget exhausted"
                );
                self.log(
                    LogLevel::Error,
                    format!("Flash failed after {} retries", tracker.retries()),
                );
                return self.finish(tracker, FlashState::Giveup, ReturnCode::OperationAborted);
            }
        }

        self.phase(Phase::Flashing, Phase::Verifying);
        let code = self.reconcile_checksums();
        self.finish(tracker, FlashState::Success, code)
    }

    fn round_trip(&mut self, packet: &Packet) -> Packet {
        if !self.port.write(packet) {
            debug!("Write failed, treating as timeout");
            return Packet::new();
        }
        self.port.read(self.timeout)
    }

    fn reconcile_checksums(&mut self) -> ReturnCode {
        let expected = self.query_checksum(Command::GetExpectedCsum);
        let actual = self.query_checksum(Command::GetActualCsum);
        match (expected, actual) {
            (Some(expected), Some(actual)) if expected == actual => {
                info!(checksum = %format!("0x{:08X}", actual), "Device checksum verified");
                ReturnCode::Okay
            }
            _ => {
                warn!(?expected, ?actual, "Device checksum mismatch");
                self.log(LogLevel::Error, "Device checksum mismatch".to_string());
                ReturnCode::FlashChecksumMismatch
            }
        }
    }

    fn query_checksum(&mut self, command: Command) -> Option<u32> {
        let request = self.port.package(&[command.code(), CHECKSUM_SUBCOMMAND]);
        let response = self.round_trip(&request);
        if !response.is_valid_ack() {
            debug!(%command, response = %response.validated_type(), "Checksum query not acknowledged");
            return None;
        }
        ParserRegistry::global()
            .parse::<u32>(&response.extract_payload())
            .ok()
            .flatten()
    }

    fn finish(&mut self, mut tracker: FlashTracker, state: FlashState, code: ReturnCode) -> ReturnCode {
        tracker.stop(state);
        info!(result = %code, summary = %tracker, "Flash finished");
        if code.is_okay() {
            self.phase(Phase::Verifying, Phase::Complete);
            self.observer.on_event(&PtixEvent::Complete);
        } else {
            let from = if state == FlashState::Success {
                Phase::Verifying
            } else {
                Phase::Flashing
            };
            self.phase(from, Phase::Error);
        }
        self.tracker = Some(tracker);
        code
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn phase(&self, from: Phase, to: Phase) {
        self.observer.on_event(&PtixEvent::PhaseChanged { from, to });
    }

    fn log(&self, level: LogLevel, message: String) {
        self.observer.on_event(&PtixEvent::Log { level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::transport::MockPort;

    fn queue(port: &MockPort, n: u8) -> Vec<Packet> {
        (0..n).map(|i| port.package(&[0x55, i, 0xA0 + i])).collect()
    }

    #[test]
    fn test_empty_queue_does_no_io() {
        let mut port = MockPort::new();
        let handle = port.clone();
        let code = FlashStreamer::new(&mut port, &NullObserver).stream(Vec::new());
        assert_eq!(code, ReturnCode::InvalidRequestPayload);
        assert!(handle.get_writes().is_empty());
        assert_eq!(handle.read_count(), 0);
    }

    #[test]
    fn test_always_timeout_gives_up_after_limit_plus_one() {
        let mut port = MockPort::new();
        let handle = port.clone();
        let packets = queue(&handle, 3);
        let mut streamer = FlashStreamer::new(&mut port, &NullObserver).with_retry_limit(5);
        assert_eq!(streamer.stream(packets), ReturnCode::OperationAborted);

        let tracker = streamer.tracker().unwrap();
        assert_eq!(tracker.state(), FlashState::Giveup);
        assert_eq!(tracker.timeouts(), 6);
        assert_eq!(tracker.retries(), 6);
        assert_eq!(handle.get_writes().len(), 6);
        assert_eq!(handle.read_count(), 6);
        // Every attempt resends the first packet.
        assert!(handle.get_writes().iter().all(|w| w[2] == 0));
    }

    #[test]
    fn test_happy_path_reports_progress_and_verifies() {
        let mut port = MockPort::new();
        let handle = port.clone();
        for _ in 0..3 {
            handle.queue_ack(&[]);
        }
        handle.queue_ack(&[0x12, 0x34, 0x56, 0x78]);
        handle.queue_ack(&[0x12, 0x34, 0x56, 0x78]);

        let observer = RecordingObserver::default();
        let packets = queue(&handle, 3);
        let mut streamer = FlashStreamer::new(&mut port, &observer);
        assert_eq!(streamer.stream(packets), ReturnCode::Okay);

        let writes = handle.get_writes();
        assert_eq!(writes.len(), 5);
        assert_eq!(&writes[3][1..3], &[0x85, 0x11]);
        assert_eq!(&writes[4][1..3], &[0x95, 0x11]);

        let progress = observer.progress(FLASH_OPERATION);
        assert_eq!(progress.len(), 3);
        for (i, fraction) in progress.iter().enumerate() {
            assert!((fraction - (i + 1) as f64 / 3.0).abs() < 1e-9);
        }
        assert!(observer.events().contains(&PtixEvent::Complete));

        let tracker = streamer.tracker().unwrap();
        assert_eq!(tracker.state(), FlashState::Success);
        assert_eq!(tracker.packets_sent(), 3);
        assert_eq!(tracker.retries(), 0);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut port = MockPort::new();
        let handle = port.clone();
        handle.queue_ack(&[]);
        handle.queue_ack(&[0, 0, 0, 1]);
        handle.queue_ack(&[0, 0, 0, 2]);
        let packets = queue(&handle, 1);
        let code = FlashStreamer::new(&mut port, &NullObserver).stream(packets);
        assert_eq!(code, ReturnCode::FlashChecksumMismatch);
    }

    #[test]
    fn test_unanswered_checksum_is_mismatch() {
        let mut port = MockPort::new();
        let handle = port.clone();
        handle.queue_ack(&[]);
        handle.queue_response(&MockPort::nak_frame());
        handle.queue_response(&MockPort::nak_frame());
        let packets = queue(&handle, 1);
        let code = FlashStreamer::new(&mut port, &NullObserver).stream(packets);
        assert_eq!(code, ReturnCode::FlashChecksumMismatch);
    }

    #[test]
    fn test_nak_retries_same_packet() {
        let mut port = MockPort::new();
        let handle = port.clone();
        handle.queue_response(&MockPort::nak_frame());
        handle.queue_response(&MockPort::sequence_error_frame());
        handle.queue_timeout();
        handle.queue_ack(&[]);
        handle.queue_ack(&[0, 0, 0, 9]);
        handle.queue_ack(&[0, 0, 0, 9]);

        let packets = queue(&handle, 1);
        let mut streamer = FlashStreamer::new(&mut port, &NullObserver);
        assert_eq!(streamer.stream(packets), ReturnCode::Okay);

        let tracker = streamer.tracker().unwrap();
        assert_eq!(tracker.retries(), 3);
        assert_eq!(tracker.timeouts(), 1);
        let writes = handle.get_writes();
        assert_eq!(writes.len(), 6);
        assert!(writes[..4].iter().all(|w| w == &writes[0]));
    }

    #[test]
    fn test_retries_are_cumulative() {
        let mut port = MockPort::new();
        let handle = port.clone();
        // Three failures before each of two packets: 6 retries > limit of 5.
        for _ in 0..3 {
            handle.queue_response(&MockPort::nak_frame());
        }
        handle.queue_ack(&[]);
        for _ in 0..3 {
            handle.queue_response(&MockPort::nak_frame());
        }
        let packets = queue(&handle, 2);
        let code = FlashStreamer::new(&mut port, &NullObserver).stream(packets);
        assert_eq!(code, ReturnCode::OperationAborted);
        assert_eq!(handle.get_writes().len(), 7);
    }

    #[test]
    fn test_garbled_ack_is_retried() {
        let mut port = MockPort::new();
        let handle = port.clone();
        let mut garbled = MockPort::ack_frame(&[]);
        let last = garbled.len() - 1;
        garbled[last] ^= 0x5A;
        handle.respond_always(&garbled);

        let packets = queue(&handle, 3);
        let mut streamer = FlashStreamer::new(&mut port, &NullObserver).with_retry_limit(5);
        assert_eq!(streamer.stream(packets), ReturnCode::OperationAborted);

        let tracker = streamer.tracker().unwrap();
        assert_eq!(tracker.packets_sent(), 0);
        assert_eq!(tracker.retries(), 6);
        assert_eq!(tracker.timeouts(), 0);
        assert!(handle.get_writes().iter().all(|w| w[2] == 0));
    }

    #[test]
    fn test_garbled_checksum_reply_is_mismatch() {
        let mut port = MockPort::new();
        let handle = port.clone();
        handle.queue_ack(&[]);
        handle.queue_ack(&[0, 0, 0, 7]);
        let mut garbled = MockPort::ack_frame(&[0, 0, 0, 7]);
        garbled[2] ^= 0x01;
        handle.queue_response(&garbled);

        let packets = queue(&handle, 1);
        let code = FlashStreamer::new(&mut port, &NullObserver).stream(packets);
        assert_eq!(code, ReturnCode::FlashChecksumMismatch);
    }

    #[test]
    fn test_write_failure_counts_as_timeout() {
        let mut port = MockPort::new();
        let handle = port.clone();
        handle.disconnect();
        let packets = queue(&handle, 2);
        let mut streamer = FlashStreamer::new(&mut port, &NullObserver);
        assert_eq!(streamer.stream(packets), ReturnCode::OperationAborted);
        assert_eq!(streamer.tracker().unwrap().timeouts(), 6);
        assert_eq!(handle.read_count(), 0);
    }

    #[test]
    fn test_cancel_stops_before_io() {
        let mut port = MockPort::new();
        let handle = port.clone();
        let flag = Arc::new(AtomicBool::new(true));
        let packets = queue(&handle, 2);
        let observer = RecordingObserver::default();
        let code = FlashStreamer::new(&mut port, &observer)
            .with_cancel(flag)
            .stream(packets);
        assert_eq!(code, ReturnCode::OperationAborted);
        assert!(handle.get_writes().is_empty());
        assert!(observer.events().contains(&PtixEvent::PhaseChanged {
            from: Phase::Flashing,
            to: Phase::Error,
        }));
    }
}

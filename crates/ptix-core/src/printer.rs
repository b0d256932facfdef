//! Printer facade: high-level operations over a port.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::events::{Phase, PtixEvent, PtixObserver, TracingObserver};
use crate::firmware::{FirmwareError, FirmwareImage};
use crate::flash::{FlashStreamer, FlashTracker, firmware_packets, logo_packets};
use crate::parsers::{LifetimeTelemetry, ParserRegistry, PowerupTelemetry, Revlev, SerialConfig};
use crate::protocol::constants::{Command, TELEMETRY_LIFETIME, TELEMETRY_POWERUP};
use crate::protocol::{Packet, PacketType};
use crate::reader::StructuredReader;
use crate::status::ReturnCode;
use crate::transport::PrinterPort;

#[cfg(feature = "hid")]
use crate::transport::HidPort;

/// One printer session over an exclusively owned port.
pub struct Printer<P: PrinterPort, O: PtixObserver = TracingObserver> {
    port: P,
    observer: Arc<O>,
    config: PrinterConfig,
    registry: &'static ParserRegistry,
    cancel: Arc<AtomicBool>,
    last_flash: Option<FlashTracker>,
}

#[cfg(feature = "hid")]
impl Printer<HidPort, TracingObserver> {
    /// Printer on the HID device described by `config`. Call `connect` to open it.
    pub fn hid(config: PrinterConfig) -> Self {
        let port = HidPort::new(&config);
        Self::new(port, config)
    }
}

impl<P: PrinterPort> Printer<P, TracingObserver> {
    pub fn new(port: P, config: PrinterConfig) -> Self {
        Self::with_observer(port, config, Arc::new(TracingObserver))
    }
}

impl<P: PrinterPort, O: PtixObserver> Printer<P, O> {
    pub fn with_observer(port: P, config: PrinterConfig, observer: Arc<O>) -> Self {
        Self {
            port,
            observer,
            config,
            registry: ParserRegistry::global(),
            cancel: Arc::new(AtomicBool::new(false)),
            last_flash: None,
        }
    }

    /// Use `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: &'static ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Setting the returned flag aborts a running flash at its next round-trip.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Counters from the most recent flash operation.
    pub fn last_flash(&self) -> Option<&FlashTracker> {
        self.last_flash.as_ref()
    }

    #[instrument(skip(self), fields(vid = format!("{:04X}", self.port.vendor_id()), pid = format!("{:04X}", self.port.product_id())))]
    pub fn connect(&mut self) -> bool {
        self.phase(Phase::Idle, Phase::Connecting);
        if self.port.open() {
            info!("Printer connected");
            self.observer.on_event(&PtixEvent::DeviceConnected {
                vid: self.port.vendor_id(),
                pid: self.port.product_id(),
            });
            self.phase(Phase::Connecting, Phase::Idle);
            true
        } else {
            warn!("Printer not found");
            self.phase(Phase::Connecting, Phase::Error);
            false
        }
    }

    pub fn disconnect(&mut self) {
        if self.port.is_open() {
            self.port.close();
            self.observer.on_event(&PtixEvent::DeviceDisconnected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_open()
    }

    pub fn ping(&mut self) -> ReturnCode {
        self.send_config(&[Command::Ping.code()])
    }

    pub fn reboot(&mut self) -> ReturnCode {
        self.send_config(&[Command::Reboot.code()])
    }

    /// Send one request and expect a positive acknowledgement.
    pub fn send_config(&mut self, request: &[u8]) -> ReturnCode {
        let response = self.transact(request);
        let kind = response.validated_type();
        debug!(command = %format!("0x{:02X}", request.first().copied().unwrap_or(0)), response = %kind, "Command round-trip");
        ReturnCode::from_ack(kind == PacketType::PositiveAck)
    }

    /// Firmware revision. `0.0.0` when the printer does not answer.
    pub fn get_revlev(&mut self) -> Revlev {
        let response = self.transact(&[Command::GetRevlev.code()]);
        if !response.is_valid_ack() {
            return Revlev::default();
        }
        self.parse::<Revlev>(&response.extract_payload())
            .unwrap_or_default()
    }

    pub fn get_telemetry_powerup(&mut self) -> Option<PowerupTelemetry> {
        let data = self.read_structured(&[Command::GetTelemetry.code(), TELEMETRY_POWERUP]);
        self.parse(&data)
    }

    pub fn get_telemetry_lifetime(&mut self) -> Option<LifetimeTelemetry> {
        let data = self.read_structured(&[Command::GetTelemetry.code(), TELEMETRY_LIFETIME]);
        self.parse(&data)
    }

    /// Paginated read of the record selected by `preamble`.
    pub fn read_structured(&mut self, preamble: &[u8]) -> Packet {
        let timeout = self.config.structured_timeout();
        StructuredReader::new(&mut self.port, timeout).read(preamble)
    }

    pub fn get_serial_config(&mut self) -> Option<SerialConfig> {
        let data = self.read_structured(&[Command::GetSerialConfig.code()]);
        self.parse(&data)
    }

    /// Read the serial settings, let `edit` change them, write them back.
    pub fn update_serial_config<F>(&mut self, edit: F) -> ReturnCode
    where
        F: FnOnce(&mut SerialConfig),
    {
        let Some(mut serial) = self.get_serial_config() else {
            warn!("Serial config read returned nothing");
            return ReturnCode::TargetStoppedResponding;
        };
        edit(&mut serial);
        info!(config = %serial, "Writing serial config");

        let mut request = vec![Command::SetSerialConfig.code()];
        request.extend_from_slice(&serial.to_bytes());
        self.send_config(&request)
    }

    /// Flash a `.ptix` firmware file.
    pub fn flash_update<Q: AsRef<Path>>(&mut self, path: Q) -> Result<ReturnCode, FirmwareError> {
        let image = FirmwareImage::load(path)?;
        Ok(self.flash_image(&image))
    }

    /// Flash a `.ptix` image already in memory.
    pub fn flash_update_bytes(&mut self, data: Vec<u8>) -> ReturnCode {
        self.flash_image(&FirmwareImage::from_bytes(data))
    }

    #[instrument(skip(self, image), fields(size = image.len()))]
    fn flash_image(&mut self, image: &FirmwareImage) -> ReturnCode {
        let header = image.header();
        let payload = match image.verified_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Rejecting firmware file");
                return ReturnCode::FlashFileInvalid;
            }
        };
        if let Some(model) = self.config.model.filter(|&m| m != header.model) {
            warn!(
                expected = %format!("0x{:08X}", model),
                actual = %format!("0x{:08X}", header.model),
                "Firmware built for another model"
            );
            return ReturnCode::FlashPermissionDenied;
        }

        match firmware_packets(&self.port, header, payload) {
            Ok(packets) => self.stream_flash_data(packets),
            Err(e) => {
                warn!(error = %e, "Firmware packetizing failed");
                ReturnCode::OperationAborted
            }
        }
    }

    /// Flash encoded logo bytes to the region tagged `tag`.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub fn flash_logo(&mut self, data: &[u8], tag: u8, start_address: u32) -> ReturnCode {
        match logo_packets(&self.port, data, tag, start_address) {
            Ok(packets) => self.stream_flash_data(packets),
            Err(e) => {
                warn!(error = %e, "Logo packetizing failed");
                ReturnCode::OperationAborted
            }
        }
    }

    /// Stream a prepared packet queue.
    pub fn stream_flash_data(&mut self, packets: Vec<Packet>) -> ReturnCode {
        self.cancel.store(false, Ordering::Relaxed);
        let mut streamer = FlashStreamer::new(&mut self.port, self.observer.as_ref())
            .with_retry_limit(self.config.retry_limit)
            .with_timeout(self.config.flash_timeout())
            .with_cancel(self.cancel.clone());
        let code = streamer.stream(packets);
        let tracker = streamer.tracker().cloned();
        self.last_flash = tracker;
        code
    }

    fn transact(&mut self, request: &[u8]) -> Packet {
        let packet = self.port.package(request);
        if !self.port.write(&packet) {
            return Packet::new();
        }
        self.port.read(self.config.read_timeout())
    }

    fn parse<R: 'static>(&self, packet: &Packet) -> Option<R> {
        match self.registry.parse::<R>(packet) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Parser lookup failed");
                None
            }
        }
    }

    fn phase(&self, from: Phase, to: Phase) {
        self.observer.on_event(&PtixEvent::PhaseChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::firmware::PTIX_HEADER_LEN;
    use crate::firmware::test_support::{TEST_MODEL, build_image};
    use crate::parsers::{Handshake, Parity, TelemetryCore};
    use crate::protocol::constants::{FIRMWARE_BLOCK_SIZE, FIRMWARE_SEGMENT_SIZE};
    use crate::transport::MockPort;

    fn printer() -> (Printer<MockPort, RecordingObserver>, MockPort, Arc<RecordingObserver>) {
        let port = MockPort::new();
        let handle = port.clone();
        let observer = Arc::new(RecordingObserver::default());
        let printer = Printer::with_observer(port, PrinterConfig::default(), observer.clone());
        (printer, handle, observer)
    }

    #[test]
    fn test_connect_emits_events() {
        let (mut printer, _, observer) = printer();
        assert!(printer.connect());
        assert!(observer.events().contains(&PtixEvent::DeviceConnected {
            vid: 0x0425,
            pid: 0x8147
        }));

        printer.disconnect();
        assert!(!printer.is_connected());
        assert!(observer.events().contains(&PtixEvent::DeviceDisconnected));
    }

    #[test]
    fn test_connect_fails_without_device() {
        let (mut printer, handle, observer) = printer();
        handle.disconnect();
        assert!(!printer.connect());
        assert!(observer.events().contains(&PtixEvent::PhaseChanged {
            from: Phase::Connecting,
            to: Phase::Error
        }));
    }

    #[test]
    fn test_ping_and_reboot() {
        let (mut printer, handle, _) = printer();
        handle.queue_ack(&[]);
        assert_eq!(printer.ping(), ReturnCode::Okay);
        handle.queue_response(&MockPort::nak_frame());
        assert_eq!(printer.reboot(), ReturnCode::ExecutionFailure);
        assert_eq!(printer.ping(), ReturnCode::ExecutionFailure);

        let writes = handle.get_writes();
        assert_eq!(writes[0], vec![0x02, 0x75, 0x77]);
        assert_eq!(writes[1], vec![0x02, 0x25, 0x27]);
    }

    #[test]
    fn test_get_revlev() {
        let (mut printer, handle, _) = printer();
        handle.queue_ack(&[0, 2, 0, 7, 0, 0, 0x10, 0x00]);
        assert_eq!(printer.get_revlev(), Revlev::new(2, 7, 0x1000));

        // Not connected: zero revision.
        assert!(printer.get_revlev().is_zero());

        handle.queue_ack(&[1, 2, 3]);
        assert!(printer.get_revlev().is_zero());
    }

    #[test]
    fn test_get_revlev_ignores_garbled_ack() {
        let (mut printer, handle, _) = printer();
        let mut garbled = MockPort::ack_frame(&[0, 2, 0, 7, 0, 0, 0x10, 0x00]);
        let last = garbled.len() - 1;
        garbled[last] ^= 0x5A;
        handle.queue_response(&garbled);
        assert!(printer.get_revlev().is_zero());

        handle.queue_response(&garbled);
        assert_eq!(printer.ping(), ReturnCode::ExecutionFailure);
    }

    #[test]
    fn test_telemetry_powerup_across_pages() {
        let (mut printer, handle, _) = printer();
        let mut record = Vec::new();
        for value in 1..=10u32 {
            record.extend_from_slice(&value.to_be_bytes());
        }
        handle.queue_ack(&record[..24]);
        handle.queue_ack(&record[24..]);
        handle.queue_response(&MockPort::nak_frame());

        let telemetry = printer.get_telemetry_powerup().unwrap();
        assert_eq!(telemetry.core.paper_moved_mm, 1);
        assert_eq!(telemetry.core.avg_cut_time_ms, 10);
        assert_eq!(&handle.get_writes()[0][1..5], &[0x65, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_telemetry_lifetime() {
        let (mut printer, handle, _) = printer();
        let mut record = vec![0u8; TelemetryCore::SIZE];
        record.extend_from_slice(&3u32.to_be_bytes());
        record.extend_from_slice(&4u32.to_be_bytes());
        record.extend_from_slice(&5u32.to_be_bytes());
        handle.queue_ack(&record[..28]);
        handle.queue_ack(&record[28..]);

        let telemetry = printer.get_telemetry_lifetime().unwrap();
        assert_eq!(telemetry.power_up_count, 3);
        assert_eq!(telemetry.firmware_update_count, 4);
        assert_eq!(telemetry.total_on_seconds, 5);
        assert_eq!(&handle.get_writes()[0][1..3], &[0x65, 0x02]);
    }

    #[test]
    fn test_telemetry_without_reply() {
        let (mut printer, _, _) = printer();
        assert!(printer.get_telemetry_powerup().is_none());
    }

    #[test]
    fn test_update_serial_config() {
        let (mut printer, handle, _) = printer();
        handle.queue_ack(&SerialConfig::default().to_bytes());
        handle.queue_response(&MockPort::nak_frame());
        handle.queue_ack(&[]);

        let code = printer.update_serial_config(|c| {
            c.baud_rate = 115200;
            c.parity = Parity::Even;
            c.handshake = Handshake::RtsCts;
        });
        assert_eq!(code, ReturnCode::Okay);

        let expected = SerialConfig {
            baud_rate: 115200,
            parity: Parity::Even,
            handshake: Handshake::RtsCts,
            ..SerialConfig::default()
        };
        let writes = handle.get_writes();
        let set = writes.last().unwrap();
        assert_eq!(set[1], 0x6D);
        assert_eq!(&set[2..10], &expected.to_bytes());
    }

    #[test]
    fn test_update_serial_config_without_reply() {
        let (mut printer, handle, _) = printer();
        let code = printer.update_serial_config(|c| c.baud_rate = 9600);
        assert_eq!(code, ReturnCode::TargetStoppedResponding);
        // Only the read request went out.
        assert_eq!(handle.get_writes().len(), 1);
    }

    #[test]
    fn test_update_serial_config_write_rejected() {
        let (mut printer, handle, _) = printer();
        handle.queue_ack(&SerialConfig::default().to_bytes());
        handle.queue_response(&MockPort::nak_frame());
        handle.queue_response(&MockPort::nak_frame());
        let code = printer.update_serial_config(|c| c.stop_bits = 2);
        assert_eq!(code, ReturnCode::ExecutionFailure);
    }

    #[test]
    fn test_flash_invalid_file_does_no_io() {
        let (mut printer, handle, _) = printer();
        let mut data = build_image(&[1; 16], 0);
        data[PTIX_HEADER_LEN] ^= 0xFF;
        assert_eq!(printer.flash_update_bytes(data), ReturnCode::FlashFileInvalid);
        assert_eq!(printer.flash_update_bytes(vec![0; 8]), ReturnCode::FlashFileInvalid);
        assert!(handle.get_writes().is_empty());
    }

    #[test]
    fn test_flash_wrong_model_denied() {
        let port = MockPort::new();
        let handle = port.clone();
        let config = PrinterConfig {
            model: Some(TEST_MODEL + 1),
            ..PrinterConfig::default()
        };
        let mut printer = Printer::new(port, config);
        let code = printer.flash_update_bytes(build_image(&[0; 16], 0));
        assert_eq!(code, ReturnCode::FlashPermissionDenied);
        assert!(handle.get_writes().is_empty());
    }

    #[test]
    fn test_flash_update_happy_path() {
        let (mut printer, handle, observer) = printer();
        let packets = 1 + 1 + FIRMWARE_BLOCK_SIZE.div_ceil(FIRMWARE_SEGMENT_SIZE);
        for _ in 0..packets {
            handle.queue_ack(&[]);
        }
        handle.queue_ack(&[0xAB, 0xCD, 0xEF, 0x01]);
        handle.queue_ack(&[0xAB, 0xCD, 0xEF, 0x01]);

        let code = printer.flash_update_bytes(build_image(&[0x42; 100], 0x2000));
        assert_eq!(code, ReturnCode::Okay);
        assert_eq!(handle.get_writes().len(), packets + 2);
        assert_eq!(printer.last_flash().unwrap().packets_sent(), packets);

        let progress = observer.progress(crate::flash::streamer::FLASH_OPERATION);
        assert_eq!(progress.len(), packets);
        assert!((progress[packets - 1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flash_gives_up_on_silent_device() {
        let (mut printer, handle, _) = printer();
        let code = printer.flash_update_bytes(build_image(&[0x42; 10], 0));
        assert_eq!(code, ReturnCode::OperationAborted);
        assert_eq!(handle.get_writes().len(), 6);
        assert_eq!(printer.last_flash().unwrap().timeouts(), 6);
    }

    #[test]
    fn test_flash_update_missing_file() {
        let (mut printer, _, _) = printer();
        let result = printer.flash_update("/nonexistent/update.ptix");
        assert!(matches!(result, Err(FirmwareError::FileRead { .. })));
    }

    #[test]
    fn test_flash_logo() {
        let (mut printer, handle, _) = printer();
        assert_eq!(printer.flash_logo(&[], 1, 0), ReturnCode::InvalidRequestPayload);

        handle.respond_always(&MockPort::ack_frame(&[0, 0, 0, 0]));
        assert_eq!(printer.flash_logo(&[0x11; 64], 2, 0x8000), ReturnCode::Okay);
        let writes = handle.get_writes();
        assert_eq!(&writes[0][1..3], &[0x79, 0x02]);
        assert_eq!(&writes[0][3..7], &0x8000u32.to_be_bytes());
    }
}

//! Telemetry records.
//!
//! Power-up and lifetime telemetry share one leading block of counters;
//! lifetime telemetry appends a few fields of its own. Both are read with a
//! single layout function.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::PacketParser;
use crate::protocol::Packet;

/// Counters common to every telemetry record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryCore {
    pub paper_moved_mm: u32,
    pub ticket_count: u32,
    pub cut_count: u32,
    pub cutter_jam_count: u32,
    pub platen_open_count: u32,
    pub paper_out_count: u32,
    pub button_press_count: u32,
    pub overheat_count: u32,
    pub avg_ticket_length_mm: u32,
    pub avg_cut_time_ms: u32,
}

impl TelemetryCore {
    pub const SIZE: usize = 40;
}

/// Telemetry since the last power-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerupTelemetry {
    pub core: TelemetryCore,
}

/// Telemetry over the life of the printer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifetimeTelemetry {
    pub core: TelemetryCore,
    pub power_up_count: u32,
    pub firmware_update_count: u32,
    pub total_on_seconds: u32,
}

impl LifetimeTelemetry {
    pub const SIZE: usize = TelemetryCore::SIZE + 12;
}

struct LifetimeFields {
    power_up_count: u32,
    firmware_update_count: u32,
    total_on_seconds: u32,
}

fn read_core<R: Read>(r: &mut R) -> std::io::Result<TelemetryCore> {
    Ok(TelemetryCore {
        paper_moved_mm: r.read_u32::<BigEndian>()?,
        ticket_count: r.read_u32::<BigEndian>()?,
        cut_count: r.read_u32::<BigEndian>()?,
        cutter_jam_count: r.read_u32::<BigEndian>()?,
        platen_open_count: r.read_u32::<BigEndian>()?,
        paper_out_count: r.read_u32::<BigEndian>()?,
        button_press_count: r.read_u32::<BigEndian>()?,
        overheat_count: r.read_u32::<BigEndian>()?,
        avg_ticket_length_mm: r.read_u32::<BigEndian>()?,
        avg_cut_time_ms: r.read_u32::<BigEndian>()?,
    })
}

/// Read the core block and, when `lifetime` is set, the trailing lifetime fields.
fn read_layout(bytes: &[u8], lifetime: bool) -> Option<(TelemetryCore, Option<LifetimeFields>)> {
    let needed = if lifetime {
        LifetimeTelemetry::SIZE
    } else {
        TelemetryCore::SIZE
    };
    if bytes.len() < needed {
        return None;
    }

    let mut cursor = Cursor::new(bytes);
    let core = read_core(&mut cursor).ok()?;
    if !lifetime {
        return Some((core, None));
    }
    let extra = LifetimeFields {
        power_up_count: cursor.read_u32::<BigEndian>().ok()?,
        firmware_update_count: cursor.read_u32::<BigEndian>().ok()?,
        total_on_seconds: cursor.read_u32::<BigEndian>().ok()?,
    };
    Some((core, Some(extra)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PowerupTelemetryParser;

impl PacketParser for PowerupTelemetryParser {
    type Output = PowerupTelemetry;

    fn parse(&self, packet: &Packet) -> Option<PowerupTelemetry> {
        let (core, _) = read_layout(packet.as_bytes(), false)?;
        Some(PowerupTelemetry { core })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LifetimeTelemetryParser;

impl PacketParser for LifetimeTelemetryParser {
    type Output = LifetimeTelemetry;

    fn parse(&self, packet: &Packet) -> Option<LifetimeTelemetry> {
        let (core, extra) = read_layout(packet.as_bytes(), true)?;
        let extra = extra?;
        Some(LifetimeTelemetry {
            core,
            power_up_count: extra.power_up_count,
            firmware_update_count: extra.firmware_update_count,
            total_on_seconds: extra.total_on_seconds,
        })
    }
}

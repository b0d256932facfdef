//! Splits a flash image into the packet queue the streamer sends.
//!
//! Each block is announced by a permission request carrying its address and
//! CRC32, then sent as numbered `FlashDo` segments. The sequence number
//! restarts at zero for every block.

use std::collections::VecDeque;

use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use crate::firmware::PtixHeader;
use crate::protocol::constants::{
    Command, FIRMWARE_BLOCK_SIZE, FIRMWARE_SEGMENT_SIZE, LOGO_BLOCK_SIZE, LOGO_SEGMENT_SIZE,
};
use crate::protocol::Packet;
use crate::transport::PrinterPort;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketizeError {
    #[error("Block of {block_size} bytes needs {segments} segments, over the 255 a sequence byte allows")]
    TooManySegments { block_size: usize, segments: usize },

    #[error("{len} bytes from 0x{start:08X} run past the end of the address space")]
    AddressOverflow { start: u32, len: usize },

    #[error("Queued packet too short to inspect: {len} bytes")]
    ShortPacket { len: usize },
}

struct BlockPlan<'a> {
    /// Permission request bytes before address and CRC.
    request: &'a [u8],
    block_size: usize,
    segment_size: usize,
    start_address: u32,
}

/// Packets for a firmware update: the ID matrix, then every 0x800-byte block.
pub fn firmware_packets<P: PrinterPort + ?Sized>(
    port: &P,
    header: &PtixHeader,
    payload: &[u8],
) -> Result<Vec<Packet>, PacketizeError> {
    let mut id_matrix = Vec::with_capacity(1 + header.id_matrix.len());
    id_matrix.push(Command::InjectIdMatrix.code());
    id_matrix.extend_from_slice(&header.id_matrix);

    let mut packets = vec![port.package(&id_matrix)];
    packets.extend(block_packets(
        port,
        payload,
        &BlockPlan {
            request: &[Command::FlashRequest.code()],
            block_size: FIRMWARE_BLOCK_SIZE,
            segment_size: FIRMWARE_SEGMENT_SIZE,
            start_address: header.start_address,
        },
    )?);
    debug!(packets = packets.len(), bytes = payload.len(), "Firmware packetized");
    Ok(packets)
}

/// Packets for a logo or other data region tagged `tag`.
pub fn logo_packets<P: PrinterPort + ?Sized>(
    port: &P,
    data: &[u8],
    tag: u8,
    start_address: u32,
) -> Result<Vec<Packet>, PacketizeError> {
    let packets = block_packets(
        port,
        data,
        &BlockPlan {
            request: &[Command::DataWriteRequest.code(), tag],
            block_size: LOGO_BLOCK_SIZE,
            segment_size: LOGO_SEGMENT_SIZE,
            start_address,
        },
    )?;
    debug!(packets = packets.len(), bytes = data.len(), tag, "Logo packetized");
    Ok(packets)
}

fn block_packets<P: PrinterPort + ?Sized>(
    port: &P,
    data: &[u8],
    plan: &BlockPlan<'_>,
) -> Result<Vec<Packet>, PacketizeError> {
    let segments_per_block = plan.block_size.div_ceil(plan.segment_size);
    if segments_per_block > 255 {
        return Err(PacketizeError::TooManySegments {
            block_size: plan.block_size,
            segments: segments_per_block,
        });
    }
    let blocks = data.len().div_ceil(plan.block_size);
    let end = u64::from(plan.start_address) + (blocks as u64) * (plan.block_size as u64);
    if end > u64::from(u32::MAX) + 1 {
        return Err(PacketizeError::AddressOverflow {
            start: plan.start_address,
            len: data.len(),
        });
    }

    let mut packets = Vec::with_capacity(blocks * (1 + segments_per_block));
    let mut rng = rand::rng();
    let mut address = plan.start_address;

    for chunk in data.chunks(plan.block_size) {
        let mut block = chunk.to_vec();
        if block.len() < plan.block_size {
            // Short final block: pad with noise, never zeros.
            let filled = block.len();
            block.resize(plan.block_size, 0);
            rng.fill_bytes(&mut block[filled..]);
        }
        let crc = crc32fast::hash(&block);

        let mut request = Vec::with_capacity(plan.request.len() + 8);
        request.extend_from_slice(plan.request);
        request.extend_from_slice(&address.to_be_bytes());
        request.extend_from_slice(&crc.to_be_bytes());
        packets.push(port.package(&request));

        for (sequence, segment) in block.chunks(plan.segment_size).enumerate() {
            let mut bytes = Vec::with_capacity(2 + segment.len());
            bytes.push(Command::FlashDo.code());
            bytes.push(sequence as u8);
            bytes.extend_from_slice(segment);
            packets.push(port.package(&bytes));
        }

        address = address.wrapping_add(plan.block_size as u32);
    }
    Ok(packets)
}

/// Drop queued packets until the next block request, which is returned.
///
/// `Ok(None)` means the queue ran out. A packet too short to carry a command
/// byte means the queue was built wrongly.
pub fn skip_to_next_block(queue: &mut VecDeque<Packet>) -> Result<Option<Packet>, PacketizeError> {
    let mut skipped = 0usize;
    while let Some(packet) = queue.pop_front() {
        let bytes = packet.as_bytes();
        if bytes.len() < 2 {
            return Err(PacketizeError::ShortPacket { len: bytes.len() });
        }
        if Command::is_block_request(bytes[1]) {
            debug!(skipped, "Skipped to next block");
            return Ok(Some(packet));
        }
        skipped += 1;
    }
    debug!(skipped, "Skip reached end of queue");
    Ok(None)
}

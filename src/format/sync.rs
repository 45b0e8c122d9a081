//! Container detection and packet alignment.
//!
//! Transport streams are found by looking for a run of correctly spaced
//! sync bytes; program streams by a pack header followed by a plausible
//! next start code.

use super::ts::types::{TS_PACKET_SIZE, TS_SYNC_BYTE};

/// Legal transport packet sizes: plain, timecode prefixed (M2TS), and the
/// two FEC variants. The 188 byte packet always sits at the end.
pub const TS_PACKET_SIZES: [usize; 4] = [188, 192, 204, 208];

/// Consecutive sync hits required to accept a packet size.
pub const TS_DETECT_RUN: usize = 16;
/// Consecutive sync hits required to resynchronize mid-stream.
pub const TS_RESYNC_RUN: usize = 8;
pub const TS_DETECT_WINDOW: usize = 8 * 1024;
pub const PS_DETECT_WINDOW: usize = 512 * 1024;

pub const PACK_START_CODE: u8 = 0xBA;
pub const PROGRAM_END_CODE: u8 = 0xB9;

/// Sync byte, no scrambling and a legal adaptation control.
pub fn check_ts_sync(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf[0] == TS_SYNC_BYTE && buf[3] >> 6 == 0 && buf[3] >> 4 > 0
}

fn has_ts_run(buf: &[u8], at: usize, size: usize, run: usize) -> bool {
    (0..run).all(|n| buf.get(at + n * size..).is_some_and(check_ts_sync))
}

/// Finds the packet size and the offset of the first sync byte.
///
/// ```rust
/// use esdemux::format::sync::detect_ts_packet_size;
///
/// let mut data = Vec::new();
/// for _ in 0..16 {
///     let mut packet = vec![0xFFu8; 188];
///     packet[..4].copy_from_slice(&[0x47, 0x1F, 0xFF, 0x10]);
///     data.extend(packet);
/// }
/// assert_eq!(detect_ts_packet_size(&data), Some((188, 0)));
/// ```
pub fn detect_ts_packet_size(buf: &[u8]) -> Option<(usize, usize)> {
    let window = buf.len().min(TS_DETECT_WINDOW);
    for offset in 0..window {
        if buf[offset] != TS_SYNC_BYTE {
            continue;
        }
        for &size in &TS_PACKET_SIZES {
            if has_ts_run(buf, offset, size, TS_DETECT_RUN) {
                return Some((size, offset));
            }
        }
    }
    None
}

/// Byte offset of the first whole packet given the sync offset reported
/// by [`detect_ts_packet_size`].
pub fn first_packet_offset(size: usize, sync_offset: usize) -> usize {
    let prefix = size - TS_PACKET_SIZE;
    if sync_offset >= prefix {
        sync_offset - prefix
    } else {
        // the prefix of the first packet was cut off
        sync_offset + TS_PACKET_SIZE
    }
}

/// Offset of the next packet start in `buf` where `TS_RESYNC_RUN`
/// packets in a row carry a valid sync.
pub fn find_ts_resync(buf: &[u8], size: usize) -> Option<usize> {
    let prefix = size - TS_PACKET_SIZE;
    (prefix..buf.len())
        .find(|&at| buf[at] == TS_SYNC_BYTE && has_ts_run(buf, at, size, TS_RESYNC_RUN))
        .map(|at| at - prefix)
}

/// Offset of the next `00 00 01` prefix at or after `from`.
pub fn find_start_code(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < 3 {
        return None;
    }
    (from..buf.len() - 2).find(|&i| buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1)
}

/// Length of the pack header at `buf[0]`, or `None` if it is not one.
pub fn pack_header_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 12 || buf[..4] != [0x00, 0x00, 0x01, PACK_START_CODE] {
        return None;
    }
    if buf[4] & 0xC0 == 0x40 {
        // MPEG-2: 14 bytes plus stuffing
        let stuffing = *buf.get(13)? as usize & 0x07;
        Some(14 + stuffing)
    } else if buf[4] & 0xF0 == 0x20 {
        Some(12)
    } else {
        None
    }
}

/// Offset of the first pack header that is followed by another systems
/// or PES start code.
pub fn detect_program_stream(buf: &[u8]) -> Option<usize> {
    let window = buf.len().min(PS_DETECT_WINDOW);
    let mut from = 0;
    while let Some(at) = find_start_code(&buf[..window], from) {
        if let Some(len) = pack_header_len(&buf[at..]) {
            let next = at + len;
            if buf.len() >= next + 4
                && buf[next..next + 3] == [0x00, 0x00, 0x01]
                && buf[next + 3] >= PROGRAM_END_CODE
            {
                return Some(at);
            }
        }
        from = at + 1;
    }
    None
}

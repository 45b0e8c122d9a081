use super::types::{ADTSHeader, ProfileType};
use crate::utils::BitReader;
use crate::{DemuxError, Result};

/// LOAS/LATM AudioSyncStream sync word (11 bits).
const LOAS_SYNC: u32 = 0x2B7;

pub fn parse_adts_header(data: &[u8]) -> Result<ADTSHeader> {
    if data.len() < 7 {
        return Err(DemuxError::Bitstream("ADTS header too short".into()));
    }

    let mut reader = BitReader::new(data);

    if reader.read_bits(12)? != 0xFFF {
        return Err(DemuxError::Bitstream("Invalid ADTS sync word".into()));
    }

    let id = reader.read_bits(1)? as u8;
    let layer = reader.read_bits(2)? as u8;
    if layer != 0 {
        // layer != 0 is MPEG audio sharing the sync pattern
        return Err(DemuxError::Bitstream("ADTS layer must be zero".into()));
    }
    let protection_absent = reader.read_bit()?;
    let profile = ProfileType::from(reader.read_bits(2)? as u8);
    let sample_rate_index = reader.read_bits(4)? as u8;
    reader.skip_bits(1)?; // private_bit
    let channel_configuration = reader.read_bits(3)? as u8;
    reader.skip_bits(4)?; // original_copy, home, copyright bits
    let frame_length = reader.read_bits(13)? as u16;
    reader.skip_bits(11)?; // buffer_fullness
    let number_of_raw_blocks = reader.read_bits(2)? as u8;

    let header = ADTSHeader {
        id,
        layer,
        protection_absent,
        profile,
        sample_rate_index,
        channel_configuration,
        frame_length,
        number_of_raw_blocks,
    };

    if header.sample_rate().is_none() || (frame_length as usize) < header.header_len() {
        return Err(DemuxError::Bitstream("Implausible ADTS header".into()));
    }
    Ok(header)
}

/// Longest run of back-to-back ADTS frames starting anywhere in `data`.
pub fn count_adts_frames(data: &[u8]) -> usize {
    count_chained(data, |frame| {
        parse_adts_header(frame).ok().map(|h| h.frame_length as usize)
    })
}

/// Same for LOAS framed LATM: 11 bit sync then a 13 bit payload length.
pub fn count_loas_frames(data: &[u8]) -> usize {
    count_chained(data, |frame| {
        if frame.len() < 3 {
            return None;
        }
        let word = ((frame[0] as u32) << 16) | ((frame[1] as u32) << 8) | frame[2] as u32;
        if word >> 13 != LOAS_SYNC {
            return None;
        }
        let len = (word & 0x1FFF) as usize;
        (len > 0).then_some(len + 3)
    })
}

/// Scans for the best chain of frames where each frame's declared size
/// lands exactly on the next frame header.
pub(crate) fn count_chained<F>(data: &[u8], frame_size: F) -> usize
where
    F: Fn(&[u8]) -> Option<usize>,
{
    let mut best = 0;
    let mut start = 0;
    while start < data.len() && best < 3 {
        let mut pos = start;
        let mut count = 0;
        while let Some(size) = frame_size(&data[pos..]) {
            count += 1;
            pos += size;
            if pos >= data.len() {
                break;
            }
        }
        best = best.max(count);
        start += 1;
    }
    best
}

//! Sync word and frame size parsing for the compressed audio formats
//! carried in MPEG program and transport streams.

use crate::utils::BitReader;

pub const AC3_SYNC: u16 = 0x0B77;
pub const DTS_SYNC: u32 = 0x7FFE_8001;
pub const DTS_HD_SYNC: u32 = 0x6458_2025;
pub const TRUEHD_SYNC: u32 = 0xF872_6FBA;

const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

/// Dolby frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Frame {
    pub size: usize,
    pub bsid: u8,
}

impl Ac3Frame {
    pub fn is_eac3(&self) -> bool {
        self.bsid > 10
    }
}

/// Parses an AC-3 or E-AC-3 sync frame header at `data[0]`.
pub fn parse_ac3_frame(data: &[u8]) -> Option<Ac3Frame> {
    if data.len() < 6 {
        return None;
    }
    let mut reader = BitReader::new(data);
    if reader.read_u16().ok()? != AC3_SYNC {
        return None;
    }

    // bsid sits at the same bit offset in both syntaxes
    let bsid = BitReader::new(&data[5..]).read_bits(5).ok()? as u8;

    match bsid {
        0..=8 => {
            reader.skip_bits(16).ok()?; // crc1
            let fscod = reader.read_bits(2).ok()?;
            let frmsizecod = reader.read_bits(6).ok()? as usize;
            let bitrate = *AC3_BITRATES.get(frmsizecod >> 1)?;
            let words = match fscod {
                0 => bitrate * 2,
                1 => bitrate * 96_000 / 44_100 + (frmsizecod as u32 & 1),
                2 => bitrate * 3,
                _ => return None,
            };
            Some(Ac3Frame {
                size: words as usize * 2,
                bsid,
            })
        }
        11..=16 => {
            reader.skip_bits(5).ok()?; // strmtyp, substreamid
            let frmsiz = reader.read_bits(11).ok()? as usize;
            Some(Ac3Frame {
                size: (frmsiz + 1) * 2,
                bsid,
            })
        }
        _ => None,
    }
}

/// Size of the DTS core frame starting at `data[0]`.
pub fn parse_dts_frame(data: &[u8]) -> Option<usize> {
    let mut reader = BitReader::new(data);
    if reader.read_bits(32).ok()? != DTS_SYNC {
        return None;
    }
    // FTYPE, SHORT, CPF, NBLKS
    reader.skip_bits(14).ok()?;
    let fsize = reader.read_bits(14).ok()? as usize;
    (fsize >= 95).then_some(fsize + 1)
}

/// A DTS-HD extension substream header anywhere in `data`.
pub fn has_dts_hd(data: &[u8]) -> bool {
    data.windows(4)
        .any(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]) == DTS_HD_SYNC)
}

/// TrueHD major sync: the word after the 4 byte access unit header.
pub fn is_truehd_sync(data: &[u8]) -> bool {
    data.len() >= 8 && u32::from_be_bytes([data[4], data[5], data[6], data[7]]) == TRUEHD_SYNC
}

pub fn count_truehd_syncs(data: &[u8]) -> usize {
    data.windows(4)
        .filter(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]) == TRUEHD_SYNC)
        .count()
}

const MPA_V1_BITRATES: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const MPA_V2_BITRATES: [[u32; 15]; 2] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// MPEG audio frame header fields needed for framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpaFrame {
    pub layer: u8,
    pub sample_rate: u32,
    pub size: usize,
}

/// Parses an MPEG-1/2/2.5 layer I-III header at `data[0]`.
pub fn parse_mpa_frame(data: &[u8]) -> Option<MpaFrame> {
    let mut reader = BitReader::new(data);
    if reader.read_bits(11).ok()? != 0x7FF {
        return None;
    }
    let version = reader.read_bits(2).ok()?; // 0 = 2.5, 2 = 2, 3 = 1
    let layer_bits = reader.read_bits(2).ok()?;
    reader.skip_bits(1).ok()?; // protection
    let bitrate_index = reader.read_bits(4).ok()? as usize;
    let sr_index = reader.read_bits(2).ok()? as usize;
    let padding = reader.read_bits(1).ok()? as usize;

    if version == 1 || layer_bits == 0 || bitrate_index == 0 || bitrate_index == 15 {
        return None;
    }
    let layer = (4 - layer_bits) as u8;

    let base_rate = [44_100u32, 48_000, 32_000].get(sr_index).copied()?;
    let sample_rate = match version {
        3 => base_rate,
        2 => base_rate / 2,
        _ => base_rate / 4,
    };

    let bitrate = if version == 3 {
        MPA_V1_BITRATES[layer as usize - 1][bitrate_index]
    } else {
        MPA_V2_BITRATES[if layer == 1 { 0 } else { 1 }][bitrate_index]
    } * 1000;

    let size = match layer {
        1 => (12 * bitrate / sample_rate) as usize * 4 + padding * 4,
        3 if version != 3 => (72 * bitrate / sample_rate) as usize + padding,
        _ => (144 * bitrate / sample_rate) as usize + padding,
    };

    Some(MpaFrame {
        layer,
        sample_rate,
        size,
    })
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// 48kHz 2.0 AC-3 frame at 192 kbps (768 bytes).
    pub fn ac3_frame() -> Vec<u8> {
        let mut frame = vec![0x0B, 0x77, 0x00, 0x00, 0x14, 0x40, 0x43];
        frame.resize(768, 0);
        frame
    }

    /// Minimal DTS core frame of 1024 bytes.
    pub fn dts_frame() -> Vec<u8> {
        let fsize = 1023u32;
        let mut frame = vec![0x7F, 0xFE, 0x80, 0x01];
        // FTYPE=1, SHORT=31, CPF=0, NBLKS=15, FSIZE, left aligned
        let bits: u32 = ((1 << 27) | (31 << 22) | (15 << 14) | fsize) << 4;
        frame.extend_from_slice(&bits.to_be_bytes());
        frame.resize(1024, 0);
        frame
    }

    /// MPEG-1 layer II, 48kHz, 192 kbps (576 bytes).
    pub fn mp2_frame() -> Vec<u8> {
        let mut frame = vec![0xFF, 0xFD, 0xA4, 0x00];
        frame.resize(576, 0);
        frame
    }
}

use crate::error::{DemuxError, Result};
use crate::format::sync::{pack_header_len, PACK_START_CODE};
use crate::format::ts::parser::TSPacketParser;
use crate::format::ts::types::{Descriptor, STREAM_ID_PSM};
use crate::utils::BitReader;

/// A parsed pack header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// System clock reference base, 90 kHz.
    pub scr: i64,
    pub mpeg2: bool,
    /// In units of 50 bytes per second.
    pub mux_rate: u32,
    /// Header length including stuffing.
    pub len: usize,
}

fn bad_pack(msg: &str) -> DemuxError {
    DemuxError::MalformedPesHeader(format!("pack header: {}", msg))
}

pub fn parse_pack_header(data: &[u8]) -> Result<PackHeader> {
    if data.len() < 4 || data[..4] != [0x00, 0x00, 0x01, PACK_START_CODE] {
        return Err(bad_pack("missing start code"));
    }
    let len = pack_header_len(data).ok_or_else(|| bad_pack("unknown layout"))?;
    let mut reader = BitReader::new(&data[4..]);

    let mpeg2 = reader.peek_bits(2)? == 0b01;
    if mpeg2 {
        reader.skip_bits(2)?;
    } else {
        reader.skip_bits(4)?;
    }
    let high = reader.read_bits(3)? as i64;
    reader.read_marker()?;
    let mid = reader.read_bits(15)? as i64;
    reader.read_marker()?;
    let low = reader.read_bits(15)? as i64;
    reader.read_marker()?;
    if mpeg2 {
        // 27 MHz extension
        reader.skip_bits(9)?;
        reader.read_marker()?;
    } else {
        reader.read_marker()?;
    }
    let mux_rate = reader.read_bits(22)?;

    Ok(PackHeader {
        scr: high << 30 | mid << 15 | low,
        mpeg2,
        mux_rate,
        len,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsmEntry {
    pub stream_type: u8,
    pub stream_id: u8,
    pub descriptors: Vec<Descriptor>,
}

impl PsmEntry {
    pub fn language(&self) -> Option<String> {
        self.descriptors.iter().find_map(Descriptor::language)
    }
}

/// Program Stream Map (stream id 0xBC).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStreamMap {
    pub version: u8,
    pub descriptors: Vec<Descriptor>,
    pub entries: Vec<PsmEntry>,
}

fn bad_psm(msg: &str) -> DemuxError {
    DemuxError::MalformedTable(format!("program stream map: {}", msg))
}

/// Parses a complete PSM packet, start code included. `psi` does the CRC
/// and descriptor parsing shared with transport stream tables.
pub fn parse_psm(data: &[u8], psi: &TSPacketParser) -> Result<ProgramStreamMap> {
    if data.len() < 16 || data[..4] != [0x00, 0x00, 0x01, STREAM_ID_PSM] {
        return Err(bad_psm("too short"));
    }
    let total = 6 + u16::from_be_bytes([data[4], data[5]]) as usize;
    if total > data.len() || total < 16 {
        return Err(bad_psm("length does not fit"));
    }
    let data = &data[..total];
    if !psi.check_crc(data) {
        return Err(bad_psm("CRC mismatch"));
    }
    let end = total - 4;

    let version = data[6] & 0x1F;
    let info_len = u16::from_be_bytes([data[8], data[9]]) as usize;
    let mut pos = 10;
    if pos + info_len + 2 > end {
        return Err(bad_psm("program info overruns map"));
    }
    let descriptors = psi.parse_descriptors(&data[pos..pos + info_len])?;
    pos += info_len;

    let map_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    pos += 2;
    let map_end = pos + map_len;
    if map_end > end {
        return Err(bad_psm("elementary stream map overruns map"));
    }

    let mut entries = Vec::new();
    while pos + 4 <= map_end {
        let stream_type = data[pos];
        let stream_id = data[pos + 1];
        let es_info_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        if pos + es_info_len > map_end {
            return Err(bad_psm("stream info overruns map"));
        }
        entries.push(PsmEntry {
            stream_type,
            stream_id,
            descriptors: psi.parse_descriptors(&data[pos..pos + es_info_len])?,
        });
        pos += es_info_len;
    }

    Ok(ProgramStreamMap {
        version,
        descriptors,
        entries,
    })
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mpeg2_pack_header() {
        let scr = 0x1_2345_6789;
        let pack = parse_pack_header(&pack_header(scr)).unwrap();
        assert_eq!(pack.scr, scr);
        assert!(pack.mpeg2);
        assert_eq!(pack.mux_rate, 25_200);
        assert_eq!(pack.len, 14);
    }

    #[test]
    fn test_mpeg1_pack_header() {
        let pack = parse_pack_header(&mpeg1_pack_header(90_000)).unwrap();
        assert_eq!(pack.scr, 90_000);
        assert!(!pack.mpeg2);
        assert_eq!(pack.len, 12);
    }

    #[test]
    fn test_truncated_pack_header() {
        let header = pack_header(1000);
        assert!(parse_pack_header(&header[..9]).is_err());
    }

    #[test]
    fn test_psm() {
        let psi = TSPacketParser::new();
        let data = psm(&[(0x02, 0xE0), (0x81, 0xBD)]);
        let map = parse_psm(&data, &psi).unwrap();
        assert_eq!(map.entries.len(), 2);
        assert_eq!(map.entries[1].stream_type, 0x81);
        assert_eq!(map.entries[1].stream_id, 0xBD);
        assert_eq!(map.version, 0);

        let mut corrupt = data.clone();
        corrupt[12] ^= 0xFF;
        assert!(parse_psm(&corrupt, &psi).is_err());
        assert!(parse_psm(&corrupt, &TSPacketParser::new().with_crc_check(false)).is_ok());
    }
}

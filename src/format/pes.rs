//! Packetized Elementary Stream header parsing.
//!
//! Both the MPEG-1 (stuffing and marker) and MPEG-2 (flag byte) header
//! layouts are handled, plus the sub-stream id byte DVD and HD-DVD put in
//! front of private stream 1 payloads.

use super::sync::pack_header_len;
use super::ts::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::BitReader;

/// How a private payload prefix is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubStreamMode {
    #[default]
    None,
    /// DVD / HD-DVD private stream 1: one id byte plus a codec specific
    /// header.
    DvdPrivate,
    /// DVB subtitles: data_identifier and subtitle_stream_id.
    DvbSubtitle,
}

/// Parsed PES header fields. Timestamps are 33 bit 90 kHz values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PesInfo {
    pub stream_id: u8,
    pub sub_stream_id: Option<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Bytes from the start code to the first payload byte.
    pub header_len: usize,
    /// Declared PES_packet_length; 0 means unbounded.
    pub packet_len: usize,
    pub stuffing_len: usize,
    pub mpeg2: bool,
    /// Elementary stream clock reference, 27 MHz.
    pub escr: Option<u64>,
    pub es_rate: Option<u32>,
    pub stream_id_extension: Option<u8>,
}

impl PesInfo {
    /// Total size the header declares, start code included.
    pub fn total_len(&self) -> Option<usize> {
        (self.packet_len > 0).then_some(6 + self.packet_len)
    }

    /// The payload of a unit whose header this is.
    pub fn payload<'a>(&self, unit: &'a [u8]) -> &'a [u8] {
        let end = self
            .total_len()
            .map_or(unit.len(), |total| total.min(unit.len()));
        unit.get(self.header_len..end).unwrap_or_default()
    }
}

fn malformed(msg: impl Into<String>) -> DemuxError {
    DemuxError::MalformedPesHeader(msg.into())
}

/// Stream ids whose packets carry no PES header extension.
pub fn has_no_header_extension(stream_id: u8) -> bool {
    matches!(
        stream_id,
        STREAM_ID_SYSTEM_HEADER
            | STREAM_ID_PSM
            | STREAM_ID_PADDING
            | STREAM_ID_PRIVATE_2
            | 0xF0 // ECM
            | 0xF1 // EMM
            | 0xF2 // DSM-CC
            | 0xF8 // H.222.1 type E
            | 0xFF // directory
    )
}

/// Reads a 33 bit timestamp: 4 bit prefix, then 3, 15 and 15 bits each
/// followed by a marker bit.
fn read_timestamp(reader: &mut BitReader) -> Result<i64> {
    reader.skip_bits(4)?;
    let high = reader.read_bits(3)? as i64;
    reader.read_marker()?;
    let mid = reader.read_bits(15)? as i64;
    reader.read_marker()?;
    let low = reader.read_bits(15)? as i64;
    reader.read_marker()?;
    Ok(high << 30 | mid << 15 | low)
}

/// Parses the header of the PES packet starting at `data[0]` (the start
/// code prefix). Never reads past `data`; anything that does not fit
/// yields [`DemuxError::MalformedPesHeader`].
pub fn parse_pes_header(data: &[u8], mode: SubStreamMode) -> Result<PesInfo> {
    if data.len() < 4 || data[..3] != [0x00, 0x00, 0x01] {
        return Err(malformed("missing start code"));
    }
    let stream_id = data[3];
    let mut info = PesInfo {
        stream_id,
        ..Default::default()
    };

    match stream_id {
        STREAM_ID_PROGRAM_END => {
            info.header_len = 4;
            return Ok(info);
        }
        STREAM_ID_PACK => {
            info.header_len = pack_header_len(data)
                .filter(|&len| len <= data.len())
                .ok_or_else(|| malformed("bad pack header"))?;
            return Ok(info);
        }
        _ => {}
    }

    if data.len() < 6 {
        return Err(malformed("truncated before packet length"));
    }
    info.packet_len = ((data[4] as usize) << 8) | data[5] as usize;

    if has_no_header_extension(stream_id) {
        info.header_len = 6;
    } else if data.len() > 6 && data[6] & 0xC0 == 0x80 {
        parse_mpeg2_header(data, &mut info)?;
    } else {
        parse_mpeg1_header(data, &mut info)?;
    }

    if let Some(total) = info.total_len() {
        if total < info.header_len {
            return Err(malformed(format!(
                "header length {} exceeds packet length {}",
                info.header_len, total
            )));
        }
    }

    if let (Some(pts), Some(dts)) = (info.pts, info.dts) {
        if dts > pts {
            info.dts = Some(pts);
        }
    }

    match (stream_id, mode) {
        (STREAM_ID_PRIVATE_1, SubStreamMode::DvdPrivate) => {
            let sub = *data
                .get(info.header_len)
                .ok_or_else(|| malformed("missing sub-stream id"))?;
            info.sub_stream_id = Some(sub);
            info.header_len += dvd_sub_stream_header_len(sub);
        }
        (_, SubStreamMode::DvbSubtitle) => {
            let sub = *data
                .get(info.header_len)
                .ok_or_else(|| malformed("missing subtitle data identifier"))?;
            info.sub_stream_id = Some(sub);
            info.header_len += 2;
        }
        (STREAM_ID_EXTENDED, _) => {
            info.sub_stream_id = info.stream_id_extension;
        }
        _ => {}
    }

    if info.header_len > data.len() {
        return Err(malformed(format!(
            "header length {} exceeds {} available bytes",
            info.header_len,
            data.len()
        )));
    }
    Ok(info)
}

/// Bytes occupied by the id byte and codec header of a private stream 1
/// sub-stream.
pub fn dvd_sub_stream_header_len(sub: u8) -> usize {
    match sub {
        0x20..=0x3F => 1, // subtitles
        0xA0..=0xAF => 1, // LPCM, its own header stays with the payload
        0xB0..=0xBF => 5, // TrueHD
        0x80..=0x9F => 4, // AC-3, DTS
        0xC0..=0xCF => 4, // E-AC-3
        _ => 1,
    }
}

fn parse_mpeg2_header(data: &[u8], info: &mut PesInfo) -> Result<()> {
    if data.len() < 9 {
        return Err(malformed("truncated MPEG-2 header"));
    }
    info.mpeg2 = true;
    let flags = data[7];
    let header_data_len = data[8] as usize;
    info.header_len = 9 + header_data_len;
    if data.len() < info.header_len {
        return Err(malformed(format!(
            "header data length {} exceeds {} available bytes",
            header_data_len,
            data.len() - 9
        )));
    }

    let mut reader = BitReader::new(&data[9..info.header_len]);
    parse_mpeg2_fields(&mut reader, flags, info).map_err(|e| match e {
        DemuxError::Bitstream(msg) => malformed(msg),
        other => other,
    })?;
    info.stuffing_len = reader.rest().len();
    Ok(())
}

fn parse_mpeg2_fields(reader: &mut BitReader, flags: u8, info: &mut PesInfo) -> Result<()> {
    match flags >> 6 {
        0b10 => info.pts = Some(read_timestamp(reader)?),
        0b11 => {
            info.pts = Some(read_timestamp(reader)?);
            info.dts = Some(read_timestamp(reader)?);
        }
        0b01 => return Err(malformed("forbidden PTS_DTS_flags value")),
        _ => {}
    }

    if flags & 0x20 != 0 {
        reader.skip_bits(2)?;
        let high = reader.read_bits(3)? as u64;
        reader.read_marker()?;
        let mid = reader.read_bits(15)? as u64;
        reader.read_marker()?;
        let low = reader.read_bits(15)? as u64;
        reader.read_marker()?;
        let ext = reader.read_bits(9)? as u64;
        reader.read_marker()?;
        info.escr = Some((high << 30 | mid << 15 | low) * 300 + ext);
    }

    if flags & 0x10 != 0 {
        reader.read_marker()?;
        info.es_rate = Some(reader.read_bits(22)?);
        reader.read_marker()?;
    }

    if flags & 0x08 != 0 {
        reader.skip_bits(8)?; // trick mode control
    }

    if flags & 0x04 != 0 {
        reader.read_marker()?;
        reader.skip_bits(7)?; // additional copy info
    }

    if flags & 0x02 != 0 {
        reader.skip_bits(16)?; // previous PES CRC
    }

    if flags & 0x01 != 0 {
        let ext_flags = reader.read_u8()?;
        if ext_flags & 0x80 != 0 {
            reader.skip_bytes(16)?; // PES private data
        }
        if ext_flags & 0x40 != 0 {
            let len = reader.read_u8()? as usize;
            reader.skip_bytes(len)?; // pack header field
        }
        if ext_flags & 0x20 != 0 {
            reader.skip_bits(16)?; // program packet sequence counter
        }
        if ext_flags & 0x10 != 0 {
            reader.skip_bits(16)?; // P-STD buffer
        }
        if ext_flags & 0x01 != 0 {
            reader.read_marker()?;
            let len = reader.read_bits(7)? as usize;
            let mut ext2 = reader.sub_reader(len)?;
            if len > 0 && !ext2.read_bit()? {
                info.stream_id_extension = Some(ext2.read_bits(7)? as u8);
            }
        }
    }
    Ok(())
}

fn parse_mpeg1_header(data: &[u8], info: &mut PesInfo) -> Result<()> {
    let mut pos = 6;
    while data.get(pos) == Some(&0xFF) {
        pos += 1;
    }
    info.stuffing_len = pos - 6;
    if info.stuffing_len > 16 {
        return Err(malformed("more than 16 stuffing bytes"));
    }

    let mut byte = *data.get(pos).ok_or_else(|| malformed("truncated MPEG-1 header"))?;
    if byte & 0xC0 == 0x40 {
        // STD buffer scale and size
        pos += 2;
        byte = *data.get(pos).ok_or_else(|| malformed("truncated MPEG-1 header"))?;
    }

    let timestamps = match byte & 0xF0 {
        0x20 => 1,
        0x30 => 2,
        _ if byte == 0x0F => 0,
        _ => return Err(malformed(format!("bad MPEG-1 header byte 0x{:02x}", byte))),
    };

    let end = pos + if timestamps == 0 { 1 } else { 5 * timestamps };
    let fields = data
        .get(pos..end)
        .ok_or_else(|| malformed("truncated MPEG-1 timestamps"))?;
    let mut reader = BitReader::new(fields);
    if timestamps >= 1 {
        info.pts = Some(read_mpeg1_timestamp(&mut reader)?);
    }
    if timestamps == 2 {
        info.dts = Some(read_mpeg1_timestamp(&mut reader)?);
    }
    info.header_len = end;
    Ok(())
}

fn read_mpeg1_timestamp(reader: &mut BitReader) -> Result<i64> {
    read_timestamp(reader).map_err(|_| malformed("MPEG-1 timestamp marker bit not set"))
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_mpeg2_pts_dts() {
        let data = pes(0xE0, Some(180_000), Some(176_400), &[0xAA; 10]);
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert!(info.mpeg2);
        assert_eq!(info.pts, Some(180_000));
        assert_eq!(info.dts, Some(176_400));
        assert_eq!(info.header_len, 19);
        assert_eq!(info.payload(&data), &[0xAA; 10]);
    }

    #[test]
    fn test_full_33_bit_timestamp() {
        let ts = (1i64 << 33) - 1;
        let data = pes(0xC0, Some(ts), None, &[]);
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert_eq!(info.pts, Some(ts));
    }

    #[test]
    fn test_dts_is_clamped() {
        let data = pes(0xE0, Some(1000), Some(5000), &[]);
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert_eq!(info.dts, Some(1000));
    }

    #[test]
    fn test_forbidden_flags() {
        let mut data = pes(0xE0, Some(1000), None, &[]);
        data[7] = 0x40;
        assert!(matches!(
            parse_pes_header(&data, SubStreamMode::None),
            Err(DemuxError::MalformedPesHeader(_))
        ));
    }

    /// PES header carrying PTS, DTS and ESCR, no payload.
    fn pes_with_escr(pts: i64, escr_base: u64, escr_ext: u64) -> Vec<u8> {
        let mut data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 19, 0x80, 0xE0, 16];
        data.extend(timestamp(0x3, pts));
        data.extend(timestamp(0x1, pts));
        let escr: u64 = 0b11 << 46
            | ((escr_base >> 30) & 0x7) << 43
            | 1u64 << 42
            | ((escr_base >> 15) & 0x7FFF) << 27
            | 1u64 << 26
            | (escr_base & 0x7FFF) << 11
            | 1u64 << 10
            | (escr_ext & 0x1FF) << 1
            | 1;
        data.extend_from_slice(&escr.to_be_bytes()[2..]);
        data
    }

    /// Bit offsets of every marker bit in [`pes_with_escr`].
    const MARKER_BITS: [usize; 10] = [
        72 + 7,
        72 + 23,
        72 + 39,
        112 + 7,
        112 + 23,
        112 + 39,
        152 + 5,
        152 + 21,
        152 + 37,
        152 + 47,
    ];

    #[test]
    fn test_escr() {
        let data = pes_with_escr(1000, 900, 17);
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert_eq!(info.pts, Some(1000));
        assert_eq!(info.dts, Some(1000));
        assert_eq!(info.escr, Some(900 * 300 + 17));
        assert_eq!(info.header_len, 25);
    }

    #[quickcheck]
    fn prop_corrupt_marker_is_rejected(pts: u32, escr: u32, ext: u16, which: u8) -> bool {
        let mut data = pes_with_escr(pts as i64, escr as u64, ext as u64);
        let bit = MARKER_BITS[which as usize % MARKER_BITS.len()];
        data[bit / 8] &= !(0x80 >> (bit % 8));
        matches!(
            parse_pes_header(&data, SubStreamMode::None),
            Err(DemuxError::MalformedPesHeader(_))
        )
    }

    #[test]
    fn test_mpeg1_header() {
        let mut data = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x0F, 0xFF, 0xFF, 0x40, 0x20];
        data.extend(timestamp(0x2, 3600));
        data.extend_from_slice(&[0x11, 0x22]);
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert!(!info.mpeg2);
        assert_eq!(info.stuffing_len, 2);
        assert_eq!(info.pts, Some(3600));
        assert_eq!(info.header_len, 15);
        assert_eq!(info.payload(&data), &[0x11, 0x22]);

        let bare = [0x00, 0x00, 0x01, 0xE0, 0x00, 0x02, 0x0F, 0x99];
        let info = parse_pes_header(&bare, SubStreamMode::None).unwrap();
        assert_eq!(info.pts, None);
        assert_eq!(info.header_len, 7);
    }

    #[test]
    fn test_dvd_private_stream() {
        let payload = [0x80, 0x01, 0x00, 0x01, 0x0B, 0x77];
        let data = pes(0xBD, Some(900), None, &payload);
        let info = parse_pes_header(&data, SubStreamMode::DvdPrivate).unwrap();
        assert_eq!(info.sub_stream_id, Some(0x80));
        assert_eq!(info.payload(&data), &[0x0B, 0x77]);

        let subs = pes(0xBD, Some(900), None, &[0x21, 0x00, 0x10]);
        let info = parse_pes_header(&subs, SubStreamMode::DvdPrivate).unwrap();
        assert_eq!(info.sub_stream_id, Some(0x21));
        assert_eq!(info.payload(&subs), &[0x00, 0x10]);
    }

    #[test]
    fn test_headerless_ids() {
        let data = [0x00, 0x00, 0x01, 0xBE, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];
        let info = parse_pes_header(&data, SubStreamMode::None).unwrap();
        assert_eq!(info.header_len, 6);
        assert_eq!(info.total_len(), Some(10));
    }

    #[test]
    fn test_truncated_header() {
        let data = pes(0xE0, Some(1000), Some(900), &[1, 2, 3]);
        for cut in 0..19 {
            assert!(parse_pes_header(&data[..cut], SubStreamMode::None).is_err());
        }
    }

    #[quickcheck]
    fn prop_never_panics(body: Vec<u8>, id: u8) -> bool {
        let mut data = vec![0x00, 0x00, 0x01, id];
        data.extend(body);
        for mode in [
            SubStreamMode::None,
            SubStreamMode::DvdPrivate,
            SubStreamMode::DvbSubtitle,
        ] {
            if let Ok(info) = parse_pes_header(&data, mode) {
                if info.header_len > data.len() {
                    return false;
                }
                let _ = info.payload(&data);
            }
        }
        true
    }

    #[quickcheck]
    fn prop_dts_never_exceeds_pts(pts: u32, dts: u32, junk: Vec<u8>) -> bool {
        let data = pes(0xE0, Some(pts as i64), Some(dts as i64), &junk);
        match parse_pes_header(&data, SubStreamMode::None) {
            Ok(info) => matches!((info.pts, info.dts), (Some(p), Some(d)) if d <= p),
            Err(_) => false,
        }
    }
}

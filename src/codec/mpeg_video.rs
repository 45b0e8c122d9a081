use super::Codec;
use crate::utils::BitReader;
use crate::Result;

pub const PICTURE_START: u8 = 0x00;
pub const SEQUENCE_HEADER: u8 = 0xB3;
pub const EXTENSION_START: u8 = 0xB5;
pub const GROUP_START: u8 = 0xB8;

/// Fields of an MPEG-1/2 sequence header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio_code: u8,
    pub frame_rate_code: u8,
    pub bit_rate: u32,
}

/// Iterates `(offset_of_id_byte, id)` for every 00 00 01 xx in `data`.
pub fn start_codes(data: &[u8]) -> impl Iterator<Item = (usize, u8)> + '_ {
    let mut i = 0;
    std::iter::from_fn(move || {
        while i + 3 < data.len() {
            if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
                let at = i + 3;
                i += 3;
                return Some((at, data[at]));
            }
            i += 1;
        }
        None
    })
}

/// Parses the sequence header whose id byte sits at `data[0]`.
pub fn parse_sequence_header(data: &[u8]) -> Result<SequenceHeader> {
    let mut reader = BitReader::new(data);
    reader.skip_bits(8)?; // 0xB3
    let width = reader.read_bits(12)?;
    let height = reader.read_bits(12)?;
    let aspect_ratio_code = reader.read_bits(4)? as u8;
    let frame_rate_code = reader.read_bits(4)? as u8;
    let bit_rate = reader.read_bits(18)?;
    reader.read_marker()?;
    Ok(SequenceHeader {
        width,
        height,
        aspect_ratio_code,
        frame_rate_code,
        bit_rate,
    })
}

/// MPEG-1 and MPEG-2 share the sequence header; only MPEG-2 follows it
/// with a sequence_extension (extension id 1).
///
/// Returns `None` when no sequence header is present yet.
pub fn detect_version(data: &[u8]) -> Option<Codec> {
    let mut seen_sequence = false;
    for (at, id) in start_codes(data) {
        match id {
            SEQUENCE_HEADER => {
                if parse_sequence_header(&data[at..]).is_ok() {
                    seen_sequence = true;
                }
            }
            EXTENSION_START if seen_sequence => {
                if data.get(at + 1).map(|b| b >> 4) == Some(1) {
                    return Some(Codec::Mpeg2Video);
                }
            }
            GROUP_START | PICTURE_START if seen_sequence => {
                return Some(Codec::Mpeg1Video);
            }
            _ => {}
        }
    }
    None
}

/// GOP header, sequence header, or an I picture.
pub fn is_random_access(data: &[u8]) -> bool {
    for (at, id) in start_codes(data) {
        match id {
            GROUP_START | SEQUENCE_HEADER => return true,
            PICTURE_START => {
                // temporal_reference(10) picture_coding_type(3)
                if let Some(&b) = data.get(at + 2) {
                    if (b >> 3) & 0x7 == 1 {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// 720x576 25fps sequence header, optionally with its MPEG-2 extension.
    pub fn sequence(mpeg2: bool) -> Vec<u8> {
        let mut out = vec![
            0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33, 0x24, 0x9F, 0x23, 0x80,
        ];
        if mpeg2 {
            out.extend_from_slice(&[0x00, 0x00, 0x01, 0xB5, 0x14, 0x8A, 0x00, 0x01, 0x00, 0x00]);
        }
        out
    }

    pub fn gop() -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x00]
    }

    /// Picture header with the given coding type (1 = I, 2 = P, 3 = B).
    pub fn picture(coding_type: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0x00, 0x00, coding_type << 3, 0xFF, 0xF8]
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequence_header() {
        let data = sequence(false);
        let header = parse_sequence_header(&data[3..]).unwrap();
        assert_eq!(header.width, 720);
        assert_eq!(header.height, 576);
        assert_eq!(header.aspect_ratio_code, 3);
        assert_eq!(header.frame_rate_code, 3);
    }

    #[test]
    fn test_detect_version() {
        let mut mpeg1 = sequence(false);
        mpeg1.extend(gop());
        assert_eq!(detect_version(&mpeg1), Some(Codec::Mpeg1Video));

        let mut mpeg2 = sequence(true);
        mpeg2.extend(gop());
        assert_eq!(detect_version(&mpeg2), Some(Codec::Mpeg2Video));

        assert_eq!(detect_version(&picture(2)), None);
    }

    #[test]
    fn test_random_access() {
        assert!(is_random_access(&gop()));
        assert!(is_random_access(&picture(1)));
        assert!(!is_random_access(&picture(2)));
        assert!(!is_random_access(&picture(3)));
    }
}

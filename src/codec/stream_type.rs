use super::Codec;
use crate::av::StreamKind;

/// Classification of a container-declared stream type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTypeEntry {
    pub kind: StreamKind,
    pub codec: Codec,
    pub name: &'static str,
}

const fn entry(kind: StreamKind, codec: Codec, name: &'static str) -> StreamTypeEntry {
    StreamTypeEntry { kind, codec, name }
}

const UNKNOWN: StreamTypeEntry = entry(StreamKind::Unknown, Codec::Unknown, "Unknown");

/// ISO/IEC 13818-1 and ATSC stream types.
pub fn lookup_stream_type(stream_type: u8) -> StreamTypeEntry {
    use StreamKind::*;
    match stream_type {
        0x01 => entry(Video, Codec::Mpeg1Video, "MPEG1"),
        0x02 => entry(Video, Codec::Mpeg2Video, "MPEG2"),
        0x03 => entry(Audio, Codec::MpegAudio, "MPEG1 Audio"),
        0x04 => entry(Audio, Codec::MpegAudio, "MPEG2 Audio"),
        0x05 => entry(Unknown, Codec::Unknown, "ISO 13818-1 private section"),
        0x06 => entry(Unknown, Codec::Unknown, "ISO 13818-1 PES private data"),
        0x07 => entry(Unknown, Codec::Unknown, "ISO 13522 MHEG"),
        0x08 => entry(Unknown, Codec::Unknown, "ISO 13818-1 DSM-CC"),
        0x09 => entry(Unknown, Codec::Unknown, "ISO 13818-1 auxiliary"),
        0x0a => entry(Unknown, Codec::Unknown, "ISO 13818-6 encap"),
        0x0b => entry(Unknown, Codec::Unknown, "ISO 13818-6 DSM-CC U-N msgs"),
        0x0c => entry(Unknown, Codec::Unknown, "ISO 13818-6 Stream descriptors"),
        0x0d => entry(Unknown, Codec::Unknown, "ISO 13818-6 Sections"),
        0x0e => entry(Unknown, Codec::Unknown, "ISO 13818-1 auxiliary"),
        0x0f => entry(Audio, Codec::Aac, "ISO 13818-7 AAC Audio"),
        0x10 => entry(Video, Codec::Mpeg4Video, "MPEG4"),
        0x11 => entry(Audio, Codec::AacLatm, "MPEG4 LATM AAC"),
        0x12 => entry(Unknown, Codec::Unknown, "MPEG4 generic"),
        0x14 => entry(Unknown, Codec::Unknown, "ISO 13818-6 DSM-CC download"),
        0x1b => entry(Video, Codec::H264, "H.264"),
        0x24 => entry(Video, Codec::Hevc, "HEVC"),
        0x80 => entry(Unknown, Codec::Unknown, "DigiCipher II Video"),
        0x81 => entry(Audio, Codec::Ac3, "AC-3"),
        0x82 => entry(Audio, Codec::Dts, "DTS"),
        0x83 => entry(Audio, Codec::Lpcm, "LPCM"),
        0x84 => entry(Unknown, Codec::Unknown, "SDDS"),
        0x85 => entry(Unknown, Codec::Unknown, "ATSC Program ID"),
        0x86 => entry(Unknown, Codec::Unknown, "SCTE 35 splice info"),
        0x87 => entry(Audio, Codec::Eac3, "E-AC-3"),
        0x8a => entry(Audio, Codec::Dts, "DTS"),
        0x91 => entry(Audio, Codec::Ac3, "AC-3"),
        0x92 => entry(Unknown, Codec::Unknown, "Subtitle"),
        0x94 => entry(Unknown, Codec::Unknown, "SDDS"),
        0xa0 => entry(Unknown, Codec::Unknown, "MSCODEC"),
        0xea => entry(Video, Codec::Vc1, "VC-1"),
        _ => UNKNOWN,
    }
}

/// Blu-ray ("HDMV" registration) reassigns the private range.
pub fn lookup_hdmv_stream_type(stream_type: u8) -> StreamTypeEntry {
    use StreamKind::*;
    match stream_type {
        0x80 => entry(Audio, Codec::Lpcm, "HDMV LPCM"),
        0x81 => entry(Audio, Codec::Ac3, "HDMV AC-3"),
        0x82 => entry(Audio, Codec::Dts, "HDMV DTS"),
        0x83 => entry(Audio, Codec::TrueHd, "HDMV TrueHD"),
        0x84 => entry(Audio, Codec::Eac3, "HDMV E-AC-3"),
        0x85 => entry(Audio, Codec::DtsHd, "HDMV DTS-HD HRA"),
        0x86 => entry(Audio, Codec::DtsHd, "HDMV DTS-HD MA"),
        0x90 => entry(Subtitle, Codec::PgsSub, "HDMV PGS"),
        0xa1 => entry(Audio, Codec::Eac3, "HDMV secondary E-AC-3"),
        0xa2 => entry(Audio, Codec::DtsHd, "HDMV secondary DTS-HD"),
        0xea => entry(Video, Codec::Vc1, "VC-1"),
        _ => lookup_stream_type(stream_type),
    }
}

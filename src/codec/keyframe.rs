use super::mpeg_video::start_codes;
use super::{h264, mpeg_video, Codec};

const VC1_SEQUENCE_HEADER: u8 = 0x0F;
const MPEG4_VOS_START: u8 = 0xB0;
const MPEG4_VOP_START: u8 = 0xB6;

/// Per-codec random access heuristic on the start of a video unit.
///
/// Codecs without a known heuristic answer `true` so they are never
/// starved by keyframe gating.
pub fn is_keyframe(codec: Codec, data: &[u8]) -> bool {
    match codec {
        Codec::Mpeg1Video | Codec::Mpeg2Video => mpeg_video::is_random_access(data),
        Codec::H264 => h264::is_random_access(data),
        Codec::Hevc => hevc_is_irap(data),
        Codec::Vc1 => start_codes(data).any(|(_, id)| id == VC1_SEQUENCE_HEADER),
        Codec::Mpeg4Video => mpeg4_is_intra(data),
        _ => true,
    }
}

fn hevc_is_irap(data: &[u8]) -> bool {
    start_codes(data).any(|(_, header)| {
        // nal_unit_type 16..=21 are BLA, IDR and CRA pictures
        header & 0x80 == 0 && (16..=21).contains(&((header >> 1) & 0x3F))
    })
}

fn mpeg4_is_intra(data: &[u8]) -> bool {
    for (at, id) in start_codes(data) {
        match id {
            MPEG4_VOS_START => return true,
            MPEG4_VOP_START => {
                // vop_coding_type 0 = I
                return data.get(at + 1).map(|b| b >> 6) == Some(0);
            }
            _ => {}
        }
    }
    false
}

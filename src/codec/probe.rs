//! Content sniffing for streams the container does not describe.
//!
//! A [`FormatProbe`] looks at raw elementary stream bytes and names a
//! format the way a generic media library would ("mpegvideo", "ac3", ...).
//! The name is mapped to a [`Codec`] with [`codec_for_format_name`]. A
//! few formats cannot be told apart from a shallow look, so a
//! [`BitstreamProbe`] gets a second, deeper pass at them.

use super::aac::{count_adts_frames, count_loas_frames};
use super::audio::{
    count_truehd_syncs, has_dts_hd, parse_ac3_frame, parse_dts_frame, parse_mpa_frame,
};
use super::h264::{split_nal_units, H264Parser, NALUnit, NALUnitType};
use super::mpeg_video::{self, start_codes};
use super::Codec;
use crate::codec::aac::parser::count_chained;

/// Score at or above which a guess is trusted.
pub const PROBE_SCORE_CONFIDENT: u32 = 50;
pub const PROBE_SCORE_MAX: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeGuess {
    pub name: String,
    pub score: u32,
}

impl ProbeGuess {
    pub fn new(name: &str, score: u32) -> Self {
        Self {
            name: name.to_string(),
            score,
        }
    }

    pub fn is_confident(&self) -> bool {
        self.score >= PROBE_SCORE_CONFIDENT
    }
}

/// Shallow format sniffer.
pub trait FormatProbe: Send + Sync {
    fn probe(&self, data: &[u8]) -> Option<ProbeGuess>;
}

/// Deep pass for codecs a shallow sniff confuses.
pub trait BitstreamProbe: Send + Sync {
    /// Returns the refined codec, or `None` if `data` does not yet hold
    /// enough of the bitstream to decide.
    fn refine(&self, codec: Codec, data: &[u8]) -> Option<Codec>;
}

/// Whether `codec` must go through [`BitstreamProbe::refine`].
pub fn needs_refinement(codec: Codec) -> bool {
    matches!(
        codec,
        Codec::Mpeg1Video | Codec::Mpeg2Video | Codec::Dts | Codec::DtsHd
    )
}

/// Maps a sniffed format name to a codec. Some sniffers report raw
/// framings under their own names, which are folded in here.
pub fn codec_for_format_name(name: &str) -> Option<Codec> {
    let codec = match name {
        "mpegvideo" | "mpeg1video" => Codec::Mpeg1Video,
        "mpeg2video" => Codec::Mpeg2Video,
        "m4v" | "mpeg4" => Codec::Mpeg4Video,
        "h264" => Codec::H264,
        "hevc" | "h265" => Codec::Hevc,
        "vc1" => Codec::Vc1,
        "mp1" | "mp2" | "mp3" => Codec::MpegAudio,
        "aac" | "adts" => Codec::Aac,
        "loas" | "latm" => Codec::AacLatm,
        "ac3" | "a52" => Codec::Ac3,
        "eac3" => Codec::Eac3,
        "dts" | "dca" => Codec::Dts,
        "dtshd" => Codec::DtsHd,
        "truehd" | "mlp" => Codec::TrueHd,
        _ => return None,
    };
    Some(codec)
}

/// Built-in sniffer covering the codecs found in MPEG-2 systems streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFormatProbe;

impl NativeFormatProbe {
    fn frames_score(frames: usize) -> u32 {
        match frames {
            0 => 0,
            1 => PROBE_SCORE_CONFIDENT / 2,
            2 => PROBE_SCORE_CONFIDENT + 1,
            _ => PROBE_SCORE_MAX - 1,
        }
    }

    fn probe_mpeg_video(data: &[u8]) -> u32 {
        let (mut seq, mut pic, mut slice) = (0, 0, 0);
        for (_, id) in start_codes(data) {
            match id {
                mpeg_video::SEQUENCE_HEADER => seq += 1,
                mpeg_video::PICTURE_START => pic += 1,
                0x01..=0xAF => slice += 1,
                // system or MPEG-4 start codes make it something else
                0xB0 | 0xB6 | 0xB9..=0xFF => return 0,
                _ => {}
            }
        }
        if seq > 0 && pic > 0 && slice >= pic {
            PROBE_SCORE_MAX / 2 + 1
        } else {
            0
        }
    }

    fn probe_m4v(data: &[u8]) -> u32 {
        let (mut vos, mut vol, mut vop) = (0, 0, 0);
        for (_, id) in start_codes(data) {
            match id {
                0xB0 => vos += 1,
                0x20..=0x2F => vol += 1,
                0xB6 => vop += 1,
                _ => {}
            }
        }
        if (vos > 0 || vol > 0) && vop > 0 {
            PROBE_SCORE_MAX / 2 + 1
        } else {
            0
        }
    }

    fn probe_h264(data: &[u8]) -> u32 {
        let (mut sps, mut pps, mut slices, mut bad) = (0, 0, 0, 0);
        let parser = H264Parser::new();
        for raw in split_nal_units(data) {
            let Some(unit) = NALUnit::new(raw) else {
                bad += 1;
                continue;
            };
            match unit.unit_type() {
                NALUnitType::SPS if parser.parse_sps(unit.payload()).is_ok() => sps += 1,
                NALUnitType::PPS => pps += 1,
                NALUnitType::CodedSliceIDR | NALUnitType::CodedSliceNonIDR => slices += 1,
                NALUnitType::Unspecified => bad += 1,
                _ => {}
            }
        }
        if sps > 0 && pps > 0 && slices > 0 && bad == 0 {
            PROBE_SCORE_MAX / 2 + 1
        } else if sps > 0 && slices > 0 && bad < slices {
            PROBE_SCORE_CONFIDENT / 2
        } else {
            0
        }
    }

    fn probe_hevc(data: &[u8]) -> u32 {
        let (mut vps, mut sps, mut pps, mut irap, mut bad) = (0, 0, 0, 0, 0);
        for raw in split_nal_units(data) {
            if raw.len() < 2 || raw[0] & 0x80 != 0 || raw[1] & 0x07 == 0 {
                bad += 1;
                continue;
            }
            match (raw[0] >> 1) & 0x3F {
                32 => vps += 1,
                33 => sps += 1,
                34 => pps += 1,
                16..=21 => irap += 1,
                41..=47 => bad += 1,
                _ => {}
            }
        }
        if vps > 0 && sps > 0 && pps > 0 && irap > 0 && bad == 0 {
            PROBE_SCORE_MAX / 2 + 1
        } else {
            0
        }
    }

    fn probe_vc1(data: &[u8]) -> u32 {
        let (mut seq, mut entry, mut frame) = (0, 0, 0);
        for (_, id) in start_codes(data) {
            match id {
                0x0F => seq += 1,
                0x0E => entry += 1,
                0x0D => frame += 1,
                _ => {}
            }
        }
        if seq > 0 && entry > 0 && frame > 0 {
            PROBE_SCORE_MAX / 2 + 1
        } else {
            0
        }
    }
}

impl FormatProbe for NativeFormatProbe {
    fn probe(&self, data: &[u8]) -> Option<ProbeGuess> {
        let ac3 = |f: &[u8]| parse_ac3_frame(f).filter(|h| !h.is_eac3()).map(|h| h.size);
        let eac3 = |f: &[u8]| parse_ac3_frame(f).filter(|h| h.is_eac3()).map(|h| h.size);
        let mpa = |f: &[u8]| parse_mpa_frame(f).map(|h| h.size);

        let candidates = [
            ("mpegvideo", Self::probe_mpeg_video(data)),
            ("m4v", Self::probe_m4v(data)),
            ("h264", Self::probe_h264(data)),
            ("hevc", Self::probe_hevc(data)),
            ("vc1", Self::probe_vc1(data)),
            ("ac3", Self::frames_score(count_chained(data, ac3))),
            ("eac3", Self::frames_score(count_chained(data, eac3))),
            ("dts", Self::frames_score(count_chained(data, parse_dts_frame))),
            ("aac", Self::frames_score(count_adts_frames(data))),
            ("loas", Self::frames_score(count_loas_frames(data))),
            ("truehd", Self::frames_score(count_truehd_syncs(data))),
            ("mp3", Self::frames_score(count_chained(data, mpa)).saturating_sub(1)),
        ];

        candidates
            .iter()
            .filter(|(_, score)| *score > 0)
            .max_by_key(|(_, score)| *score)
            .map(|(name, score)| ProbeGuess::new(name, *score))
    }
}

/// Built-in deep pass: MPEG-1 vs MPEG-2 video and DTS core vs DTS-HD.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBitstreamProbe;

impl BitstreamProbe for NativeBitstreamProbe {
    fn refine(&self, codec: Codec, data: &[u8]) -> Option<Codec> {
        match codec {
            Codec::Mpeg1Video | Codec::Mpeg2Video => mpeg_video::detect_version(data),
            Codec::Dts | Codec::DtsHd => Some(if has_dts_hd(data) {
                Codec::DtsHd
            } else {
                Codec::Dts
            }),
            other => Some(other),
        }
    }
}

/// The pair of collaborators used while probing.
pub struct Probes {
    pub format: Box<dyn FormatProbe>,
    pub bitstream: Box<dyn BitstreamProbe>,
}

impl Probes {
    /// Full classification of a byte sample: sniff, map, refine.
    pub fn classify(&self, data: &[u8]) -> Option<Codec> {
        let guess = self.format.probe(data).filter(ProbeGuess::is_confident)?;
        let codec = codec_for_format_name(&guess.name)?;
        if needs_refinement(codec) {
            self.bitstream.refine(codec, data)
        } else {
            Some(codec)
        }
    }
}

impl Default for Probes {
    fn default() -> Self {
        Self {
            format: Box::new(NativeFormatProbe),
            bitstream: Box::new(NativeBitstreamProbe),
        }
    }
}

impl std::fmt::Debug for Probes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Probes")
    }
}

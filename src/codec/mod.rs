//! # Codec classification
//!
//! The demuxer never decodes; it only needs to know which codec a stream
//! carries, whether a unit starts at a random access point, and enough of
//! each bitstream's framing to tell look-alike codecs apart.

use crate::av::StreamKind;

pub mod aac;
pub mod audio;
pub mod h264;
pub mod keyframe;
pub mod mpeg_video;
pub mod probe;
pub mod stream_type;

pub use keyframe::is_keyframe;
pub use probe::{
    codec_for_format_name, BitstreamProbe, FormatProbe, NativeBitstreamProbe, NativeFormatProbe,
    ProbeGuess, Probes,
};
pub use stream_type::{lookup_stream_type, lookup_hdmv_stream_type, StreamTypeEntry};

/// Codecs the demuxer can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Video,
    H264,
    Hevc,
    Vc1,
    MpegAudio,
    Aac,
    AacLatm,
    Ac3,
    Eac3,
    Dts,
    DtsHd,
    TrueHd,
    Lpcm,
    DvdSub,
    PgsSub,
    DvbSub,
    Teletext,
    Unknown,
}

impl Codec {
    pub fn name(self) -> &'static str {
        match self {
            Codec::Mpeg1Video => "MPEG-1 Video",
            Codec::Mpeg2Video => "MPEG-2 Video",
            Codec::Mpeg4Video => "MPEG-4 Video",
            Codec::H264 => "H.264",
            Codec::Hevc => "HEVC",
            Codec::Vc1 => "VC-1",
            Codec::MpegAudio => "MPEG Audio",
            Codec::Aac => "AAC",
            Codec::AacLatm => "AAC LATM",
            Codec::Ac3 => "AC-3",
            Codec::Eac3 => "E-AC-3",
            Codec::Dts => "DTS",
            Codec::DtsHd => "DTS-HD",
            Codec::TrueHd => "TrueHD",
            Codec::Lpcm => "LPCM",
            Codec::DvdSub => "VOBSUB",
            Codec::PgsSub => "PGS",
            Codec::DvbSub => "DVB Subtitles",
            Codec::Teletext => "Teletext",
            Codec::Unknown => "Unknown",
        }
    }

    /// The stream kind a codec implies.
    pub fn kind(self) -> StreamKind {
        match self {
            Codec::Mpeg1Video
            | Codec::Mpeg2Video
            | Codec::Mpeg4Video
            | Codec::H264
            | Codec::Hevc
            | Codec::Vc1 => StreamKind::Video,
            Codec::MpegAudio
            | Codec::Aac
            | Codec::AacLatm
            | Codec::Ac3
            | Codec::Eac3
            | Codec::Dts
            | Codec::DtsHd
            | Codec::TrueHd
            | Codec::Lpcm => StreamKind::Audio,
            Codec::DvdSub | Codec::PgsSub | Codec::DvbSub | Codec::Teletext => {
                StreamKind::Subtitle
            }
            Codec::Unknown => StreamKind::Unknown,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

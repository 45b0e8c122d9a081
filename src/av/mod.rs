use crate::codec::Codec;
use bytes::Bytes;

/// What a logical elementary stream turned out to be.
///
/// Streams start as `Unknown` and move to one of the other kinds once;
/// they never go back to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Unknown,
    NotWanted,
    Audio,
    Video,
    Subtitle,
    /// Carries the program clock but no payload we demux.
    PcrOnly,
}

impl StreamKind {
    /// Kinds whose payload is handed downstream.
    pub fn is_media(self) -> bool {
        matches!(self, StreamKind::Audio | StreamKind::Video | StreamKind::Subtitle)
    }

    pub fn letter(self) -> char {
        match self {
            StreamKind::Unknown => 'U',
            StreamKind::NotWanted => 'N',
            StreamKind::Audio => 'A',
            StreamKind::Video => 'V',
            StreamKind::Subtitle => 'S',
            StreamKind::PcrOnly => 'P',
        }
    }
}

/// Public description of one demuxable stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Stable logical id, also carried by every [`DemuxBuffer`].
    pub id: usize,
    pub kind: StreamKind,
    pub codec: Codec,
    /// Registration format identifier or private sub-stream id, 0 when absent.
    pub codec_param: u32,
    /// Container-declared type code (PMT/PSM stream_type).
    pub stream_type: u8,
    /// PID for transport streams, stream id for program streams.
    pub physical: u16,
    pub sub_stream: Option<u8>,
    pub language: Option<String>,
    /// Codec side data such as subtitle descriptor bytes.
    pub extra: Option<Bytes>,
}

mod packet;
pub use packet::*;

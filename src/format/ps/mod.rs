//! # MPEG Program Stream (PS) demuxing
//!
//! Program streams are a sequence of packs. Each pack header carries the
//! system clock reference and is followed by PES packets. DVDs put all
//! audio and subpicture streams into private stream 1, told apart by a
//! sub-stream id byte at the start of the payload.

/// Pack header and program stream map parsing
pub mod pack;

/// Program stream demuxer
pub mod demuxer;

pub use demuxer::{private_stream_codec, PSDemuxer};
pub use pack::{parse_pack_header, parse_psm, PackHeader, ProgramStreamMap, PsmEntry};

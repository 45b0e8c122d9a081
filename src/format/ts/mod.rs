//! # MPEG Transport Stream (TS) demuxing
//!
//! This module reads transport streams packet by packet:
//!
//! - TS header and adaptation field parsing, with PCR extraction
//! - PAT and PMT section reassembly and parsing
//! - Per PID PES reassembly with continuity checking
//! - 188, 192 (M2TS), 204 and 208 byte packets
//!
//! ## Example Usage
//!
//! ```rust
//! use esdemux::format::ts::{TSPacketParser, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
//! packet[..4].copy_from_slice(&[0x47, 0x41, 0x00, 0x10]);
//!
//! let parser = TSPacketParser::new();
//! let header = parser.parse_header(&packet)?;
//! assert_eq!(header.pid, 0x100);
//! assert!(header.payload_unit_start);
//! assert_eq!(parser.payload_offset(&header, &packet)?, 4);
//! # Ok(())
//! # }
//! ```

/// TS demuxer extracting elementary streams
pub mod demuxer;

/// Low-level TS packet and PSI parsing
pub mod parser;

/// PSI section reassembly
pub mod section;

/// Per PID PES reassembly and continuity checking
pub mod slot;

/// Core TS types and constants
pub mod types;

pub use demuxer::TSDemuxer;
pub use parser::TSPacketParser;
pub use section::SectionAssembler;
pub use slot::{Continuity, PhysicalSlot};
pub use types::{
    AdaptationField, Descriptor, ElementaryStreamInfo, TSHeader, PAT, PID_NULL, PID_PAT, PMT,
    TS_PACKET_SIZE,
};

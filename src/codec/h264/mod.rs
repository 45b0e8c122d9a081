//! # H.264/AVC inspection
//!
//! Just enough of the Annex B bitstream to classify a stream and find
//! random access points:
//!
//! - NAL unit splitting and emulation prevention removal
//! - Sequence Parameter Set parsing (profile, level, dimensions)
//! - IDR / recovery point / intra slice detection
//!
//! ```rust
//! use esdemux::codec::h264::is_random_access;
//!
//! let idr = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];
//! assert!(is_random_access(&idr));
//! ```

/// Parser for H.264 bitstreams, implementing NAL unit extraction and parsing
pub mod parser;
/// NAL unit and parameter set types
pub mod types;

#[doc(inline)]
pub use parser::*;
#[doc(inline)]
pub use types::*;

//! AAC framing: ADTS headers and LOAS sync detection.

pub mod parser;
pub mod types;

pub use parser::{count_adts_frames, count_loas_frames, parse_adts_header};
pub use types::{ADTSHeader, ProfileType};

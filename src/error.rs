use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized container")]
    UnrecognizedContainer,

    #[error("sync lost at offset {0}")]
    SyncLost(u64),

    #[error("continuity error on pid 0x{pid:x}: expected {expected}, got {got}")]
    Continuity { pid: u16, expected: u8, got: u8 },

    #[error("malformed table: {0}")]
    MalformedTable(String),

    #[error("malformed pes header: {0}")]
    MalformedPesHeader(String),

    #[error("bitstream error: {0}")]
    Bitstream(String),

    #[error("probe exhausted for stream {0}")]
    ProbeExhausted(usize),

    #[error("seek unsupported: {0}")]
    SeekUnsupported(&'static str),

    #[error("delegate error: {0}")]
    Delegate(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl DemuxError {
    /// Errors that drop the offending unit but leave the handle usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DemuxError::SyncLost(_)
                | DemuxError::Continuity { .. }
                | DemuxError::MalformedTable(_)
                | DemuxError::MalformedPesHeader(_)
                | DemuxError::Bitstream(_)
                | DemuxError::ProbeExhausted(_)
                | DemuxError::SeekUnsupported(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;

use crate::av::{DemuxBuffer, StreamInfo};
use crate::error::{DemuxError, Result};
use crate::utils::ErrorLog;
use log::info;

pub mod clock;
pub mod delegate;
pub mod duration;
pub mod emit;
pub mod handle;
pub mod pes;
pub mod prober;
pub mod ps;
pub mod registry;
pub mod seek;
pub mod source;
pub mod sync;
pub mod ts;

/// How an input is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `offset` is where the first whole packet starts.
    Transport { packet_size: usize, offset: usize },
    Program { offset: usize },
    /// Anything else, handed to a [`delegate::ContainerDelegate`].
    Delegated,
}

impl ContainerKind {
    /// Looks at the head of a file. Transport streams are tried first
    /// since a pack header pattern can occur inside TS payload.
    pub fn detect(head: &[u8]) -> Option<ContainerKind> {
        if let Some((packet_size, sync)) = sync::detect_ts_packet_size(head) {
            let offset = sync::first_packet_offset(packet_size, sync);
            info!("transport stream, {} byte packets at {}", packet_size, offset);
            return Some(ContainerKind::Transport { packet_size, offset });
        }
        if let Some(offset) = sync::detect_program_stream(head) {
            info!("program stream at {}", offset);
            return Some(ContainerKind::Program { offset });
        }
        None
    }
}

/// Common trait for container demuxers
#[async_trait::async_trait]
pub trait Demuxer: Send {
    /// Next buffer in file order. Once the input is exhausted every call
    /// returns an end-of-stream buffer.
    async fn read_buffer(&mut self) -> Result<DemuxBuffer>;

    /// Streams that produce buffers.
    fn streams(&self) -> Vec<StreamInfo>;

    /// Repositions to `fraction` (0.0 to 1.0) of the input.
    async fn seek_fraction(&mut self, fraction: f64) -> Result<()>;

    /// Repositions to a presentation time in 90 kHz ticks.
    async fn seek_timestamp(&mut self, _ts: i64) -> Result<()> {
        Err(DemuxError::SeekUnsupported("timestamp seek needs an indexed container"))
    }

    /// Estimated duration in 90 kHz ticks.
    fn duration(&self) -> Option<i64>;

    /// Per-chapter durations in 90 kHz ticks, empty when unknown.
    fn chapters(&self) -> Vec<i64> {
        Vec::new()
    }

    fn error_log(&self) -> &ErrorLog;
}

pub use self::delegate::{ContainerDelegate, DelegateOpener, DelegatePacket, DelegatedDemuxer};
pub use self::handle::StreamHandle;
pub use self::ps::PSDemuxer;
pub use self::ts::TSDemuxer;

//! Inputs that are neither transport nor program streams are read through
//! an external container library. This module only defines the seam and
//! adapts its packets to [`DemuxBuffer`]s.

use super::Demuxer;
use crate::av::{BufferKind, DemuxBuffer, StreamInfo, StreamKind};
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::utils::ErrorLog;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};

/// One packet as the container library hands it over.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatePacket {
    /// Index into [`ContainerDelegate::streams`].
    pub stream_id: usize,
    pub data: Bytes,
    /// 90 kHz ticks.
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: Option<i64>,
    pub is_key: bool,
}

/// A generic container reader.
#[async_trait]
pub trait ContainerDelegate: Send {
    /// Next packet, `None` at end of input.
    async fn read_packet(&mut self) -> Result<Option<DelegatePacket>>;

    /// Seeks to a presentation time in 90 kHz ticks.
    async fn seek(&mut self, ts: i64) -> Result<()>;

    fn streams(&self) -> Vec<StreamInfo>;

    fn duration(&self) -> Option<i64>;

    /// Per-chapter durations in 90 kHz ticks.
    fn chapters(&self) -> Vec<i64> {
        Vec::new()
    }
}

/// Opens a [`ContainerDelegate`] over a source that was not recognized
/// as TS or PS.
#[async_trait]
pub trait DelegateOpener<R: Send + 'static>: Send + Sync {
    async fn open(&self, source: R) -> Result<Box<dyn ContainerDelegate>>;
}

/// [`Demuxer`] over a [`ContainerDelegate`].
pub struct DelegatedDemuxer {
    delegate: Box<dyn ContainerDelegate>,
    streams: Vec<StreamInfo>,
    errors: ErrorLog,
    discontinuity: bool,
    finished: bool,
}

impl DelegatedDemuxer {
    /// Wraps `delegate`, keeping the audio and subtitle tracks `config`
    /// selects.
    pub fn new(delegate: Box<dyn ContainerDelegate>, config: &DemuxConfig) -> Self {
        let streams: Vec<StreamInfo> = delegate
            .streams()
            .into_iter()
            .filter(|s| match s.kind {
                StreamKind::Video => true,
                StreamKind::Audio => config.audio.selects(s.id, s.language.as_deref()),
                StreamKind::Subtitle => config.subtitles.selects(s.id, s.language.as_deref()),
                _ => false,
            })
            .collect();
        info!("delegated container with {} usable streams", streams.len());
        Self {
            delegate,
            streams,
            errors: ErrorLog::new(config.warn_interval_frames),
            discontinuity: false,
            finished: false,
        }
    }

    fn stream_kind(&self, id: usize) -> Option<BufferKind> {
        self.streams
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| BufferKind::from_stream_kind(s.kind))
    }
}

#[async_trait]
impl Demuxer for DelegatedDemuxer {
    async fn read_buffer(&mut self) -> Result<DemuxBuffer> {
        while !self.finished {
            let Some(packet) = self.delegate.read_packet().await? else {
                self.finished = true;
                break;
            };
            let Some(kind) = self.stream_kind(packet.stream_id) else {
                continue;
            };
            if kind == BufferKind::Video {
                self.errors.frame();
            }
            let mut buf = DemuxBuffer::new(packet.data, kind)
                .with_stream_id(packet.stream_id)
                .with_start(packet.pts)
                .with_render_offset(packet.dts.or(packet.pts))
                .with_discontinuity(std::mem::take(&mut self.discontinuity))
                .with_key_flag(packet.is_key);
            if let Some(duration) = packet.duration {
                buf = buf.with_duration(duration);
            }
            return Ok(buf);
        }
        Ok(DemuxBuffer::end_of_stream())
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.clone()
    }

    async fn seek_fraction(&mut self, fraction: f64) -> Result<()> {
        let duration = self
            .delegate
            .duration()
            .ok_or(DemuxError::SeekUnsupported("container has no duration"))?;
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.seek_timestamp((duration as f64 * fraction) as i64).await
    }

    async fn seek_timestamp(&mut self, ts: i64) -> Result<()> {
        debug!("delegated seek to {}", ts);
        self.delegate.seek(ts.max(0)).await?;
        self.finished = false;
        self.discontinuity = true;
        Ok(())
    }

    fn duration(&self) -> Option<i64> {
        self.delegate.duration()
    }

    fn chapters(&self) -> Vec<i64> {
        self.delegate.chapters()
    }

    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}

use super::delegate::{ContainerDelegate, DelegateOpener, DelegatedDemuxer};
use super::ps::PSDemuxer;
use super::seek::{ChapterMap, ChapterMarker};
use super::source::{Source, SourceReader};
use super::sync::PS_DETECT_WINDOW;
use super::ts::TSDemuxer;
use super::{ContainerKind, Demuxer};
use crate::av::{DemuxBuffer, StreamInfo};
use crate::codec::Probes;
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use futures::stream::{self, Stream};
use log::{debug, info};

/// One opened input.
///
/// Wraps the demuxer picked for the detected container and keeps chapter
/// bookkeeping on top of it. A handle is used by one caller at a time; a
/// seek must not be issued while a read is in flight.
pub struct StreamHandle {
    demuxer: Box<dyn Demuxer>,
    container: ContainerKind,
    chapters: ChapterMarker,
}

enum Detected<R> {
    Native(StreamHandle),
    Unrecognized(SourceReader<R>),
}

impl StreamHandle {
    /// Opens a transport or program stream.
    pub async fn open<R: Source + 'static>(source: R, config: DemuxConfig) -> Result<Self> {
        Self::open_with_probes(source, config, Probes::default()).await
    }

    /// Like [`open`](Self::open) with caller supplied codec probes.
    pub async fn open_with_probes<R: Source + 'static>(
        source: R,
        config: DemuxConfig,
        probes: Probes,
    ) -> Result<Self> {
        match Self::detect(source, config, probes).await? {
            Detected::Native(handle) => Ok(handle),
            Detected::Unrecognized(_) => Err(DemuxError::UnrecognizedContainer),
        }
    }

    /// Opens a transport or program stream, handing anything else to
    /// `opener`.
    pub async fn open_with_delegate<R, O>(source: R, config: DemuxConfig, opener: &O) -> Result<Self>
    where
        R: Source + 'static,
        O: DelegateOpener<R> + ?Sized,
    {
        match Self::detect(source, config.clone(), Probes::default()).await? {
            Detected::Native(handle) => Ok(handle),
            Detected::Unrecognized(reader) => {
                let delegate = opener.open(reader.into_inner().await?).await?;
                Ok(Self::open_delegated(delegate, config))
            }
        }
    }

    /// Wraps an already opened generic container.
    pub fn open_delegated(delegate: Box<dyn ContainerDelegate>, config: DemuxConfig) -> Self {
        let demuxer = DelegatedDemuxer::new(delegate, &config);
        Self::from_demuxer(Box::new(demuxer), ContainerKind::Delegated)
    }

    async fn detect<R: Source + 'static>(
        source: R,
        config: DemuxConfig,
        probes: Probes,
    ) -> Result<Detected<R>> {
        let mut reader = SourceReader::new(source).await?;
        reader.fill(PS_DETECT_WINDOW).await?;
        let kind = ContainerKind::detect(reader.peek());

        let demuxer: Box<dyn Demuxer> = match kind {
            Some(ContainerKind::Transport {
                packet_size,
                offset,
            }) => Box::new(
                TSDemuxer::open(reader, packet_size, offset as u64, config, probes).await?,
            ),
            Some(ContainerKind::Program { offset }) => {
                Box::new(PSDemuxer::open(reader, offset as u64, config, probes).await?)
            }
            Some(ContainerKind::Delegated) | None => {
                debug!("neither transport nor program stream");
                return Ok(Detected::Unrecognized(reader));
            }
        };
        Ok(Detected::Native(Self::from_demuxer(demuxer, kind.unwrap_or(ContainerKind::Delegated))))
    }

    fn from_demuxer(demuxer: Box<dyn Demuxer>, container: ContainerKind) -> Self {
        let chapters = ChapterMarker::new(ChapterMap::from_durations(&demuxer.chapters()));
        Self {
            demuxer,
            container,
            chapters,
        }
    }

    pub fn container(&self) -> ContainerKind {
        self.container
    }

    /// Next buffer in file order; an end-of-stream buffer once the input
    /// is exhausted.
    pub async fn read_buffer(&mut self) -> Result<DemuxBuffer> {
        let mut buf = self.demuxer.read_buffer().await?;
        if !buf.is_end_of_stream() {
            self.chapters.observe(&mut buf);
        }
        Ok(buf)
    }

    /// Seeks to `fraction` of the input. Seeking to 0.0 restores the state
    /// right after open.
    pub async fn seek_fraction(&mut self, fraction: f64) -> Result<()> {
        self.demuxer.seek_fraction(fraction).await?;
        if let (Some(duration), false) = (self.demuxer.duration(), fraction.is_nan()) {
            self.chapters
                .relocate((duration as f64 * fraction.clamp(0.0, 1.0)) as i64);
        }
        Ok(())
    }

    /// Seeks to a presentation time in 90 kHz ticks. Only delegated
    /// containers support this.
    pub async fn seek_timestamp(&mut self, ts: i64) -> Result<()> {
        self.demuxer.seek_timestamp(ts).await?;
        self.chapters.relocate(ts);
        Ok(())
    }

    /// Declares that reading continues at `chapter` (1-based); the next
    /// video buffer carries the chapter mark.
    pub fn set_chapter(&mut self, chapter: u32) {
        self.chapters.set_chapter(chapter);
    }

    pub fn chapter(&self) -> u32 {
        self.chapters.current()
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.demuxer.streams()
    }

    /// Duration in 90 kHz ticks, if known.
    pub fn duration(&self) -> Option<i64> {
        self.demuxer.duration()
    }

    /// Closes the handle and returns the frame and error summary.
    pub fn close(self) -> String {
        let summary = self.demuxer.error_log().summary();
        info!("closed: {}", summary);
        summary
    }

    /// Buffers until end of stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<DemuxBuffer>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut handle = state?;
            match handle.read_buffer().await {
                Ok(buf) if buf.is_end_of_stream() => None,
                Ok(buf) => Some((Ok(buf), Some(handle))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

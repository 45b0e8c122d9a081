use super::prober::Prober;
use crate::av::{StreamInfo, StreamKind};
use crate::codec::Codec;
use crate::config::TrackSelection;
use bytes::Bytes;
use log::{debug, info};

/// Which units of a physical stream a logical stream takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubStream {
    /// The physical stream is not sub-divided.
    None,
    Id(u8),
    /// Every unit regardless of its sub-stream id.
    All,
}

impl SubStream {
    pub fn matches(self, unit: Option<u8>) -> bool {
        match self {
            SubStream::Id(id) => unit == Some(id),
            SubStream::None | SubStream::All => true,
        }
    }

    pub fn id(self) -> Option<u8> {
        match self {
            SubStream::Id(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Active,
    Inactive,
}

/// One demuxable elementary stream.
#[derive(Debug)]
pub struct LogicalStream {
    pub id: usize,
    /// PID for transport streams, stream id for program streams.
    pub physical: u16,
    pub sub_stream: SubStream,
    pub stream_type: u8,
    pub kind: StreamKind,
    pub codec: Codec,
    pub codec_param: u32,
    pub language: Option<String>,
    pub extra: Option<Bytes>,
    pub state: SlotState,
    /// Set on a clock discontinuity, cleared by the next emitted buffer.
    pub pending_discontinuity: bool,
    pub probe: Option<Prober>,
}

impl LogicalStream {
    pub fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    pub fn is_media(&self) -> bool {
        self.is_active() && self.kind.is_media()
    }

    /// Stops emitting buffers for this stream. A stream on the clock
    /// carrying physical stream stays active as PCR-only.
    fn retire(&mut self, pcr: Option<u16>) {
        if Some(self.physical) == pcr {
            self.kind = StreamKind::PcrOnly;
        } else {
            self.state = SlotState::Inactive;
        }
        self.probe = None;
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id,
            kind: self.kind,
            codec: self.codec,
            codec_param: self.codec_param,
            stream_type: self.stream_type,
            physical: self.physical,
            sub_stream: self.sub_stream.id(),
            language: self.language.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Arena of logical streams. Ids are arena indices and stay valid for
/// the lifetime of the handle; streams are only ever deactivated.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Vec<LogicalStream>,
    pcr_physical: Option<u16>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream, or returns the id already registered for the
    /// same physical and sub-stream pair.
    pub fn add(&mut self, physical: u16, sub_stream: SubStream, stream_type: u8, codec: Codec) -> usize {
        if let Some(id) = self.find(physical, sub_stream) {
            return id;
        }
        let id = self.streams.len();
        self.streams.push(LogicalStream {
            id,
            physical,
            sub_stream,
            stream_type,
            kind: codec.kind(),
            codec,
            codec_param: 0,
            language: None,
            extra: None,
            state: SlotState::Active,
            pending_discontinuity: false,
            probe: None,
        });
        id
    }

    pub fn find(&self, physical: u16, sub_stream: SubStream) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.physical == physical && s.sub_stream == sub_stream)
            .map(|s| s.id)
    }

    pub fn by_physical(&self, physical: u16) -> impl Iterator<Item = &LogicalStream> {
        self.streams.iter().filter(move |s| s.physical == physical)
    }

    /// Active streams of `physical` that take a unit with sub-stream id
    /// `unit`.
    pub fn matching(&self, physical: u16, unit: Option<u8>) -> Vec<usize> {
        self.by_physical(physical)
            .filter(|s| s.is_active() && s.sub_stream.matches(unit))
            .map(|s| s.id)
            .collect()
    }

    pub fn get(&self, id: usize) -> Option<&LogicalStream> {
        self.streams.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut LogicalStream> {
        self.streams.get_mut(id)
    }

    pub fn deactivate(&mut self, id: usize) {
        if let Some(stream) = self.streams.get_mut(id) {
            stream.state = SlotState::Inactive;
            stream.probe = None;
        }
    }

    /// Settles the codec of a stream that is still unknown. Known streams
    /// are left alone; returns whether anything changed.
    pub fn resolve(&mut self, id: usize, codec: Codec) -> bool {
        let Some(stream) = self.streams.get_mut(id) else {
            return false;
        };
        if stream.kind != StreamKind::Unknown || codec.kind() == StreamKind::Unknown {
            return false;
        }
        stream.codec = codec;
        stream.kind = codec.kind();
        stream.probe = None;
        info!(
            "stream {} (0x{:x}) resolved to {} {}",
            id,
            stream.physical,
            stream.kind.letter(),
            codec
        );
        true
    }

    /// Gives up on a stream. The clock carrying stream keeps being read
    /// for its clock references.
    pub fn mark_not_wanted(&mut self, id: usize) {
        let pcr = self.pcr_physical;
        if let Some(stream) = self.streams.get_mut(id) {
            stream.kind = if Some(stream.physical) == pcr {
                StreamKind::PcrOnly
            } else {
                StreamKind::NotWanted
            };
            stream.probe = None;
        }
    }

    pub fn set_pcr(&mut self, physical: u16) {
        self.pcr_physical = Some(physical);
    }

    pub fn pcr_physical(&self) -> Option<u16> {
        self.pcr_physical
    }

    /// Keeps the video stream with the lowest physical/sub-stream pair and
    /// deactivates the others.
    pub fn resolve_primary_video(&mut self) -> Option<usize> {
        let primary = self
            .streams
            .iter()
            .filter(|s| s.is_active() && s.kind == StreamKind::Video)
            .min_by_key(|s| (s.physical, s.sub_stream.id().unwrap_or(0)))
            .map(|s| s.id)?;

        let pcr = self.pcr_physical;
        for stream in self.streams.iter_mut() {
            if stream.id != primary && stream.is_active() && stream.kind == StreamKind::Video {
                debug!("video stream {} superseded by {}", stream.id, primary);
                stream.retire(pcr);
            }
        }
        Some(primary)
    }

    /// Deactivates unwanted streams and unselected audio and subtitle
    /// tracks. Ids are not renumbered.
    pub fn prune(&mut self, audio: &TrackSelection, subtitles: &TrackSelection) {
        let pcr = self.pcr_physical;
        for stream in self.streams.iter_mut().filter(|s| s.is_active()) {
            let keep = match stream.kind {
                StreamKind::NotWanted | StreamKind::Unknown => false,
                StreamKind::Audio => audio.selects(stream.id, stream.language.as_deref()),
                StreamKind::Subtitle => subtitles.selects(stream.id, stream.language.as_deref()),
                StreamKind::Video | StreamKind::PcrOnly => true,
            };
            if !keep {
                debug!("dropping stream {} ({})", stream.id, stream.kind.letter());
                stream.retire(pcr);
            }
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &LogicalStream> {
        self.streams.iter().filter(|s| s.is_active())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalStream> {
        self.streams.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LogicalStream> {
        self.streams.iter_mut()
    }

    /// Public descriptions of the streams that produce buffers.
    pub fn media_streams(&self) -> Vec<StreamInfo> {
        self.active()
            .filter(|s| s.kind.is_media())
            .map(LogicalStream::info)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Logs the stream table the way discovery settled it.
    pub fn log_summary(&self) {
        for s in &self.streams {
            info!(
                "  {} 0x{:04x}{} type 0x{:02x} {} {}{}",
                s.id,
                s.physical,
                s.sub_stream
                    .id()
                    .map(|id| format!("/0x{:02x}", id))
                    .unwrap_or_default(),
                s.stream_type,
                s.kind.letter(),
                s.codec,
                if s.is_active() { "" } else { " (inactive)" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_is_idempotent_per_pair() {
        let mut registry = StreamRegistry::new();
        let a = registry.add(0x101, SubStream::None, 0x1b, Codec::H264);
        let b = registry.add(0x102, SubStream::Id(0x76), 0x83, Codec::Ac3);
        let c = registry.add(0x102, SubStream::Id(0x72), 0x83, Codec::TrueHd);
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(registry.add(0x102, SubStream::Id(0x76), 0x83, Codec::Ac3), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_sub_stream_matching() {
        let mut registry = StreamRegistry::new();
        let core = registry.add(0x1100, SubStream::Id(0x71), 0x86, Codec::Dts);
        let hd = registry.add(0x1100, SubStream::All, 0x86, Codec::DtsHd);
        assert_eq!(registry.matching(0x1100, Some(0x71)), vec![core, hd]);
        assert_eq!(registry.matching(0x1100, Some(0x72)), vec![hd]);
        assert!(registry.matching(0x1200, None).is_empty());
    }

    #[test]
    fn test_resolution_is_monotonic() {
        let mut registry = StreamRegistry::new();
        let id = registry.add(0xE0, SubStream::None, 0, Codec::Unknown);
        assert_eq!(registry.get(id).unwrap().kind, StreamKind::Unknown);
        assert!(registry.resolve(id, Codec::Mpeg2Video));
        assert!(!registry.resolve(id, Codec::H264));
        assert!(!registry.resolve(id, Codec::Unknown));
        assert_eq!(registry.get(id).unwrap().codec, Codec::Mpeg2Video);
    }

    #[test]
    fn test_pcr_stream_is_never_unwanted() {
        let mut registry = StreamRegistry::new();
        let id = registry.add(0x100, SubStream::None, 0x06, Codec::Unknown);
        registry.set_pcr(0x100);
        registry.mark_not_wanted(id);
        assert_eq!(registry.get(id).unwrap().kind, StreamKind::PcrOnly);
        registry.prune(&TrackSelection::All, &TrackSelection::All);
        assert!(registry.get(id).unwrap().is_active());
    }

    #[test]
    fn test_pruned_clock_streams_stay_active() {
        let mut registry = StreamRegistry::new();
        let video = registry.add(0x200, SubStream::None, 0x02, Codec::Mpeg2Video);
        let alt = registry.add(0x201, SubStream::None, 0x1b, Codec::H264);
        let audio = registry.add(0x300, SubStream::None, 0x81, Codec::Ac3);
        registry.set_pcr(0x300);
        registry.prune(&TrackSelection::Nothing, &TrackSelection::All);
        let stream = registry.get(audio).unwrap();
        assert!(stream.is_active());
        assert_eq!(stream.kind, StreamKind::PcrOnly);

        registry.set_pcr(0x201);
        assert_eq!(registry.resolve_primary_video(), Some(video));
        let stream = registry.get(alt).unwrap();
        assert!(stream.is_active());
        assert_eq!(stream.kind, StreamKind::PcrOnly);

        let ids: Vec<usize> = registry.media_streams().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![video]);
    }

    #[test]
    fn test_primary_video_and_pruning_keep_ids() {
        let mut registry = StreamRegistry::new();
        let second = registry.add(0x201, SubStream::None, 0x1b, Codec::H264);
        let first = registry.add(0x200, SubStream::None, 0x02, Codec::Mpeg2Video);
        let eng = registry.add(0x300, SubStream::None, 0x81, Codec::Ac3);
        let fre = registry.add(0x301, SubStream::None, 0x81, Codec::Ac3);
        registry.get_mut(eng).unwrap().language = Some("eng".into());
        registry.get_mut(fre).unwrap().language = Some("fre".into());

        assert_eq!(registry.resolve_primary_video(), Some(first));
        registry.prune(
            &TrackSelection::Languages(vec!["eng".into()]),
            &TrackSelection::All,
        );

        let ids: Vec<usize> = registry.media_streams().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first, eng]);
        assert!(!registry.get(second).unwrap().is_active());
        assert_eq!(registry.len(), 4);
    }
}

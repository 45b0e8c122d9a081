use super::StreamKind;
use bytes::Bytes;

/// Media tag of an emitted buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Video,
    Audio,
    Subtitle,
    EndOfStream,
}

impl BufferKind {
    pub fn from_stream_kind(kind: StreamKind) -> Option<Self> {
        match kind {
            StreamKind::Video => Some(BufferKind::Video),
            StreamKind::Audio => Some(BufferKind::Audio),
            StreamKind::Subtitle => Some(BufferKind::Subtitle),
            _ => None,
        }
    }
}

/// One elementary stream unit handed to the decode pipeline.
///
/// Times are in 90 kHz ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxBuffer {
    pub data: Bytes,
    pub stream_id: usize,
    pub kind: BufferKind,
    pub start: Option<i64>,
    /// Decode order time (DTS, or PTS when the unit has no DTS).
    pub render_offset: Option<i64>,
    pub duration: Option<i64>,
    pub discontinuity: bool,
    pub new_chapter: Option<u32>,
    pub is_key: bool,
}

impl DemuxBuffer {
    pub fn new(data: impl Into<Bytes>, kind: BufferKind) -> Self {
        Self {
            data: data.into(),
            stream_id: 0,
            kind,
            start: None,
            render_offset: None,
            duration: None,
            discontinuity: false,
            new_chapter: None,
            is_key: false,
        }
    }

    /// The sentinel returned once input is exhausted, and on every read after.
    pub fn end_of_stream() -> Self {
        Self::new(Bytes::new(), BufferKind::EndOfStream)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.kind == BufferKind::EndOfStream
    }

    pub fn with_stream_id(mut self, id: usize) -> Self {
        self.stream_id = id;
        self
    }

    pub fn with_start(mut self, start: Option<i64>) -> Self {
        self.start = start;
        self
    }

    pub fn with_render_offset(mut self, offset: Option<i64>) -> Self {
        self.render_offset = offset;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_discontinuity(mut self, discontinuity: bool) -> Self {
        self.discontinuity = discontinuity;
        self
    }

    pub fn with_new_chapter(mut self, chapter: u32) -> Self {
        self.new_chapter = Some(chapter);
        self
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let buf = DemuxBuffer::new(vec![1, 2, 3], BufferKind::Video)
            .with_stream_id(2)
            .with_start(Some(3600))
            .with_render_offset(Some(0))
            .with_key_flag(true);
        assert_eq!(buf.stream_id, 2);
        assert_eq!(buf.start, Some(3600));
        assert_eq!(buf.render_offset, Some(0));
        assert!(buf.is_key);
        assert!(!buf.is_end_of_stream());
        assert_eq!(&buf.data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_end_of_stream() {
        let eos = DemuxBuffer::end_of_stream();
        assert!(eos.is_end_of_stream());
        assert!(eos.data.is_empty());
        assert_eq!(BufferKind::from_stream_kind(StreamKind::PcrOnly), None);
    }
}

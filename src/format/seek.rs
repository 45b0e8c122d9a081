use crate::av::{BufferKind, DemuxBuffer};
use log::debug;

/// DVD sector; program stream seeks land on a multiple of it.
pub const SECTOR_SIZE: u64 = 2048;

pub fn sector_align(offset: u64) -> u64 {
    offset & !(SECTOR_SIZE - 1)
}

/// Byte offset for a seek to `fraction` of a `size` byte file, clamped to
/// [0, 1] and rounded down to a sector.
pub fn fraction_to_offset(fraction: f64, size: u64) -> u64 {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    sector_align((size as f64 * fraction) as u64).min(sector_align(size))
}

/// Chapter boundaries as cumulative end times (90 kHz ticks).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterMap {
    ends: Vec<i64>,
}

impl ChapterMap {
    /// Builds the map from per-chapter durations.
    pub fn from_durations(durations: &[i64]) -> Self {
        let mut total = 0;
        let ends = durations
            .iter()
            .map(|d| {
                total += d.max(&0);
                total
            })
            .collect();
        Self { ends }
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// The 1-based chapter containing `ts` and the time it ends. Times past
    /// the last chapter belong to the last chapter.
    pub fn locate(&self, ts: i64) -> Option<(u32, i64)> {
        let last = self.ends.len().checked_sub(1)?;
        let index = self.ends.iter().position(|&end| ts < end).unwrap_or(last);
        Some((index as u32 + 1, self.ends[index]))
    }

    /// End of the 1-based chapter `chapter`.
    pub fn end_of(&self, chapter: u32) -> Option<i64> {
        let index = (chapter as usize).checked_sub(1)?;
        self.ends.get(index).copied()
    }
}

/// Tracks the current chapter and marks the first video buffer of each
/// new one.
#[derive(Debug, Clone, Default)]
pub struct ChapterMarker {
    map: ChapterMap,
    current: u32,
    end: Option<i64>,
    pending: Option<u32>,
}

impl ChapterMarker {
    pub fn new(map: ChapterMap) -> Self {
        let mut marker = Self {
            map,
            ..Default::default()
        };
        marker.set_chapter(1);
        marker.pending = None;
        marker
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// Starts reading at `chapter` (1-based). The next video buffer gets
    /// the new chapter mark.
    pub fn set_chapter(&mut self, chapter: u32) {
        self.current = chapter.max(1);
        self.end = self.map.end_of(self.current);
        self.pending = Some(self.current);
    }

    /// Re-derives chapter state after a seek to `ts`.
    pub fn relocate(&mut self, ts: i64) {
        if let Some((chapter, end)) = self.map.locate(ts) {
            debug!("seek to {} lands in chapter {}", ts, chapter);
            self.current = chapter;
            self.end = Some(end);
            self.pending = Some(chapter);
        }
    }

    /// Looks at an outgoing buffer: advances past chapter ends and puts
    /// the pending mark on the next video buffer.
    pub fn observe(&mut self, buf: &mut DemuxBuffer) {
        if let (Some(end), Some(start)) = (self.end, buf.start) {
            if start >= end && (self.current as usize) < self.map.len() {
                if let Some((chapter, end)) = self.map.locate(start) {
                    self.current = chapter;
                    self.end = Some(end);
                    self.pending = Some(chapter);
                }
            }
        }
        if buf.kind == BufferKind::Video {
            if let Some(chapter) = self.pending.take() {
                buf.new_chapter = Some(chapter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fraction_to_offset() {
        assert_eq!(fraction_to_offset(0.0, 1_000_000), 0);
        assert_eq!(fraction_to_offset(0.5, 1_000_000), 499_712);
        assert_eq!(fraction_to_offset(2.0, 10_000), 8192);
        assert_eq!(fraction_to_offset(f64::NAN, 10_000), 0);
    }

    #[test]
    fn test_chapter_map() {
        let map = ChapterMap::from_durations(&[900, 1800, 900]);
        assert_eq!(map.locate(0), Some((1, 900)));
        assert_eq!(map.locate(900), Some((2, 2700)));
        assert_eq!(map.locate(99_999), Some((3, 3600)));
        assert_eq!(ChapterMap::default().locate(5), None);
    }

    #[test]
    fn test_marker_flags_next_video_buffer() {
        let mut marker = ChapterMarker::new(ChapterMap::from_durations(&[1000, 1000]));

        let mut audio = DemuxBuffer::new(vec![0], BufferKind::Audio).with_start(Some(1200));
        marker.observe(&mut audio);
        assert_eq!(audio.new_chapter, None);
        assert_eq!(marker.current(), 2);

        let mut video = DemuxBuffer::new(vec![0], BufferKind::Video).with_start(Some(1210));
        marker.observe(&mut video);
        assert_eq!(video.new_chapter, Some(2));

        let mut next = DemuxBuffer::new(vec![0], BufferKind::Video).with_start(Some(1250));
        marker.observe(&mut next);
        assert_eq!(next.new_chapter, None);
    }

    #[test]
    fn test_relocate_after_seek() {
        let mut marker = ChapterMarker::new(ChapterMap::from_durations(&[1000, 1000, 1000]));
        marker.relocate(2500);
        assert_eq!(marker.current(), 3);
        let mut video = DemuxBuffer::new(vec![0], BufferKind::Video).with_start(Some(2500));
        marker.observe(&mut video);
        assert_eq!(video.new_chapter, Some(3));
    }
}

use super::pes::{parse_pes_header, SubStreamMode};
use super::registry::StreamRegistry;
use crate::av::{BufferKind, DemuxBuffer};
use crate::codec::is_keyframe;
use crate::utils::ErrorLog;
use bytes::Bytes;
use log::{debug, warn};
use std::collections::VecDeque;

pub const DEFAULT_KEYFRAME_BUDGET: u32 = 600;

/// Drops units after a seek until video restarts on a random access
/// point.
///
/// Audio and subtitles are held back too so every stream restarts at the
/// same place. Streams without recognizable keyframes would stall, so
/// the gate gives up after `budget` dropped video units.
#[derive(Debug, Clone)]
pub struct KeyframeGate {
    waiting: bool,
    budget: u32,
    remaining: u32,
}

impl KeyframeGate {
    pub fn new(budget: u32) -> Self {
        Self {
            waiting: false,
            budget: budget.max(1),
            remaining: 0,
        }
    }

    pub fn arm(&mut self) {
        self.waiting = true;
        self.remaining = self.budget;
    }

    pub fn disarm(&mut self) {
        self.waiting = false;
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Whether a unit of `kind` passes. `is_key` is only looked at for
    /// video.
    pub fn admit(&mut self, kind: BufferKind, is_key: bool) -> bool {
        if !self.waiting {
            return true;
        }
        if kind != BufferKind::Video {
            return false;
        }
        if is_key {
            debug!(
                "keyframe found after {} dropped units",
                self.budget - self.remaining
            );
            self.waiting = false;
            return true;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            warn!("no keyframe within {} units, resuming", self.budget);
            self.waiting = false;
        }
        false
    }
}

impl Default for KeyframeGate {
    fn default() -> Self {
        Self::new(DEFAULT_KEYFRAME_BUDGET)
    }
}

/// Turns reassembled PES units into [`DemuxBuffer`]s.
#[derive(Debug)]
pub struct Emitter {
    pending: VecDeque<DemuxBuffer>,
    gate: KeyframeGate,
    errors: ErrorLog,
}

impl Emitter {
    pub fn new(keyframe_budget: u32, warn_interval: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            gate: KeyframeGate::new(keyframe_budget),
            errors: ErrorLog::new(warn_interval),
        }
    }

    /// Emits one unit (start code onwards) read from `physical`, once per
    /// logical stream it belongs to. Returns how many buffers were queued.
    pub fn emit(
        &mut self,
        registry: &mut StreamRegistry,
        physical: u16,
        unit: Bytes,
        mode: SubStreamMode,
    ) -> usize {
        let info = match parse_pes_header(&unit, mode) {
            Ok(info) => info,
            Err(e) => {
                self.errors.report(&format!("0x{:x}: {}", physical, e));
                return 0;
            }
        };

        let end = info
            .total_len()
            .map_or(unit.len(), |total| total.min(unit.len()));
        if info.header_len > end {
            self.errors
                .report(&format!("0x{:x}: unit shorter than its header", physical));
            return 0;
        }
        let payload = unit.slice(info.header_len..end);

        let mut queued = 0;
        for id in registry.matching(physical, info.sub_stream_id) {
            let Some(stream) = registry.get_mut(id) else {
                continue;
            };
            let Some(kind) = BufferKind::from_stream_kind(stream.kind) else {
                continue;
            };
            let is_key = match kind {
                BufferKind::Video => is_keyframe(stream.codec, &payload),
                _ => true,
            };
            if !self.gate.admit(kind, is_key) {
                continue;
            }
            if kind == BufferKind::Video {
                self.errors.frame();
            }

            let discontinuity = std::mem::take(&mut stream.pending_discontinuity);
            self.pending.push_back(
                DemuxBuffer::new(payload.clone(), kind)
                    .with_stream_id(id)
                    .with_start(info.pts)
                    .with_render_offset(info.dts.or(info.pts))
                    .with_discontinuity(discontinuity)
                    .with_key_flag(is_key),
            );
            queued += 1;
        }
        queued
    }

    pub fn pop(&mut self) -> Option<DemuxBuffer> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Rate-limited error report.
    pub fn report(&mut self, msg: &str) {
        self.errors.report(msg);
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn gate(&mut self) -> &mut KeyframeGate {
        &mut self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mpeg_video::test_utils::{gop, picture};
    use crate::codec::Codec;
    use crate::format::pes::test_utils::pes;
    use crate::format::registry::SubStream;
    use pretty_assertions::assert_eq;

    fn registry() -> StreamRegistry {
        let mut registry = StreamRegistry::new();
        registry.add(0xE0, SubStream::None, 0x02, Codec::Mpeg2Video);
        registry.add(0xBD, SubStream::Id(0x80), 0x81, Codec::Ac3);
        registry.add(0xBD, SubStream::Id(0x81), 0x81, Codec::Ac3);
        registry
    }

    #[test]
    fn test_emits_with_timestamps() {
        let mut registry = registry();
        let mut emitter = Emitter::new(600, 30_000);
        let unit = pes(0xE0, Some(9000), Some(6000), &gop());

        assert_eq!(
            emitter.emit(&mut registry, 0xE0, Bytes::from(unit), SubStreamMode::None),
            1
        );
        let buf = emitter.pop().unwrap();
        assert_eq!(buf.kind, BufferKind::Video);
        assert_eq!(buf.start, Some(9000));
        assert_eq!(buf.render_offset, Some(6000));
        assert!(buf.is_key);
        assert_eq!(&buf.data[..], &gop()[..]);
        assert_eq!(emitter.error_log().frames(), 1);
    }

    #[test]
    fn test_routes_private_sub_streams() {
        let mut registry = registry();
        let mut emitter = Emitter::new(600, 30_000);
        let unit = pes(0xBD, Some(900), None, &[0x81, 0x01, 0x00, 0x01, 0x0B, 0x77]);
        emitter.emit(&mut registry, 0xBD, Bytes::from(unit), SubStreamMode::DvdPrivate);

        let buf = emitter.pop().unwrap();
        assert_eq!(buf.stream_id, 2);
        assert_eq!(buf.render_offset, Some(900));
        assert_eq!(&buf.data[..], &[0x0B, 0x77]);
        assert!(emitter.pop().is_none());
    }

    #[test]
    fn test_gate_waits_for_keyframe() {
        let mut registry = registry();
        let mut emitter = Emitter::new(600, 30_000);
        emitter.gate().arm();

        let p = pes(0xE0, Some(100), None, &picture(2));
        let a = pes(0xBD, Some(100), None, &[0x80, 0x01, 0x00, 0x01, 0x0B, 0x77]);
        let i = pes(0xE0, Some(200), None, &picture(1));

        assert_eq!(emitter.emit(&mut registry, 0xE0, Bytes::from(p), SubStreamMode::None), 0);
        assert_eq!(
            emitter.emit(&mut registry, 0xBD, Bytes::from(a.clone()), SubStreamMode::DvdPrivate),
            0
        );
        assert_eq!(emitter.emit(&mut registry, 0xE0, Bytes::from(i), SubStreamMode::None), 1);
        assert_eq!(
            emitter.emit(&mut registry, 0xBD, Bytes::from(a), SubStreamMode::DvdPrivate),
            1
        );
        assert!(!emitter.gate().is_waiting());
    }

    #[test]
    fn test_gate_gives_up_after_budget() {
        let mut gate = KeyframeGate::new(3);
        gate.arm();
        assert!(!gate.admit(BufferKind::Video, false));
        assert!(!gate.admit(BufferKind::Video, false));
        assert!(!gate.admit(BufferKind::Video, false));
        assert!(!gate.is_waiting());
        assert!(gate.admit(BufferKind::Audio, false));
    }

    #[test]
    fn test_discontinuity_flag_is_consumed() {
        let mut registry = registry();
        registry.get_mut(0).unwrap().pending_discontinuity = true;
        let mut emitter = Emitter::new(600, 30_000);
        for _ in 0..2 {
            let unit = pes(0xE0, Some(100), None, &picture(2));
            emitter.emit(&mut registry, 0xE0, Bytes::from(unit), SubStreamMode::None);
        }
        assert!(emitter.pop().unwrap().discontinuity);
        assert!(!emitter.pop().unwrap().discontinuity);
    }

    #[test]
    fn test_bad_header_is_reported_and_dropped() {
        let mut registry = registry();
        let mut emitter = Emitter::new(600, 30_000);
        let mut unit = pes(0xE0, Some(100), None, &gop());
        unit.truncate(12);
        assert_eq!(emitter.emit(&mut registry, 0xE0, Bytes::from(unit), SubStreamMode::None), 0);
        assert_eq!(emitter.error_log().errors(), 1);
    }
}

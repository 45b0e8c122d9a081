use super::pes::{parse_pes_header, SubStreamMode};
use super::registry::StreamRegistry;
use crate::codec::{Codec, Probes};
use crate::error::DemuxError;
use bytes::BytesMut;
use log::{debug, warn};

/// Buffered bytes at which the first classification is tried; each
/// failed try doubles it up to the cap.
const FIRST_CHECKPOINT: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    NeedMoreData,
    Resolved(Codec),
    Exhausted,
}

/// Accumulates payload of a stream whose codec the container left open
/// and classifies it with the configured [`Probes`].
///
/// Each attempt buffers up to `cap` bytes. An attempt that fills the cap
/// without a confident answer is thrown away and the next one starts from
/// the next unit fed in.
#[derive(Debug)]
pub struct Prober {
    buffer: BytesMut,
    cap: usize,
    attempts_left: u32,
    next_checkpoint: usize,
}

impl Prober {
    pub fn new(cap: usize, attempts: u32) -> Self {
        let cap = cap.max(FIRST_CHECKPOINT);
        Self {
            buffer: BytesMut::new(),
            cap,
            attempts_left: attempts,
            next_checkpoint: FIRST_CHECKPOINT,
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn feed(&mut self, payload: &[u8], probes: &Probes) -> ProbeState {
        if self.attempts_left == 0 {
            return ProbeState::Exhausted;
        }

        let room = self.cap - self.buffer.len();
        self.buffer
            .extend_from_slice(&payload[..payload.len().min(room)]);

        if self.buffer.len() >= self.next_checkpoint {
            self.next_checkpoint = (self.next_checkpoint * 2).min(self.cap);
            if let Some(codec) = probes.classify(&self.buffer) {
                return ProbeState::Resolved(codec);
            }
        }

        if self.buffer.len() >= self.cap {
            self.attempts_left -= 1;
            debug!(
                "probe attempt over {} bytes failed, {} left",
                self.buffer.len(),
                self.attempts_left
            );
            self.buffer.clear();
            self.next_checkpoint = FIRST_CHECKPOINT;
            if self.attempts_left == 0 {
                return ProbeState::Exhausted;
            }
        }
        ProbeState::NeedMoreData
    }

    /// Last try on whatever is buffered when discovery stops early.
    pub fn conclude(&mut self, probes: &Probes) -> ProbeState {
        if self.attempts_left > 0 && !self.buffer.is_empty() {
            if let Some(codec) = probes.classify(&self.buffer) {
                return ProbeState::Resolved(codec);
            }
        }
        self.buffer.clear();
        self.attempts_left = 0;
        ProbeState::Exhausted
    }
}

/// Whether any stream of `registry` is still being probed.
pub fn probing_pending(registry: &StreamRegistry) -> bool {
    registry.iter().any(|s| s.probe.is_some())
}

/// Feeds the payload of one unit read from `physical` to the probers of
/// the streams it belongs to.
pub fn probe_unit(
    registry: &mut StreamRegistry,
    probes: &Probes,
    physical: u16,
    unit: &[u8],
    mode: SubStreamMode,
) {
    let Ok(info) = parse_pes_header(unit, mode) else {
        return;
    };
    let payload = info.payload(unit);
    for id in registry.matching(physical, info.sub_stream_id) {
        let state = match registry.get_mut(id).and_then(|s| s.probe.as_mut()) {
            Some(prober) => prober.feed(payload, probes),
            None => continue,
        };
        settle(registry, id, state);
    }
}

/// Ends probing for every stream still undecided.
pub fn conclude_probes(registry: &mut StreamRegistry, probes: &Probes) {
    let pending: Vec<usize> = registry
        .iter()
        .filter(|s| s.probe.is_some())
        .map(|s| s.id)
        .collect();
    for id in pending {
        let state = match registry.get_mut(id).and_then(|s| s.probe.as_mut()) {
            Some(prober) => prober.conclude(probes),
            None => continue,
        };
        settle(registry, id, state);
    }
}

fn settle(registry: &mut StreamRegistry, id: usize, state: ProbeState) {
    match state {
        ProbeState::NeedMoreData => {}
        ProbeState::Resolved(codec) => {
            if !registry.resolve(id, codec) {
                registry.mark_not_wanted(id);
            }
        }
        ProbeState::Exhausted => {
            warn!("{}", DemuxError::ProbeExhausted(id));
            registry.mark_not_wanted(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::audio::test_utils::ac3_frame;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolves_at_checkpoint() {
        let probes = Probes::default();
        let mut prober = Prober::new(1 << 20, 3);
        let frame = ac3_frame();

        assert_eq!(prober.feed(&frame, &probes), ProbeState::NeedMoreData);
        assert_eq!(prober.feed(&frame, &probes), ProbeState::NeedMoreData);
        assert_eq!(
            prober.feed(&frame, &probes),
            ProbeState::Resolved(Codec::Ac3)
        );
    }

    #[test]
    fn test_exhausts_after_attempts() {
        let probes = Probes::default();
        let mut prober = Prober::new(4096, 2);
        let noise = vec![0x55u8; 1500];

        let mut states = Vec::new();
        for _ in 0..12 {
            states.push(prober.feed(&noise, &probes));
        }
        assert_eq!(states.last(), Some(&ProbeState::Exhausted));
        assert_eq!(prober.attempts_left(), 0);
        assert!(!states.iter().any(|s| matches!(s, ProbeState::Resolved(_))));
    }

    #[test]
    fn test_conclude_uses_partial_buffer() {
        let probes = Probes::default();
        let mut prober = Prober::new(1 << 20, 3);
        let mut data = ac3_frame();
        data.extend(ac3_frame());
        assert_eq!(prober.feed(&data[..1000], &probes), ProbeState::NeedMoreData);
        prober.feed(&data[1000..], &probes);
        let mut more = ac3_frame();
        more.truncate(100);
        let _ = prober.feed(&more, &probes);
        assert_eq!(prober.conclude(&probes), ProbeState::Resolved(Codec::Ac3));
    }

    #[test]
    fn test_probe_unit_settles_registry() {
        use crate::av::StreamKind;
        use crate::format::pes::test_utils::pes;
        use crate::format::registry::SubStream;

        let probes = Probes::default();
        let mut registry = StreamRegistry::new();
        let audio = registry.add(0x100, SubStream::None, 0x06, Codec::Unknown);
        let noise = registry.add(0x101, SubStream::None, 0x06, Codec::Unknown);
        registry.get_mut(audio).unwrap().probe = Some(Prober::new(1 << 20, 3));
        registry.get_mut(noise).unwrap().probe = Some(Prober::new(1 << 20, 3));
        assert!(probing_pending(&registry));

        let mut frames = ac3_frame();
        frames.extend(ac3_frame());
        frames.extend(ac3_frame());
        let unit = pes(0xBD, Some(0), None, &frames);
        probe_unit(&mut registry, &probes, 0x100, &unit, SubStreamMode::None);
        assert_eq!(registry.get(audio).unwrap().codec, Codec::Ac3);

        let unit = pes(0xBD, Some(0), None, &[0x55u8; 500]);
        probe_unit(&mut registry, &probes, 0x101, &unit, SubStreamMode::None);
        conclude_probes(&mut registry, &probes);
        assert_eq!(registry.get(noise).unwrap().kind, StreamKind::NotWanted);
        assert!(!probing_pending(&registry));
    }
}

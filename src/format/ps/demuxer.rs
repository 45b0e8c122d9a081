use super::pack::{parse_pack_header, parse_psm, ProgramStreamMap};
use crate::av::{DemuxBuffer, StreamInfo, StreamKind};
use crate::codec::{lookup_stream_type, Codec, Probes};
use crate::config::DemuxConfig;
use crate::error::Result;
use crate::format::clock::{ClockEvent, ClockTracker};
use crate::format::duration::{
    sample_stream, scan_ps_window, DurationEstimate, DurationSample, PtsSampler, SAMPLE_WINDOW,
};
use crate::format::emit::Emitter;
use crate::format::pes::{parse_pes_header, SubStreamMode};
use crate::format::prober::{conclude_probes, probe_unit, probing_pending, Prober};
use crate::format::registry::{StreamRegistry, SubStream};
use crate::format::seek::{fraction_to_offset, sector_align, SECTOR_SIZE};
use crate::format::source::{Source, SourceReader};
use crate::format::sync::{find_start_code, pack_header_len, PACK_START_CODE, PROGRAM_END_CODE};
use crate::format::ts::parser::TSPacketParser;
use crate::format::ts::types::*;
use crate::format::Demuxer;
use crate::utils::ErrorLog;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};

/// Once this much has been scanned and nothing is left to probe,
/// discovery stops.
const STREAM_SCAN: u64 = 4096 * SECTOR_SIZE;
const READ_AHEAD: usize = 64 * 1024;
/// Longest unbounded unit accepted before it is cut.
const UNBOUNDED_CAP: usize = 1024 * 1024;
/// Largest pack header: 14 bytes plus 7 stuffing bytes.
const MAX_PACK_HEADER: usize = 21;

const MODE: SubStreamMode = SubStreamMode::DvdPrivate;

/// Codec of a DVD / HD-DVD private stream 1 sub-stream, by id range.
pub fn private_stream_codec(sub: u8) -> Codec {
    match sub {
        0x20..=0x3F => Codec::DvdSub,
        0x80..=0x87 => Codec::Ac3,
        0x88..=0x9F => Codec::Dts,
        0xA0..=0xAF => Codec::Lpcm,
        0xB0..=0xBF => Codec::TrueHd,
        0xC0..=0xCF => Codec::Eac3,
        _ => Codec::Unknown,
    }
}

/// MPEG Program Stream demuxer.
///
/// Program streams often carry no stream map, so streams are registered
/// as their packets show up during discovery. Video and unknown private
/// sub-streams are probed.
pub struct PSDemuxer<R> {
    reader: SourceReader<R>,
    psi: TSPacketParser,
    config: DemuxConfig,
    probes: Probes,
    start: u64,
    registry: StreamRegistry,
    psm: Option<ProgramStreamMap>,
    clock: ClockTracker,
    emitter: Emitter,
    estimate: Option<DurationEstimate>,
    finished: bool,
}

struct PsSampler<'a, R> {
    reader: &'a mut SourceReader<R>,
    stream_id: u8,
    codec: Codec,
}

#[async_trait]
impl<R: Source> PtsSampler for PsSampler<'_, R> {
    async fn sample_at(&mut self, offset: u64) -> Result<Option<DurationSample>> {
        let offset = sector_align(offset);
        let window = self.reader.window(offset, SAMPLE_WINDOW).await?;
        Ok(scan_ps_window(window, offset, self.stream_id, self.codec))
    }
}

impl<R: Source> PSDemuxer<R> {
    /// Opens a program stream whose first pack starts at `start`.
    pub async fn open(
        reader: SourceReader<R>,
        start: u64,
        config: DemuxConfig,
        probes: Probes,
    ) -> Result<Self> {
        let psi = TSPacketParser::new().with_crc_check(config.verify_crc);
        let emitter = Emitter::new(config.keyframe_budget, config.warn_interval_frames);
        let mut demuxer = Self {
            reader,
            psi,
            config,
            probes,
            start,
            registry: StreamRegistry::new(),
            psm: None,
            clock: ClockTracker::for_program(),
            emitter,
            estimate: None,
            finished: false,
        };
        demuxer.discover().await?;
        if demuxer.config.estimate_duration {
            demuxer.estimate_duration().await?;
        }
        demuxer.reset().await?;
        Ok(demuxer)
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn stream_map(&self) -> Option<&ProgramStreamMap> {
        self.psm.as_ref()
    }

    /// Next pack header, end code or PES packet, start code first.
    async fn next_unit(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.reader.fill(4).await? < 4 {
                return Ok(None);
            }
            let head = self.reader.peek();
            if head[..3] != [0x00, 0x00, 0x01] {
                self.skip_garbage().await?;
                continue;
            }
            let id = head[3];

            let len = if id == PACK_START_CODE {
                self.reader.fill(MAX_PACK_HEADER).await?;
                match pack_header_len(self.reader.peek()) {
                    Some(len) => len,
                    None => {
                        self.emitter.report("bad pack header");
                        self.reader.consume(4);
                        continue;
                    }
                }
            } else if id == PROGRAM_END_CODE {
                4
            } else if id < PROGRAM_END_CODE {
                // a stray elementary stream start code
                self.reader.consume(3);
                continue;
            } else {
                if self.reader.fill(6).await? < 6 {
                    return Ok(None);
                }
                let head = self.reader.peek();
                match u16::from_be_bytes([head[4], head[5]]) as usize {
                    0 => self.unbounded_len().await?,
                    len => 6 + len,
                }
            };

            match self.reader.read_exact_or_eof(len).await? {
                Some(unit) => return Ok(Some(unit)),
                None => {
                    let left = self.reader.peek().len();
                    self.emitter
                        .report(&format!("unit 0x{:02x} truncated at end of input", id));
                    self.reader.consume(left);
                    return Ok(None);
                }
            }
        }
    }

    /// Length of a unit with no declared length: it runs to the next
    /// systems or PES start code.
    async fn unbounded_len(&mut self) -> Result<usize> {
        let mut from = 6;
        let mut want = READ_AHEAD;
        loop {
            let have = self.reader.fill(want).await?;
            let buf = self.reader.peek();
            let mut at = from;
            while let Some(found) = find_start_code(buf, at) {
                match buf.get(found + 3) {
                    Some(&id) if id >= PROGRAM_END_CODE => return Ok(found),
                    Some(_) => at = found + 1,
                    None => break,
                }
            }
            if have < want || have >= UNBOUNDED_CAP {
                return Ok(have.min(UNBOUNDED_CAP));
            }
            from = have.saturating_sub(3).max(6);
            want = have + READ_AHEAD;
        }
    }

    async fn skip_garbage(&mut self) -> Result<()> {
        let have = self.reader.fill(READ_AHEAD).await?;
        let skip = find_start_code(self.reader.peek(), 0)
            .unwrap_or_else(|| have.saturating_sub(2).max(1));
        let at = self.reader.position();
        self.emitter
            .report(&format!("skipped {} bytes without a start code at {}", skip, at));
        self.reader.consume(skip);
        Ok(())
    }

    /// Positions the reader on the next pack header. Returns false at end
    /// of input.
    async fn skip_to_next_pack(&mut self) -> Result<bool> {
        loop {
            let have = self.reader.fill(READ_AHEAD).await?;
            let buf = self.reader.peek();
            let mut from = 0;
            while let Some(at) = find_start_code(buf, from) {
                if buf.get(at + 3) == Some(&PACK_START_CODE) {
                    self.reader.consume(at);
                    return Ok(true);
                }
                from = at + 1;
            }
            if have < READ_AHEAD {
                self.reader.consume(have);
                return Ok(false);
            }
            self.reader.consume(have - 3);
        }
    }

    async fn discover(&mut self) -> Result<()> {
        self.reader.seek(self.start).await?;
        let limit = self.start.saturating_add(self.config.discovery_limit);
        let settle = self.start.saturating_add(STREAM_SCAN);
        let mut saw_clock = false;

        while self.reader.position() < limit {
            if self.reader.position() >= settle && !probing_pending(&self.registry) {
                break;
            }
            let Some(unit) = self.next_unit().await? else {
                break;
            };
            match unit[3] {
                PACK_START_CODE => saw_clock |= parse_pack_header(&unit).is_ok(),
                STREAM_ID_PSM => {
                    if self.psm.is_none() {
                        match parse_psm(&unit, &self.psi) {
                            Ok(map) => self.apply_stream_map(map),
                            Err(e) => self.emitter.report(&e.to_string()),
                        }
                    }
                }
                PROGRAM_END_CODE | STREAM_ID_SYSTEM_HEADER | STREAM_ID_PADDING
                | STREAM_ID_PRIVATE_2 => {}
                id => {
                    let Ok(info) = parse_pes_header(&unit, MODE) else {
                        continue;
                    };
                    self.register(id, info.sub_stream_id);
                    probe_unit(&mut self.registry, &self.probes, id as u16, &unit, MODE);
                }
            }
        }

        conclude_probes(&mut self.registry, &self.probes);
        self.clock.set_required(saw_clock);
        self.registry.resolve_primary_video();
        self.registry.prune(&self.config.audio, &self.config.subtitles);
        info!(
            "program stream{}: {} streams, {} demuxed",
            if self.psm.is_some() { " with stream map" } else { "" },
            self.registry.len(),
            self.registry.media_streams().len()
        );
        self.registry.log_summary();
        Ok(())
    }

    fn apply_stream_map(&mut self, map: ProgramStreamMap) {
        info!("stream map version {} with {} entries", map.version, map.entries.len());
        for entry in &map.entries {
            // private stream 1 is split by sub-stream id, not by the map
            if entry.stream_id == STREAM_ID_PRIVATE_1 {
                continue;
            }
            let codec = lookup_stream_type(entry.stream_type).codec;
            let id = self.registry.add(
                entry.stream_id as u16,
                SubStream::None,
                entry.stream_type,
                codec,
            );
            if let Some(stream) = self.registry.get_mut(id) {
                stream.language = entry.language();
            }
            if codec == Codec::Unknown {
                self.attach_prober(id);
            }
        }
        self.psm = Some(map);
    }

    /// Registers the stream a PES packet belongs to, once.
    fn register(&mut self, stream_id: u8, sub: Option<u8>) {
        let (sub_stream, codec) = match (stream_id, sub) {
            (0xE0..=0xEF, _) => (SubStream::None, Codec::Unknown),
            (0xC0..=0xDF, _) => (SubStream::None, Codec::MpegAudio),
            (STREAM_ID_PRIVATE_1, Some(sub)) => (SubStream::Id(sub), private_stream_codec(sub)),
            (STREAM_ID_EXTENDED, Some(sub @ 0x55..=0x5F)) => (SubStream::Id(sub), Codec::Vc1),
            (STREAM_ID_EXTENDED, Some(sub)) => (SubStream::Id(sub), Codec::Unknown),
            _ => return,
        };
        if self.registry.find(stream_id as u16, sub_stream).is_some() {
            return;
        }
        let id = self.registry.add(stream_id as u16, sub_stream, 0, codec);
        debug!(
            "found stream 0x{:02x}{} ({})",
            stream_id,
            sub.map(|s| format!("/0x{:02x}", s)).unwrap_or_default(),
            codec
        );
        if let (Some(stream), Some(sub)) = (self.registry.get_mut(id), sub_stream.id()) {
            stream.codec_param = sub as u32;
        }
        if codec == Codec::Unknown {
            self.attach_prober(id);
        }
    }

    fn attach_prober(&mut self, id: usize) {
        if let Some(stream) = self.registry.get_mut(id) {
            stream.probe = Some(Prober::new(
                self.config.probe_buffer_cap,
                self.config.probe_attempts,
            ));
        }
    }

    async fn estimate_duration(&mut self) -> Result<()> {
        let video = self
            .registry
            .active()
            .find(|s| s.kind == StreamKind::Video)
            .map(|s| (s.physical as u8, s.codec));
        let Some((stream_id, codec)) = video else {
            return Ok(());
        };
        let size = self.reader.size();
        let mut sampler = PsSampler {
            reader: &mut self.reader,
            stream_id,
            codec,
        };
        self.estimate = sample_stream(&mut sampler, size, self.config.duration_samples).await?;
        Ok(())
    }

    fn clear_state(&mut self) {
        self.clock.reset();
        self.emitter.clear();
        self.emitter.gate().disarm();
        for stream in self.registry.iter_mut() {
            stream.pending_discontinuity = false;
        }
        self.finished = false;
    }

    async fn reset(&mut self) -> Result<()> {
        self.reader.seek(self.start).await?;
        self.clear_state();
        Ok(())
    }

    fn handle_unit(&mut self, unit: Bytes) {
        match unit[3] {
            PACK_START_CODE => match parse_pack_header(&unit) {
                Ok(pack) => {
                    if self.clock.update(pack.scr) == ClockEvent::Discontinuity {
                        info!("SCR discontinuity at {}", pack.scr);
                        for stream in self.registry.iter_mut() {
                            stream.pending_discontinuity = true;
                        }
                    }
                }
                Err(e) => self.emitter.report(&e.to_string()),
            },
            PROGRAM_END_CODE | STREAM_ID_SYSTEM_HEADER | STREAM_ID_PSM | STREAM_ID_PADDING
            | STREAM_ID_PRIVATE_2 => {}
            id => {
                if self.clock.is_open() {
                    self.emitter.emit(&mut self.registry, id as u16, unit, MODE);
                }
            }
        }
    }
}

#[async_trait]
impl<R: Source> Demuxer for PSDemuxer<R> {
    async fn read_buffer(&mut self) -> Result<DemuxBuffer> {
        loop {
            if let Some(buf) = self.emitter.pop() {
                return Ok(buf);
            }
            if self.finished {
                return Ok(DemuxBuffer::end_of_stream());
            }
            match self.next_unit().await? {
                Some(unit) => self.handle_unit(unit),
                None => self.finished = true,
            }
        }
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.registry.media_streams()
    }

    async fn seek_fraction(&mut self, fraction: f64) -> Result<()> {
        if fraction.is_nan() || fraction <= 0.0 {
            return self.reset().await;
        }
        let target = fraction_to_offset(fraction, self.reader.size()).max(self.start);
        debug!("seek to {} ({:.3})", target, fraction);
        self.reader.seek(target).await?;
        self.clear_state();
        if !self.skip_to_next_pack().await? {
            self.finished = true;
            return Ok(());
        }
        if self.estimate.is_some_and(|e| e.has_keyframes) {
            self.emitter.gate().arm();
        }
        Ok(())
    }

    fn duration(&self) -> Option<i64> {
        self.estimate.map(|e| e.duration)
    }

    fn error_log(&self) -> &ErrorLog {
        self.emitter.error_log()
    }
}

use super::parser::TSPacketParser;
use super::section::SectionAssembler;
use super::slot::{packet_summary, Continuity, PhysicalSlot};
use super::types::*;
use crate::av::{DemuxBuffer, StreamInfo, StreamKind};
use crate::codec::{lookup_hdmv_stream_type, lookup_stream_type, Codec, Probes};
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::format::clock::{ClockEvent, ClockTracker};
use crate::format::duration::{
    sample_stream, scan_ts_window, DurationEstimate, DurationSample, PtsSampler, SAMPLE_WINDOW,
};
use crate::format::emit::Emitter;
use crate::format::pes::SubStreamMode;
use crate::format::prober::{conclude_probes, probe_unit, probing_pending, Prober};
use crate::format::registry::{StreamRegistry, SubStream};
use crate::format::seek::fraction_to_offset;
use crate::format::source::{Source, SourceReader};
use crate::format::sync::{find_ts_resync, TS_RESYNC_RUN};
use crate::format::Demuxer;
use crate::utils::ErrorLog;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, trace};
use std::collections::{BTreeMap, HashMap};

/// Extension ids Blu-ray uses to split one audio PID into a core and an
/// extended stream.
const BD_AC3_CORE: u8 = 0x76;
const BD_TRUEHD: u8 = 0x72;
const BD_DTS_CORE: u8 = 0x71;

/// MPEG Transport Stream demuxer.
///
/// Opening runs discovery: PAT and PMT are read, the declared streams are
/// registered and those the tables leave open are probed. The duration is
/// then estimated and reading restarts from the first packet.
pub struct TSDemuxer<R> {
    reader: SourceReader<R>,
    parser: TSPacketParser,
    config: DemuxConfig,
    probes: Probes,
    packet_size: usize,
    first_packet: u64,
    registry: StreamRegistry,
    slots: BTreeMap<u16, PhysicalSlot>,
    modes: HashMap<u16, SubStreamMode>,
    clock: ClockTracker,
    emitter: Emitter,
    estimate: Option<DurationEstimate>,
    finished: bool,
}

/// Codec implied by the descriptors of a stream whose type code is
/// private or unknown.
fn codec_from_descriptors(es: &ElementaryStreamInfo) -> Option<Codec> {
    let by_registration = es.registration().and_then(|format| match format {
        FORMAT_AC3 => Some(Codec::Ac3),
        FORMAT_EAC3 => Some(Codec::Eac3),
        FORMAT_DTS1 | FORMAT_DTS2 | FORMAT_DTS3 => Some(Codec::Dts),
        FORMAT_VC1 => Some(Codec::Vc1),
        FORMAT_HEVC => Some(Codec::Hevc),
        _ => None,
    });
    by_registration.or_else(|| {
        es.descriptors.iter().find_map(|d| match d.tag {
            DESC_TELETEXT => Some(Codec::Teletext),
            DESC_DVB_SUBTITLE => Some(Codec::DvbSub),
            DESC_DVB_AC3 | DESC_ATSC_AC3 => Some(Codec::Ac3),
            DESC_DVB_EAC3 => Some(Codec::Eac3),
            DESC_DVB_DTS => Some(Codec::Dts),
            DESC_DVB_AAC => Some(Codec::Aac),
            _ => None,
        })
    })
}

/// Logical streams a PMT entry declares.
fn declared_streams(es: &ElementaryStreamInfo, hdmv: bool) -> Vec<(SubStream, Codec)> {
    let entry = if hdmv {
        lookup_hdmv_stream_type(es.stream_type)
    } else {
        lookup_stream_type(es.stream_type)
    };
    let codec = match entry.codec {
        Codec::Unknown => codec_from_descriptors(es).unwrap_or(Codec::Unknown),
        codec => codec,
    };
    match codec {
        Codec::TrueHd => vec![
            (SubStream::Id(BD_AC3_CORE), Codec::Ac3),
            (SubStream::Id(BD_TRUEHD), Codec::TrueHd),
        ],
        Codec::DtsHd => vec![
            (SubStream::Id(BD_DTS_CORE), Codec::Dts),
            (SubStream::All, Codec::DtsHd),
        ],
        codec => vec![(SubStream::None, codec)],
    }
}

/// Pulls duration samples out of a transport stream.
struct TsSampler<'a, R> {
    reader: &'a mut SourceReader<R>,
    packet_size: usize,
    pid: u16,
    codec: Codec,
}

#[async_trait]
impl<R: Source> PtsSampler for TsSampler<'_, R> {
    async fn sample_at(&mut self, offset: u64) -> Result<Option<DurationSample>> {
        let window = self.reader.window(offset, SAMPLE_WINDOW).await?;
        Ok(scan_ts_window(window, offset, self.packet_size, self.pid, self.codec))
    }
}

impl<R: Source> TSDemuxer<R> {
    /// Opens a transport stream of `packet_size` byte packets, the first
    /// of which starts at `first_packet`.
    pub async fn open(
        reader: SourceReader<R>,
        packet_size: usize,
        first_packet: u64,
        config: DemuxConfig,
        probes: Probes,
    ) -> Result<Self> {
        let parser = TSPacketParser::new().with_crc_check(config.verify_crc);
        let emitter = Emitter::new(config.keyframe_budget, config.warn_interval_frames);
        let mut demuxer = Self {
            reader,
            parser,
            config,
            probes,
            packet_size,
            first_packet,
            registry: StreamRegistry::new(),
            slots: BTreeMap::new(),
            modes: HashMap::new(),
            clock: ClockTracker::for_transport(),
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

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn estimate(&self) -> Option<&DurationEstimate> {
        self.estimate.as_ref()
    }

    /// Next packet with a valid sync byte, the timecode or FEC bytes
    /// stripped. Resynchronizes after garbage.
    async fn next_packet(&mut self) -> Result<Option<Bytes>> {
        let prefix = self.packet_size - TS_PACKET_SIZE;
        loop {
            let Some(raw) = self.reader.read_exact_or_eof(self.packet_size).await? else {
                return Ok(None);
            };
            if raw[prefix] == TS_SYNC_BYTE {
                return Ok(Some(raw.slice(prefix..)));
            }
            let at = self.reader.position() - self.packet_size as u64;
            self.emitter.report(&DemuxError::SyncLost(at).to_string());
            if !self.resync(at + 1).await? {
                return Ok(None);
            }
        }
    }

    /// Looks for the next run of good packets within the configured
    /// window after `from`.
    async fn resync(&mut self, from: u64) -> Result<bool> {
        let window = self.config.resync_window_packets * self.packet_size;
        self.reader.seek(from).await?;
        self.reader
            .fill(window + TS_RESYNC_RUN * self.packet_size)
            .await?;
        match find_ts_resync(self.reader.peek(), self.packet_size) {
            Some(skip) if skip <= window => {
                debug!("resynchronized after skipping {} bytes", skip);
                self.reader.consume(skip);
                Ok(true)
            }
            _ => {
                info!("no sync within {} bytes of {}, giving up", window, from);
                Ok(false)
            }
        }
    }

    /// Reads the tables and probes undeclared streams.
    async fn discover(&mut self) -> Result<()> {
        self.reader.seek(self.first_packet).await?;
        let limit = self.first_packet.saturating_add(self.config.discovery_limit);

        let mut pat_sections = SectionAssembler::new();
        let mut pmt_sections: HashMap<u16, SectionAssembler> = HashMap::new();
        let mut pmt_pids: Vec<u16> = Vec::new();
        let mut pmt: Option<PMT> = None;
        let mut probe_slots: BTreeMap<u16, PhysicalSlot> = BTreeMap::new();
        let mut pcr_seen = false;

        while self.reader.position() < limit {
            let Some(packet) = self.next_packet().await? else {
                break;
            };
            let Ok(header) = self.parser.parse_header(&packet) else {
                continue;
            };
            if header.transport_error {
                continue;
            }
            let Ok(offset) = self.parser.payload_offset(&header, &packet) else {
                continue;
            };
            let payload = &packet[offset..];

            let Some(pmt) = pmt.as_ref() else {
                if !header.contains_payload {
                    continue;
                }
                if header.pid == PID_PAT {
                    let sections = pat_sections.push(
                        header.payload_unit_start,
                        header.continuity_counter,
                        payload,
                    );
                    for section in sections {
                        match self.parser.parse_pat(&section) {
                            Ok(pat) => pmt_pids = self.select_programs(&pat),
                            Err(e) => self.emitter.report(&e.to_string()),
                        }
                    }
                } else if pmt_pids.contains(&header.pid) {
                    let sections = pmt_sections.entry(header.pid).or_default().push(
                        header.payload_unit_start,
                        header.continuity_counter,
                        payload,
                    );
                    for section in sections {
                        match self.parser.parse_pmt(&section) {
                            Ok(table) if self.wants_program(table.program_number) => {
                                self.register_program(header.pid, &table);
                                pmt = Some(table);
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => self.emitter.report(&e.to_string()),
                        }
                    }
                }
                continue;
            };

            if pmt.has_clock() && header.pid == pmt.pcr_pid && !pcr_seen {
                pcr_seen = matches!(
                    self.parser.parse_adaptation_field(&packet, TS_HEADER_SIZE),
                    Ok(Some(AdaptationField { pcr: Some(_), .. }))
                );
            }

            let pending = probing_pending(&self.registry);
            if !pending && (pcr_seen || !pmt.has_clock()) {
                break;
            }
            if pending && header.contains_payload && self.is_probed(header.pid) {
                let slot = probe_slots.entry(header.pid).or_default();
                for unit in slot.push(header.payload_unit_start, payload) {
                    let mode = self.mode(header.pid);
                    probe_unit(&mut self.registry, &self.probes, header.pid, &unit, mode);
                }
            }
        }

        let Some(pmt) = pmt else {
            return Err(DemuxError::MalformedTable(
                "no program map table found".into(),
            ));
        };

        for (pid, slot) in probe_slots.iter_mut() {
            if let Some(unit) = slot.flush() {
                let mode = self.mode(*pid);
                probe_unit(&mut self.registry, &self.probes, *pid, &unit, mode);
            }
        }
        conclude_probes(&mut self.registry, &self.probes);

        let required = pmt.has_clock() && pcr_seen;
        self.clock.set_required(required);
        debug!("clock required: {}", required);

        if let Some(video) = self.registry.resolve_primary_video() {
            debug!("primary video stream {}", video);
        }
        self.registry.prune(&self.config.audio, &self.config.subtitles);
        info!(
            "program {}: {} streams, {} demuxed",
            pmt.program_number,
            self.registry.len(),
            self.registry.media_streams().len()
        );
        self.registry.log_summary();
        Ok(())
    }

    fn wants_program(&self, program_number: u16) -> bool {
        self.config.program.map_or(true, |p| p == program_number)
    }

    fn select_programs(&self, pat: &PAT) -> Vec<u16> {
        let pids: Vec<u16> = pat
            .programs()
            .filter(|e| self.wants_program(e.program_number))
            .map(|e| e.program_map_pid)
            .collect();
        debug!("PAT lists PMT pids {:x?}", pids);
        pids
    }

    fn register_program(&mut self, pmt_pid: u16, pmt: &PMT) {
        info!(
            "PMT 0x{:x}: program {}, PCR pid 0x{:x}, {} streams",
            pmt_pid,
            pmt.program_number,
            pmt.pcr_pid,
            pmt.elementary_stream_infos.len()
        );
        let hdmv = pmt.is_hdmv();
        if pmt.has_clock() {
            self.registry.set_pcr(pmt.pcr_pid);
        }

        for es in &pmt.elementary_stream_infos {
            for (sub_stream, codec) in declared_streams(es, hdmv) {
                let id = self
                    .registry
                    .add(es.elementary_pid, sub_stream, es.stream_type, codec);
                let Some(stream) = self.registry.get_mut(id) else {
                    continue;
                };
                stream.language = es.language();
                stream.codec_param = es.registration().unwrap_or(0);
                if codec == Codec::DvbSub {
                    stream.extra = es
                        .descriptor(DESC_DVB_SUBTITLE)
                        .map(|d| Bytes::from(d.data.clone()));
                    self.modes
                        .insert(es.elementary_pid, SubStreamMode::DvbSubtitle);
                }
                if codec == Codec::Unknown {
                    stream.probe = Some(Prober::new(
                        self.config.probe_buffer_cap,
                        self.config.probe_attempts,
                    ));
                }
            }
        }

        if pmt.has_clock() && self.registry.by_physical(pmt.pcr_pid).next().is_none() {
            let id = self
                .registry
                .add(pmt.pcr_pid, SubStream::None, 0, Codec::Unknown);
            self.registry.mark_not_wanted(id);
        }
    }

    fn is_probed(&self, pid: u16) -> bool {
        self.registry.by_physical(pid).any(|s| s.probe.is_some())
    }

    fn mode(&self, pid: u16) -> SubStreamMode {
        self.modes.get(&pid).copied().unwrap_or_default()
    }

    async fn estimate_duration(&mut self) -> Result<()> {
        let video = self
            .registry
            .active()
            .find(|s| s.kind == StreamKind::Video)
            .map(|s| (s.physical, s.codec));
        let Some((pid, codec)) = video else {
            debug!("no video stream, skipping duration estimate");
            return Ok(());
        };
        let size = self.reader.size();
        let mut sampler = TsSampler {
            reader: &mut self.reader,
            packet_size: self.packet_size,
            pid,
            codec,
        };
        self.estimate = sample_stream(&mut sampler, size, self.config.duration_samples).await?;
        Ok(())
    }

    /// Drops all reassembly and timing state.
    fn clear_state(&mut self) {
        self.slots.clear();
        self.clock.reset();
        self.emitter.clear();
        self.emitter.gate().disarm();
        for stream in self.registry.iter_mut() {
            stream.pending_discontinuity = false;
        }
        self.finished = false;
    }

    /// Back to the state right after open.
    async fn reset(&mut self) -> Result<()> {
        self.reader.seek(self.first_packet).await?;
        self.clear_state();
        Ok(())
    }

    fn flush_all(&mut self) {
        for (pid, slot) in self.slots.iter_mut() {
            if let Some(unit) = slot.flush() {
                let mode = self.modes.get(pid).copied().unwrap_or_default();
                self.emitter.emit(&mut self.registry, *pid, unit, mode);
            }
        }
    }

    fn handle_packet(&mut self, packet: Bytes) {
        let Ok(header) = self.parser.parse_header(&packet) else {
            return;
        };
        let pid = header.pid;
        if !self.registry.by_physical(pid).any(|s| s.is_active()) {
            return;
        }
        if header.transport_error {
            self.emitter
                .report(&format!("transport error on pid 0x{:x}", pid));
            self.slots.entry(pid).or_default().mark_bad();
            return;
        }

        let adaptation = match self.parser.parse_adaptation_field(&packet, TS_HEADER_SIZE) {
            Ok(adaptation) => adaptation,
            Err(e) => {
                self.emitter.report(&format!("pid 0x{:x}: {}", pid, e));
                self.slots.entry(pid).or_default().mark_bad();
                return;
            }
        };
        let discontinuity = adaptation.as_ref().is_some_and(|a| a.discontinuity);

        if Some(pid) == self.registry.pcr_physical() {
            if let Some(pcr) = adaptation.as_ref().and_then(|a| a.pcr) {
                self.on_clock(pcr_to_pts(pcr));
            }
        }
        if !self.clock.is_open() || !header.contains_payload {
            return;
        }

        let offset = match self.parser.payload_offset(&header, &packet) {
            Ok(offset) => offset,
            Err(e) => {
                self.emitter.report(&format!("pid 0x{:x}: {}", pid, e));
                return;
            }
        };
        let summary = packet_summary(&header, &packet, offset);
        let slot = self.slots.entry(pid).or_default();
        match slot.check_continuity(header.continuity_counter, summary, discontinuity) {
            Continuity::Ok => {}
            Continuity::Duplicate => {
                trace!("duplicate packet on pid 0x{:x}", pid);
                return;
            }
            Continuity::Error { expected } => {
                let err = DemuxError::Continuity {
                    pid,
                    expected,
                    got: header.continuity_counter,
                };
                self.emitter.report(&err.to_string());
                slot.mark_bad();
                if !header.payload_unit_start {
                    return;
                }
            }
        }

        let units = slot.push(header.payload_unit_start, &packet[offset..]);
        let mode = self.mode(pid);
        for unit in units {
            self.emitter.emit(&mut self.registry, pid, unit, mode);
        }
    }

    /// Units in progress are flushed only on a discontinuity, not on every
    /// clock reference.
    fn on_clock(&mut self, clock: i64) {
        if self.clock.update(clock) == ClockEvent::Discontinuity {
            info!("PCR discontinuity at {}", clock);
            self.flush_all();
            for stream in self.registry.iter_mut() {
                stream.pending_discontinuity = true;
            }
        }
    }
}

#[async_trait]
impl<R: Source> Demuxer for TSDemuxer<R> {
    async fn read_buffer(&mut self) -> Result<DemuxBuffer> {
        loop {
            if let Some(buf) = self.emitter.pop() {
                return Ok(buf);
            }
            if self.finished {
                return Ok(DemuxBuffer::end_of_stream());
            }
            match self.next_packet().await? {
                Some(packet) => self.handle_packet(packet),
                None => {
                    self.finished = true;
                    self.flush_all();
                }
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
        let target = fraction_to_offset(fraction, self.reader.size()).max(self.first_packet);
        debug!("seek to {} ({:.3})", target, fraction);
        self.clear_state();
        if !self.resync(target).await? {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn es(stream_type: u8, descriptors: Vec<Descriptor>) -> ElementaryStreamInfo {
        ElementaryStreamInfo {
            stream_type,
            elementary_pid: 0x100,
            descriptors,
        }
    }

    fn desc(tag: u8, data: &[u8]) -> Descriptor {
        Descriptor {
            tag,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_declared_iso_types() {
        assert_eq!(declared_streams(&es(0x1b, vec![]), false), vec![(SubStream::None, Codec::H264)]);
        assert_eq!(declared_streams(&es(0x83, vec![]), false), vec![(SubStream::None, Codec::Lpcm)]);
    }

    #[test]
    fn test_private_type_refined_by_descriptors() {
        let ac3 = es(0x06, vec![desc(DESC_DVB_AC3, &[0])]);
        assert_eq!(declared_streams(&ac3, false), vec![(SubStream::None, Codec::Ac3)]);

        let registered = es(0x06, vec![desc(DESC_REGISTRATION, b"EAC3")]);
        assert_eq!(declared_streams(&registered, false), vec![(SubStream::None, Codec::Eac3)]);

        let subs = es(0x06, vec![desc(DESC_DVB_SUBTITLE, &[b'e', b'n', b'g', 0x10, 0, 1, 0, 1])]);
        assert_eq!(Codec::DvbSub.kind(), StreamKind::Subtitle);
        assert_eq!(declared_streams(&subs, false), vec![(SubStream::None, Codec::DvbSub)]);

        assert_eq!(declared_streams(&es(0x06, vec![]), false), vec![(SubStream::None, Codec::Unknown)]);
    }

    #[test]
    fn test_blu_ray_audio_splits_into_sub_streams() {
        assert_eq!(
            declared_streams(&es(0x83, vec![]), true),
            vec![
                (SubStream::Id(0x76), Codec::Ac3),
                (SubStream::Id(0x72), Codec::TrueHd)
            ]
        );
        assert_eq!(
            declared_streams(&es(0x86, vec![]), true),
            vec![(SubStream::Id(0x71), Codec::Dts), (SubStream::All, Codec::DtsHd)]
        );
        assert_eq!(declared_streams(&es(0x90, vec![]), true), vec![(SubStream::None, Codec::PgsSub)]);
    }
}

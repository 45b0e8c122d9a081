//! Builders for synthetic transport and program streams.

#![allow(dead_code)]

use esdemux::utils::Crc32Mpeg2;
use std::collections::HashMap;

pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;
pub const PROGRAM: u16 = 1;

/// Elementary stream bytes per video unit.
pub const VIDEO_ES_LEN: usize = 400;
/// 40 ms at 90 kHz.
pub const FRAME_TICKS: i64 = 3600;
pub const FIRST_PTS: i64 = 90_000;

pub fn pts_of(unit: usize) -> i64 {
    FIRST_PTS + unit as i64 * FRAME_TICKS
}

fn timestamp(prefix: u8, ts: i64) -> [u8; 5] {
    let ts = ts as u64;
    [
        (prefix << 4) | ((ts >> 29) as u8 & 0x0E) | 0x01,
        (ts >> 22) as u8,
        ((ts >> 14) as u8 & 0xFE) | 0x01,
        (ts >> 7) as u8,
        ((ts << 1) as u8 & 0xFE) | 0x01,
    ]
}

/// MPEG-2 PES packet with a declared length.
pub fn pes(stream_id: u8, pts: Option<i64>, dts: Option<i64>, payload: &[u8]) -> Vec<u8> {
    let mut header = Vec::new();
    let mut flags = 0u8;
    match (pts, dts) {
        (Some(pts), Some(dts)) => {
            flags = 0xC0;
            header.extend(timestamp(0x3, pts));
            header.extend(timestamp(0x1, dts));
        }
        (Some(pts), None) => {
            flags = 0x80;
            header.extend(timestamp(0x2, pts));
        }
        _ => {}
    }
    let len = 3 + header.len() + payload.len();
    let mut out = vec![0x00, 0x00, 0x01, stream_id, (len >> 8) as u8, len as u8];
    out.extend_from_slice(&[0x80, flags, header.len() as u8]);
    out.extend(header);
    out.extend_from_slice(payload);
    out
}

/// MPEG-2 video of a fixed size: a sequence header, GOP and I picture
/// for keyframes, a P picture otherwise.
pub fn mpeg2_video(key: bool) -> Vec<u8> {
    let mut es = Vec::new();
    if key {
        es.extend_from_slice(&[
            0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33, 0x24, 0x9F, 0x23, 0x80,
        ]);
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0xB5, 0x14, 0x8A, 0x00, 0x01, 0x00, 0x00]);
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x00]);
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x08, 0xFF, 0xF8]);
    } else {
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x10, 0xFF, 0xF8]);
    }
    es.extend_from_slice(&[0x00, 0x00, 0x01, 0x01]);
    es.resize(VIDEO_ES_LEN, 0x55);
    es
}

/// H.264 access unit of a fixed size: an access unit delimiter then an
/// IDR slice for keyframes, a P slice otherwise.
pub fn h264_video(key: bool) -> Vec<u8> {
    let mut es = vec![0x00, 0x00, 0x01, 0x09, if key { 0x10 } else { 0x30 }];
    if key {
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0x65, 0x88, 0x80]);
    } else {
        es.extend_from_slice(&[0x00, 0x00, 0x01, 0x41, 0x9A, 0x00]);
    }
    es.resize(VIDEO_ES_LEN, 0x55);
    es
}

pub fn ac3_payload() -> Vec<u8> {
    let mut frame = vec![0x0B, 0x77, 0x00, 0x00, 0x14, 0x40, 0x43];
    frame.resize(64, 0x00);
    frame
}

pub fn is_key_unit(unit: usize) -> bool {
    unit % 3 == 0
}

/// Long form PSI section with its CRC.
pub fn section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
    let length = 5 + body.len() + 4;
    let mut out = vec![
        table_id,
        0xB0 | (length >> 8) as u8,
        length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0xC1,
        0x00,
        0x00,
    ];
    out.extend_from_slice(body);
    let crc = Crc32Mpeg2::new().calculate(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

pub fn pat(program: u16, pmt_pid: u16) -> Vec<u8> {
    let body = [
        (program >> 8) as u8,
        program as u8,
        0xE0 | (pmt_pid >> 8) as u8,
        pmt_pid as u8,
    ];
    section(0x00, 1, &body)
}

/// PMT listing `(stream_type, pid)` pairs without descriptors.
pub fn pmt(program: u16, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    let mut body = vec![0xE0 | (pcr_pid >> 8) as u8, pcr_pid as u8, 0xF0, 0x00];
    for &(stream_type, pid) in streams {
        body.extend_from_slice(&[stream_type, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0x00]);
    }
    section(0x02, program, &body)
}

/// Damage applied to one transport packet of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The packet is left out; its continuity counter is still used up.
    Lose(usize),
    /// The packet is sent twice.
    Duplicate(usize),
}

/// Packetizes payloads into 188 byte packets, optionally behind a 4 byte
/// timecode prefix as in M2TS.
#[derive(Debug, Default)]
pub struct TsWriter {
    out: Vec<u8>,
    counters: HashMap<u16, u8>,
    prefix: bool,
}

impl TsWriter {
    pub fn new(prefix: bool) -> Self {
        Self {
            prefix,
            ..Default::default()
        }
    }

    fn build(&mut self, pid: u16, start: bool, pcr: Option<i64>, payload: &[u8]) -> Vec<u8> {
        let counter = self.counters.entry(pid).or_insert(0);
        let cc = *counter;
        *counter = (cc + 1) & 0x0F;

        let mut packet = Vec::with_capacity(192);
        if self.prefix {
            packet.extend_from_slice(&[0x00; 4]);
        }
        // adaptation field bytes, length byte included
        let room = 184 - payload.len();
        packet.extend_from_slice(&[
            0x47,
            ((start as u8) << 6) | (pid >> 8) as u8,
            pid as u8,
            if room > 0 { 0x30 } else { 0x10 } | cc,
        ]);
        if room > 0 {
            let end = packet.len() + room;
            packet.push((room - 1) as u8);
            if room > 1 {
                match pcr {
                    Some(pcr) => {
                        let base = pcr as u64;
                        packet.extend_from_slice(&[
                            0x10,
                            (base >> 25) as u8,
                            (base >> 17) as u8,
                            (base >> 9) as u8,
                            (base >> 1) as u8,
                            ((base & 1) as u8) << 7 | 0x7E,
                            0x00,
                        ]);
                    }
                    None => packet.push(0x00),
                }
            }
            packet.resize(end, 0xFF);
        }
        packet.extend_from_slice(payload);
        packet
    }

    /// One packet carrying `payload`.
    pub fn packet(&mut self, pid: u16, start: bool, pcr: Option<i64>, payload: &[u8]) {
        let packet = self.build(pid, start, pcr, payload);
        self.out.extend(packet);
    }

    /// A PSI section behind a zero pointer field.
    pub fn psi(&mut self, pid: u16, section: &[u8]) {
        let mut payload = vec![0x00];
        payload.extend_from_slice(section);
        self.packet(pid, true, None, &payload);
    }

    /// A PES packet split over as many packets as needed, the PCR on the
    /// first.
    pub fn pes(&mut self, pid: u16, pes: &[u8], pcr: Option<i64>) {
        self.pes_with_fault(pid, pes, pcr, None);
    }

    pub fn pes_with_fault(&mut self, pid: u16, pes: &[u8], pcr: Option<i64>, fault: Option<Fault>) {
        let first = if pcr.is_some() { 176 } else { 184 };
        let mut chunks = vec![&pes[..pes.len().min(first)]];
        if pes.len() > first {
            chunks.extend(pes[first..].chunks(184));
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            let packet = self.build(pid, i == 0, if i == 0 { pcr } else { None }, chunk);
            match fault {
                Some(Fault::Lose(n)) if n == i => {}
                Some(Fault::Duplicate(n)) if n == i => {
                    self.out.extend_from_slice(&packet);
                    self.out.extend(packet);
                }
                _ => self.out.extend(packet),
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// A one program transport stream: MPEG-2 video on [`VIDEO_PID`] carrying
/// the PCR and AC-3 audio on [`AUDIO_PID`], one unit of each per frame.
#[derive(Debug, Clone)]
pub struct TsProgram {
    pub units: usize,
    pub pmt_pid: u16,
    pub video_pid: u16,
    pub audio_pid: u16,
    /// H.264 (stream type 0x1B) instead of MPEG-2 video.
    pub h264: bool,
    /// The PCR rides on the audio PID, whose unit is written first.
    pub pcr_on_audio: bool,
    /// 192 byte packets.
    pub prefix: bool,
    /// Damage to the video unit with this index.
    pub fault: Option<(usize, Fault)>,
    /// A video unit cut off inside its PES header is inserted before the
    /// unit with this index.
    pub truncated_before: Option<usize>,
}

impl TsProgram {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            pmt_pid: PMT_PID,
            video_pid: VIDEO_PID,
            audio_pid: AUDIO_PID,
            h264: false,
            pcr_on_audio: false,
            prefix: false,
            fault: None,
            truncated_before: None,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let (video_pid, audio_pid) = (self.video_pid, self.audio_pid);
        let video_type = if self.h264 { 0x1B } else { 0x02 };
        let pcr_pid = if self.pcr_on_audio { audio_pid } else { video_pid };

        let mut ts = TsWriter::new(self.prefix);
        ts.psi(0x0000, &pat(PROGRAM, self.pmt_pid));
        ts.psi(
            self.pmt_pid,
            &pmt(PROGRAM, pcr_pid, &[(video_type, video_pid), (0x81, audio_pid)]),
        );
        for unit in 0..self.units {
            let pts = pts_of(unit);
            let pcr = pts - FIRST_PTS;
            let es = if self.h264 {
                h264_video(is_key_unit(unit))
            } else {
                mpeg2_video(is_key_unit(unit))
            };
            let video = pes(0xE0, Some(pts), None, &es);
            let audio = pes(0xBD, Some(pts), None, &ac3_payload());

            if self.pcr_on_audio {
                ts.pes(audio_pid, &audio, Some(pcr));
            }
            if self.truncated_before == Some(unit) {
                ts.packet(video_pid, true, None, &video[..7]);
            }
            let fault = self
                .fault
                .filter(|(at, _)| *at == unit)
                .map(|(_, fault)| fault);
            let video_pcr = (!self.pcr_on_audio).then_some(pcr);
            ts.pes_with_fault(video_pid, &video, video_pcr, fault);
            if !self.pcr_on_audio {
                ts.pes(audio_pid, &audio, None);
            }
        }
        ts.into_bytes()
    }
}

/// MPEG-2 pack header without stuffing.
pub fn pack_header(scr: i64) -> Vec<u8> {
    let scr = scr as u64;
    let mux_rate: u32 = 25_200;
    vec![
        0x00,
        0x00,
        0x01,
        0xBA,
        0x40 | ((scr >> 27) as u8 & 0x38) | 0x04 | ((scr >> 28) as u8 & 0x03),
        (scr >> 20) as u8,
        ((scr >> 12) as u8 & 0xF8) | 0x04 | ((scr >> 13) as u8 & 0x03),
        (scr >> 5) as u8,
        ((scr << 3) as u8 & 0xF8) | 0x04,
        0x01,
        (mux_rate >> 14) as u8,
        (mux_rate >> 6) as u8,
        ((mux_rate << 2) as u8) | 0x03,
        0xF8,
    ]
}

/// A DVD style program stream without a stream map: MPEG-2 video on 0xE0
/// and AC-3 in private stream 1, sub-stream 0x80.
pub fn ps_program(units: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in 0..units {
        let pts = pts_of(unit);
        out.extend(pack_header(pts - FIRST_PTS));
        out.extend(pes(0xE0, Some(pts), None, &mpeg2_video(is_key_unit(unit))));
        let mut private = vec![0x80, 0x01, 0x00, 0x01];
        private.extend(ac3_payload());
        out.extend(pes(0xBD, Some(pts), None, &private));
    }
    out.extend_from_slice(&[0x00, 0x00, 0x01, 0xB9]);
    out
}

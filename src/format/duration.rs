//! Duration estimation from timestamps sampled across the file.
//!
//! Files are often spliced from several programs (feature, adverts,
//! station idents) each with its own timestamp base, and bitrate varies a
//! lot within one program. So the rate (ticks per byte) is computed for
//! many sample pairs and the median taken. Pairs are only formed between
//! samples less than half the sample count apart, which keeps the median
//! inside one piece when the file is made of a few similar sized pieces.

use super::pes::{parse_pes_header, SubStreamMode};
use super::sync::{find_start_code, find_ts_resync};
use super::ts::parser::TSPacketParser;
use super::ts::types::TS_PACKET_SIZE;
use crate::codec::{is_keyframe, Codec};
use crate::error::Result;
use async_trait::async_trait;
use log::{debug, info};

pub const DEFAULT_DURATION_SAMPLES: usize = 128;
/// Bytes read at each sample offset.
pub const SAMPLE_WINDOW: usize = 1024 * 1024;

/// One (file position, presentation time) observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSample {
    pub pos: u64,
    pub pts: i64,
    /// The video unit found there started on a random access point.
    pub keyframe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationEstimate {
    /// 90 kHz ticks.
    pub duration: i64,
    /// Ticks per byte.
    pub rate: f64,
    pub has_keyframes: bool,
    pub samples: usize,
}

/// `n` evenly spaced offsets, each in the middle of its slice of the
/// file.
pub fn sample_offsets(size: u64, n: usize) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }
    let step = size / n as u64;
    if step == 0 {
        return Vec::new();
    }
    (0..n as u64).map(|i| i * step + step / 2).collect()
}

/// Median of the pairwise rates between nearby samples.
pub fn median_rate(samples: &[DurationSample]) -> Option<f64> {
    let n = samples.len();
    let mut rates = Vec::new();
    for i in 0..n.saturating_sub(1) {
        let window_end = (i + n / 2).min(n);
        for j in i + 1..window_end {
            let (a, b) = (&samples[i], &samples[j]);
            if b.pts > a.pts && b.pos > a.pos {
                rates.push((b.pts - a.pts) as f64 / (b.pos - a.pos) as f64);
            }
        }
    }
    if rates.is_empty() {
        return None;
    }
    rates.sort_by(|a, b| a.total_cmp(b));
    Some(rates[rates.len() / 2])
}

pub fn estimate_duration(samples: &[DurationSample], size: u64) -> Option<DurationEstimate> {
    let rate = median_rate(samples)?;
    Some(DurationEstimate {
        duration: (rate * size as f64) as i64,
        rate,
        has_keyframes: samples.iter().any(|s| s.keyframe),
        samples: samples.len(),
    })
}

/// Something that can pull a timestamp sample near a file offset.
#[async_trait]
pub trait PtsSampler: Send {
    async fn sample_at(&mut self, offset: u64) -> Result<Option<DurationSample>>;
}

/// Samples `n` offsets of a `size` byte file and estimates its duration.
pub async fn sample_stream<S: PtsSampler + ?Sized>(
    sampler: &mut S,
    size: u64,
    n: usize,
) -> Result<Option<DurationEstimate>> {
    let mut samples = Vec::with_capacity(n);
    for offset in sample_offsets(size, n) {
        match sampler.sample_at(offset).await? {
            Some(sample) => samples.push(sample),
            None => debug!("no video timestamp near offset {}", offset),
        }
    }
    let estimate = estimate_duration(&samples, size);
    if let Some(est) = &estimate {
        info!(
            "estimated duration {} ms from {} samples (keyframes: {})",
            est.duration / 90,
            est.samples,
            est.has_keyframes
        );
    }
    Ok(estimate)
}

/// First video PTS in a window of transport packets read at `window_pos`.
pub fn scan_ts_window(
    window: &[u8],
    window_pos: u64,
    packet_size: usize,
    video_pid: u16,
    codec: Codec,
) -> Option<DurationSample> {
    let parser = TSPacketParser::new();
    let prefix = packet_size - TS_PACKET_SIZE;
    let mut at = find_ts_resync(window, packet_size)?;

    while at + packet_size <= window.len() {
        let packet = &window[at + prefix..at + packet_size];
        at += packet_size;

        let Ok(header) = parser.parse_header(packet) else {
            // lost sync inside the window
            let rest = &window[at..];
            at += find_ts_resync(rest, packet_size)?;
            continue;
        };
        if header.pid != video_pid || !header.payload_unit_start || !header.contains_payload {
            continue;
        }
        let Ok(offset) = parser.payload_offset(&header, packet) else {
            continue;
        };
        let unit = &packet[offset..];
        let Ok(info) = parse_pes_header(unit, SubStreamMode::None) else {
            continue;
        };
        if let Some(pts) = info.pts {
            let payload = unit.get(info.header_len..).unwrap_or_default();
            return Some(DurationSample {
                pos: window_pos + (at - packet_size) as u64,
                pts,
                keyframe: is_keyframe(codec, payload),
            });
        }
    }
    None
}

/// First PTS of program stream `video_id` in a window read at
/// `window_pos`.
pub fn scan_ps_window(
    window: &[u8],
    window_pos: u64,
    video_id: u8,
    codec: Codec,
) -> Option<DurationSample> {
    let mut from = 0;
    while let Some(at) = find_start_code(window, from) {
        from = at + 3;
        if window.get(at + 3) != Some(&video_id) {
            continue;
        }
        let unit = &window[at..];
        if let Ok(info) = parse_pes_header(unit, SubStreamMode::None) {
            if let Some(pts) = info.pts {
                return Some(DurationSample {
                    pos: window_pos + at as u64,
                    pts,
                    keyframe: is_keyframe(codec, info.payload(unit)),
                });
            }
        }
    }
    None
}

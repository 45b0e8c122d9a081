use super::types::TSHeader;
use bytes::{Bytes, BytesMut};
use log::trace;

/// Bytes of header and payload compared to tell a retransmitted packet
/// from a real continuity error.
pub type PacketSummary = [u8; 8];

/// Builds the duplicate detection summary of a packet: adaptation
/// control, adaptation field length, and 6 payload bytes starting 9 bytes
/// into the payload (past a PES start code and fixed header).
///
/// This is an approximation. Two different packets with equal summaries
/// and the same counter are treated as duplicates.
pub fn packet_summary(header: &TSHeader, packet: &[u8], payload_offset: usize) -> PacketSummary {
    let mut summary = [0u8; 8];
    summary[0] = header.adaptation_control();
    if header.adaptation_field_exists {
        summary[1] = packet.get(4).copied().unwrap_or(0);
    }
    let from = payload_offset + 9;
    if let Some(bytes) = packet.get(from..packet.len().min(from + 6)) {
        summary[2..2 + bytes.len()].copy_from_slice(bytes);
    }
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    Ok,
    /// Same counter and summary as the previous packet; drop it.
    Duplicate,
    Error { expected: u8 },
}

/// Per PID reassembly state.
///
/// A unit starts with a payload-unit-start packet and ends when the
/// declared PES length is reached or the next unit starts. Units are
/// returned whole, start code first.
#[derive(Debug, Default)]
pub struct PhysicalSlot {
    last_cc: Option<u8>,
    summary: PacketSummary,
    buffer: BytesMut,
    accumulating: bool,
    /// Set after a continuity error; cleared by the next unit start.
    skip_bad: bool,
}

impl PhysicalSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the 4 bit continuity counter of a packet carrying payload.
    /// `discontinuity` is the adaptation field discontinuity indicator,
    /// which allows any counter.
    pub fn check_continuity(&mut self, cc: u8, summary: PacketSummary, discontinuity: bool) -> Continuity {
        let last = match self.last_cc {
            Some(last) if !discontinuity => last,
            _ => {
                self.last_cc = Some(cc);
                self.summary = summary;
                return Continuity::Ok;
            }
        };
        if cc == last && summary == self.summary {
            return Continuity::Duplicate;
        }
        self.last_cc = Some(cc);
        self.summary = summary;

        let expected = (last + 1) & 0x0F;
        if cc == expected {
            Continuity::Ok
        } else {
            Continuity::Error { expected }
        }
    }

    /// Adds a packet payload. Returns the units it completed: the previous
    /// one when `start` is set, and this one once its declared length is
    /// reached.
    pub fn push(&mut self, start: bool, payload: &[u8]) -> Vec<Bytes> {
        let mut units = Vec::new();
        if start {
            if let Some(unit) = self.flush() {
                trace!("unit of {} bytes ended by the next start", unit.len());
                units.push(unit);
            }
            self.skip_bad = false;
            self.accumulating = true;
        } else if !self.accumulating || self.skip_bad {
            return units;
        }
        self.buffer.extend_from_slice(payload);

        if let Some(total) = self.declared_len() {
            if self.buffer.len() >= total {
                units.push(self.buffer.split_to(total).freeze());
                self.buffer.clear();
                self.accumulating = false;
            }
        }
        units
    }

    fn declared_len(&self) -> Option<usize> {
        if self.buffer.len() < 6 {
            return None;
        }
        let len = u16::from_be_bytes([self.buffer[4], self.buffer[5]]) as usize;
        (len > 0).then_some(6 + len)
    }

    /// Takes whatever has been accumulated.
    pub fn flush(&mut self) -> Option<Bytes> {
        let was_accumulating = std::mem::take(&mut self.accumulating);
        if !was_accumulating || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(self.buffer.split().freeze())
    }

    /// Drops the unit in progress and everything up to the next start.
    pub fn mark_bad(&mut self) {
        self.buffer.clear();
        self.accumulating = false;
        self.skip_bad = true;
    }

    pub fn is_skipping(&self) -> bool {
        self.skip_bad
    }

    /// Forgets all state, including the continuity counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

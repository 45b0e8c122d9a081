use bytes::{Bytes, BytesMut};

/// Reassembles PSI sections spread over several transport packets.
///
/// A packet with payload_unit_start carries a pointer field giving the
/// number of bytes that still belong to the previous section. Sections
/// may be packed back to back; 0xFF in the table id position means the
/// rest of the packet is stuffing.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffer: BytesMut,
    next_cc: Option<u8>,
    collecting: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_cc = None;
        self.collecting = false;
    }

    /// Feeds one packet payload and returns the sections it completed.
    pub fn push(&mut self, start: bool, cc: u8, payload: &[u8]) -> Vec<Bytes> {
        let in_order = self.next_cc.map_or(true, |expected| expected == cc);
        self.next_cc = Some((cc + 1) & 0x0F);

        if !in_order {
            self.buffer.clear();
            self.collecting = false;
        }

        let mut sections = Vec::new();
        if start {
            let Some((&pointer, rest)) = payload.split_first() else {
                return sections;
            };
            let pointer = (pointer as usize).min(rest.len());
            if self.collecting {
                self.buffer.extend_from_slice(&rest[..pointer]);
                self.drain(&mut sections);
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&rest[pointer..]);
            self.collecting = true;
        } else if self.collecting {
            self.buffer.extend_from_slice(payload);
        }

        self.drain(&mut sections);
        sections
    }

    fn drain(&mut self, sections: &mut Vec<Bytes>) {
        while self.collecting && self.buffer.len() >= 3 {
            if self.buffer[0] == 0xFF {
                self.buffer.clear();
                self.collecting = false;
                break;
            }
            let length = ((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize;
            let total = 3 + length;
            if self.buffer.len() < total {
                break;
            }
            sections.push(self.buffer.split_to(total).freeze());
        }
        if self.collecting && self.buffer.is_empty() {
            self.collecting = false;
        }
        if !self.collecting {
            self.buffer.clear();
        }
    }
}

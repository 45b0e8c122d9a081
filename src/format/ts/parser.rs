use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::Crc32Mpeg2;

/// Long-form PSI section header: table id, length, extension, version,
/// section numbers.
const SECTION_HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;

#[derive(Debug, Clone)]
pub struct TSPacketParser {
    crc: Crc32Mpeg2,
    verify_crc: bool,
}

impl Default for TSPacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TSPacketParser {
    pub fn new() -> Self {
        Self {
            crc: Crc32Mpeg2::new(),
            verify_crc: true,
        }
    }

    /// Accept sections whose CRC does not match.
    pub fn with_crc_check(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(DemuxError::SyncLost(0));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(DemuxError::SyncLost(0));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    pub fn parse_adaptation_field(
        &self,
        data: &[u8],
        offset: usize,
    ) -> Result<Option<AdaptationField>> {
        if (data[3] & 0x20) == 0 {
            return Ok(None);
        }

        let adaptation_field_length = *data
            .get(offset)
            .ok_or_else(|| DemuxError::Bitstream("adaptation field length missing".into()))?
            as usize;
        if data.len() < offset + adaptation_field_length + 1 {
            return Err(DemuxError::Bitstream(format!(
                "adaptation field length {} overruns packet",
                adaptation_field_length
            )));
        }
        if adaptation_field_length == 0 {
            return Ok(None);
        }

        let flags = data[offset + 1];
        let mut field = AdaptationField {
            length: adaptation_field_length,
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            pcr_flag: (flags & 0x10) != 0,
            opcr_flag: (flags & 0x08) != 0,
            splicing_point_flag: (flags & 0x04) != 0,
            private_data_flag: (flags & 0x02) != 0,
            extension_flag: (flags & 0x01) != 0,
            pcr: None,
            opcr: None,
            splice_countdown: None,
            private_data: None,
        };

        let end = offset + 1 + adaptation_field_length;
        let mut pos = offset + 2;

        if field.pcr_flag {
            if end < pos + 6 {
                return Err(DemuxError::Bitstream("PCR data too short".into()));
            }
            field.pcr = Some(read_clock(&data[pos..pos + 6]));
            pos += 6;
        }

        if field.opcr_flag {
            if end < pos + 6 {
                return Err(DemuxError::Bitstream("OPCR data too short".into()));
            }
            field.opcr = Some(read_clock(&data[pos..pos + 6]));
            pos += 6;
        }

        if field.splicing_point_flag {
            if end < pos + 1 {
                return Err(DemuxError::Bitstream("Splice countdown too short".into()));
            }
            field.splice_countdown = Some(data[pos] as i8);
            pos += 1;
        }

        if field.private_data_flag {
            if end < pos + 1 {
                return Err(DemuxError::Bitstream(
                    "Private data length byte missing".into(),
                ));
            }
            let private_data_length = data[pos] as usize;
            pos += 1;
            if end < pos + private_data_length {
                return Err(DemuxError::Bitstream("Private data too short".into()));
            }
            field.private_data = Some(data[pos..pos + private_data_length].to_vec());
        }
        Ok(Some(field))
    }

    /// Whether a complete section (CRC field included) passes the CRC
    /// check, or checking is off.
    pub fn check_crc(&self, section: &[u8]) -> bool {
        !self.verify_crc || self.crc.verify(section)
    }

    /// Offset of the payload within a packet whose header is `header`.
    pub fn payload_offset(&self, header: &TSHeader, data: &[u8]) -> Result<usize> {
        if !header.adaptation_field_exists {
            return Ok(TS_HEADER_SIZE);
        }
        let length = *data
            .get(TS_HEADER_SIZE)
            .ok_or_else(|| DemuxError::Bitstream("adaptation field length missing".into()))?
            as usize;
        let offset = TS_HEADER_SIZE + 1 + length;
        if offset > data.len() {
            return Err(DemuxError::Bitstream(format!(
                "adaptation field length {} overruns packet",
                length
            )));
        }
        Ok(offset)
    }

    /// Validates the common long section framing and returns the
    /// section body between the 8 byte header and the CRC.
    fn section_body<'a>(&self, section: &'a [u8], table_id: u8) -> Result<&'a [u8]> {
        if section.len() < SECTION_HEADER_LEN + CRC_LEN {
            return Err(DemuxError::MalformedTable("section too short".into()));
        }
        if section[0] != table_id {
            return Err(DemuxError::MalformedTable(format!(
                "expected table id 0x{:02x}, got 0x{:02x}",
                table_id, section[0]
            )));
        }
        if section[1] & 0x80 == 0 {
            return Err(DemuxError::MalformedTable(
                "section syntax indicator not set".into(),
            ));
        }
        let section_length = ((section[1] as usize & 0x0F) << 8) | section[2] as usize;
        let total = 3 + section_length;
        if total > section.len() || total < SECTION_HEADER_LEN + CRC_LEN {
            return Err(DemuxError::MalformedTable(format!(
                "section length {} does not fit {} bytes",
                section_length,
                section.len()
            )));
        }
        let section = &section[..total];
        if !self.check_crc(section) {
            return Err(DemuxError::MalformedTable("CRC mismatch".into()));
        }
        Ok(&section[SECTION_HEADER_LEN..total - CRC_LEN])
    }

    pub fn parse_pat(&self, section: &[u8]) -> Result<PAT> {
        let data = self.section_body(section, TABLE_ID_PAT)?;
        let mut pat = PAT::new();
        pat.transport_stream_id = ((section[3] as u16) << 8) | section[4] as u16;

        for entry in data.chunks_exact(4) {
            let program_number = ((entry[0] as u16) << 8) | entry[1] as u16;
            let pid = ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16;
            pat.entries.push(PATEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
        }

        Ok(pat)
    }

    pub fn parse_pmt(&self, section: &[u8]) -> Result<PMT> {
        let data = self.section_body(section, TABLE_ID_PMT)?;
        let mut pmt = PMT::new();
        pmt.program_number = ((section[3] as u16) << 8) | section[4] as u16;

        let mut pos = 0;
        let end = data.len();

        if pos + 4 > end {
            return Err(DemuxError::MalformedTable("PMT too short for PCR PID".into()));
        }

        pmt.pcr_pid = ((data[pos] as u16 & 0x1F) << 8) | data[pos + 1] as u16;
        pos += 2;

        let program_info_length = ((data[pos] as usize & 0x0F) << 8) | data[pos + 1] as usize;
        pos += 2;

        if program_info_length > 0 {
            if pos + program_info_length > end {
                return Err(DemuxError::MalformedTable("Program info data too short".into()));
            }
            pmt.program_descriptors =
                self.parse_descriptors(&data[pos..pos + program_info_length])?;
            pos += program_info_length;
        }

        while pos + 5 <= end {
            let stream_type = data[pos];
            let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
            let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(DemuxError::MalformedTable("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&data[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    pub fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(DemuxError::MalformedTable("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}

/// 33 bit base, 6 reserved bits, 9 bit extension.
fn read_clock(data: &[u8]) -> u64 {
    let base = ((data[0] as u64) << 25)
        | ((data[1] as u64) << 17)
        | ((data[2] as u64) << 9)
        | ((data[3] as u64) << 1)
        | ((data[4] & 0x80) as u64 >> 7);
    let ext = (((data[4] & 0x01) as u64) << 8) | (data[5] as u64);
    base * 300 + ext
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::utils::Crc32Mpeg2;

    /// Wraps a section body in the long header and appends the CRC.
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
}

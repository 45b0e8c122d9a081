// Stream IDs
pub const STREAM_ID_PROGRAM_END: u8 = 0xb9;
pub const STREAM_ID_PACK: u8 = 0xba;
pub const STREAM_ID_SYSTEM_HEADER: u8 = 0xbb;
pub const STREAM_ID_PSM: u8 = 0xbc;
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;
pub const STREAM_ID_PADDING: u8 = 0xbe;
pub const STREAM_ID_PRIVATE_2: u8 = 0xbf;
pub const STREAM_ID_EXTENDED: u8 = 0xfd;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1fff;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_AC3: u8 = 0x81;

// Descriptor tags
pub const DESC_REGISTRATION: u8 = 0x05;
pub const DESC_LANGUAGE: u8 = 0x0a;
pub const DESC_TELETEXT: u8 = 0x56;
pub const DESC_DVB_SUBTITLE: u8 = 0x59;
pub const DESC_DVB_AC3: u8 = 0x6a;
pub const DESC_DVB_EAC3: u8 = 0x7a;
pub const DESC_DVB_DTS: u8 = 0x7b;
pub const DESC_DVB_AAC: u8 = 0x7c;
pub const DESC_ATSC_AC3: u8 = 0x81;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;

/// Builds a registration format identifier from its four characters.
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

pub const FORMAT_AC3: u32 = fourcc(b"AC-3");
pub const FORMAT_EAC3: u32 = fourcc(b"EAC3");
pub const FORMAT_DTS1: u32 = fourcc(b"DTS1");
pub const FORMAT_DTS2: u32 = fourcc(b"DTS2");
pub const FORMAT_DTS3: u32 = fourcc(b"DTS3");
pub const FORMAT_VC1: u32 = fourcc(b"VC-1");
pub const FORMAT_HEVC: u32 = fourcc(b"HEVC");
pub const FORMAT_HDMV: u32 = fourcc(b"HDMV");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    pub network_pid: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub entries: Vec<PATEntry>,
}

impl PAT {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs only, network information entries skipped.
    pub fn programs(&self) -> impl Iterator<Item = &PATEntry> {
        self.entries.iter().filter(|e| e.program_number != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

impl Descriptor {
    /// ISO-639 language code of a language descriptor.
    pub fn language(&self) -> Option<String> {
        if self.tag != DESC_LANGUAGE || self.data.len() < 3 {
            return None;
        }
        let code = &self.data[..3];
        code.iter()
            .all(u8::is_ascii_alphabetic)
            .then(|| String::from_utf8_lossy(code).to_ascii_lowercase())
    }

    /// Format identifier of a registration descriptor.
    pub fn registration(&self) -> Option<u32> {
        if self.tag != DESC_REGISTRATION || self.data.len() < 4 {
            return None;
        }
        Some(u32::from_be_bytes([
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

impl ElementaryStreamInfo {
    pub fn descriptor(&self, tag: u8) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.tag == tag)
    }

    pub fn language(&self) -> Option<String> {
        self.descriptors.iter().find_map(Descriptor::language)
    }

    pub fn registration(&self) -> Option<u32> {
        self.descriptors.iter().find_map(Descriptor::registration)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registration(&self) -> Option<u32> {
        self.program_descriptors
            .iter()
            .find_map(Descriptor::registration)
    }

    /// Blu-ray streams announce themselves with an "HDMV" registration,
    /// either for the whole program or per stream.
    pub fn is_hdmv(&self) -> bool {
        self.registration() == Some(FORMAT_HDMV)
            || self
                .elementary_stream_infos
                .iter()
                .any(|es| es.registration() == Some(FORMAT_HDMV))
    }

    /// Whether the PCR travels on a PID of its own.
    pub fn has_clock(&self) -> bool {
        self.pcr_pid != PID_NULL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationField {
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr_flag: bool,
    pub opcr_flag: bool,
    pub splicing_point_flag: bool,
    pub private_data_flag: bool,
    pub extension_flag: bool,
    /// 27 MHz clock value (base * 300 + extension).
    pub pcr: Option<u64>,
    pub opcr: Option<u64>,
    pub splice_countdown: Option<i8>,
    pub private_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl TSHeader {
    /// The two bit adaptation_field_control value.
    pub fn adaptation_control(&self) -> u8 {
        (self.adaptation_field_exists as u8) << 1 | self.contains_payload as u8
    }
}

/// 27 MHz clock value to 90 kHz ticks.
pub fn pcr_to_pts(pcr: u64) -> i64 {
    (pcr / 300) as i64
}

/// Converts 90 kHz ticks to milliseconds.
pub fn pts_to_millis(pts: i64) -> i64 {
    pts * 1000 / PTS_HZ as i64
}

pub fn millis_to_pts(millis: i64) -> i64 {
    millis * PTS_HZ as i64 / 1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Main = 0,
    LC = 1,
    SSR = 2,
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            _ => ProfileType::LTP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ADTSHeader {
    pub id: u8,                   // 1 bit, 0=MPEG-4, 1=MPEG-2
    pub layer: u8,                // 2 bits, always 0
    pub protection_absent: bool,  // 1 bit
    pub profile: ProfileType,     // 2 bits
    pub sample_rate_index: u8,    // 4 bits
    pub channel_configuration: u8, // 3 bits
    pub frame_length: u16,        // 13 bits, header included
    pub number_of_raw_blocks: u8, // 2 bits
}

impl ADTSHeader {
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            7
        } else {
            9
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match self.sample_rate_index {
            0 => Some(96000),
            1 => Some(88200),
            2 => Some(64000),
            3 => Some(48000),
            4 => Some(44100),
            5 => Some(32000),
            6 => Some(24000),
            7 => Some(22050),
            8 => Some(16000),
            9 => Some(12000),
            10 => Some(11025),
            11 => Some(8000),
            12 => Some(7350),
            _ => None,
        }
    }
}

/// CRC32 used by MPEG-2 PSI sections (ITU-T H.222.0 annex A).
/// Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final xor.
const CRC32_MPEG2: u32 = 0x04C11DB7;

/// Table driven MPEG-2 CRC32.
///
/// A section that carries its trailing CRC field checksums to zero, which
/// is how [`Crc32Mpeg2::verify`] validates PAT, PMT and PSM sections.
#[derive(Clone)]
pub struct Crc32Mpeg2 {
    table: [u32; 256],
}

impl Crc32Mpeg2 {
    pub fn new() -> Self {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if (crc & 0x8000_0000) != 0 {
                    (crc << 1) ^ CRC32_MPEG2
                } else {
                    crc << 1
                };
            }
            *slot = crc;
        }
        Self { table }
    }

    /// Calculates the CRC32 checksum for the given data.
    ///
    /// ```
    /// use esdemux::utils::Crc32Mpeg2;
    ///
    /// let crc = Crc32Mpeg2::new();
    /// assert_eq!(crc.calculate(&[0x01, 0x01]), 0xD66FB816);
    /// ```
    pub fn calculate(&self, data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ self.table[index as usize]
        })
    }

    /// Checks a complete section, CRC field included.
    pub fn verify(&self, section: &[u8]) -> bool {
        section.len() >= 4 && self.calculate(section) == 0
    }
}

impl Default for Crc32Mpeg2 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32Mpeg2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Crc32Mpeg2")
    }
}

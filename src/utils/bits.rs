use crate::error::{DemuxError, Result};

/// A bit-level reader over a byte slice.
///
/// Every read is checked against the remaining length before any bit is
/// consumed, so a failed read leaves the cursor where it was. Used for
/// table sections, PES header fields and codec headers:
/// - Reading individual bits
/// - Reading up to 64 bits as a big-endian number
/// - Peeking without consuming
/// - Reading exponential Golomb codes (ue(v) / se(v))
/// - Taking a bounded sub-view of the next bytes
///
/// Example:
/// ```
/// use esdemux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.peek_bits(1).unwrap(), 1);
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// assert_eq!(reader.remaining_bits(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    fn ensure(&self, n: usize) -> Result<()> {
        let remaining = self.remaining_bits();
        if n > remaining {
            return Err(DemuxError::Bitstream(format!(
                "requested {} bits with {} remaining",
                n, remaining
            )));
        }
        Ok(())
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    pub fn read_bit(&mut self) -> Result<bool> {
        self.ensure(1)?;

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits (n <= 32) and returns them as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(DemuxError::Bitstream("Too many bits requested".into()));
        }
        Ok(self.read_bits_u64(n)? as u32)
    }

    /// Reads n bits (n <= 64) and returns them as a big-endian number.
    pub fn read_bits_u64(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(DemuxError::Bitstream("Too many bits requested".into()));
        }
        self.ensure(n as usize)?;

        let mut value = 0u64;
        let mut left = n;
        while left > 0 {
            let avail = 8 - self.bit_offset as u32;
            let take = avail.min(left);
            let byte = self.data[self.byte_offset] as u64;
            let shift = avail - take;
            let bits = (byte >> shift) & ((1u64 << take) - 1);
            value = (value << take) | bits;

            self.bit_offset += take as u8;
            if self.bit_offset == 8 {
                self.bit_offset = 0;
                self.byte_offset += 1;
            }
            left -= take;
        }

        Ok(value)
    }

    /// Returns the next n bits (n <= 32) without consuming them.
    pub fn peek_bits(&self, n: u32) -> Result<u32> {
        let mut probe = self.clone();
        probe.read_bits(n)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Reads one bit that must be set; marker bits are used by MPEG
    /// timestamps to guard against start code emulation.
    pub fn read_marker(&mut self) -> Result<()> {
        if !self.read_bit()? {
            return Err(DemuxError::Bitstream("marker bit not set".into()));
        }
        Ok(())
    }

    /// Reads an unsigned exponential Golomb code (ue(v)) as specified in H.264/H.265.
    ///
    /// Format:
    /// 1. M leading zeros followed by a 1
    /// 2. M more INFO bits
    /// 3. Value = 2^M + INFO - 1
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(DemuxError::Bitstream("Invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) + info as u64 - 1) as u32)
    }

    /// Reads a signed exponential Golomb code (se(v)) as specified in H.264/H.265.
    ///
    /// Odd codes map to positive values, even codes to negative ones:
    /// k=1 -> +1, k=2 -> -1, k=3 -> +2, ...
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        if k == 0 {
            return Ok(0);
        }

        let magnitude = ((k as u64 + 1) >> 1) as i32;
        let sign = if k & 1 == 1 { 1 } else { -1 };
        Ok(sign * magnitude)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        self.ensure(n as usize)?;
        let total = self.bit_offset as usize + n as usize;
        self.byte_offset += total / 8;
        self.bit_offset = (total % 8) as u8;
        Ok(())
    }

    pub fn skip_bytes(&mut self, n: usize) -> Result<()> {
        self.ensure(n * 8)?;
        self.byte_offset += n;
        Ok(())
    }

    /// Aligns reader to next byte boundary by skipping remaining bits in current byte.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Returns number of bits available to read.
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }

    /// Byte offset of the cursor, rounded down.
    pub fn position(&self) -> usize {
        self.byte_offset
    }

    /// Splits off a reader over the next `len` bytes and advances past them.
    /// The cursor must be byte aligned.
    pub fn sub_reader(&mut self, len: usize) -> Result<BitReader<'a>> {
        if self.bit_offset != 0 {
            return Err(DemuxError::Bitstream("sub view on unaligned cursor".into()));
        }
        self.ensure(len * 8)?;
        let view = &self.data[self.byte_offset..self.byte_offset + len];
        self.byte_offset += len;
        Ok(BitReader::new(view))
    }

    /// The unread bytes from the (byte aligned) cursor onwards.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.byte_offset.min(self.data.len())..]
    }
}

#[cfg(test)]
mod test_utils {
    /// Encodes a single value as unsigned exp-Golomb code, as in H.264 headers.
    pub fn encode_golomb(value: u32) -> Vec<u8> {
        if value == 0 {
            return vec![0b10000000];
        }

        let leading_zeros = 32 - (value + 1).leading_zeros() - 1;
        let info = value - ((1u32 << leading_zeros) - 1);

        let total_bits = (leading_zeros as usize) * 2 + 1;
        let total_bytes = (total_bits + 7) / 8;
        let mut result = vec![0u8; total_bytes];

        let mut bit_pos: usize = leading_zeros as usize;

        result[bit_pos / 8] |= 1 << (7 - (bit_pos % 8));
        bit_pos += 1;

        for i in 0..leading_zeros as usize {
            let bit = (info >> (leading_zeros - 1 - i as u32)) & 1;
            if bit == 1 {
                result[bit_pos / 8] |= 1 << (7 - (bit_pos % 8));
            }
            bit_pos += 1;
        }

        result
    }

    /// Packs the exp-Golomb codes of several values back to back.
    pub fn encode_multiple_golomb(values: &[u32]) -> Vec<u8> {
        let mut bits: Vec<bool> = Vec::new();
        for &value in values {
            let leading_zeros = 32 - (value + 1).leading_zeros() - 1;
            for _ in 0..leading_zeros {
                bits.push(false);
            }
            let code = value + 1;
            for i in (0..=leading_zeros).rev() {
                bits.push((code >> i) & 1 == 1);
            }
        }

        let mut result = vec![0u8; (bits.len() + 7) / 8];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                result[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        let data = [0xFF; 8];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(33).is_err());

        let data = [0b10110011, 0b11001100, 0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(20).unwrap(), 0b10110011110011001010);
    }

    #[test]
    fn test_read_33_bit_value() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x80];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits_u64(33).unwrap(), (1u64 << 33) - 1);
        assert_eq!(reader.remaining_bits(), 7);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let data = [0b11000000, 0x01];
        let reader = BitReader::new(&data);
        assert_eq!(reader.peek_bits(2).unwrap(), 0b11);
        assert_eq!(reader.remaining_bits(), 16);
    }

    #[test]
    fn test_failed_read_keeps_cursor() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        reader.read_bits(6).unwrap();
        assert!(reader.read_bits(8).is_err());
        assert_eq!(reader.remaining_bits(), 2);
        assert_eq!(reader.read_bits(2).unwrap(), 0b11);
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut reader = BitReader::new(&data);
        reader.skip_bytes(1).unwrap();
        let mut sub = reader.sub_reader(2).unwrap();
        assert_eq!(sub.read_u16().unwrap(), 0x0203);
        assert!(sub.read_bit().is_err());
        assert_eq!(reader.read_u8().unwrap(), 0x04);
        assert!(reader.sub_reader(1).is_err());
    }

    #[test]
    fn test_marker() {
        let data = [0b10000000];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_marker().is_ok());
        assert!(reader.read_marker().is_err());
    }

    #[test]
    fn test_read_golomb() {
        let test_cases = [
            ([0b10000000], 0, "1"),
            ([0b01000000], 1, "010"),
            ([0b01100000], 2, "011"),
            ([0b00100000], 3, "00100"),
            ([0b00110000], 5, "00110"),
            ([0b00101000], 4, "00101"),
            ([0b00111000], 6, "00111"),
            ([0b00010000], 7, "0001000"),
            ([0b00010010], 8, "0001001"),
        ];

        for (input, expected, pattern) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            let result = reader.read_golomb().unwrap();
            assert_eq!(result, *expected, "Failed for pattern {}", pattern);

            let encoded = encode_golomb(*expected);
            assert_eq!(&encoded[..1], input, "Encoding {} gave wrong pattern", expected);
        }

        let data = [0x00];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_golomb().is_err());
    }

    #[test]
    fn test_signed_golomb() {
        let test_cases = [
            ([0b10000000], 0),
            ([0b01000000], 1),
            ([0b01100000], -1),
            ([0b00100000], 2),
            ([0b00101000], -2),
            ([0b00110000], 3),
            ([0b00111000], -3),
        ];

        for (input, expected) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_signed_golomb().unwrap(), *expected);
        }
    }

    #[test]
    fn test_consecutive_golomb() {
        let values = [3, 5, 1, 0, 4];
        let encoded = encode_multiple_golomb(&values);
        let mut reader = BitReader::new(&encoded);

        for &expected in &values {
            assert_eq!(reader.read_golomb().unwrap(), expected);
        }
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 33) as u32;
        let mut reader = BitReader::new(&data);

        match reader.read_bits(n) {
            Ok(result) => {
                let mut expected = 0u64;
                for i in 0..n as usize {
                    let bit = (data[i / 8] >> (7 - (i % 8))) & 1;
                    expected = (expected << 1) | bit as u64;
                }
                result as u64 == expected
            }
            Err(_) => (n as usize) > data.len() * 8,
        }
    }

    #[quickcheck]
    fn prop_never_reads_past_end(data: Vec<u8>, widths: Vec<u8>) -> bool {
        let mut reader = BitReader::new(&data);
        for w in widths {
            let before = reader.remaining_bits();
            match reader.read_bits_u64((w % 65) as u32) {
                Ok(_) => {}
                Err(_) => {
                    if reader.remaining_bits() != before {
                        return false;
                    }
                }
            }
        }
        true
    }

    #[quickcheck]
    fn prop_golomb_round_trip(values: Vec<u8>) -> bool {
        let values: Vec<u32> = values.into_iter().map(|v| v as u32).collect();
        let encoded = encode_multiple_golomb(&values);
        let mut reader = BitReader::new(&encoded);

        values
            .iter()
            .all(|&expected| matches!(reader.read_golomb(), Ok(decoded) if decoded == expected))
    }

    #[test]
    fn test_byte_alignment() {
        let data = [0xFF, 0x00];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        assert_eq!(reader.bit_offset, 3);
        reader.align_byte();
        assert_eq!(reader.bit_offset, 0);
        assert_eq!(reader.byte_offset, 1);
    }
}

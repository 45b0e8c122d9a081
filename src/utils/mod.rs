//! # Utility Functions and Types
//!
//! Low level helpers shared by the container and codec parsers:
//!
//! - Bit-level reading with bounds checks on every access
//! - MPEG-2 CRC32 for PSI section validation
//! - Rate-limited error reporting
//!
//! ## Bit Operations
//!
//! ```rust
//! use esdemux::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! // Read specific number of bits
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//!
//! // Out of range requests fail instead of panicking
//! assert!(reader.read_bits(8).is_err());
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

/// Rate-limited warning log
pub mod warn;

// Re-export commonly used types
pub use bits::*;
pub use crc::Crc32Mpeg2;
pub use warn::ErrorLog;

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # esdemux - MPEG elementary stream demultiplexer
//!
//! `esdemux` splits MPEG-2 Transport Streams (broadcast captures, Blu-ray
//! M2TS) and MPEG Program Streams (DVD VOBs, MPEG-1 system streams) into
//! their elementary streams. It never decodes; it hands out timestamped
//! buffers of raw codec data, one per PES packet and logical stream.
//!
//! ## Features
//!
//! ### Containers
//! - Transport streams with 188, 192, 204 and 208 byte packets
//! - Program streams, MPEG-1 and MPEG-2 pack layouts, with or without a
//!   program stream map
//! - Any other container through a caller supplied delegate
//!
//! ### Streams
//! - PAT / PMT decoding with descriptor and registration refinement
//! - Blu-ray HDMV stream types and split TrueHD / DTS-HD audio PIDs
//! - DVD private stream 1 sub-streams (AC-3, DTS, LPCM, TrueHD, subpictures)
//! - Content probing for streams the tables leave undecided
//!
//! ### Robustness
//! - Bounded resynchronisation after lost sync
//! - Continuity and duplicate packet detection
//! - PCR / SCR discontinuity tracking
//! - Rate-limited error reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esdemux::config::DemuxConfig;
//! use esdemux::format::StreamHandle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = tokio::fs::File::open("movie.m2ts").await?;
//!     let mut handle = StreamHandle::open(file, DemuxConfig::default()).await?;
//!
//!     for stream in handle.streams() {
//!         println!("{}: {} {:?}", stream.id, stream.codec, stream.language);
//!     }
//!     if let Some(duration) = handle.duration() {
//!         println!("about {} seconds", duration / 90_000);
//!     }
//!
//!     loop {
//!         let buf = handle.read_buffer().await?;
//!         if buf.is_end_of_stream() {
//!             break;
//!         }
//!         println!("stream {} pts {:?} {} bytes", buf.stream_id, buf.start, buf.data.len());
//!     }
//!     println!("{}", handle.close());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Buffer and stream description types
//! - `codec`: Codec identification, keyframe detection and content probes
//! - `format`: Container detection and the TS, PS and delegated demuxers
//! - `config`: Demuxer settings
//! - `error`: Error type and `Result` alias
//! - `utils`: Bit reader, MPEG-2 CRC and the rate-limited error log

/// Buffer and stream description types
pub mod av;

/// Codec identification and probing
pub mod codec;

/// Error types and utilities
pub mod error;

/// Container detection and demuxers
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use error::{DemuxError, Result};

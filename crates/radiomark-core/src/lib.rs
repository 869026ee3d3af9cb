//! Radiomark Core - Landmark Audio Fingerprinting for Broadcast Monitoring
//!
//! This crate identifies short audio clips against a catalog of full songs:
//! - Short-time spectrum in decibels
//! - Local-maximum landmark extraction
//! - Combinatorial peak-pair hashing
//! - Concurrent in-memory fingerprint index with JSON snapshots
//! - Offset-alignment voting with a confidence gate
//! - Aggregation of detections into broadcast play sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Radiomark Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │ Spectrogram  │─▶│    Peak      │─▶│    Hash      │          │
//! │  │   Builder    │  │  Extractor   │  │  Generator   │          │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘          │
//! │                                             │                   │
//! │                    ┌────────────────────────┤                   │
//! │                    │                        │                   │
//! │             ┌──────┴──────┐          ┌──────┴──────┐           │
//! │             │ Fingerprint │◀─────────│   Matcher   │           │
//! │             │    Index    │  lookup  │  (voting)   │           │
//! │             └─────────────┘          └──────┬──────┘           │
//! │                                             │                   │
//! │                                      ┌──────┴──────┐           │
//! │                                      │   Airplay   │           │
//! │                                      │ Aggregation │           │
//! │                                      └─────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use radiomark_core::{FingerprintConfig, FingerprintIndex, Fingerprinter, SampleBuffer, SongId};
//!
//! fn main() -> radiomark_core::Result<()> {
//!     let fingerprinter = Fingerprinter::new(FingerprintConfig::default())?;
//!     let index = FingerprintIndex::new();
//!
//!     let song = SampleBuffer::from_f32(vec![0.0; 44100 * 30], 44100);
//!     fingerprinter.index_song(&SongId::from("track-001"), &song, &index)?;
//!
//!     let clip = song.sub_clip(10.0, 10.0);
//!     let result = fingerprinter.match_clip(&clip, &index)?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod airplay;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hashing;
pub mod index;
pub mod matcher;
pub mod peaks;
pub mod spectrogram;
pub mod types;

pub use airplay::{aggregate_plays, AirplayConfig, Detection, PlaySession};
pub use config::{FingerprintConfig, DEFAULT_SAMPLE_RATE};
pub use error::{Error, Result};
pub use fingerprint::{index_song, match_clip, Extraction, Fingerprinter};
pub use hashing::HashGenerator;
pub use index::{FingerprintIndex, FingerprintLookup, FingerprintStore, IndexSnapshot, Posting, SongFilter};
pub use matcher::{FailureReason, MatchFailure, MatchResult, Matcher, SongMatch};
pub use peaks::PeakExtractor;
pub use spectrogram::{SpectrogramBuilder, SpectrogramMatrix, DB_FLOOR};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version. Installing a subscriber is up to the caller.
pub fn init() {
    tracing::info!(version = VERSION, "Radiomark Core initialized");
}

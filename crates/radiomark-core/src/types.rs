//! Core types shared by the fingerprinting stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mono audio already decoded to a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap float samples. Buffers peaking above full scale are scaled back
    /// to `[-1.0, 1.0]` when the spectrogram is built.
    pub fn from_f32(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Convert signed 16-bit PCM to normalized floats.
    pub fn from_i16(samples: &[i16], sample_rate: u32) -> Self {
        let samples = samples.iter().map(|&s| s as f32 / 32768.0).collect();
        Self { samples, sample_rate }
    }

    /// Down-mix interleaved 16-bit PCM by averaging the channels of each frame.
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved_i16(samples: &[i16], channels: usize, sample_rate: u32) -> Self {
        if channels <= 1 {
            return Self::from_i16(samples, sample_rate);
        }
        let samples = samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                sum as f32 / channels as f32 / 32768.0
            })
            .collect();
        Self { samples, sample_rate }
    }

    /// Samples as normalized floats.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Copy out a clip starting at `start_secs`, clamped to the buffer bounds.
    ///
    /// Times are rounded to the nearest sample.
    pub fn sub_clip(&self, start_secs: f64, duration_secs: f64) -> SampleBuffer {
        let rate = self.sample_rate as f64;
        let start = ((start_secs.max(0.0) * rate).round() as usize).min(self.samples.len());
        let end = (start + (duration_secs.max(0.0) * rate).round() as usize).min(self.samples.len());
        Self {
            samples: self.samples[start..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Opaque catalog identifier of an indexed song.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    /// Create a song identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SongId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A landmark: local maximum of a spectrogram.
///
/// Only meaningful relative to the matrix that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peak {
    /// Frequency bin index
    pub freq_bin: u32,
    /// Time frame index
    pub time_frame: u32,
}

impl Peak {
    /// Create a peak at the given coordinate.
    pub fn new(freq_bin: u32, time_frame: u32) -> Self {
        Self { freq_bin, time_frame }
    }
}

/// Truncated 64-bit digest of a peak pair.
///
/// The retained bytes sit in the low end of the value, so a hash of width `w`
/// is always below `2^(8w)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintHash(u64);

impl FingerprintHash {
    /// Keep the `width` most significant bytes of a full digest.
    pub fn truncate(digest: u64, width: usize) -> Self {
        let width = width.clamp(1, 8);
        Self(digest >> (8 * (8 - width)))
    }

    /// Wrap an already truncated value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw truncated value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether the value survives encoding as `width` bytes.
    pub fn fits(&self, width: usize) -> bool {
        match width {
            1..=7 => self.0 >> (8 * width) == 0,
            8 => true,
            _ => false,
        }
    }

    /// Fixed-width big-endian byte string, as persisted.
    pub fn to_bytes(&self, width: usize) -> Vec<u8> {
        let width = width.clamp(1, 8);
        self.0.to_be_bytes()[8 - width..].to_vec()
    }

    /// Rebuild a hash from its persisted byte string (1 to 8 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[8 - bytes.len()..].copy_from_slice(bytes);
        Some(Self(u64::from_be_bytes(buf)))
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A hash together with the time frame of its anchor peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Peak-pair digest
    pub hash: FingerprintHash,
    /// Time frame of the earlier peak
    pub offset: u32,
}

/// Durable `(song, hash, offset)` association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    /// Song the hash belongs to
    pub song_id: SongId,
    /// Peak-pair digest
    pub hash: FingerprintHash,
    /// Anchor time frame inside the song
    pub offset: u32,
}

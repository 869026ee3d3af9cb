//! Fingerprinting configuration.
//!
//! A [`FingerprintConfig`] is threaded explicitly through every call; the engine
//! keeps no process-wide defaults. Values are validated once, when a
//! [`crate::Fingerprinter`] is built, so the inner stages can trust them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::spectrogram::DB_FLOOR;

/// Default capture sample rate used by the ingestion tooling.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Smallest analysis window accepted.
pub const MIN_WINDOW_SIZE: usize = 16;

/// Tunable knobs of the fingerprinting and matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// FFT window size in samples
    pub window_size: usize,
    /// Fraction of each window shared with the next one, in `[0, 1)`
    pub overlap_ratio: f32,
    /// Each peak is paired with the next `fan_value - 1` peaks
    pub fan_value: usize,
    /// Minimum peak amplitude in dB relative to the loudest bin
    pub amp_min: f32,
    /// Side of the square neighborhood used for local-maximum detection (odd)
    pub peak_neighborhood_size: usize,
    /// Smallest accepted anchor-to-target distance, in frames
    pub min_hash_time_delta: u32,
    /// Largest accepted anchor-to-target distance, in frames
    pub max_hash_time_delta: u32,
    /// Bytes of the 64-bit digest kept in each hash
    pub hash_width: usize,
    /// Minimum aligned hash count for a positive match
    pub min_match_count: usize,
    /// Minimum share of the query's hashes in the winning bucket, in percent
    pub min_input_confidence: f64,
    /// Minimum share of the song's indexed hashes in the winning bucket, in percent
    pub min_db_confidence: f64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            overlap_ratio: 0.5,
            fan_value: 15,
            amp_min: -20.0,
            peak_neighborhood_size: 11,
            min_hash_time_delta: 0,
            max_hash_time_delta: 200,
            hash_width: 8,
            min_match_count: 10,
            min_input_confidence: 10.0,
            min_db_confidence: 2.0,
        }
    }
}

impl FingerprintConfig {
    /// Parse a configuration from JSON. Missing keys keep their defaults.
    ///
    /// Values of the wrong type or sign are reported as invalid configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Hop length between consecutive frames, `⌊W·(1 − r)⌋`.
    pub fn hop_length(&self) -> usize {
        (self.window_size as f64 * (1.0 - self.overlap_ratio as f64)) as usize
    }

    /// Convert a frame count (or frame offset) into seconds.
    pub fn frames_to_seconds(&self, frames: i64, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        frames as f64 * self.hop_length() as f64 / sample_rate as f64
    }

    /// Check every knob against its documented range.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(Error::config(format!(
                "window_size must be at least {}, got {}",
                MIN_WINDOW_SIZE, self.window_size
            )));
        }
        if !self.overlap_ratio.is_finite() || !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(Error::config(format!(
                "overlap_ratio must be in [0, 1), got {}",
                self.overlap_ratio
            )));
        }
        if self.hop_length() == 0 {
            return Err(Error::config(format!(
                "window_size {} with overlap_ratio {} leaves a zero hop length",
                self.window_size, self.overlap_ratio
            )));
        }
        if self.fan_value == 0 {
            return Err(Error::config("fan_value must be at least 1"));
        }
        if self.peak_neighborhood_size < 3 || self.peak_neighborhood_size % 2 == 0 {
            return Err(Error::config(format!(
                "peak_neighborhood_size must be an odd integer >= 3, got {}",
                self.peak_neighborhood_size
            )));
        }
        if !self.amp_min.is_finite() || self.amp_min <= DB_FLOOR {
            return Err(Error::config(format!(
                "amp_min must be a finite value above the {} dB floor, got {}",
                DB_FLOOR, self.amp_min
            )));
        }
        if self.min_hash_time_delta > self.max_hash_time_delta {
            return Err(Error::config(format!(
                "min_hash_time_delta ({}) exceeds max_hash_time_delta ({})",
                self.min_hash_time_delta, self.max_hash_time_delta
            )));
        }
        if !(1..=8).contains(&self.hash_width) {
            return Err(Error::config(format!(
                "hash_width must be between 1 and 8 bytes, got {}",
                self.hash_width
            )));
        }
        for (name, value) in [
            ("min_input_confidence", self.min_input_confidence),
            ("min_db_confidence", self.min_db_confidence),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(format!(
                    "{} must be a non-negative percentage, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

//! Combinatorial peak-pair hashing.
//!
//! Peaks are sorted by time (then frequency) and each one is paired with the
//! next `fan_value - 1` peaks. A pair is kept when its frame distance lies in
//! the configured window; its key `"{f1}|{f2}|{dt}"` is digested with
//! XXH64 (seed 0) and truncated to `hash_width` bytes. The digest is the same
//! on every target, so persisted indexes stay valid across builds. The anchor
//! frame travels with the hash for offset alignment.

use std::fmt::Write as _;

use tracing::debug;
use twox_hash::XxHash64;

use crate::types::{Fingerprint, FingerprintHash, Peak};

/// Turns peak lists into [`Fingerprint`]s.
#[derive(Debug, Clone)]
pub struct HashGenerator {
    fan_value: usize,
    min_delta: u32,
    max_delta: u32,
    hash_width: usize,
}

impl HashGenerator {
    /// Create a generator.
    pub fn new(fan_value: usize, min_delta: u32, max_delta: u32, hash_width: usize) -> Self {
        Self {
            fan_value,
            min_delta,
            max_delta,
            hash_width,
        }
    }

    /// Hash of a single peak pair.
    pub fn hash_pair(&self, freq1: u32, freq2: u32, time_delta: u32) -> FingerprintHash {
        let mut key = String::with_capacity(24);
        self.hash_with_buffer(&mut key, freq1, freq2, time_delta)
    }

    /// Sort `peaks` canonically and emit every accepted pair.
    pub fn generate(&self, mut peaks: Vec<Peak>) -> Vec<Fingerprint> {
        peaks.sort_unstable_by_key(|p| (p.time_frame, p.freq_bin));

        let pairs_per_peak = self.fan_value.saturating_sub(1);
        let mut fingerprints = Vec::with_capacity(peaks.len() * pairs_per_peak);
        let mut key = String::with_capacity(24);

        for (i, anchor) in peaks.iter().enumerate() {
            for target in peaks.iter().skip(i + 1).take(pairs_per_peak) {
                let time_delta = target.time_frame - anchor.time_frame;
                if time_delta < self.min_delta || time_delta > self.max_delta {
                    continue;
                }
                fingerprints.push(Fingerprint {
                    hash: self.hash_with_buffer(&mut key, anchor.freq_bin, target.freq_bin, time_delta),
                    offset: anchor.time_frame,
                });
            }
        }

        debug!(
            peaks = peaks.len(),
            hashes = fingerprints.len(),
            fan_value = self.fan_value,
            "Generated hashes"
        );

        fingerprints
    }

    fn hash_with_buffer(&self, key: &mut String, freq1: u32, freq2: u32, time_delta: u32) -> FingerprintHash {
        key.clear();
        // Writing into a String cannot fail
        let _ = write!(key, "{}|{}|{}", freq1, freq2, time_delta);

        FingerprintHash::truncate(XxHash64::oneshot(0, key.as_bytes()), self.hash_width)
    }
}

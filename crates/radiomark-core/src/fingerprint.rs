//! Landmark fingerprinting pipeline.
//!
//! # Algorithm Overview
//!
//! 1. Compute the dB spectrogram of the buffer
//! 2. Keep local maxima above the amplitude floor as landmarks
//! 3. Pair each landmark with the next few ones into `(hash, offset)` tuples
//! 4. Index the tuples under a song id, or vote them against the index
//!
//! Indexing and matching run the exact same extraction, so a clip cut on a
//! hop boundary of an indexed recording reproduces that recording's hashes.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::FingerprintConfig;
use crate::error::{Error, Result};
use crate::hashing::HashGenerator;
use crate::index::{FingerprintLookup, FingerprintStore, SongFilter};
use crate::matcher::{FailureReason, MatchResult, Matcher};
use crate::peaks::PeakExtractor;
use crate::spectrogram::SpectrogramBuilder;
use crate::types::{Fingerprint, Peak, SampleBuffer, SongId};

/// Intermediate products of one extraction pass.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Number of spectrogram frames
    pub frame_count: usize,
    /// Landmarks ordered by `(time_frame, freq_bin)`
    pub peaks: Vec<Peak>,
    /// Hashes with their anchor frame
    pub fingerprints: Vec<Fingerprint>,
}

/// Runs the whole pipeline for one validated configuration.
pub struct Fingerprinter {
    config: FingerprintConfig,
    spectrogram: SpectrogramBuilder,
    peaks: PeakExtractor,
    hashes: HashGenerator,
    matcher: Matcher,
}

impl Fingerprinter {
    /// Validate `config` and prepare every stage.
    pub fn new(config: FingerprintConfig) -> Result<Self> {
        config.validate()?;

        let spectrogram = SpectrogramBuilder::new(config.window_size, config.overlap_ratio);
        let peaks = PeakExtractor::new(config.amp_min, config.peak_neighborhood_size);
        let hashes = HashGenerator::new(
            config.fan_value,
            config.min_hash_time_delta,
            config.max_hash_time_delta,
            config.hash_width,
        );
        let matcher = Matcher::from_config(&config);

        Ok(Self {
            config,
            spectrogram,
            peaks,
            hashes,
            matcher,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Run spectrogram, peak extraction and hashing.
    ///
    /// Returns `None` for an empty buffer.
    pub fn extract(&self, audio: &SampleBuffer) -> Result<Option<Extraction>> {
        if audio.sample_rate() == 0 {
            return Err(Error::InvalidSampleRate(0));
        }

        let Some(matrix) = self.spectrogram.build(audio.samples())? else {
            return Ok(None);
        };

        let mut peaks = self.peaks.extract(&matrix);
        peaks.sort_unstable_by_key(|p| (p.time_frame, p.freq_bin));
        let fingerprints = self.hashes.generate(peaks.clone());

        debug!(
            samples = audio.len(),
            frames = matrix.num_frames(),
            peaks = peaks.len(),
            hashes = fingerprints.len(),
            "Extracted fingerprints"
        );

        Ok(Some(Extraction {
            frame_count: matrix.num_frames(),
            peaks,
            fingerprints,
        }))
    }

    /// Fingerprint a song and append its hashes to `store`.
    ///
    /// Returns the number of stored hashes; 0 for an empty buffer.
    pub fn index_song<S>(&self, song_id: &SongId, audio: &SampleBuffer, store: &S) -> Result<usize>
    where
        S: FingerprintStore + ?Sized,
    {
        let Some(extraction) = self.extract(audio)? else {
            warn!(song_id = %song_id, "Skipping song with no samples");
            return Ok(0);
        };

        let stored = store.insert(song_id, &extraction.fingerprints);
        info!(
            song_id = %song_id,
            duration_secs = audio.duration_secs(),
            peaks = extraction.peaks.len(),
            hashes = stored,
            "Indexed song"
        );
        Ok(stored)
    }

    /// Index several songs in parallel. Counts are returned in input order.
    pub fn index_catalog<S>(&self, songs: &[(SongId, SampleBuffer)], store: &S) -> Result<Vec<usize>>
    where
        S: FingerprintStore + ?Sized,
    {
        let counts = songs
            .par_iter()
            .map(|(song_id, audio)| self.index_song(song_id, audio, store))
            .collect::<Result<Vec<_>>>()?;

        info!(
            songs = songs.len(),
            hashes = counts.iter().sum::<usize>(),
            "Indexed catalog"
        );
        Ok(counts)
    }

    /// Identify a clip against every song in `lookup`.
    pub fn match_clip<L>(&self, audio: &SampleBuffer, lookup: &L) -> Result<MatchResult>
    where
        L: FingerprintLookup + ?Sized,
    {
        let Some(extraction) = self.extract(audio)? else {
            return Ok(self.log_result(MatchResult::failure(FailureReason::EmptyInput)));
        };

        if extraction.peaks.is_empty() {
            return Ok(self.log_result(MatchResult::failure(FailureReason::NoLandmarks)));
        }
        if extraction.fingerprints.is_empty() {
            return Ok(self.log_result(MatchResult::failure(FailureReason::NoHashes)));
        }

        let result = self.matcher.match_fingerprints(&extraction.fingerprints, lookup);
        Ok(self.log_result(result))
    }

    /// Check a clip against one known song only.
    pub fn match_clip_against<L>(&self, audio: &SampleBuffer, song_id: &SongId, lookup: &L) -> Result<MatchResult>
    where
        L: FingerprintLookup + ?Sized,
    {
        self.match_clip(audio, &SongFilter::new(lookup, song_id))
    }

    fn log_result(&self, result: MatchResult) -> MatchResult {
        match &result {
            MatchResult::Match(m) => info!(
                song_id = %m.song_id,
                offset_delta = m.offset_delta,
                match_count = m.match_count,
                input_confidence = m.input_confidence,
                db_confidence = m.db_confidence,
                "Clip matched"
            ),
            MatchResult::NoMatch(f) => info!(
                reason = %f.reason,
                match_count = f.match_count,
                input_confidence = f.input_confidence,
                db_confidence = f.db_confidence,
                "Clip not matched"
            ),
        }
        result
    }
}

/// Fingerprint a song with `config` and store its hashes.
pub fn index_song<S>(song_id: &SongId, audio: &SampleBuffer, config: &FingerprintConfig, store: &S) -> Result<usize>
where
    S: FingerprintStore + ?Sized,
{
    Fingerprinter::new(config.clone())?.index_song(song_id, audio, store)
}

/// Identify a clip with `config` against `lookup`.
pub fn match_clip<L>(audio: &SampleBuffer, config: &FingerprintConfig, lookup: &L) -> Result<MatchResult>
where
    L: FingerprintLookup + ?Sized,
{
    Fingerprinter::new(config.clone())?.match_clip(audio, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FingerprintIndex;

    fn small_config() -> FingerprintConfig {
        FingerprintConfig {
            window_size: 256,
            peak_neighborhood_size: 5,
            amp_min: -40.0,
            ..FingerprintConfig::default()
        }
    }

    fn chirp_train(sample_rate: u32, seconds: f32) -> SampleBuffer {
        let n = (sample_rate as f32 * seconds) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                // Tone hopping between 8 pitches every quarter second
                let step = (t * 4.0) as usize % 8;
                let freq = 500.0 + 250.0 * step as f32;
                0.8 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        SampleBuffer::from_f32(samples, sample_rate)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = FingerprintConfig {
            peak_neighborhood_size: 4,
            ..small_config()
        };
        let err = Fingerprinter::new(config).err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let audio = SampleBuffer::from_f32(vec![0.1; 1000], 0);
        assert!(matches!(fp.extract(&audio), Err(Error::InvalidSampleRate(0))));
    }

    #[test]
    fn test_empty_buffer() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let index = FingerprintIndex::new();
        let empty = SampleBuffer::from_f32(Vec::new(), 8000);

        assert!(fp.extract(&empty).unwrap().is_none());
        assert_eq!(fp.index_song(&SongId::from("a"), &empty, &index).unwrap(), 0);
        assert!(index.is_empty());

        let result = fp.match_clip(&empty, &index).unwrap();
        assert_eq!(result.reason(), Some(FailureReason::EmptyInput));
    }

    #[test]
    fn test_silence_has_no_landmarks() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let index = FingerprintIndex::new();
        let silence = SampleBuffer::from_f32(vec![0.0; 8000], 8000);

        let extraction = fp.extract(&silence).unwrap().unwrap();
        assert!(extraction.peaks.is_empty());
        assert!(extraction.fingerprints.is_empty());

        let result = fp.match_clip(&silence, &index).unwrap();
        assert_eq!(result.reason(), Some(FailureReason::NoLandmarks));
    }

    #[test]
    fn test_extraction_is_deterministic_and_sorted() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let audio = chirp_train(8000, 3.0);

        let a = fp.extract(&audio).unwrap().unwrap();
        let b = fp.extract(&audio).unwrap().unwrap();
        assert_eq!(a.fingerprints, b.fingerprints);
        assert_eq!(a.peaks, b.peaks);
        assert!(!a.fingerprints.is_empty());
        assert!(a
            .peaks
            .windows(2)
            .all(|w| (w[0].time_frame, w[0].freq_bin) <= (w[1].time_frame, w[1].freq_bin)));
        assert_eq!(a.frame_count, (24000 - 256) / 128 + 1);
    }

    #[test]
    fn test_index_song_counts_hashes() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let index = FingerprintIndex::new();
        let audio = chirp_train(8000, 3.0);
        let song = SongId::from("chirps");

        let expected = fp.extract(&audio).unwrap().unwrap().fingerprints.len();
        let stored = fp.index_song(&song, &audio, &index).unwrap();
        assert_eq!(stored, expected);
        assert_eq!(index.len(), expected);
        assert_eq!(index.song_hash_count(&song), expected);
    }

    #[test]
    fn test_index_catalog_preserves_order() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let index = FingerprintIndex::new();
        let songs = vec![
            (SongId::from("long"), chirp_train(8000, 3.0)),
            (SongId::from("empty"), SampleBuffer::from_f32(Vec::new(), 8000)),
            (SongId::from("short"), chirp_train(8000, 1.5)),
        ];

        let counts = fp.index_catalog(&songs, &index).unwrap();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[1], 0);
        assert_eq!(counts[0], index.song_hash_count(&SongId::from("long")));
        assert_eq!(counts[2], index.song_hash_count(&SongId::from("short")));
        assert_eq!(index.len(), counts.iter().sum::<usize>());
    }

    #[test]
    fn test_free_functions_match_the_fingerprinter() {
        let config = small_config();
        let index = FingerprintIndex::new();
        let audio = chirp_train(8000, 3.0);

        let stored = index_song(&SongId::from("a"), &audio, &config, &index).unwrap();
        assert!(stored > 0);

        let result = match_clip(&audio, &config, &index).unwrap();
        let m = result.song_match().expect("full song should match itself");
        assert_eq!(m.song_id, SongId::from("a"));
        assert_eq!(m.offset_delta, 0);
    }

    #[test]
    fn test_match_clip_against_other_song_has_no_hits() {
        let fp = Fingerprinter::new(small_config()).unwrap();
        let index = FingerprintIndex::new();
        let audio = chirp_train(8000, 3.0);
        fp.index_song(&SongId::from("a"), &audio, &index).unwrap();

        let result = fp.match_clip_against(&audio, &SongId::from("b"), &index).unwrap();
        assert_eq!(result.reason(), Some(FailureReason::NoIndexHits));

        let result = fp.match_clip_against(&audio, &SongId::from("a"), &index).unwrap();
        assert!(result.is_match());
    }
}

//! Offset-alignment voting and the acceptance gate.
//!
//! Index postings are first restricted to the query's hashes, then every
//! `(query hash, posting)` pair with equal hashes casts one vote for `(song, db_offset − query_offset)`. A true match piles its
//! votes into a single bucket; collisions scatter.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FingerprintConfig;
use crate::index::FingerprintLookup;
use crate::types::{Fingerprint, FingerprintHash, SongId};

/// Why a clip was not matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The clip had no samples
    EmptyInput,
    /// No spectral peak passed the amplitude floor
    NoLandmarks,
    /// Peaks were found but no pair fell inside the fan-out and delta window
    NoHashes,
    /// None of the clip's hashes is in the index
    NoIndexHits,
    /// Hits existed but produced no vote
    NoAlignment,
    /// The best bucket failed the acceptance gate
    LowConfidence,
}

impl FailureReason {
    /// Human readable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyInput => "no samples",
            FailureReason::NoLandmarks => "no landmarks",
            FailureReason::NoHashes => "no fingerprints",
            FailureReason::NoIndexHits => "no matching hashes",
            FailureReason::NoAlignment => "no offset alignment",
            FailureReason::LowConfidence => "low confidence",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A positive identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongMatch {
    /// Identified song
    pub song_id: SongId,
    /// Frame of the song where the clip starts
    pub offset_delta: i64,
    /// Votes in the winning bucket
    pub match_count: usize,
    /// Winning votes over the query's hash count, in percent
    pub input_confidence: f64,
    /// Winning votes over the song's indexed hash count, in percent
    pub db_confidence: f64,
}

impl SongMatch {
    /// Clip start inside the song, in seconds.
    pub fn offset_seconds(&self, hop_length: usize, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.offset_delta as f64 * hop_length as f64 / sample_rate as f64
    }
}

/// A negative outcome with whatever evidence was gathered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFailure {
    /// Why the clip was rejected
    pub reason: FailureReason,
    /// Votes in the best bucket (0 on early failure)
    pub match_count: usize,
    /// Input confidence of the best bucket (0 on early failure)
    pub input_confidence: f64,
    /// DB confidence of the best bucket (0 on early failure)
    pub db_confidence: f64,
}

/// Outcome of matching a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResult {
    /// Clip identified
    Match(SongMatch),
    /// Clip not identified
    NoMatch(MatchFailure),
}

impl MatchResult {
    /// Early failure with zeroed metrics.
    pub fn failure(reason: FailureReason) -> Self {
        MatchResult::NoMatch(MatchFailure {
            reason,
            match_count: 0,
            input_confidence: 0.0,
            db_confidence: 0.0,
        })
    }

    /// Whether the clip was identified.
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match(_))
    }

    /// The identification, if any.
    pub fn song_match(&self) -> Option<&SongMatch> {
        match self {
            MatchResult::Match(m) => Some(m),
            MatchResult::NoMatch(_) => None,
        }
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            MatchResult::Match(_) => None,
            MatchResult::NoMatch(f) => Some(f.reason),
        }
    }

    /// Votes in the best bucket.
    pub fn match_count(&self) -> usize {
        match self {
            MatchResult::Match(m) => m.match_count,
            MatchResult::NoMatch(f) => f.match_count,
        }
    }

    /// Input confidence in percent.
    pub fn input_confidence(&self) -> f64 {
        match self {
            MatchResult::Match(m) => m.input_confidence,
            MatchResult::NoMatch(f) => f.input_confidence,
        }
    }

    /// DB confidence in percent.
    pub fn db_confidence(&self) -> f64 {
        match self {
            MatchResult::Match(m) => m.db_confidence,
            MatchResult::NoMatch(f) => f.db_confidence,
        }
    }
}

/// Votes query fingerprints against a store and applies the acceptance gate.
#[derive(Debug, Clone)]
pub struct Matcher {
    min_match_count: usize,
    min_input_confidence: f64,
    min_db_confidence: f64,
}

impl Matcher {
    /// Create a matcher with explicit thresholds.
    pub fn new(min_match_count: usize, min_input_confidence: f64, min_db_confidence: f64) -> Self {
        Self {
            min_match_count,
            min_input_confidence,
            min_db_confidence,
        }
    }

    /// Create a matcher from the thresholds of a configuration.
    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self::new(
            config.min_match_count,
            config.min_input_confidence,
            config.min_db_confidence,
        )
    }

    /// Match query fingerprints (with query-side offsets) against `store`.
    ///
    /// Ties on the vote count go to the lowest song id, then the lowest
    /// offset delta.
    pub fn match_fingerprints<L>(&self, query: &[Fingerprint], store: &L) -> MatchResult
    where
        L: FingerprintLookup + ?Sized,
    {
        if query.is_empty() {
            return MatchResult::failure(FailureReason::NoHashes);
        }

        let mut wanted: Vec<FingerprintHash> = query.iter().map(|fp| fp.hash).collect();
        wanted.sort_unstable();
        wanted.dedup();

        // Every stored record votes, including repeated identical ones
        let mut candidates = store.lookup_many(&wanted);
        candidates.retain(|_, postings| !postings.is_empty());

        if candidates.is_empty() {
            debug!(query_hashes = query.len(), "No index hits");
            return MatchResult::failure(FailureReason::NoIndexHits);
        }

        let mut votes: FxHashMap<(&SongId, i64), usize> = FxHashMap::default();
        for fp in query {
            if let Some(postings) = candidates.get(&fp.hash) {
                for posting in postings {
                    let delta = posting.offset as i64 - fp.offset as i64;
                    *votes.entry((&posting.song_id, delta)).or_default() += 1;
                }
            }
        }

        let best = votes.into_iter().max_by(|(key_a, count_a), (key_b, count_b)| {
            count_a.cmp(count_b).then_with(|| key_b.cmp(key_a))
        });
        let Some(((song_id, offset_delta), match_count)) = best else {
            return MatchResult::failure(FailureReason::NoAlignment);
        };

        let song_total = store.song_hash_count(song_id);
        let input_confidence = match_count as f64 / query.len() as f64 * 100.0;
        let db_confidence = if song_total > 0 {
            match_count as f64 / song_total as f64 * 100.0
        } else {
            0.0
        };

        debug!(
            song_id = %song_id,
            offset_delta,
            match_count,
            input_confidence,
            db_confidence,
            hit_hashes = candidates.len(),
            "Best alignment"
        );

        if match_count < self.min_match_count
            || input_confidence < self.min_input_confidence
            || db_confidence < self.min_db_confidence
        {
            return MatchResult::NoMatch(MatchFailure {
                reason: FailureReason::LowConfidence,
                match_count,
                input_confidence,
                db_confidence,
            });
        }

        MatchResult::Match(SongMatch {
            song_id: song_id.clone(),
            offset_delta,
            match_count,
            input_confidence,
            db_confidence,
        })
    }
}

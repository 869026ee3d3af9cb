//! Turning per-clip detections into broadcast play sessions.
//!
//! A monitoring loop samples each station every few seconds and matches the
//! clip. Consecutive detections of one song on one station form a run; runs
//! split wherever two detections are further apart than `max_gap_secs`. A run
//! becomes a [`PlaySession`] once it has enough detections and covers enough
//! time. Royalty computation is left to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matcher::MatchResult;
use crate::types::SongId;

/// A clip from a station identified as a song at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Identified song
    pub song_id: SongId,
    /// Station the clip was captured from
    pub station: String,
    /// Capture time
    pub matched_at: DateTime<Utc>,
}

impl Detection {
    /// Build a detection from a positive match, `None` otherwise.
    pub fn from_match(result: &MatchResult, station: impl Into<String>, matched_at: DateTime<Utc>) -> Option<Self> {
        result.song_match().map(|m| Self {
            song_id: m.song_id.clone(),
            station: station.into(),
            matched_at,
        })
    }
}

/// Thresholds for promoting detection runs to play sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirplayConfig {
    /// Largest silence between two detections of the same run, in seconds
    pub max_gap_secs: i64,
    /// Fewest detections a run needs
    pub min_detections: usize,
    /// Shortest first-to-last span a run needs, in seconds
    pub min_duration_secs: i64,
}

impl Default for AirplayConfig {
    fn default() -> Self {
        Self {
            max_gap_secs: 180,
            min_detections: 3,
            min_duration_secs: 30,
        }
    }
}

/// One continuous airing of a song on a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaySession {
    /// Song aired
    pub song_id: SongId,
    /// Station that aired it
    pub station: String,
    /// First detection
    pub start: DateTime<Utc>,
    /// Last detection
    pub stop: DateTime<Utc>,
    /// Detections in the run
    pub detections: usize,
}

impl PlaySession {
    /// Time between the first and last detection.
    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }
}

/// Group detections into play sessions.
///
/// Input order does not matter. Sessions are sorted by start time, then
/// station, then song.
pub fn aggregate_plays(detections: &[Detection], config: &AirplayConfig) -> Vec<PlaySession> {
    let mut groups: BTreeMap<(&str, &SongId), Vec<DateTime<Utc>>> = BTreeMap::new();
    for detection in detections {
        groups
            .entry((detection.station.as_str(), &detection.song_id))
            .or_default()
            .push(detection.matched_at);
    }

    let max_gap = Duration::seconds(config.max_gap_secs);
    let min_duration = Duration::seconds(config.min_duration_secs);
    let mut sessions = Vec::new();

    for ((station, song_id), mut times) in groups {
        times.sort_unstable();

        let mut run_start = 0;
        for i in 1..=times.len() {
            let split = i == times.len() || times[i] - times[i - 1] > max_gap;
            if !split {
                continue;
            }

            let run = &times[run_start..i];
            run_start = i;

            let (start, stop) = (run[0], run[run.len() - 1]);
            if run.len() >= config.min_detections && stop - start >= min_duration {
                sessions.push(PlaySession {
                    song_id: song_id.clone(),
                    station: station.to_string(),
                    start,
                    stop,
                    detections: run.len(),
                });
            }
        }
    }

    sessions.sort_by(|a, b| {
        (a.start, &a.station, &a.song_id).cmp(&(b.start, &b.station, &b.song_id))
    });

    debug!(
        detections = detections.len(),
        sessions = sessions.len(),
        "Aggregated plays"
    );

    sessions
}

//! Output formatting for CLI

use radiomark_core::{MatchResult, PlaySession};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON, falling back to an empty object
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Human readable match outcome
pub fn format_match(result: &MatchResult, hop_length: usize, sample_rate: u32) -> String {
    match result {
        MatchResult::Match(m) => format!(
            "MATCH {}\n  Offset:           {:.2}s (frame {})\n  Matched hashes:   {}\n  Input confidence: {:.1}%\n  DB confidence:    {:.1}%",
            m.song_id,
            m.offset_seconds(hop_length, sample_rate),
            m.offset_delta,
            m.match_count,
            m.input_confidence,
            m.db_confidence
        ),
        MatchResult::NoMatch(f) => format!(
            "NO MATCH ({})\n  Best bucket:      {} hashes\n  Input confidence: {:.1}%\n  DB confidence:    {:.1}%",
            f.reason, f.match_count, f.input_confidence, f.db_confidence
        ),
    }
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Station")]
    station: String,
    #[tabled(rename = "Song")]
    song: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Stop")]
    stop: String,
    #[tabled(rename = "Duration (s)")]
    duration: i64,
    #[tabled(rename = "Detections")]
    detections: usize,
}

/// Play sessions as text lines or a table
pub fn format_sessions(sessions: &[PlaySession], format: OutputFormat) -> String {
    if format == OutputFormat::Table {
        let rows: Vec<SessionRow> = sessions
            .iter()
            .map(|s| SessionRow {
                station: s.station.clone(),
                song: s.song_id.to_string(),
                start: s.start.to_rfc3339(),
                stop: s.stop.to_rfc3339(),
                duration: s.duration().num_seconds(),
                detections: s.detections,
            })
            .collect();
        return Table::new(rows).with(Style::rounded()).to_string();
    }

    sessions
        .iter()
        .map(|s| {
            format!(
                "{}  {}  {} -> {}  {}s  ({} detections)",
                s.station,
                s.song_id,
                s.start.to_rfc3339(),
                s.stop.to_rfc3339(),
                s.duration().num_seconds(),
                s.detections
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Key/value rows as aligned text or a two-column table
pub fn format_pairs(pairs: &[(&str, String)], format: OutputFormat) -> String {
    if format == OutputFormat::Table {
        let rows: Vec<Vec<String>> = pairs.iter().map(|(k, v)| vec![k.to_string(), v.clone()]).collect();
        return Builder::from(rows).build().with(Style::rounded()).to_string();
    }
    pairs
        .iter()
        .map(|(k, v)| format!("  {:<18} {}", format!("{}:", k), v))
        .collect::<Vec<_>>()
        .join("\n")
}

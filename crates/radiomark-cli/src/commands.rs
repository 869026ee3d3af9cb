//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use radiomark_core::{
    aggregate_plays, AirplayConfig, Detection, FingerprintConfig, FingerprintIndex,
    FingerprintLookup, Fingerprinter, IndexSnapshot, SampleBuffer, SongId,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::output::{self, OutputFormat};
use crate::pcm;

/// Load the fingerprinting configuration, or the defaults
pub async fn load_config(path: Option<&Path>) -> anyhow::Result<FingerprintConfig> {
    let Some(path) = path else {
        return Ok(FingerprintConfig::default());
    };
    FingerprintConfig::from_json_file(path).with_context(|| format!("loading config {}", path.display()))
}

async fn load_index(path: &Path, config: &FingerprintConfig) -> anyhow::Result<FingerprintIndex> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading index {}", path.display()))?;
    let snapshot: IndexSnapshot =
        serde_json::from_str(&json).with_context(|| format!("parsing index {}", path.display()))?;
    if snapshot.hash_width != config.hash_width {
        bail!(
            "index {} stores {}-byte hashes but the config uses {}",
            path.display(),
            snapshot.hash_width,
            config.hash_width
        );
    }
    Ok(FingerprintIndex::from_snapshot(snapshot)?)
}

async fn save_index(path: &Path, index: &FingerprintIndex, hash_width: usize) -> anyhow::Result<()> {
    let json = serde_json::to_string(&index.snapshot(hash_width)?)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing index {}", path.display()))
}

async fn read_pcm(path: &Path, channels: usize, sample_rate: u32) -> anyhow::Result<SampleBuffer> {
    if channels == 0 {
        bail!("channel count must be at least 1");
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading PCM {}", path.display()))?;
    Ok(pcm::decode_s16le(&bytes, channels, sample_rate))
}

#[derive(Serialize)]
struct IndexReport {
    song_id: SongId,
    hashes: usize,
    replaced: usize,
    songs: usize,
    records: usize,
}

/// Fingerprint a song into the index snapshot
pub async fn index(
    song_id: &str,
    input: &Path,
    index_path: &Path,
    sample_rate: u32,
    channels: usize,
    config: FingerprintConfig,
    format: &str,
) -> anyhow::Result<()> {
    let audio = read_pcm(input, channels, sample_rate).await?;

    let index = if tokio::fs::try_exists(index_path).await? {
        load_index(index_path, &config).await?
    } else {
        info!(path = %index_path.display(), "Creating new index");
        FingerprintIndex::new()
    };

    let song_id = SongId::from(song_id);
    let replaced = index.remove_song(&song_id);
    if replaced > 0 {
        warn!(song_id = %song_id, records = replaced, "Replacing previously indexed song");
    }

    let hash_width = config.hash_width;
    let index = Arc::new(index);
    let hashes = {
        let index = Arc::clone(&index);
        let song_id = song_id.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let fingerprinter = Fingerprinter::new(config)?;
            Ok(fingerprinter.index_song(&song_id, &audio, index.as_ref())?)
        })
        .await??
    };

    save_index(index_path, &index, hash_width).await?;

    let report = IndexReport {
        song_id,
        hashes,
        replaced,
        songs: index.song_count(),
        records: index.len(),
    };
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)),
        fmt => {
            println!("Indexed {}", report.song_id);
            println!(
                "{}",
                output::format_pairs(
                    &[
                        ("Hashes", report.hashes.to_string()),
                        ("Replaced", report.replaced.to_string()),
                        ("Songs in index", report.songs.to_string()),
                        ("Records in index", report.records.to_string()),
                    ],
                    fmt,
                )
            );
        }
    }

    Ok(())
}

/// Identify a clip against the index snapshot
pub async fn match_clip(
    input: &Path,
    index_path: &Path,
    song: Option<&str>,
    sample_rate: u32,
    channels: usize,
    config: FingerprintConfig,
    format: &str,
) -> anyhow::Result<()> {
    let audio = read_pcm(input, channels, sample_rate).await?;
    let index = load_index(index_path, &config).await?;
    let song = song.map(SongId::from);
    let hop_length = config.hop_length();

    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let fingerprinter = Fingerprinter::new(config)?;
        let result = match &song {
            Some(song_id) => fingerprinter.match_clip_against(&audio, song_id, &index)?,
            None => fingerprinter.match_clip(&audio, &index)?,
        };
        Ok(result)
    })
    .await??;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&result)),
        _ => println!("{}", output::format_match(&result, hop_length, sample_rate)),
    }

    Ok(())
}

#[derive(Serialize)]
struct SongStats {
    song_id: SongId,
    hashes: usize,
}

#[derive(Serialize)]
struct IndexStats {
    hash_width: usize,
    songs: usize,
    records: usize,
    distinct_hashes: usize,
    per_song: Vec<SongStats>,
}

/// Show index statistics
pub async fn stats(index_path: &Path, format: &str) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(index_path)
        .await
        .with_context(|| format!("reading index {}", index_path.display()))?;
    let snapshot: IndexSnapshot = serde_json::from_str(&json)?;
    let hash_width = snapshot.hash_width;
    let index = FingerprintIndex::from_snapshot(snapshot)?;

    let stats = IndexStats {
        hash_width,
        songs: index.song_count(),
        records: index.len(),
        distinct_hashes: index.distinct_hashes(),
        per_song: index
            .songs()
            .into_iter()
            .map(|song_id| SongStats {
                hashes: index.song_hash_count(&song_id),
                song_id,
            })
            .collect(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&stats)),
        fmt => {
            println!("Index: {}", index_path.display());
            println!(
                "{}",
                output::format_pairs(
                    &[
                        ("Hash width", format!("{} bytes", stats.hash_width)),
                        ("Songs", stats.songs.to_string()),
                        ("Records", stats.records.to_string()),
                        ("Distinct hashes", stats.distinct_hashes.to_string()),
                    ],
                    fmt,
                )
            );
            if !stats.per_song.is_empty() {
                println!("\nSongs:");
                let rows: Vec<(&str, String)> = stats
                    .per_song
                    .iter()
                    .map(|s| (s.song_id.as_str(), s.hashes.to_string()))
                    .collect();
                println!("{}", output::format_pairs(&rows, fmt));
            }
        }
    }

    Ok(())
}

/// Aggregate a detection log into play sessions
pub async fn airplay(detections_path: &Path, config: &AirplayConfig, format: &str) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(detections_path)
        .await
        .with_context(|| format!("reading detections {}", detections_path.display()))?;
    let detections: Vec<Detection> = serde_json::from_str(&json)
        .with_context(|| format!("parsing detections {}", detections_path.display()))?;

    let sessions = aggregate_plays(&detections, config);
    info!(detections = detections.len(), sessions = sessions.len(), "Aggregated detection log");

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&sessions)),
        _ if sessions.is_empty() => println!("No play sessions"),
        fmt => println!("{}", output::format_sessions(&sessions, fmt)),
    }

    Ok(())
}

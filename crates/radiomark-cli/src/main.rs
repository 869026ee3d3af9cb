//! Radiomark CLI - Broadcast Song Identification
//!
//! Features:
//! - Song indexing from raw PCM into a JSON index snapshot
//! - Clip matching against the whole catalog or a single song
//! - Index statistics
//! - Play session aggregation from detection logs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;
mod pcm;

/// Radiomark CLI - Audio fingerprinting toolkit
#[derive(Parser)]
#[command(name = "radiomark")]
#[command(author = "Radiomark Developers")]
#[command(version)]
#[command(about = "Landmark audio fingerprinting for broadcast monitoring", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Fingerprinting configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint a song and add it to the index
    Index {
        /// Catalog identifier of the song
        song_id: String,

        /// Raw signed 16-bit little-endian PCM file
        input: PathBuf,

        /// Index snapshot (created if missing)
        #[arg(short, long)]
        index: PathBuf,

        /// Sample rate of the PCM data
        #[arg(short = 'r', long, default_value_t = radiomark_core::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Interleaved channels in the PCM data
        #[arg(long, default_value = "1")]
        channels: usize,
    },

    /// Identify a clip against the index
    Match {
        /// Raw signed 16-bit little-endian PCM file
        input: PathBuf,

        /// Index snapshot
        #[arg(short, long)]
        index: PathBuf,

        /// Only check against this song
        #[arg(short, long)]
        song: Option<String>,

        /// Sample rate of the PCM data
        #[arg(short = 'r', long, default_value_t = radiomark_core::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Interleaved channels in the PCM data
        #[arg(long, default_value = "1")]
        channels: usize,
    },

    /// Show index statistics
    Stats {
        /// Index snapshot
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Turn a detection log into play sessions
    Airplay {
        /// JSON array of detections
        detections: PathBuf,

        /// Largest gap between detections of one play, in seconds
        #[arg(long, default_value = "180")]
        max_gap: i64,

        /// Fewest detections per play
        #[arg(long, default_value = "3")]
        min_detections: usize,

        /// Shortest play, in seconds
        #[arg(long, default_value = "30")]
        min_duration: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    radiomark_core::init();
    let config = commands::load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Index { song_id, input, index, sample_rate, channels } => {
            commands::index(&song_id, &input, &index, sample_rate, channels, config, &cli.format).await?;
        }
        Commands::Match { input, index, song, sample_rate, channels } => {
            commands::match_clip(&input, &index, song.as_deref(), sample_rate, channels, config, &cli.format).await?;
        }
        Commands::Stats { index } => {
            commands::stats(&index, &cli.format).await?;
        }
        Commands::Airplay { detections, max_gap, min_detections, min_duration } => {
            let airplay = radiomark_core::AirplayConfig {
                max_gap_secs: max_gap,
                min_detections,
                min_duration_secs: min_duration,
            };
            commands::airplay(&detections, &airplay, &cli.format).await?;
        }
    }

    Ok(())
}

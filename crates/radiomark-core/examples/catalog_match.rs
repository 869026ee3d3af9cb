//! Catalog Matching Example
//!
//! Indexes a small synthetic catalog, samples a simulated broadcast every
//! fifteen seconds and turns the detections into play sessions.
//!
//! # Usage
//! ```bash
//! cargo run --example catalog_match
//! ```

use anyhow::Result;
use chrono::{Duration, Utc};
use radiomark_core::{
    aggregate_plays, AirplayConfig, Detection, FingerprintConfig, FingerprintIndex, Fingerprinter,
    SampleBuffer, SongId,
};

const SAMPLE_RATE: u32 = 11025;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    radiomark_core::init();

    let config = FingerprintConfig {
        window_size: 1024,
        ..FingerprintConfig::default()
    };
    let fingerprinter = Fingerprinter::new(config)?;
    let index = FingerprintIndex::new();

    let catalog: Vec<(SongId, SampleBuffer)> = (0..3)
        .map(|i| (SongId::new(format!("track-{:03}", i + 1)), synth_song(i as u64 + 1, 60.0)))
        .collect();
    let counts = fingerprinter.index_catalog(&catalog, &index)?;

    println!("Indexed catalog:");
    for ((song_id, audio), count) in catalog.iter().zip(&counts) {
        println!("  {:<10} {:>6.1}s  {:>6} hashes", song_id, audio.duration_secs(), count);
    }
    println!("{}", "-".repeat(50));

    // The station plays track-002 then track-003
    let broadcast = [&catalog[1].1, &catalog[2].1];
    let started = Utc::now();
    let mut detections = Vec::new();

    for (slot, audio) in broadcast.iter().enumerate() {
        for k in 0..4 {
            let offset = 5.0 + 15.0 * k as f64;
            let clip = audio.sub_clip(offset, 8.0);
            let matched_at = started + Duration::seconds(slot as i64 * 60 + offset as i64);

            let result = fingerprinter.match_clip(&clip, &index)?;
            match result.song_match() {
                Some(m) => println!(
                    "  +{:>4.0}s  {}  at {:.1}s  ({} hashes, {:.1}% input, {:.1}% db)",
                    (matched_at - started).num_seconds(),
                    m.song_id,
                    m.offset_seconds(fingerprinter.config().hop_length(), SAMPLE_RATE),
                    m.match_count,
                    m.input_confidence,
                    m.db_confidence
                ),
                None => println!(
                    "  +{:>4.0}s  no match ({})",
                    (matched_at - started).num_seconds(),
                    result.reason().map(|r| r.as_str()).unwrap_or("unknown")
                ),
            }

            detections.extend(Detection::from_match(&result, "fm-101.5", matched_at));
        }
    }

    println!("{}", "-".repeat(50));
    println!("Play sessions:");
    for session in aggregate_plays(&detections, &AirplayConfig::default()) {
        println!(
            "  {}  {}  {}s over {} detections",
            session.station,
            session.song_id,
            session.duration().num_seconds(),
            session.detections
        );
    }

    Ok(())
}

/// Deterministic note sequence: each seed gives a different song.
fn synth_song(seed: u64, seconds: f32) -> SampleBuffer {
    let total = (SAMPLE_RATE as f32 * seconds) as usize;
    let mut state = seed;
    let mut samples = Vec::with_capacity(total);

    while samples.len() < total {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let freq = 200.0 + ((state >> 40) % 40) as f32 * 50.0;
        let len = SAMPLE_RATE as usize / 4 + ((state >> 20) % 4) as usize * SAMPLE_RATE as usize / 8;
        for n in 0..len {
            let env = (std::f32::consts::PI * n as f32 / len as f32).sin();
            let t = samples.len() as f32 / SAMPLE_RATE as f32;
            samples.push(0.7 * env * (2.0 * std::f32::consts::PI * freq * t).sin());
        }
    }
    samples.truncate(total);

    SampleBuffer::from_f32(samples, SAMPLE_RATE)
}

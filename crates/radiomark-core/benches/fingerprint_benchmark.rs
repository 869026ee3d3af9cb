//! Benchmark tests for the fingerprinting pipeline
//!
//! Run with: cargo bench -p radiomark-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use radiomark_core::{
    FingerprintConfig, FingerprintIndex, Fingerprinter, HashGenerator, Matcher, PeakExtractor,
    SampleBuffer, SongId, SpectrogramBuilder,
};

// Helper to generate test audio
fn generate_complex_audio(sample_rate: u32, duration_secs: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // Pitch changes every half second so peaks spread over time
            let step = (t * 2.0) as usize % 7;
            let melody = 330.0 + 110.0 * step as f32;
            0.5 * (2.0 * std::f32::consts::PI * melody * t).sin()
                + 0.3 * (2.0 * std::f32::consts::PI * 880.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
        })
        .collect()
}

// ============================================================================
// Spectrogram Benchmarks
// ============================================================================

fn bench_spectrogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spectrogram");
    let samples = generate_complex_audio(44100, 10.0);

    for window in [1024usize, 2048, 4096] {
        let builder = SpectrogramBuilder::new(window, 0.5);
        group.bench_with_input(BenchmarkId::new("Window", window), &samples, |b, samples| {
            b.iter(|| black_box(builder.build(black_box(samples))))
        });
    }

    group.finish();
}

// ============================================================================
// Peak and Hash Benchmarks
// ============================================================================

fn bench_peaks_and_hashes(c: &mut Criterion) {
    let config = FingerprintConfig::default();
    let samples = generate_complex_audio(44100, 10.0);
    let builder = SpectrogramBuilder::new(config.window_size, config.overlap_ratio);
    let matrix = match builder.build(&samples) {
        Ok(Some(matrix)) => matrix,
        _ => return,
    };

    let mut group = c.benchmark_group("Peaks");
    for neighborhood in [5usize, 11, 21] {
        let extractor = PeakExtractor::new(config.amp_min, neighborhood);
        group.bench_with_input(BenchmarkId::new("Neighborhood", neighborhood), &matrix, |b, m| {
            b.iter(|| black_box(extractor.extract(black_box(m))))
        });
    }
    group.finish();

    let peaks = PeakExtractor::new(config.amp_min, config.peak_neighborhood_size).extract(&matrix);
    let mut group = c.benchmark_group("Hashes");
    for fan_value in [5usize, 15, 30] {
        let generator = HashGenerator::new(fan_value, 0, 200, 8);
        group.bench_with_input(BenchmarkId::new("Fan", fan_value), &peaks, |b, peaks| {
            b.iter(|| black_box(generator.generate(peaks.clone())))
        });
    }
    group.finish();
}

// ============================================================================
// Matching Benchmarks
// ============================================================================

fn bench_match(c: &mut Criterion) {
    let config = FingerprintConfig::default();
    let fingerprinter = match Fingerprinter::new(config.clone()) {
        Ok(fp) => fp,
        Err(_) => return,
    };

    let index = FingerprintIndex::new();
    let songs: Vec<(SongId, SampleBuffer)> = (0..8)
        .map(|i| {
            let mut samples = generate_complex_audio(44100, 30.0);
            // Rotate so every song differs
            samples.rotate_left(i * 44100);
            (SongId::new(format!("song-{}", i)), SampleBuffer::from_f32(samples, 44100))
        })
        .collect();
    if fingerprinter.index_catalog(&songs, &index).is_err() {
        return;
    }

    let clip = songs[3].1.sub_clip(10.0, 10.0);
    let query = match fingerprinter.extract(&clip) {
        Ok(Some(extraction)) => extraction.fingerprints,
        _ => return,
    };
    let matcher = Matcher::from_config(&config);

    c.bench_function("Vote 10s clip against 8 songs", |b| {
        b.iter(|| black_box(matcher.match_fingerprints(black_box(&query), &index)))
    });

    c.bench_function("Match 10s clip end to end", |b| {
        b.iter(|| black_box(fingerprinter.match_clip(black_box(&clip), &index)))
    });
}

criterion_group!(benches, bench_spectrogram, bench_peaks_and_hashes, bench_match);
criterion_main!(benches);

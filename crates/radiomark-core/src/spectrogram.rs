//! Short-time magnitude spectrum in decibels.
//!
//! Frame `k` covers samples `[k·H, k·H + W)`. A buffer no longer than one
//! window yields a single zero-padded frame; longer buffers drop the trailing
//! partial window so that a clip cut on a hop boundary reproduces the frames of
//! the full recording exactly. Float input whose peak exceeds full scale is
//! scaled down by that peak before windowing.

use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex32;
use rayon::prelude::*;
use realfft::{RealFftPlanner, RealToComplex};
use tracing::debug;

use crate::error::Result;

/// Value assigned to bins with no energy, in dB.
pub const DB_FLOOR: f32 = -120.0;

/// Magnitudes in dB relative to the loudest bin, indexed `[freq_bin, time_frame]`.
///
/// Every value lies in `[DB_FLOOR, 0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramMatrix {
    data: Array2<f32>,
}

impl SpectrogramMatrix {
    /// Wrap a precomputed `[bins, frames]` matrix.
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Number of frequency bins (rows).
    pub fn num_bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time frames (columns).
    pub fn num_frames(&self) -> usize {
        self.data.ncols()
    }

    /// Value at a cell.
    pub fn get(&self, freq_bin: usize, time_frame: usize) -> Option<f32> {
        self.data.get((freq_bin, time_frame)).copied()
    }

    /// Underlying matrix.
    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Largest value in the matrix.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(DB_FLOOR, f32::max)
    }
}

/// Builds [`SpectrogramMatrix`] values with a Hann-windowed real FFT.
pub struct SpectrogramBuilder {
    window_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl SpectrogramBuilder {
    /// Create a builder. Callers validate the parameters through
    /// [`crate::FingerprintConfig::validate`].
    pub fn new(window_size: usize, overlap_ratio: f32) -> Self {
        let hop_size = ((window_size as f64 * (1.0 - overlap_ratio as f64)) as usize).max(1);

        // Generate Hann window
        let window: Vec<f32> = (0..window_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (window_size - 1) as f32).cos())
            })
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);

        Self {
            window_size,
            hop_size,
            window,
            fft,
        }
    }

    /// Window length in samples.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Hop length in samples.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of frames produced for a buffer of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        match len {
            0 => 0,
            n if n <= self.window_size => 1,
            n => (n - self.window_size) / self.hop_size + 1,
        }
    }

    /// Compute the dB spectrogram, or `None` for an empty buffer.
    pub fn build(&self, samples: &[f32]) -> Result<Option<SpectrogramMatrix>> {
        let num_frames = self.frame_count(samples.len());
        if num_frames == 0 {
            return Ok(None);
        }

        let gain = input_gain(samples);
        let fft = Arc::clone(&self.fft);
        let frames: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map_init(
                || (fft.make_input_vec(), fft.make_output_vec(), fft.make_scratch_vec()),
                |(input, output, scratch), frame_idx| -> Result<Vec<f32>> {
                    self.fill_frame(samples, frame_idx * self.hop_size, gain, input);
                    fft.process_with_scratch(input, output, scratch)?;
                    Ok(output.iter().map(|c: &Complex32| c.norm()).collect())
                },
            )
            .collect::<Result<_>>()?;

        let num_bins = self.window_size / 2 + 1;
        let mut data = Array2::<f32>::zeros((num_bins, num_frames));
        for (t, magnitudes) in frames.iter().enumerate() {
            for (f, &mag) in magnitudes.iter().enumerate() {
                data[[f, t]] = mag;
            }
        }

        let max_mag = data.iter().copied().fold(0.0f32, f32::max);
        if max_mag > 0.0 && max_mag.is_finite() {
            data.mapv_inplace(|mag| to_db(mag / max_mag));
        } else {
            data.fill(DB_FLOOR);
        }

        debug!(
            frames = num_frames,
            bins = num_bins,
            hop = self.hop_size,
            "Computed spectrogram"
        );

        Ok(Some(SpectrogramMatrix { data }))
    }

    /// Copy one windowed frame into `input`, zero-padding past the buffer end.
    fn fill_frame(&self, samples: &[f32], start: usize, gain: f32, input: &mut [f32]) {
        for (i, slot) in input.iter_mut().enumerate() {
            let sample = samples.get(start + i).copied().map_or(0.0, |s| sanitize(s, gain));
            *slot = sample * self.window[i];
        }
    }
}

/// Scale that brings the loudest finite sample back to full scale, if it exceeds it.
fn input_gain(samples: &[f32]) -> f32 {
    let peak = samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0.0f32, |peak, s| peak.max(s.abs()));
    if peak > 1.0 {
        peak.recip()
    } else {
        1.0
    }
}

/// Apply `gain`, treating non-finite values as silence.
fn sanitize(sample: f32, gain: f32) -> f32 {
    if sample.is_finite() {
        sample * gain
    } else {
        0.0
    }
}

/// Amplitude ratio to dB, floored at [`DB_FLOOR`].
fn to_db(ratio: f32) -> f32 {
    if ratio > 0.0 {
        (20.0 * ratio.log10()).clamp(DB_FLOOR, 0.0)
    } else {
        DB_FLOOR
    }
}

//! Local-maximum landmark extraction.
//!
//! A cell is a peak when it is louder than `amp_min` and no cell of the square
//! neighborhood around it is strictly louder. Equal neighbors do not
//! disqualify a candidate. Cells closer than half a neighborhood to any edge
//! are never candidates.
//!
//! The neighborhood maximum is computed with a separable filter (a pass along
//! time, then a pass along frequency), which yields the same set as the naive
//! `n×n` scan at `O(rows · cols · n)` cost. Rows are processed in parallel.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::spectrogram::SpectrogramMatrix;
use crate::types::Peak;

/// Finds [`Peak`]s in a [`SpectrogramMatrix`].
#[derive(Debug, Clone)]
pub struct PeakExtractor {
    amp_min: f32,
    neighborhood: usize,
}

impl PeakExtractor {
    /// Create an extractor. `neighborhood` must be odd and at least 3.
    pub fn new(amp_min: f32, neighborhood: usize) -> Self {
        Self {
            amp_min,
            neighborhood,
        }
    }

    /// Extract peaks, ordered by `(freq_bin, time_frame)`.
    pub fn extract(&self, matrix: &SpectrogramMatrix) -> Vec<Peak> {
        let data = matrix.as_array();
        let (rows, cols) = data.dim();
        let half = self.neighborhood / 2;

        if rows < self.neighborhood || cols < self.neighborhood {
            return Vec::new();
        }

        let time_max = self.time_pass(data, half);

        let peaks: Vec<Peak> = (half..rows - half)
            .into_par_iter()
            .flat_map_iter(|i| {
                let time_max = &time_max;
                (half..cols - half).filter_map(move |j| {
                    let value = data[[i, j]];
                    if value <= self.amp_min {
                        return None;
                    }
                    let window_max = (i - half..=i + half)
                        .map(|r| time_max[[r, j]])
                        .fold(f32::NEG_INFINITY, f32::max);
                    (value >= window_max).then(|| Peak::new(i as u32, j as u32))
                })
            })
            .collect();

        debug!(
            peaks = peaks.len(),
            amp_min = self.amp_min,
            neighborhood = self.neighborhood,
            "Extracted peaks"
        );

        peaks
    }

    /// Sliding maximum along the time axis for every row, at interior columns.
    fn time_pass(&self, data: &Array2<f32>, half: usize) -> Array2<f32> {
        let (rows, cols) = data.dim();
        let row_maxima: Vec<Vec<f32>> = (0..rows)
            .into_par_iter()
            .map(|i| {
                let row = data.row(i);
                let mut maxima = vec![f32::NEG_INFINITY; cols];
                for (j, slot) in maxima.iter_mut().enumerate().take(cols - half).skip(half) {
                    *slot = (j - half..=j + half)
                        .map(|c| row[c])
                        .fold(f32::NEG_INFINITY, f32::max);
                }
                maxima
            })
            .collect();

        let mut time_max = Array2::from_elem((rows, cols), f32::NEG_INFINITY);
        for (i, maxima) in row_maxima.into_iter().enumerate() {
            for (j, value) in maxima.into_iter().enumerate() {
                time_max[[i, j]] = value;
            }
        }
        time_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::DB_FLOOR;

    /// Reference scan straight from the definition.
    fn naive_peaks(data: &Array2<f32>, amp_min: f32, neighborhood: usize) -> Vec<Peak> {
        let (rows, cols) = data.dim();
        let half = neighborhood / 2;
        let mut peaks = Vec::new();
        if rows < neighborhood || cols < neighborhood {
            return peaks;
        }
        for i in half..rows - half {
            for j in half..cols - half {
                let value = data[[i, j]];
                if value <= amp_min {
                    continue;
                }
                let mut is_max = true;
                for di in i - half..=i + half {
                    for dj in j - half..=j + half {
                        if (di, dj) != (i, j) && data[[di, dj]] > value {
                            is_max = false;
                        }
                    }
                }
                if is_max {
                    peaks.push(Peak::new(i as u32, j as u32));
                }
            }
        }
        peaks
    }

    fn pseudo_random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
        let mut state = seed;
        Array2::from_shape_fn((rows, cols), |_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            // Coarse quantization so that ties actually occur
            -((state >> 59) as f32) * 5.0
        })
    }

    #[test]
    fn test_single_peak() {
        let mut data = Array2::from_elem((9, 9), -60.0);
        data[[4, 4]] = -5.0;
        let matrix = SpectrogramMatrix::from_array(data);
        let peaks = PeakExtractor::new(-20.0, 3).extract(&matrix);
        assert_eq!(peaks, vec![Peak::new(4, 4)]);
    }

    #[test]
    fn test_amp_min_filters_quiet_maxima() {
        let mut data = Array2::from_elem((9, 9), DB_FLOOR);
        data[[4, 4]] = -30.0;
        let matrix = SpectrogramMatrix::from_array(data);
        assert!(PeakExtractor::new(-20.0, 3).extract(&matrix).is_empty());
        assert_eq!(PeakExtractor::new(-40.0, 3).extract(&matrix).len(), 1);
    }

    #[test]
    fn test_ties_do_not_disqualify() {
        let mut data = Array2::from_elem((7, 7), -60.0);
        data[[3, 3]] = -10.0;
        data[[3, 4]] = -10.0;
        let matrix = SpectrogramMatrix::from_array(data);
        let peaks = PeakExtractor::new(-20.0, 3).extract(&matrix);
        assert_eq!(peaks, vec![Peak::new(3, 3), Peak::new(3, 4)]);
    }

    #[test]
    fn test_strictly_greater_neighbor_disqualifies() {
        let mut data = Array2::from_elem((7, 7), -60.0);
        data[[3, 3]] = -10.0;
        data[[4, 4]] = -9.0;
        let matrix = SpectrogramMatrix::from_array(data);
        let peaks = PeakExtractor::new(-20.0, 3).extract(&matrix);
        assert_eq!(peaks, vec![Peak::new(4, 4)]);
    }

    #[test]
    fn test_border_cells_are_never_peaks() {
        let mut data = Array2::from_elem((9, 9), -60.0);
        data[[0, 4]] = 0.0;
        data[[4, 8]] = 0.0;
        data[[1, 1]] = 0.0;
        let matrix = SpectrogramMatrix::from_array(data);
        // With n = 5 the first two rows and columns are excluded
        assert!(PeakExtractor::new(-20.0, 5).extract(&matrix).is_empty());
        // With n = 3 only (1, 1) is interior
        assert_eq!(PeakExtractor::new(-20.0, 3).extract(&matrix), vec![Peak::new(1, 1)]);
    }

    #[test]
    fn test_matrix_smaller_than_neighborhood() {
        let data = Array2::from_elem((4, 50), 0.0);
        let matrix = SpectrogramMatrix::from_array(data);
        assert!(PeakExtractor::new(-20.0, 5).extract(&matrix).is_empty());

        let data = Array2::from_elem((50, 2), 0.0);
        let matrix = SpectrogramMatrix::from_array(data);
        assert!(PeakExtractor::new(-20.0, 3).extract(&matrix).is_empty());
    }

    #[test]
    fn test_matches_naive_scan() {
        for (seed, neighborhood) in [(1u64, 3usize), (7, 5), (42, 7), (1234, 11)] {
            let data = pseudo_random_matrix(40, 60, seed);
            let expected = naive_peaks(&data, -50.0, neighborhood);
            let matrix = SpectrogramMatrix::from_array(data);
            let actual = PeakExtractor::new(-50.0, neighborhood).extract(&matrix);
            assert_eq!(actual, expected, "seed {} neighborhood {}", seed, neighborhood);
        }
    }
}

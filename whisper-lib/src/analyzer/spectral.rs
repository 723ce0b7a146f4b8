//! Frequency-domain primitives behind a capability boundary.
//!
//! The analyzer only depends on the `SpectralOps` contract; `FftSpectral`
//! is the bundled implementation on top of `rustfft`. The framing follows
//! the conventional short-time transform: window length `n_fft`, hop
//! `n_fft/4`, rectangular window, centered with reflect padding, one-sided
//! output of `n_fft/2 + 1` bins.

use std::ops::Range;
use std::sync::Mutex;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Row-major `(frames, bins)` real matrix; rows are time frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    data: Vec<f64>,
    frames: usize,
    bins: usize,
}

impl Spectrogram {
    pub fn from_rows(data: Vec<f64>, frames: usize, bins: usize) -> Self {
        debug_assert_eq!(data.len(), frames * bins);
        Self { data, frames, bins }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn row(&self, frame: usize) -> &[f64] {
        &self.data[frame * self.bins..(frame + 1) * self.bins]
    }

    /// Element-wise mean over the rows in `range`.
    pub fn mean_rows(&self, range: Range<usize>) -> Vec<f64> {
        let count = range.len().max(1) as f64;
        let mut mean = vec![0.0; self.bins];
        for frame in range {
            for (m, v) in mean.iter_mut().zip(self.row(frame)) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= count;
        }
        mean
    }

    pub fn mean_all(&self) -> Vec<f64> {
        self.mean_rows(0..self.frames)
    }

    /// `v ← log2(v + 1)`, with NaN/Inf coerced to 0 so every downstream
    /// distance stays finite.
    pub fn log2_plus_one(&mut self) {
        for v in &mut self.data {
            let c = (*v + 1.0).log2();
            *v = if c.is_finite() { c } else { 0.0 };
        }
    }
}

/// Euclidean distance between two equally sized vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// The transform the analyzer projects flow signals through.
pub trait SpectralOps: Send {
    /// Short-time power spectrogram of `signal`: squared magnitude per
    /// frame and bin, shape `(frames, n_fft/2 + 1)`.
    fn stft_power(&self, signal: &[f64], n_fft: usize) -> Spectrogram;
}

/// `rustfft`-backed implementation. The planner caches twiddle tables per
/// FFT size, so repeated calls with the same `n_fft` are cheap.
pub struct FftSpectral {
    planner: Mutex<FftPlanner<f64>>,
}

impl FftSpectral {
    pub fn new() -> Self {
        Self { planner: Mutex::new(FftPlanner::new()) }
    }
}

impl Default for FftSpectral {
    fn default() -> Self {
        Self::new()
    }
}

/// Reflect-pads `signal` by `pad` samples on both sides (edge excluded).
fn reflect_pad(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    debug_assert!(n > pad);
    let mut padded = Vec::with_capacity(n + 2 * pad);
    for i in (1..=pad).rev() {
        padded.push(signal[i]);
    }
    padded.extend_from_slice(signal);
    for i in 2..=pad + 1 {
        padded.push(signal[n - i]);
    }
    padded
}

impl SpectralOps for FftSpectral {
    fn stft_power(&self, signal: &[f64], n_fft: usize) -> Spectrogram {
        let bins = n_fft / 2 + 1;
        let hop = (n_fft / 4).max(1);
        let padded = reflect_pad(signal, n_fft / 2);
        let frames = if padded.len() >= n_fft { (padded.len() - n_fft) / hop + 1 } else { 0 };

        let fft = {
            let mut planner = self
                .planner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            planner.plan_fft_forward(n_fft)
        };

        let mut data = Vec::with_capacity(frames * bins);
        let mut buf = vec![Complex::new(0.0, 0.0); n_fft];
        for f in 0..frames {
            let window = &padded[f * hop..f * hop + n_fft];
            for (c, v) in buf.iter_mut().zip(window) {
                *c = Complex::new(*v, 0.0);
            }
            fft.process(&mut buf);
            data.extend(buf[..bins].iter().map(|c| c.re * c.re + c.im * c.im));
        }
        Spectrogram::from_rows(data, frames, bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrogram_shape_is_frames_by_half_fft_plus_one() {
        let ops = FftSpectral::new();
        let n_fft = 16;
        let signal: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();

        let spec = ops.stft_power(&signal, n_fft);
        assert_eq!(spec.bins(), n_fft / 2 + 1);
        // Centered framing: padded length 64 + 16, hop 4.
        assert_eq!(spec.frames(), (64 + 16 - 16) / 4 + 1);
    }

    #[test]
    fn constant_signal_gives_constant_rows() {
        let ops = FftSpectral::new();
        let signal = vec![3.0; 100];
        let mut spec = ops.stft_power(&signal, 16);
        spec.log2_plus_one();

        let first = spec.row(0).to_vec();
        for f in 1..spec.frames() {
            for (a, b) in first.iter().zip(spec.row(f)) {
                assert!((a - b).abs() < 1e-9, "frame {f} diverges");
            }
        }
        // DC bin carries all the energy of a constant signal.
        assert!(first[0] > first[1]);
    }

    #[test]
    fn log_compression_coerces_non_finite_to_zero() {
        let mut spec =
            Spectrogram::from_rows(vec![0.0, f64::NAN, f64::INFINITY, 1.0], 2, 2);
        spec.log2_plus_one();
        assert_eq!(spec.row(0), &[0.0, 0.0]);
        assert_eq!(spec.row(1)[0], 0.0);
        assert!((spec.row(1)[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mean_rows_averages_the_selected_window() {
        let spec = Spectrogram::from_rows(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        assert_eq!(spec.mean_rows(0..2), vec![2.0, 3.0]);
        assert_eq!(spec.mean_all(), vec![3.0, 4.0]);
    }

    #[test]
    fn l2_distance_is_euclidean() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(l2_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }
}

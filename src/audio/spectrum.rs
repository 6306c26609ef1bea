use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::FrameError;

/// Added to every power value before taking log10.
const POWER_EPSILON: f32 = 1e-10;
/// Taper fraction of the analysis window.
const TUKEY_ALPHA: f32 = 0.25;
/// Profiles spanning less than this many dB are treated as flat.
const FLAT_RANGE_DB: f32 = 1e-3;

/// Turns one audio frame into a normalized intensity profile with
/// `window_len / 2 + 1` values in [0, 1].
///
/// The frame is split into windows of `window_len` samples advancing by `hop`.
/// Each window is mean-detrended, tapered and transformed; bin power is
/// converted to a one-sided power spectral density in dB, averaged over all
/// windows, then min-max normalized across bins.
pub struct SpectralProcessor {
    window_len: usize,
    hop: usize,
    window: Vec<f32>,
    /// `1 / (fs * sum(w^2))`
    density_scale: f32,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralProcessor {
    /// `window_len` must be > 0 and `hop` in `1..=window_len`; `Config::validate`
    /// enforces both.
    pub fn new(sample_rate: u32, window_len: usize, hop: usize) -> Self {
        let window = tukey_window(window_len, TUKEY_ALPHA);
        let energy: f32 = window.iter().map(|w| w * w).sum();
        let density_scale = if energy > 0.0 {
            1.0 / (sample_rate as f32 * energy)
        } else {
            0.0
        };

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_len);

        Self {
            window_len,
            hop: hop.max(1),
            window,
            density_scale,
            fft,
        }
    }

    pub fn bins(&self) -> usize {
        self.window_len / 2 + 1
    }

    pub fn process(&self, frame: &[f32]) -> Result<Vec<f32>, FrameError> {
        if frame.len() != self.window_len {
            return Err(FrameError::LengthMismatch {
                expected: self.window_len,
                actual: frame.len(),
            });
        }
        let mean_db = self.mean_power_db(frame);
        Ok(normalize(&mean_db))
    }

    fn mean_power_db(&self, samples: &[f32]) -> Vec<f32> {
        let n = self.window_len;
        let bins = self.bins();
        let nyquist = if n % 2 == 0 { Some(n / 2) } else { None };

        let mut sums = vec![0.0f32; bins];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n];
        let mut segments = 0usize;

        let mut pos = 0;
        while pos + n <= samples.len() {
            let segment = &samples[pos..pos + n];
            // f64 so a constant segment detrends to exactly zero
            let mean = segment.iter().map(|&s| s as f64).sum::<f64>() / n as f64;
            for ((slot, &s), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new((s as f64 - mean) as f32 * w, 0.0);
            }
            self.fft.process(&mut buffer);

            for (k, sum) in sums.iter_mut().enumerate() {
                let mut power = buffer[k].norm_sqr() * self.density_scale;
                // fold negative frequencies into the one-sided spectrum
                if k != 0 && Some(k) != nyquist {
                    power *= 2.0;
                }
                *sum += 10.0 * (power + POWER_EPSILON).log10();
            }
            segments += 1;
            pos += self.hop;
        }

        if segments > 1 {
            let count = segments as f32;
            sums.iter_mut().for_each(|s| *s /= count);
        }
        sums
    }
}

/// Min-max normalization into [0, 1]. A flat (or empty) input, including one
/// whose range is only rounding noise, maps to all zeros.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if range.is_nan() || range < FLAT_RANGE_DB || range.is_infinite() {
        return vec![0.0; values.len()];
    }

    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                0.0
            } else {
                ((v - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Periodic Tukey (tapered cosine) window: the first `size` points of the
/// symmetric window of length `size + 1`.
pub fn tukey_window(size: usize, alpha: f32) -> Vec<f32> {
    if alpha <= 0.0 {
        return vec![1.0; size];
    }
    let alpha = alpha.min(1.0);
    let m = size + 1;
    let denom = alpha * (m - 1) as f32;
    let width = (denom / 2.0).floor() as usize;

    (0..size)
        .map(|n| {
            let x = n as f32;
            if n <= width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * x / denom)).cos())
            } else if n >= m - width - 1 {
                0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * x / denom)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

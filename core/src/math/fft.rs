use std::f64::consts::PI;

use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Segment length used for profile spectra.
pub const PSD_SEGMENT: usize = 1024;

/// One-sided power spectral density of a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSpectrum {
    pub frequency: Vec<f64>,
    pub density: Vec<f64>,
}

/// Helper that wraps the `rustfft` planner for reuse.
pub struct FftHelper {
    fft: std::sync::Arc<dyn Fft<f64>>,
    window: Vec<f64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            fft,
            window: hann(size),
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    pub fn forward(&self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size(), Complex64::zero());
        self.fft.process(&mut buffer);
        buffer
    }

    /// Averaged periodogram over non-overlapping Hann-windowed segments.
    ///
    /// Input shorter than one segment is zero padded; a trailing partial
    /// segment is dropped otherwise. `sample_rate` is samples per unit length.
    pub fn psd(&self, samples: &[f64], sample_rate: f64) -> PowerSpectrum {
        let nfft = self.size();
        if nfft == 0 || samples.is_empty() || sample_rate.is_nan() || sample_rate <= 0.0 {
            return PowerSpectrum::default();
        }

        let bins = nfft / 2 + 1;
        let mut accum = vec![0.0; bins];
        let segments: Vec<&[f64]> = if samples.len() < nfft {
            vec![samples]
        } else {
            samples.chunks_exact(nfft).collect()
        };

        for segment in &segments {
            let windowed: Vec<f64> = segment
                .iter()
                .zip(&self.window)
                .map(|(s, w)| s * w)
                .collect();
            let spectrum = self.forward(&windowed);
            for (acc, value) in accum.iter_mut().zip(&spectrum[..bins]) {
                *acc += value.norm_sqr();
            }
        }

        let window_power: f64 = self.window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sample_rate * window_power * segments.len() as f64);
        let nyquist = if nfft % 2 == 0 { Some(bins - 1) } else { None };
        let density = accum
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let one_sided = if k == 0 || Some(k) == nyquist { 1.0 } else { 2.0 };
                p * scale * one_sided
            })
            .collect();
        let frequency = (0..bins)
            .map(|k| k as f64 * sample_rate / nfft as f64)
            .collect();

        PowerSpectrum { frequency, density }
    }
}

fn hann(size: usize) -> Vec<f64> {
    match size {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..size)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / (size - 1) as f64).cos())
            .collect(),
    }
}

/// Spectrum of a profile sampled on the (uniform) axis `x`.
pub fn profile_spectrum(x: &[f64], values: &[f64]) -> PowerSpectrum {
    if x.len() < 3 {
        return PowerSpectrum::default();
    }
    let dx = (x[2] - x[1]).abs();
    if dx == 0.0 {
        return PowerSpectrum::default();
    }
    FftHelper::new(PSD_SEGMENT).psd(values, 1.0 / dx)
}

use super::template::{elapsed_column, step_scan_header};
use anyhow::Context;
use ltpcore::ingest::header::TEMPERATURE_MARKERS;
use ltpcore::ingest::Channel;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Synthetic step scan of a single mirror.
///
/// The surface slope goes into the `S-AC Y` and `H-AC X` channels so that
/// both the vertical and the horizontal composition recover it. Every other
/// channel only carries noise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanGeneratorConfig {
    pub passes: usize,
    pub samples: usize,
    /// Scan runs over `[-half_span, half_span]` millimetres.
    pub half_span: f64,
    /// Gaussian slope noise per sample, µrad.
    pub noise: f64,
    /// Radius of curvature in metres, `None` for a flat.
    pub radius: Option<f64>,
    /// Amplitude of a sinusoidal figure error, µrad.
    pub figure_error: f64,
    /// Spatial period of the figure error, millimetres.
    pub figure_period: f64,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for ScanGeneratorConfig {
    fn default() -> Self {
        Self {
            passes: 3,
            samples: 257,
            half_span: 70.0,
            noise: 0.05,
            radius: None,
            figure_error: 0.5,
            figure_period: 40.0,
            temperature: 21.0,
            seed: 0,
        }
    }
}

impl ScanGeneratorConfig {
    /// Noise-free surface slope at `x` millimetres, µrad.
    pub fn surface_slope(&self, x: f64) -> f64 {
        let curvature = self.radius.map_or(0.0, |r| x * 1e3 / r);
        let period = self.figure_period.max(f64::EPSILON);
        curvature + self.figure_error * (2.0 * std::f64::consts::PI * x / period).sin()
    }

    fn position(&self, index: usize) -> f64 {
        let samples = self.samples.max(2);
        -self.half_span + 2.0 * self.half_span * index as f64 / (samples - 1) as f64
    }
}

/// Writes `<id>.mda` and one converted `<id>_1_<k>.asc` file per pass into
/// `dir`, returning the raw file path.
pub fn write_step_scan(dir: &Path, id: &str, config: &ScanGeneratorConfig) -> anyhow::Result<PathBuf> {
    anyhow::ensure!(config.passes > 0, "generator needs at least one pass");
    anyhow::ensure!(config.samples >= 2, "generator needs at least two samples per pass");
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let noise = Normal::new(0.0, config.noise.abs())
        .context("building slope noise distribution")?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    for pass in 1..=config.passes {
        let mut text = step_scan_header(id, pass);
        for index in 0..config.samples {
            let x = config.position(index);
            let slope = config.surface_slope(x);
            let mut row = vec![(index + 1) as f64, x];
            for channel in Channel::ALL {
                let signal = match channel {
                    Channel::Sy | Channel::Hx => slope,
                    _ => 0.0,
                };
                row.push(signal + noise.sample(&mut rng));
            }
            for sensor in 0..TEMPERATURE_MARKERS.len() {
                row.push(config.temperature + 0.01 * sensor as f64 + 1e-4 * index as f64);
            }
            row.push(2.0 * index as f64);
            debug_assert_eq!(row.len(), elapsed_column());

            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            let _ = writeln!(text, "{}", line.join(" "));
        }
        let path = dir.join(format!("{}_1_{}.asc", id, pass));
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    }

    let raw = dir.join(format!("{}.mda", id));
    fs::write(&raw, b"synthetic LTP scan\n").with_context(|| format!("writing {}", raw.display()))?;
    Ok(raw)
}

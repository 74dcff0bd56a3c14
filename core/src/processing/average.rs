use std::collections::BTreeMap;

use ndarray::{Array2, Axis};

use crate::ingest::header::Channel;
use crate::ingest::loader::PassData;
use crate::math::interp::{linspace, LinearInterpolator};
use crate::prelude::{PipelineError, PipelineResult};

/// Samples on the common grid every pass is resampled to.
pub const GRID_SIZE: usize = 2000;

/// Pass-averaged channels on a uniform grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedProfile {
    pub x: Vec<f64>,
    pub channels: BTreeMap<Channel, Vec<f64>>,
}

/// Resamples every pass onto the shared x range and averages them.
pub struct MultiPassAverager {
    grid_size: usize,
}

impl MultiPassAverager {
    pub fn new() -> Self {
        Self {
            grid_size: GRID_SIZE,
        }
    }

    pub fn with_grid_size(grid_size: usize) -> Self {
        Self { grid_size }
    }

    pub fn average(&self, passes: &[PassData]) -> PipelineResult<AveragedProfile> {
        let first = passes
            .first()
            .ok_or_else(|| PipelineError::InsufficientSamples("no scan passes".into()))?;
        if let Some(index) = passes.iter().position(PassData::is_empty) {
            return Err(PipelineError::InsufficientSamples(format!(
                "scan pass {} is empty",
                index + 1
            )));
        }

        let (lo, hi) = passes.iter().fold(
            (f64::NEG_INFINITY, f64::INFINITY),
            |(lo, hi), pass| {
                let min = pass.x.iter().copied().fold(f64::INFINITY, f64::min);
                let max = pass.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (lo.max(min), hi.min(max))
            },
        );
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(PipelineError::NoOverlap { min: lo, max: hi });
        }

        let grid = linspace(lo, hi, self.grid_size);
        let mut channels = BTreeMap::new();
        for &channel in first.channels.keys() {
            let mut stacked = Array2::<f64>::zeros((passes.len(), grid.len()));
            for (mut row, pass) in stacked.axis_iter_mut(Axis(0)).zip(passes) {
                let interp = LinearInterpolator::new(&pass.x, pass.channel(channel)?)?;
                for (cell, &t) in row.iter_mut().zip(&grid) {
                    *cell = interp.eval(t);
                }
            }
            let mean = stacked.mean_axis(Axis(0)).ok_or_else(|| {
                PipelineError::Numerical(format!("cannot average channel {}", channel))
            })?;
            channels.insert(channel, mean.to_vec());
        }

        Ok(AveragedProfile { x: grid, channels })
    }
}

impl Default for MultiPassAverager {
    fn default() -> Self {
        Self::new()
    }
}

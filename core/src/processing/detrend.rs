use serde::{Deserialize, Serialize};

use crate::math::poly::PolyHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::PipelineResult;
use crate::processing::integrate::HeightIntegrator;

/// RMS and peak-to-valley of a residual, slope in µrad and height in nm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub rms_slope: f64,
    pub pv_slope: f64,
    pub rms_height: f64,
    pub pv_height: f64,
}

impl ErrorStats {
    pub fn of(slope: &[f64], height: &[f64]) -> Self {
        Self {
            rms_slope: StatsHelper::std(slope),
            pv_slope: StatsHelper::peak_to_valley(slope),
            rms_height: StatsHelper::std(height),
            pv_height: StatsHelper::peak_to_valley(height),
        }
    }
}

/// Residual after removing a best-fit polynomial of `order` from the slope error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetrendStage {
    pub order: usize,
    pub slope: Vec<f64>,
    pub height: Vec<f64>,
    pub stats: ErrorStats,
}

/// Every order is removed from the same residual, not from the previous stage.
pub fn cascade(x: &[f64], residual_slope: &[f64], orders: &[usize]) -> PipelineResult<Vec<DetrendStage>> {
    orders
        .iter()
        .map(|&order| {
            let trend = PolyHelper::smooth(x, residual_slope, order)?;
            let slope: Vec<f64> = residual_slope.iter().zip(&trend).map(|(s, t)| s - t).collect();
            let height = HeightIntegrator::integrate(x, &slope);
            let stats = ErrorStats::of(&slope, &height);
            Ok(DetrendStage {
                order,
                slope,
                height,
                stats,
            })
        })
        .collect()
}

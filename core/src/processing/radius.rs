use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::math::matrix::MatrixHelper;
use crate::math::poly::PolyHelper;
use crate::prelude::{PipelineError, PipelineResult};

/// Radius of curvature in metres, estimated two ways.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusEstimate {
    pub from_slope: f64,
    pub from_height: f64,
}

pub struct RadiusEstimator;

impl RadiusEstimator {
    /// `x` in mm, `slope` in µrad, `height` in nm.
    pub fn estimate(x: &[f64], slope: &[f64], height: &[f64]) -> PipelineResult<RadiusEstimate> {
        let x_m: Vec<f64> = x.iter().map(|v| v * 1e-3).collect();
        let slope_rad: Vec<f64> = slope.iter().map(|v| v * 1e-6).collect();
        let height_m: Vec<f64> = height.iter().map(|v| v * 1e-9).collect();
        Ok(RadiusEstimate {
            from_slope: Self::from_slope(&x_m, &slope_rad)?,
            from_height: Self::from_height(&x_m, &height_m)?,
        })
    }

    /// Reciprocal of the slope gradient, SI units.
    pub fn from_slope(x: &[f64], slope: &[f64]) -> PipelineResult<f64> {
        let line = PolyHelper::fit(x, slope, 1)?;
        Ok(1.0 / line[0])
    }

    /// `1 / 2a` of the best parabola `a x^2 + b x + c`, SI units.
    pub fn from_height(x: &[f64], height: &[f64]) -> PipelineResult<f64> {
        if x.len() != height.len() || x.len() < 3 {
            return Err(PipelineError::InsufficientSamples(format!(
                "parabola fit on {} positions and {} heights",
                x.len(),
                height.len()
            )));
        }
        let design = DMatrix::from_fn(x.len(), 3, |r, c| x[r].powi(2 - c as i32));
        let rhs = DVector::from_column_slice(height);
        let beta = MatrixHelper::least_squares(design, &rhs)?;
        Ok(1.0 / (2.0 * beta[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::integrate::HeightIntegrator;

    #[test]
    fn sphere_radius_round_trips() {
        let radius = 150.0;
        let x: Vec<f64> = (0..401).map(|i| -50.0 + 0.25 * i as f64).collect();
        let slope: Vec<f64> = x.iter().map(|v| v * 1e-3 / radius * 1e6).collect();
        let height = HeightIntegrator::integrate(&x, &slope);
        let estimate = RadiusEstimator::estimate(&x, &slope, &height).unwrap();
        assert!((estimate.from_slope - radius).abs() / radius < 1e-9);
        assert!((estimate.from_height - radius).abs() / radius < 1e-3);
    }

    #[test]
    fn short_profile_is_rejected() {
        assert!(RadiusEstimator::from_height(&[0.0, 1.0], &[0.0, 1.0]).is_err());
    }
}

use crate::math::stats::StatsHelper;
use crate::prelude::{MirrorFitter, MirrorParameters, PipelineError, PipelineResult, SlopeProfile};
use crate::processing::fit::{finish, slope_of_height, FitResult, FittedShape, Residuals};
use crate::processing::integrate::HeightIntegrator;
use crate::processing::radius::RadiusEstimator;
use crate::telemetry::log::LogManager;

/// Measures the profile against a plane: the best constant height is removed.
pub struct FlatMirrorFitter {
    params: MirrorParameters,
    logger: LogManager,
}

impl FlatMirrorFitter {
    pub fn new(params: MirrorParameters, logger: LogManager) -> Self {
        Self { params, logger }
    }
}

impl MirrorFitter for FlatMirrorFitter {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn fit(&self, profile: &SlopeProfile) -> PipelineResult<FitResult> {
        if profile.len() < 3 {
            return Err(PipelineError::InsufficientSamples(format!(
                "flat fit needs at least 3 samples, got {}",
                profile.len()
            )));
        }

        let height = HeightIntegrator::integrate(&profile.x, &profile.slope);
        let radius = RadiusEstimator::estimate(&profile.x, &profile.slope, &height)?;
        self.logger.record(&format!(
            "fitted radius curvature: {}m (slope), {}m (height)",
            radius.from_slope, radius.from_height
        ));

        // least-squares constant in metres
        let y0 = StatsHelper::mean(&height) * 1e-9;
        let residual_height: Vec<f64> = height.iter().map(|h| h - y0 * 1e9).collect();
        let residual_slope = slope_of_height(&profile.x, &residual_height)?;

        finish(
            FittedShape::Flat { y0 },
            Residuals {
                x: profile.x.clone(),
                height,
                residual_height,
                residual_slope,
                radius,
            },
            &self.params.detrend_orders,
            &self.logger,
        )
    }
}

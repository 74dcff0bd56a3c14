use serde::{Deserialize, Serialize};

use crate::math::calculus::gradient;
use crate::prelude::{
    MirrorFitter, MirrorParameters, MirrorShape, PipelineError, PipelineResult, SlopeProfile,
};
use crate::processing::detrend::{cascade, DetrendStage, ErrorStats};
use crate::processing::ellipse::EllipticalMirrorFitter;
use crate::processing::flat::FlatMirrorFitter;
use crate::processing::radius::RadiusEstimate;
use crate::telemetry::log::LogManager;

/// Best-fit target shape, in metres and radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FittedShape {
    Flat {
        y0: f64,
    },
    EllipseSlope {
        xc: f64,
        yc: f64,
        p: f64,
        q: f64,
        theta: f64,
    },
    EllipseHeight {
        xc: f64,
        yc: f64,
        tc: f64,
        p: f64,
        q: f64,
        theta: f64,
    },
}

/// Outcome of fitting one profile. Positions in mm, heights in nm, slopes in µrad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub shape: FittedShape,
    pub x: Vec<f64>,
    pub height: Vec<f64>,
    pub residual_height: Vec<f64>,
    pub residual_slope: Vec<f64>,
    pub stats: ErrorStats,
    pub radius: RadiusEstimate,
    pub detrend: Vec<DetrendStage>,
}

pub fn fitter_for(params: &MirrorParameters, logger: LogManager) -> Box<dyn MirrorFitter> {
    match params.shape {
        MirrorShape::Flat => Box::new(FlatMirrorFitter::new(params.clone(), logger)),
        MirrorShape::Ellipse => Box::new(EllipticalMirrorFitter::new(params.clone(), logger)),
    }
}

pub fn fit_profile(
    params: &MirrorParameters,
    profile: &SlopeProfile,
    logger: LogManager,
) -> PipelineResult<FitResult> {
    fitter_for(params, logger).fit(profile)
}

/// Differentiates a residual height back into slope using the sample step.
pub(crate) fn slope_of_height(x: &[f64], residual_height: &[f64]) -> PipelineResult<Vec<f64>> {
    if x.len() < 3 {
        return Err(PipelineError::InsufficientSamples(format!(
            "{} samples are too few to differentiate",
            x.len()
        )));
    }
    let step = x[2] - x[1];
    if step == 0.0 {
        return Err(PipelineError::Numerical("zero sample step".into()));
    }
    Ok(gradient(residual_height).iter().map(|g| g / step).collect())
}

pub(crate) struct Residuals {
    pub x: Vec<f64>,
    pub height: Vec<f64>,
    pub residual_height: Vec<f64>,
    pub residual_slope: Vec<f64>,
    pub radius: RadiusEstimate,
}

/// Statistics and detrend cascade shared by every fitter.
pub(crate) fn finish(
    shape: FittedShape,
    residuals: Residuals,
    orders: &[usize],
    logger: &LogManager,
) -> PipelineResult<FitResult> {
    let stats = ErrorStats::of(&residuals.residual_slope, &residuals.residual_height);
    logger.record(&format!(
        "slope error rms: {:.4}µrad, PV: {:.4}µrad",
        stats.rms_slope, stats.pv_slope
    ));
    logger.record(&format!(
        "height error rms: {:.4}nm, PV: {:.4}nm",
        stats.rms_height, stats.pv_height
    ));

    let detrend = cascade(&residuals.x, &residuals.residual_slope, orders)?;
    for stage in &detrend {
        logger.record(&format!(
            "remove {} order polyfit: {:.2}nrad RMS, {:.2}µrad PV, {:.2}nm RMS, {:.2}nm PV",
            stage.order,
            stage.stats.rms_slope * 1e3,
            stage.stats.pv_slope,
            stage.stats.rms_height,
            stage.stats.pv_height
        ));
    }

    Ok(FitResult {
        shape,
        x: residuals.x,
        height: residuals.height,
        residual_height: residuals.residual_height,
        residual_slope: residuals.residual_slope,
        stats,
        radius: residuals.radius,
        detrend,
    })
}

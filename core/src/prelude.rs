use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ingest::header::Channel;
use crate::processing::fit::FitResult;
use crate::processing::slope::Orientation;

/// Idealized target shape the residual is measured against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MirrorShape {
    Flat,
    Ellipse,
}

/// Which observable the elliptical model is fitted against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FittingBasis {
    Slope,
    Height,
}

/// Marks which ellipse parameters are held at their nominal value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixedParameters {
    pub p: bool,
    pub q: bool,
    pub theta: bool,
}

impl Default for FixedParameters {
    fn default() -> Self {
        Self {
            p: true,
            q: true,
            theta: false,
        }
    }
}

impl FixedParameters {
    pub fn all(&self) -> bool {
        self.p && self.q && self.theta
    }
}

/// Measurement and fitting configuration, loaded once per pipeline run.
///
/// Lengths along the mirror are millimetres, focal distances metres and the
/// grazing angle radians.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MirrorParameters {
    pub orientation: Orientation,
    /// Weights for `[Hy, Hx, Sy, Sx, Vy, Vx]` in the full six-channel slope.
    pub slope_signs: [f64; 6],
    pub detrend_orders: Vec<usize>,
    pub shape: MirrorShape,
    pub p: f64,
    pub q: f64,
    pub theta: f64,
    pub fixed: FixedParameters,
    pub fitting_basis: FittingBasis,
    pub reverse: bool,
    /// Samples with `|x| <= half_length` are kept.
    pub half_length: f64,
    /// Polynomial noise-filter order per channel; 0 leaves the channel untouched.
    pub filter_orders: [usize; 6],
    /// Number of passes to combine, -1 for all of them.
    pub max_passes: i64,
}

impl Default for MirrorParameters {
    fn default() -> Self {
        Self {
            orientation: Orientation::Full,
            slope_signs: [0.0, 0.0, -1.0, 0.0, 0.0, 1.0],
            detrend_orders: vec![1, 3, 5],
            shape: MirrorShape::Flat,
            p: 67.02633,
            q: 0.17367,
            theta: 0.003,
            fixed: FixedParameters::default(),
            fitting_basis: FittingBasis::Height,
            reverse: false,
            half_length: 63.5,
            filter_orders: [0, 0, 0, 8, 0, 0],
            max_passes: -1,
        }
    }
}

impl MirrorParameters {
    /// Pass cap, `None` when every converted pass should be combined.
    pub fn pass_limit(&self) -> Option<usize> {
        usize::try_from(self.max_passes).ok().filter(|&n| n > 0)
    }

    pub fn sign(&self, channel: Channel) -> f64 {
        self.slope_signs[channel.index()]
    }
}

/// Common error type for everything that happens to a single raw file.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed header: {0}")]
    Header(String),
    #[error("malformed table in {path} line {line}: {reason}")]
    Table {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("channel {0} not present in column map")]
    MissingChannel(Channel),
    #[error("no converted ascii files found for {0}")]
    MissingConversion(PathBuf),
    #[error("scan passes do not overlap: [{min}, {max}]")]
    NoOverlap { min: f64, max: f64 },
    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("fit failed: {0}")]
    Fit(String),
    #[error("persisting results failed: {0}")]
    Persist(String),
    #[error("processing panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A slope profile: positions in millimetres and slope in microradians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeProfile {
    pub x: Vec<f64>,
    pub slope: Vec<f64>,
}

impl SlopeProfile {
    pub fn new(x: Vec<f64>, slope: Vec<f64>) -> PipelineResult<Self> {
        if x.len() != slope.len() {
            return Err(PipelineError::InsufficientSamples(format!(
                "x has {} samples but slope has {}",
                x.len(),
                slope.len()
            )));
        }
        Ok(Self { x, slope })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Negates both axes to flip the mirror handedness.
    pub fn reversed(&self) -> Self {
        Self {
            x: self.x.iter().map(|v| -v).collect(),
            slope: self.slope.iter().map(|v| -v).collect(),
        }
    }
}

/// Trait implemented by every target-shape fitter.
pub trait MirrorFitter {
    fn name(&self) -> &'static str;
    fn fit(&self, profile: &SlopeProfile) -> PipelineResult<FitResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_limit_treats_non_positive_as_unlimited() {
        let mut params = MirrorParameters::default();
        assert_eq!(params.pass_limit(), None);
        params.max_passes = 0;
        assert_eq!(params.pass_limit(), None);
        params.max_passes = 3;
        assert_eq!(params.pass_limit(), Some(3));
    }

    #[test]
    fn parameters_deserialize_with_defaults() {
        let params: MirrorParameters = serde_json::from_str(
            r#"{"orientation": "vertical", "shape": "ellipse", "slope_signs": [1, 0, 0, 0, 0, -1]}"#,
        )
        .unwrap();
        assert_eq!(params.orientation, Orientation::Vertical);
        assert_eq!(params.shape, MirrorShape::Ellipse);
        assert_eq!(params.sign(Channel::Vx), -1.0);
        assert_eq!(params.detrend_orders, vec![1, 3, 5]);
        assert!(params.fixed.p && params.fixed.q && !params.fixed.theta);
    }

    #[test]
    fn reversed_profile_negates_both_axes() {
        let profile = SlopeProfile::new(vec![-1.0, 2.0], vec![0.5, -0.25]).unwrap();
        let reversed = profile.reversed();
        assert_eq!(reversed.x, vec![1.0, -2.0]);
        assert_eq!(reversed.slope, vec![-0.5, 0.25]);
    }
}

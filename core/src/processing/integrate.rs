use crate::math::calculus::{cumulative_sum, gradient};
use crate::math::stats::StatsHelper;

/// Turns a slope profile into a height profile.
///
/// With x in millimetres and slope in microradians the height comes out in
/// nanometres.
pub struct HeightIntegrator;

impl HeightIntegrator {
    pub fn integrate(x: &[f64], slope: &[f64]) -> Vec<f64> {
        let mean = StatsHelper::mean(slope);
        let dx = gradient(x);
        cumulative_sum(slope.iter().zip(&dx).map(|(s, d)| (s - mean) * d))
    }
}

use nalgebra::{DMatrix, DVector};

use crate::math::matrix::MatrixHelper;
use crate::prelude::{PipelineError, PipelineResult};

pub struct PolyHelper;

impl PolyHelper {
    /// Least-squares polynomial coefficients, highest power first.
    pub fn fit(x: &[f64], y: &[f64], order: usize) -> PipelineResult<Vec<f64>> {
        Self::check(x, y, order)?;
        let terms = order + 1;
        let mut design = DMatrix::from_fn(x.len(), terms, |r, c| x[r].powi((order - c) as i32));

        // Column scaling keeps high orders well conditioned.
        let norms: Vec<f64> = design
            .column_iter()
            .map(|col| {
                let norm = col.norm();
                if norm > 0.0 {
                    norm
                } else {
                    1.0
                }
            })
            .collect();
        for (mut col, norm) in design.column_iter_mut().zip(&norms) {
            col /= *norm;
        }

        let rhs = DVector::from_column_slice(y);
        let beta = MatrixHelper::least_squares(design, &rhs)?;
        Ok(beta.iter().zip(&norms).map(|(b, n)| b / n).collect())
    }

    pub fn eval(coefficients: &[f64], x: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&t| coefficients.iter().fold(0.0, |acc, &c| acc * t + c))
            .collect()
    }

    /// Fitted values of a polynomial of `order` through `(x, y)`.
    ///
    /// The abscissa is mapped onto `[-1, 1]` before fitting, so only the
    /// evaluated curve is meaningful, not the coefficients.
    pub fn smooth(x: &[f64], y: &[f64], order: usize) -> PipelineResult<Vec<f64>> {
        Self::check(x, y, order)?;
        let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let half_span = (hi - lo) / 2.0;
        let centre = (hi + lo) / 2.0;
        let scaled: Vec<f64> = if half_span > 0.0 {
            x.iter().map(|v| (v - centre) / half_span).collect()
        } else {
            x.iter().map(|v| v - centre).collect()
        };
        let coefficients = Self::fit(&scaled, y, order)?;
        Ok(Self::eval(&coefficients, &scaled))
    }

    fn check(x: &[f64], y: &[f64], order: usize) -> PipelineResult<()> {
        if x.len() != y.len() {
            return Err(PipelineError::InsufficientSamples(format!(
                "polynomial fit needs matching axes ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.len() <= order {
            return Err(PipelineError::InsufficientSamples(format!(
                "order {} polynomial needs more than {} samples",
                order,
                x.len()
            )));
        }
        Ok(())
    }
}

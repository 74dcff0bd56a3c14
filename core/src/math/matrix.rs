use nalgebra::{DMatrix, DVector};

use crate::prelude::{PipelineError, PipelineResult};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Minimum-norm least-squares solution of `design * beta = rhs` via SVD.
    pub fn least_squares(design: DMatrix<f64>, rhs: &DVector<f64>) -> PipelineResult<DVector<f64>> {
        if design.nrows() != rhs.len() {
            return Err(PipelineError::Numerical(format!(
                "design has {} rows but rhs has {}",
                design.nrows(),
                rhs.len()
            )));
        }
        let svd = design.svd(true, true);
        let max_singular = svd.singular_values.max();
        let eps = f64::EPSILON * max_singular * rhs.len().max(1) as f64;
        svd.solve(rhs, eps)
            .map_err(|reason| PipelineError::Numerical(reason.to_string()))
    }
}

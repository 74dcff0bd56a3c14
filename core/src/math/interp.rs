use crate::prelude::{PipelineError, PipelineResult};

/// Evenly spaced samples over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            let mut grid: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
            grid[count - 1] = end;
            grid
        }
    }
}

/// Piecewise-linear interpolant that extrapolates along the outer segments.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearInterpolator {
    /// Sorts the samples by `x` and drops repeated positions, keeping the first
    /// occurrence of each.
    pub fn new(x: &[f64], y: &[f64]) -> PipelineResult<Self> {
        if x.len() != y.len() {
            return Err(PipelineError::InsufficientSamples(format!(
                "interpolation needs matching axes ({} vs {})",
                x.len(),
                y.len()
            )));
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        order.dedup_by(|later, earlier| x[*later] == x[*earlier]);

        if order.len() < 2 {
            return Err(PipelineError::InsufficientSamples(
                "interpolation needs at least two distinct positions".into(),
            ));
        }

        Ok(Self {
            x: order.iter().map(|&i| x[i]).collect(),
            y: order.iter().map(|&i| y[i]).collect(),
        })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 1;
        let upper = self.x.partition_point(|&v| v <= t).clamp(1, last);
        let lower = upper - 1;
        let (x0, x1) = (self.x[lower], self.x[upper]);
        let (y0, y1) = (self.y[lower], self.y[upper]);
        y0 + (y1 - y0) * (t - x0) / (x1 - x0)
    }
}

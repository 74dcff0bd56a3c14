use crate::math::poly::PolyHelper;
use crate::prelude::{PipelineError, PipelineResult};

/// Noise removal applied to a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseFilter {
    /// Uniform moving average of the given window with mirrored edges.
    MovingAverage(usize),
    /// Least-squares polynomial of the given order over the sample index.
    Polynomial(usize),
}

impl NoiseFilter {
    pub fn is_identity(&self) -> bool {
        match *self {
            NoiseFilter::MovingAverage(size) => size <= 1,
            NoiseFilter::Polynomial(order) => order == 0,
        }
    }

    pub fn apply(&self, data: &[f64]) -> PipelineResult<Vec<f64>> {
        if self.is_identity() || data.is_empty() {
            return Ok(data.to_vec());
        }
        match *self {
            NoiseFilter::MovingAverage(size) => Ok(uniform_filter(data, size)),
            NoiseFilter::Polynomial(order) => {
                if data.len() <= order {
                    return Err(PipelineError::InsufficientSamples(format!(
                        "order {} noise filter on {} samples",
                        order,
                        data.len()
                    )));
                }
                let index: Vec<f64> = (0..data.len()).map(|i| i as f64).collect();
                PolyHelper::smooth(&index, data, order)
            }
        }
    }
}

/// Window `[i - size/2, i - size/2 + size)` with `d c b a | a b c d | d c b a`
/// edge handling.
fn uniform_filter(data: &[f64], size: usize) -> Vec<f64> {
    let n = data.len() as isize;
    let left = (size / 2) as isize;
    (0..n)
        .map(|i| {
            let start = i - left;
            let sum: f64 = (start..start + size as isize)
                .map(|j| data[reflect(j, n)])
                .sum();
            sum / size as f64
        })
        .collect()
}

fn reflect(index: isize, len: isize) -> usize {
    let period = 2 * len;
    let folded = index.rem_euclid(period);
    if folded < len {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}

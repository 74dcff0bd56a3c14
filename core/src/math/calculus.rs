/// Numerical derivative with unit spacing: central differences inside,
/// one-sided differences at both ends.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push(values[1] - values[0]);
    for i in 1..n - 1 {
        out.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    out.push(values[n - 1] - values[n - 2]);
    out
}

pub fn cumulative_sum(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut acc = 0.0;
    values
        .into_iter()
        .map(|v| {
            acc += v;
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_matches_one_sided_edges() {
        let grad = gradient(&[0.0, 1.0, 4.0, 9.0]);
        assert_eq!(grad, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn gradient_of_short_input_is_zero() {
        assert_eq!(gradient(&[5.0]), vec![0.0]);
        assert!(gradient(&[]).is_empty());
    }

    #[test]
    fn cumulative_sum_accumulates() {
        assert_eq!(cumulative_sum([1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
    }
}

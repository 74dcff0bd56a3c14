pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation, reported as the RMS of an error profile.
    pub fn std(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let sum_sq: f64 = samples.iter().map(|&v| (v - mean) * (v - mean)).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn peak_to_valley(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        max - min
    }

    pub fn min(samples: &[f64]) -> f64 {
        samples.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

//! Descriptive statistics for per-node and per-experiment metrics
//!
//! Means are correctly rounded: the inputs are summed exactly (Shewchuk's
//! non-overlapping partials, the same scheme as Python's `math.fsum`) and the
//! division is corrected with the exact residual. Results therefore agree
//! bit-for-bit with reference tooling that uses exact rational arithmetic.

/// Exact running sum represented as non-overlapping partials
#[derive(Debug, Clone, Default)]
struct Partials {
    parts: Vec<f64>,
}

impl Partials {
    fn add(&mut self, mut x: f64) {
        let mut i = 0;
        for j in 0..self.parts.len() {
            let mut y = self.parts[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.parts[i] = lo;
                i += 1;
            }
            x = hi;
        }
        self.parts.truncate(i);
        self.parts.push(x);
    }

    /// Round the exact sum to the nearest f64 (ties to even)
    fn value(&self) -> f64 {
        let parts = &self.parts;
        let mut n = parts.len();
        if n == 0 {
            return 0.0;
        }

        n -= 1;
        let mut hi = parts[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = parts[n];
            hi = x + y;
            let yr = hi - x;
            lo = y - yr;
            if lo != 0.0 {
                break;
            }
        }

        // Half-way case: the remaining partials decide the rounding direction
        if n > 0 && ((lo < 0.0 && parts[n - 1] < 0.0) || (lo > 0.0 && parts[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            let yr = x - hi;
            if y == yr {
                hi = x;
            }
        }
        hi
    }
}

/// Exactly rounded sum of `values`
pub fn fsum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut partials = Partials::default();
    for v in values {
        partials.add(v);
    }
    partials.value()
}

/// Arithmetic mean, or `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut partials = Partials::default();
    for &v in values {
        partials.add(v);
    }

    let n = values.len() as f64;
    let q = partials.value() / n;

    // q * n == p + e exactly; the leftover S - p - e corrects the quotient
    let p = q * n;
    let e = q.mul_add(n, -p);
    partials.add(-p);
    partials.add(-e);
    Some(q + partials.value() / n)
}

/// Sample (n - 1) standard deviation; 0 when fewer than two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let ss = fsum(values.iter().map(|x| (x - m) * (x - m)));
    (ss / (values.len() - 1) as f64).sqrt()
}

/// `numerator / denominator`, or 0 when the denominator is not positive
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsum_exact_cancellation() {
        assert_eq!(fsum([1e100, 1.0, -1e100, 1e-100]), 1.0);
        assert_eq!(fsum([0.1; 10]), 1.0);
        assert_eq!(fsum(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_mean_three_latencies() {
        let m = mean(&[0.05, 0.06, 0.07]).unwrap();
        assert!((m - 0.06).abs() < 1e-12);
        // Correctly rounded quotient of the exact sum, not the naive sum / 3
        assert_eq!(m, 0.060000000000000005);
    }

    #[test]
    fn test_mean_single_value_is_identity() {
        assert_eq!(mean(&[0.059161]), Some(0.059161));
    }

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_sample_std_dev_three_latencies() {
        let sd = sample_std_dev(&[0.05, 0.06, 0.07]);
        assert!((sd - 0.01).abs() < 1e-12, "got {}", sd);
    }

    #[test]
    fn test_sample_std_dev_single_value_is_zero() {
        assert_eq!(sample_std_dev(&[169.031104]), 0.0);
        assert_eq!(sample_std_dev(&[]), 0.0);
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        // mean 5, squared deviations sum to 20 -> 20 / 3
        let sd = sample_std_dev(&[2.0, 4.0, 6.0, 8.0]);
        assert!((sd - (20.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_or_zero() {
        assert_eq!(ratio_or_zero(0.05, 0.02), 2.5);
        assert_eq!(ratio_or_zero(0.10, 0.02), 5.0);
        assert_eq!(ratio_or_zero(1.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(0.0, 0.0), 0.0);
    }
}

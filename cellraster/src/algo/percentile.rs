//! Percentile cut points for contrast stretching.
//!
//! Percentiles use the nearest-rank rule on the sorted finite samples:
//! quantile `q` in `[0, 1]` selects index `round(q * (n - 1))`. Because the
//! rule only picks existing samples, any monotone rescaling of the data maps
//! the cut points onto the rescaled cut points, which keeps percentile
//! normalization idempotent.

/// Nearest-rank quantile of an already sorted slice.
///
/// # Panics
/// Panics if `sorted` is empty or `q` is outside `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    assert!(!sorted.is_empty(), "percentile of an empty sample");
    assert!((0.0..=1.0).contains(&q), "quantile must be within [0, 1]");
    let index = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Lower and upper cut points of the finite values in `samples`.
///
/// Returns `None` when there are no finite samples.
///
/// ```
/// use cellraster::algo::percentile_bounds;
///
/// let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
/// assert_eq!(percentile_bounds(values, 0.05, 0.95), Some((5.0, 95.0)));
/// ```
pub fn percentile_bounds(mut samples: Vec<f64>, lower: f64, upper: f64) -> Option<(f64, f64)> {
    samples.retain(|v| v.is_finite());
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    Some((percentile(&samples, lower), percentile(&samples, upper)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes_are_min_and_max() {
        let sorted = [1.0, 2.0, 3.0, 10.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 10.0);
    }

    #[test]
    fn test_outlier_excluded() {
        // 24 regular values plus one outlier, as in a clipped stretch
        let mut values: Vec<f64> = (0..24).map(|i| (100 + (i % 5) * 100) as f64).collect();
        values.push(10000.0);
        let (lo, hi) = percentile_bounds(values, 0.05, 0.95).unwrap();
        assert_eq!(lo, 100.0);
        assert_eq!(hi, 500.0);
    }

    #[test]
    fn test_non_finite_ignored() {
        let values = vec![f64::NAN, 4.0, f64::INFINITY, 2.0];
        assert_eq!(percentile_bounds(values, 0.0, 1.0), Some((2.0, 4.0)));
        assert_eq!(percentile_bounds(vec![f64::NAN], 0.0, 1.0), None);
    }

    #[test]
    fn test_single_value() {
        assert_eq!(percentile_bounds(vec![7.0], 0.1, 0.9), Some((7.0, 7.0)));
    }
}

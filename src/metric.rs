/// Compare to metric values, determining if b is better.
/// If one of them is NaN favor the non NaN value.
/// If both are NaN, consider the first value to be better.
pub fn is_comparison_better(value: f64, comparison: f64, maximize: bool) -> bool {
    match (value.is_nan(), comparison.is_nan()) {
        // Both nan, comparison is not better,
        // Or comparison is nan, also not better
        (true, true) | (false, true) => false,
        // comparison is not Nan, it's better
        (true, false) => true,
        // Perform numerical comparison.
        (false, false) => {
            if maximize {
                value < comparison
            } else {
                value > comparison
            }
        }
    }
}

/// Unweighted mean of `(yhat - y)^2`.
pub fn mean_squared_error(y: &[f64], yhat: &[f64]) -> f64 {
    let res = y.iter().zip(yhat).map(|(y_, yhat_)| (yhat_ - y_).powi(2)).sum::<f64>();
    res / y.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precision_round(n: f64, precision: i32) -> f64 {
        let p = (10.0_f64).powi(precision);
        (n * p).round() / p
    }

    #[test]
    fn test_mean_squared_error() {
        let y = vec![1., 3., 4., 5., 2., 4., 6.];
        let yhat = vec![3., 2., 3., 4., 4., 4., 4.];
        let res = mean_squared_error(&y, &yhat);
        assert_eq!(precision_round(res, 6), 2.142857);
    }

    #[test]
    fn test_is_comparison_better() {
        assert!(is_comparison_better(2.0, 1.0, false));
        assert!(!is_comparison_better(1.0, 1.0, false));
        assert!(is_comparison_better(f64::NAN, 1.0, false));
        assert!(!is_comparison_better(1.0, f64::NAN, false));
        assert!(is_comparison_better(1.0, 2.0, true));
    }
}

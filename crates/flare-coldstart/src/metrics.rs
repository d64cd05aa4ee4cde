//! Regression fit metrics

/// Coefficient of determination
///
/// 1.0 for a perfect fit, 0.0 for predicting the mean, negative for worse.
/// A constant target scores 1.0 only when predicted exactly.
#[must_use]
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = mean(actual);
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Mean absolute error
#[must_use]
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual.iter().zip(predicted).map(|(y, p)| (y - p).abs()).collect();
    mean(&errors)
}

/// Root mean squared error
#[must_use]
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let squared: Vec<f64> = actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)).collect();
    mean(&squared).sqrt()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_fit() {
        let y = [1.0, 2.0, 3.0];
        assert!((r2(&y, &y) - 1.0).abs() < 1e-12);
        assert_eq!(mae(&y, &y), 0.0);
        assert_eq!(rmse(&y, &y), 0.0);
    }

    #[test]
    fn mean_predictor_scores_zero() {
        let y = [1.0, 2.0, 3.0];
        let p = [2.0, 2.0, 2.0];
        assert!(r2(&y, &p).abs() < 1e-12);
        assert!((mae(&y, &p) - 2.0 / 3.0).abs() < 1e-12);
        assert!((rmse(&y, &p) - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_target() {
        assert_eq!(r2(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
    }
}

//! Regressors
//!
//! Three small learners behind one [`Regressor`] trait:
//! - [`RidgeRegressor`]: closed-form normal equations on standardized features
//! - [`KnnRegressor`]: mean of the k nearest neighbours in standardized space
//! - [`BoostedStumps`]: gradient boosting of depth-one trees on squared loss

use crate::error::{ModelError, ModelResult};
use crate::metrics::mean;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A trainable regressor over dense feature rows
pub trait Regressor: Send + Sync + Debug {
    /// Short identifier used in reports
    fn name(&self) -> &'static str;

    /// Fit to `x` (one row per sample) and targets `y`
    ///
    /// # Errors
    /// `InvalidInput` for empty or ragged data, `Numerical` if fitting breaks down
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<()>;

    /// Predict one row
    ///
    /// # Errors
    /// `NotTrained` before `fit`, `InvalidInput` on a width mismatch
    fn predict_one(&self, row: &[f64]) -> ModelResult<f64>;

    /// Predict many rows
    ///
    /// # Errors
    /// As [`Regressor::predict_one`]
    fn predict(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }
}

/// Which regressor to build, with its hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorKind {
    /// L2-regularized linear regression
    Ridge {
        /// Regularization strength
        lambda: f64,
    },
    /// k-nearest-neighbours
    Knn {
        /// Neighbours averaged
        k: usize,
    },
    /// Gradient-boosted stumps
    BoostedStumps {
        /// Boosting rounds
        rounds: usize,
        /// Shrinkage per round
        learning_rate: f64,
    },
}

impl RegressorKind {
    /// The candidate set compared during training
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Ridge { lambda: 1.0 },
            Self::Knn { k: 5 },
            Self::BoostedStumps {
                rounds: 100,
                learning_rate: 0.1,
            },
        ]
    }

    /// Fresh, unfitted regressor
    #[must_use]
    pub fn build(&self) -> Box<dyn Regressor> {
        match *self {
            Self::Ridge { lambda } => Box::new(RidgeRegressor::new(lambda)),
            Self::Knn { k } => Box::new(KnnRegressor::new(k)),
            Self::BoostedStumps {
                rounds,
                learning_rate,
            } => Box::new(BoostedStumps::new(rounds, learning_rate)),
        }
    }
}

fn check_shape(x: &[Vec<f64>], y: &[f64]) -> ModelResult<usize> {
    if x.is_empty() {
        return Err(ModelError::InvalidInput("no training rows".into()));
    }
    if x.len() != y.len() {
        return Err(ModelError::InvalidInput(format!(
            "{} rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if x.iter().any(|row| row.len() != width) {
        return Err(ModelError::InvalidInput("ragged feature rows".into()));
    }
    if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidInput("non-finite value in training data".into()));
    }
    Ok(width)
}

fn check_width(expected: usize, row: &[f64]) -> ModelResult<()> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(ModelError::InvalidInput(format!(
            "expected {expected} features, got {}",
            row.len()
        )))
    }
}

/// Per-column z-scoring; constant columns map to zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Learn column means and standard deviations
    #[must_use]
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let width = x.first().map_or(0, Vec::len);
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for j in 0..width {
            let column: Vec<f64> = x.iter().map(|row| row[j]).collect();
            let m = mean(&column);
            let var = mean(&column.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>());
            let sd = var.sqrt();
            means.push(m);
            scales.push(if sd > f64::EPSILON { sd } else { 1.0 });
        }
        Self { means, scales }
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.means.len()
    }

    /// Standardize one row
    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> ModelResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(ModelError::Numerical("singular normal equations".into()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Ridge regression
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    lambda: f64,
    scaler: Option<Standardizer>,
    weights: Vec<f64>,
    intercept: f64,
}

impl RidgeRegressor {
    /// Unfitted model with regularization `lambda`
    #[must_use]
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda: lambda.max(0.0),
            scaler: None,
            weights: Vec::new(),
            intercept: 0.0,
        }
    }

    /// Coefficients in standardized feature space
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Regressor for RidgeRegressor {
    fn name(&self) -> &'static str {
        "ridge"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<()> {
        let width = check_shape(x, y)?;
        let scaler = Standardizer::fit(x);
        let z: Vec<Vec<f64>> = x.iter().map(|row| scaler.transform(row)).collect();
        let y_mean = mean(y);

        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (row, target) in z.iter().zip(y) {
            let centered = target - y_mean;
            for i in 0..width {
                rhs[i] += row[i] * centered;
                for j in 0..width {
                    gram[i][j] += row[i] * row[j];
                }
            }
        }
        for (i, r) in gram.iter_mut().enumerate() {
            r[i] += self.lambda;
        }

        self.weights = solve(gram, rhs)?;
        self.intercept = y_mean;
        self.scaler = Some(scaler);
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> ModelResult<f64> {
        let scaler = self.scaler.as_ref().ok_or(ModelError::NotTrained)?;
        check_width(scaler.width(), row)?;
        let z = scaler.transform(row);
        Ok(self.intercept + z.iter().zip(&self.weights).map(|(a, b)| a * b).sum::<f64>())
    }
}

/// k-nearest-neighbours regression
#[derive(Debug, Clone)]
pub struct KnnRegressor {
    k: usize,
    scaler: Option<Standardizer>,
    points: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    /// Unfitted model averaging `k` neighbours
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            scaler: None,
            points: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Regressor for KnnRegressor {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<()> {
        check_shape(x, y)?;
        let scaler = Standardizer::fit(x);
        self.points = x.iter().map(|row| scaler.transform(row)).collect();
        self.targets = y.to_vec();
        self.scaler = Some(scaler);
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> ModelResult<f64> {
        let scaler = self.scaler.as_ref().ok_or(ModelError::NotTrained)?;
        check_width(scaler.width(), row)?;
        let z = scaler.transform(row);
        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.iter().zip(&z).map(|(a, b)| (a - b).powi(2)).sum::<f64>(), i))
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let nearest: Vec<f64> = distances
            .iter()
            .take(self.k)
            .map(|(_, i)| self.targets[*i])
            .collect();
        Ok(mean(&nearest))
    }
}

/// One split: `left` if `row[feature] <= threshold`, else `right`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn eval(&self, row: &[f64]) -> f64 {
        if row[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Best stump on one feature, as (squared error, stump)
fn best_split(x: &[Vec<f64>], residuals: &[f64], feature: usize) -> Option<(f64, Stump)> {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

    let total: f64 = residuals.iter().sum();
    let total_sq: f64 = residuals.iter().map(|r| r * r).sum();
    #[allow(clippy::cast_precision_loss)]
    let n = x.len() as f64;

    let mut best: Option<(f64, Stump)> = None;
    let mut left_sum = 0.0;
    for (pos, window) in order.windows(2).enumerate() {
        let (cur, next) = (window[0], window[1]);
        left_sum += residuals[cur];
        let (a, b) = (x[cur][feature], x[next][feature]);
        if a == b {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let left_n = (pos + 1) as f64;
        let right_n = n - left_n;
        let right_sum = total - left_sum;
        // SSE = sum(r^2) - (sum_l^2 / n_l) - (sum_r^2 / n_r)
        let sse = total_sq - left_sum * left_sum / left_n - right_sum * right_sum / right_n;
        if best.as_ref().map_or(true, |(e, _)| sse < *e) {
            best = Some((
                sse,
                Stump {
                    feature,
                    threshold: (a + b) / 2.0,
                    left: left_sum / left_n,
                    right: right_sum / right_n,
                },
            ));
        }
    }
    best
}

/// Gradient-boosted regression stumps
#[derive(Debug, Clone)]
pub struct BoostedStumps {
    rounds: usize,
    learning_rate: f64,
    width: Option<usize>,
    base: f64,
    stumps: Vec<Stump>,
}

impl BoostedStumps {
    /// Unfitted ensemble
    #[must_use]
    pub fn new(rounds: usize, learning_rate: f64) -> Self {
        Self {
            rounds,
            learning_rate,
            width: None,
            base: 0.0,
            stumps: Vec::new(),
        }
    }

    /// Stumps kept after fitting
    #[must_use]
    pub fn len(&self) -> usize {
        self.stumps.len()
    }

    /// No stumps were fitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stumps.is_empty()
    }
}

impl Regressor for BoostedStumps {
    fn name(&self) -> &'static str {
        "boosted_stumps"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<()> {
        let width = check_shape(x, y)?;
        self.base = mean(y);
        self.stumps.clear();
        let mut fitted = vec![self.base; y.len()];

        for _ in 0..self.rounds {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();
            let candidates: Vec<Option<(f64, Stump)>> = (0..width)
                .into_par_iter()
                .map(|j| best_split(x, &residuals, j))
                .collect();
            // lowest error wins; ties go to the lower feature index
            let Some((_, stump)) = candidates
                .into_iter()
                .flatten()
                .reduce(|best, c| if c.0 < best.0 { c } else { best })
            else {
                break;
            };
            let shrunk = Stump {
                left: stump.left * self.learning_rate,
                right: stump.right * self.learning_rate,
                ..stump
            };
            for (f, row) in fitted.iter_mut().zip(x) {
                *f += shrunk.eval(row);
            }
            self.stumps.push(shrunk);
        }
        self.width = Some(width);
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> ModelResult<f64> {
        let width = self.width.ok_or(ModelError::NotTrained)?;
        check_width(width, row)?;
        Ok(self.base + self.stumps.iter().map(|s| s.eval(row)).sum::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let a = f64::from(i);
                vec![a, f64::from(i % 7), f64::from(i % 2)]
            })
            .collect();
        let y = x.iter().map(|r| 3.0 * r[0] - 2.0 * r[1] + 10.0 * r[2] + 5.0).collect();
        (x, y)
    }

    #[test]
    fn solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-9);
        assert!((x[1] - 1.4).abs() < 1e-9);
    }

    #[test]
    fn singular_system_is_numerical_error() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(solve(a, vec![1.0, 2.0]), Err(ModelError::Numerical(_))));
    }

    #[test]
    fn ridge_recovers_linear_signal() {
        let (x, y) = linear_data();
        let mut model = RidgeRegressor::new(1e-6);
        model.fit(&x, &y).unwrap();
        let p = model.predict_one(&[10.0, 3.0, 1.0]).unwrap();
        assert!((p - 39.0).abs() < 1e-3, "{p}");
    }

    #[test]
    fn knn_averages_neighbours() {
        let x = vec![vec![0.0], vec![1.0], vec![10.0], vec![11.0]];
        let y = vec![1.0, 3.0, 100.0, 102.0];
        let mut model = KnnRegressor::new(2);
        model.fit(&x, &y).unwrap();
        assert!((model.predict_one(&[0.4]).unwrap() - 2.0).abs() < 1e-9);
        assert!((model.predict_one(&[10.6]).unwrap() - 101.0).abs() < 1e-9);
    }

    #[test]
    fn stumps_reduce_error() {
        let (x, y) = linear_data();
        let mut model = BoostedStumps::new(100, 0.1);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.len(), 100);
        let p = model.predict(&x).unwrap();
        let rmse = crate::metrics::rmse(&y, &p);
        let baseline = crate::metrics::rmse(&y, &vec![mean(&y); y.len()]);
        assert!(rmse < baseline / 3.0, "{rmse} vs {baseline}");
    }

    #[test]
    fn unfitted_models_refuse_to_predict() {
        for kind in RegressorKind::defaults() {
            let model = kind.build();
            assert_eq!(model.predict_one(&[1.0]), Err(ModelError::NotTrained));
        }
    }

    #[test]
    fn rejects_ragged_rows() {
        let mut model = RidgeRegressor::new(1.0);
        let err = model.fit(&[vec![1.0, 2.0], vec![1.0]], &[1.0, 2.0]).unwrap_err();
        assert!(err.is_validation());
    }
}

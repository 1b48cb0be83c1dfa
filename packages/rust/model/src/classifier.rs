//! Binary classifier interface and the L2-regularised logistic regression behind it.
//!
//! Trainer and Evaluator only see [`Classifier`], so the optimisation
//! algorithm can change without touching their contracts.

use diagflow_shared::{DiagflowError, Result};
use ndarray::{Array1, Array2, ArrayView1, Zip, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Armijo sufficient-decrease constant for the coordinate line search.
const ARMIJO_SIGMA: f64 = 0.01;

/// Maximum step halvings per coordinate update.
const MAX_LINE_SEARCH_STEPS: usize = 30;

/// Fit/predict contract shared by every classifier.
///
/// Labels are binary codes: `0` (benign) and `1` (malignant).
pub trait Classifier {
    /// Fit on a `rows x features` matrix.
    fn fit(&mut self, features: &Array2<f64>, labels: &[u8]) -> Result<FitReport>;

    /// Predict a binary code per row.
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<u8>>;
}

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Full coordinate sweeps performed.
    pub iterations: usize,
    /// Whether the gradient tolerance was reached within the cap.
    pub converged: bool,
    /// Regularised objective of the kept iterate.
    pub objective: f64,
}

/// Solver settings persisted with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Inverse regularisation strength.
    pub c: f64,
    /// Tolerance on the largest coordinate gradient, relative to the initial one.
    pub tol: f64,
    /// Cap on coordinate sweeps.
    pub max_iter: usize,
    /// Fit a (regularised) bias term.
    pub fit_intercept: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-4,
            max_iter: 1000,
            fit_intercept: true,
        }
    }
}

/// Logistic regression fitted by cyclic coordinate descent.
///
/// Minimises `0.5 * (|w|^2 + b^2) + C * sum_i log(1 + exp(-y_i (w.x_i + b)))`
/// with `y_i` in `{-1, +1}`. Each coordinate takes a Newton step on its exact
/// second derivative, backed off until the objective decreases enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: SolverConfig,
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LogisticRegression {
    /// Unfitted model with the given solver settings.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            coefficients: Array1::zeros(0),
            intercept: 0.0,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn is_fitted(&self) -> bool {
        !self.coefficients.is_empty()
    }

    /// Raw margins `X.w + b`.
    pub fn decision_function(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        if features.ncols() != self.coefficients.len() {
            return Err(DiagflowError::schema(format!(
                "model expects {} features, got {}",
                self.coefficients.len(),
                features.ncols()
            )));
        }
        Ok(features.dot(&self.coefficients) + self.intercept)
    }

    /// Probability of the positive (malignant) class per row.
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(features)?.mapv_into(sigmoid))
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: &Array2<f64>, labels: &[u8]) -> Result<FitReport> {
        validate_training_input(features, labels)?;

        let (n, p) = features.dim();
        let c = self.config.c;
        let y: Array1<f64> = labels.iter().map(|&l| if l == 0 { -1.0 } else { 1.0 }).collect();
        // The bias is an extra all-ones coordinate.
        let ones = Array1::<f64>::ones(n);
        let dims = if self.config.fit_intercept { p + 1 } else { p };
        let column = |j: usize| if j < p { features.column(j) } else { ones.view() };

        let mut w = Array1::<f64>::zeros(dims);
        let mut z = Array1::<f64>::zeros(n);

        let grad_scale = (0..dims)
            .map(|j| (0.5 * c * column(j).dot(&y)).abs())
            .fold(1.0_f64, f64::max);
        let threshold = self.config.tol * grad_scale;

        let mut best_w = w.clone();
        let mut best_objective = objective(&w, &z, &y, c);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iter {
            iterations += 1;
            let mut max_grad = 0.0_f64;

            for j in 0..dims {
                let col = column(j);
                // s_i = sigmoid(-y_i z_i): weight of the misfit on row i.
                let s = Zip::from(&y).and(&z).map_collect(|&yi, &zi| sigmoid(-yi * zi));
                let grad = w[j] - c * col.dot(&(&y * &s));
                let curvature = s.mapv(|si| si * (1.0 - si));
                let hess = 1.0 + c * col.mapv(|x| x * x).dot(&curvature);
                max_grad = max_grad.max(grad.abs());
                if grad == 0.0 {
                    continue;
                }

                let d = -grad / hess;
                let base_loss = loss_along(&z, &y, col, 0.0);
                let mut step = 1.0;
                let mut accepted = false;
                for _ in 0..MAX_LINE_SEARCH_STEPS {
                    let delta = step * d;
                    let reg_change = 0.5 * ((w[j] + delta).powi(2) - w[j].powi(2));
                    let change = reg_change + c * (loss_along(&z, &y, col, delta) - base_loss);
                    if change <= ARMIJO_SIGMA * delta * grad {
                        accepted = true;
                        break;
                    }
                    step *= 0.5;
                }
                if !accepted {
                    continue;
                }

                let delta = step * d;
                w[j] += delta;
                z.scaled_add(delta, &col);
            }

            let current = objective(&w, &z, &y, c);
            if current < best_objective {
                best_objective = current;
                best_w.assign(&w);
            }

            if max_grad <= threshold {
                converged = true;
                break;
            }
        }

        debug!(iterations, converged, objective = best_objective, "coordinate descent finished");

        self.intercept = if self.config.fit_intercept { best_w[p] } else { 0.0 };
        self.coefficients = best_w.slice(s![..p]).to_owned();

        Ok(FitReport {
            iterations,
            converged,
            objective: best_objective,
        })
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<u8>> {
        if !self.is_fitted() {
            return Err(DiagflowError::schema("model has not been fitted"));
        }
        Ok(self
            .decision_function(features)?
            .iter()
            .map(|&m| u8::from(m > 0.0))
            .collect())
    }
}

fn validate_training_input(features: &Array2<f64>, labels: &[u8]) -> Result<()> {
    let (n, p) = features.dim();
    if n == 0 {
        return Err(DiagflowError::data_quality("cannot fit on zero rows"));
    }
    if n != labels.len() {
        return Err(DiagflowError::schema(format!(
            "{n} feature rows but {} labels",
            labels.len()
        )));
    }
    if p == 0 {
        return Err(DiagflowError::schema("feature matrix has no columns"));
    }
    if features.iter().any(|x| !x.is_finite()) {
        return Err(DiagflowError::data_quality("feature matrix contains non-finite values"));
    }
    let positives = labels.iter().filter(|&&l| l != 0).count();
    if positives == 0 || positives == labels.len() {
        return Err(DiagflowError::data_quality(
            "training labels must contain both classes",
        ));
    }
    Ok(())
}

fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(t))` without overflow.
fn log1p_exp(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

/// Data loss after moving one coordinate by `delta` along `col`.
fn loss_along(z: &Array1<f64>, y: &Array1<f64>, col: ArrayView1<'_, f64>, delta: f64) -> f64 {
    Zip::from(z)
        .and(y)
        .and(col)
        .fold(0.0, |acc, &zi, &yi, &xi| acc + log1p_exp(-yi * (zi + delta * xi)))
}

fn objective(w: &Array1<f64>, z: &Array1<f64>, y: &Array1<f64>, c: f64) -> f64 {
    let loss = Zip::from(z)
        .and(y)
        .fold(0.0, |acc, &zi, &yi| acc + log1p_exp(-yi * zi));
    0.5 * w.dot(w) + c * loss
}

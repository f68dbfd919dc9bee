//! Two-class logistic regression over embedding vectors.
//!
//! The model is refitted for every prediction on at most a few hundred
//! vectors, so a dependency-free batch gradient descent is plenty.
//!
//! # Objective
//!
//! ```text
//!            1   n                                λ
//! f(w, b) = ─── Σ  log(1 + e^zᵢ) − yᵢ·zᵢ   +   ─── ‖w‖²,   zᵢ = w·xᵢ + b
//!            n  i=1                                2
//! ```
//!
//! with `λ = 1 / (C·n)`, which is the same optimum as the usual
//! `½‖w‖² + C·Σ loss` formulation. The intercept is not penalised.
//!
//! The step size is `1 / L` where `L = ¼·mean(‖xᵢ‖² + 1) + λ` bounds the
//! curvature of `f`, so every step decreases the objective without any
//! learning-rate tuning.

use crate::config::ClassifierConfig;
use crate::error::{MastodoffError, Result};

/// A fitted model. Class `true` is the positive class.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
    iterations: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fit on `samples` with one label per sample.
    ///
    /// Fails when there are no samples, when either class is missing, or when
    /// the vectors do not all have the same non-zero length.
    pub fn fit(samples: &[Vec<f32>], labels: &[bool], config: &ClassifierConfig) -> Result<Self> {
        if samples.len() != labels.len() {
            return Err(unusable(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        let positives = labels.iter().filter(|&&l| l).count();
        if positives == 0 || positives == labels.len() {
            return Err(unusable(
                "each account needs at least one stored status".to_string(),
            ));
        }
        let dims = samples[0].len();
        if dims == 0 {
            return Err(unusable("embeddings are empty".to_string()));
        }
        if let Some(bad) = samples.iter().find(|s| s.len() != dims) {
            return Err(unusable(format!(
                "embeddings have different lengths ({} and {}); were they made by the same model?",
                dims,
                bad.len()
            )));
        }
        if samples.iter().flatten().any(|v| !v.is_finite()) {
            return Err(unusable("embeddings contain non-finite values".to_string()));
        }

        let n = samples.len() as f64;
        let lambda = 1.0 / (config.c * n);
        let mean_sq_norm = samples
            .iter()
            .map(|s| s.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() + 1.0)
            .sum::<f64>()
            / n;
        let step = 1.0 / (0.25 * mean_sq_norm + lambda);

        let targets: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let mut weights = vec![0.0f64; dims];
        let mut bias = 0.0f64;
        let mut grad_w = vec![0.0f64; dims];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < config.max_iter {
            iterations += 1;

            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for (sample, &y) in samples.iter().zip(&targets) {
                let residual = sigmoid(dot(&weights, sample) + bias) - y;
                for (g, &x) in grad_w.iter_mut().zip(sample) {
                    *g += residual * x as f64;
                }
                grad_b += residual;
            }
            grad_b /= n;
            for (g, &w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + lambda * w;
            }

            let largest = grad_w
                .iter()
                .fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if largest < config.tol {
                converged = true;
                break;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= step * g;
            }
            bias -= step * grad_b;
        }

        if !converged {
            tracing::debug!(iterations, "Logistic regression stopped before converging");
        }

        Ok(Self {
            weights,
            bias,
            iterations,
            converged,
        })
    }

    /// Probability that `x` belongs to the positive class.
    pub fn predict_proba(&self, x: &[f32]) -> Result<f64> {
        if x.len() != self.weights.len() {
            return Err(unusable(format!(
                "query embedding has {} dimensions, model expects {}",
                x.len(),
                self.weights.len()
            )));
        }
        Ok(sigmoid(dot(&self.weights, x) + self.bias))
    }

    /// `true` when the positive class is at least as likely as the negative one.
    pub fn predict(&self, x: &[f32]) -> Result<bool> {
        Ok(self.predict_proba(x)? >= 0.5)
    }

    pub fn dims(&self) -> usize {
        self.weights.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

fn dot(weights: &[f64], x: &[f32]) -> f64 {
    weights.iter().zip(x).map(|(w, &v)| w * v as f64).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn unusable(message: String) -> MastodoffError {
    MastodoffError::Classifier(message)
}

//! # Ridge regression with leave-one-out strength selection
//!
//! For each candidate strength the exact leave-one-out residuals come from a
//! single eigendecomposition of the centered Gram (`n ≤ p`) or covariance
//! (`n > p`) matrix: `e_i / (1 − h_ii)`, with `h_ii` the diagonal of the hat
//! matrix including the unpenalized intercept. The strength with the lowest
//! leave-one-out RMSE wins.

use crate::config::DEFAULT_RIDGE_ALPHAS;
use crate::estimator::{EstimationError, Estimator, FittedEstimator};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{Eigh, UPLO};

#[derive(Debug, Clone)]
pub struct RidgeCv {
    alphas: Vec<f64>,
}

impl Default for RidgeCv {
    fn default() -> Self {
        Self {
            alphas: DEFAULT_RIDGE_ALPHAS.to_vec(),
        }
    }
}

impl RidgeCv {
    pub fn new(alphas: Vec<f64>) -> Self {
        Self { alphas }
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }
}

#[derive(Debug, Clone)]
pub struct RidgeFit {
    coefficients: Array1<f64>,
    intercept: f64,
    alpha: f64,
    best_rmse: f64,
    loo_rmse: Vec<f64>,
}

impl RidgeFit {
    /// Leave-one-out RMSE for every candidate strength, in grid order.
    pub fn loo_rmse(&self) -> &[f64] {
        &self.loo_rmse
    }
}

impl FittedEstimator for RidgeFit {
    fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    fn intercept(&self) -> f64 {
        self.intercept
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn cv_rmse(&self) -> f64 {
        self.best_rmse
    }
}

/// Eigenbasis of the centered problem, shared across strengths.
enum Decomposition {
    /// `XᵀX = V diag(s) Vᵀ`; `xv = X V`, `vty = Vᵀ Xᵀ y`.
    Covariance {
        eigenvalues: Array1<f64>,
        eigenvectors: Array2<f64>,
        xv: Array2<f64>,
        vty: Array1<f64>,
    },
    /// `XXᵀ = U diag(s) Uᵀ`; `uty = Uᵀ y`.
    Gram {
        eigenvalues: Array1<f64>,
        eigenvectors: Array2<f64>,
        uty: Array1<f64>,
    },
}

struct Solution {
    coefficients: Array1<f64>,
    loo_rmse: f64,
}

impl Decomposition {
    fn new(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, EstimationError> {
        let (n_samples, n_features) = x.dim();
        if n_samples > n_features {
            let covariance = x.t().dot(&x);
            let (eigenvalues, eigenvectors) = covariance
                .eigh(UPLO::Lower)
                .map_err(EstimationError::EigendecompositionFailed)?;
            let xv = x.dot(&eigenvectors);
            let vty = xv.t().dot(&y);
            Ok(Decomposition::Covariance {
                eigenvalues: eigenvalues.mapv(|s| s.max(0.0)),
                eigenvectors,
                xv,
                vty,
            })
        } else {
            let gram = x.dot(&x.t());
            let (eigenvalues, eigenvectors) = gram
                .eigh(UPLO::Lower)
                .map_err(EstimationError::EigendecompositionFailed)?;
            let uty = eigenvectors.t().dot(&y);
            Ok(Decomposition::Gram {
                eigenvalues: eigenvalues.mapv(|s| s.max(0.0)),
                eigenvectors,
                uty,
            })
        }
    }

    fn solve(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Solution {
        let n_samples = y.len();
        let intercept_leverage = 1.0 / n_samples as f64;
        let (coefficients, residuals, leverage) = match self {
            Decomposition::Covariance {
                eigenvalues,
                eigenvectors,
                xv,
                vty,
            } => {
                let shrink = eigenvalues.mapv(|s| 1.0 / (s + alpha));
                let coefficients = eigenvectors.dot(&(vty * &shrink));
                let residuals = &y - &x.dot(&coefficients);
                let leverage = xv.mapv(|v| v * v).dot(&shrink);
                (coefficients, residuals, leverage)
            }
            Decomposition::Gram {
                eigenvalues,
                eigenvectors,
                uty,
            } => {
                let shrink = eigenvalues.mapv(|s| 1.0 / (s + alpha));
                // dual = (XXᵀ + αI)⁻¹ y
                let dual = eigenvectors.dot(&(uty * &shrink));
                let coefficients = x.t().dot(&dual);
                let residuals = dual.mapv(|d| alpha * d);
                let smoother = eigenvalues.mapv(|s| s / (s + alpha));
                let leverage = eigenvectors.mapv(|u| u * u).dot(&smoother);
                (coefficients, residuals, leverage)
            }
        };

        let sse: f64 = residuals
            .iter()
            .zip(leverage.iter())
            .map(|(&e, &h)| {
                let loo = e / (1.0 - h - intercept_leverage);
                loo * loo
            })
            .sum();
        Solution {
            coefficients,
            loo_rmse: (sse / n_samples as f64).sqrt(),
        }
    }
}

impl Estimator for RidgeCv {
    type Fitted = RidgeFit;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<RidgeFit, EstimationError> {
        let (n_samples, n_features) = x.dim();
        if y.len() != n_samples {
            return Err(EstimationError::DimensionMismatch {
                rows: n_samples,
                targets: y.len(),
            });
        }
        if n_features == 0 {
            return Err(EstimationError::EmptyDesign);
        }
        if n_samples < 2 {
            return Err(EstimationError::InsufficientSamples {
                found: n_samples,
                required: 2,
            });
        }
        if self.alphas.is_empty() {
            return Err(EstimationError::EmptyGrid("ridge alpha"));
        }
        if let Some(bad) = self.alphas.iter().find(|&&a| !(a > 0.0 && a.is_finite())) {
            return Err(EstimationError::InvalidHyperparameter(format!(
                "ridge alpha {bad} is not a positive strength"
            )));
        }

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = &x - &x_mean;
        let y_centered = y.mapv(|v| v - y_mean);

        let decomposition = Decomposition::new(x_centered.view(), y_centered.view())?;

        let mut solutions: Vec<Solution> = self
            .alphas
            .iter()
            .map(|&alpha| {
                let solution = decomposition.solve(x_centered.view(), y_centered.view(), alpha);
                log::debug!("Ridge alpha {alpha}: leave-one-out RMSE {:.6}", solution.loo_rmse);
                solution
            })
            .collect();
        let loo_rmse: Vec<f64> = solutions.iter().map(|s| s.loo_rmse).collect();
        let best_idx = best_strength(&loo_rmse).ok_or(EstimationError::NonFiniteScores)?;
        let solution = solutions.swap_remove(best_idx);

        let intercept = y_mean - x_mean.dot(&solution.coefficients);
        let alpha = self.alphas[best_idx];
        log::info!(
            "Ridge chose alpha = {alpha} with leave-one-out RMSE {:.4} over {} features.",
            solution.loo_rmse,
            n_features
        );

        Ok(RidgeFit {
            coefficients: solution.coefficients,
            intercept,
            alpha,
            best_rmse: solution.loo_rmse,
            loo_rmse,
        })
    }
}

/// Index of the lowest finite score; the first of tied scores wins.
fn best_strength(scores: &[f64]) -> Option<usize> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(k, _)| k)
}

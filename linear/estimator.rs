//! The estimator capability shared by the selection and regression stages.
//!
//! The pipeline only sequences stages. Anything that can be fitted on a
//! standardized design matrix and report coefficients, a chosen
//! regularization strength and a cross-validated error can stand in for the
//! default elastic-net selector or ridge regressor.

use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors raised while fitting a cross-validated linear estimator.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("Eigendecomposition of the Gram matrix failed: {0}")]
    EigendecompositionFailed(ndarray_linalg::error::LinalgError),

    #[error("Design matrix has {rows} rows but the target vector has {targets} entries.")]
    DimensionMismatch { rows: usize, targets: usize },

    #[error("Cross-validation needs at least {required} samples, but only {found} were provided.")]
    InsufficientSamples { found: usize, required: usize },

    #[error("The design matrix has no columns to fit.")]
    EmptyDesign,

    #[error("The {0} grid is empty.")]
    EmptyGrid(&'static str),

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("Every candidate strength produced a non-finite cross-validation score.")]
    NonFiniteScores,
}

/// A linear model that can be fitted to a standardized design matrix.
pub trait Estimator {
    type Fitted: FittedEstimator + Clone;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>)
    -> Result<Self::Fitted, EstimationError>;
}

/// The parameters of a fitted linear model.
pub trait FittedEstimator {
    /// Coefficients aligned with the columns the model was fitted on.
    fn coefficients(&self) -> ArrayView1<'_, f64>;

    fn intercept(&self) -> f64;

    /// The regularization strength chosen by cross-validation.
    fn alpha(&self) -> f64;

    /// The cross-validated root mean squared error at the chosen strength.
    fn cv_rmse(&self) -> f64;

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients()) + self.intercept()
    }

    /// Per-feature importance used for selection: the coefficient magnitude.
    fn importances(&self) -> Array1<f64> {
        self.coefficients().mapv(f64::abs)
    }
}

/// Root mean squared error between observed and predicted values.
///
/// Returns 0.0 for empty inputs.
pub fn rmse(observed: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = observed.len();
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(o, p)| (o - p) * (o - p))
        .sum();
    (sse / n as f64).sqrt()
}

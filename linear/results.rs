use crate::catalog::CatalogPatch;
use ndarray::{Array1, ArrayView1};
use std::fmt;

/// Outcome of a ridge fit on the selected subgraphs.
///
/// `coefs` live on the standardized scale and follow the ordering of
/// [`feature_indices`](Self::feature_indices). The scaler statistics of the
/// same fit are kept alongside so raw-unit contributions can always be
/// derived from exactly the coefficients they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeResults {
    best_rmse: f64,
    alpha: f64,
    coefs: Array1<f64>,
    test_rmse: f64,
    feature_indices: Vec<usize>,
    feature_scale: Array1<f64>,
}

impl RidgeResults {
    pub(crate) fn new(
        best_rmse: f64,
        alpha: f64,
        coefs: Array1<f64>,
        test_rmse: f64,
        feature_indices: Vec<usize>,
        feature_scale: Array1<f64>,
    ) -> Self {
        debug_assert_eq!(coefs.len(), feature_indices.len());
        debug_assert_eq!(coefs.len(), feature_scale.len());
        Self {
            best_rmse,
            alpha,
            coefs,
            test_rmse,
            feature_indices,
            feature_scale,
        }
    }

    /// Leave-one-out RMSE at the chosen strength.
    pub fn best_rmse(&self) -> f64 {
        self.best_rmse
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn coefs(&self) -> ArrayView1<'_, f64> {
        self.coefs.view()
    }

    pub fn test_rmse(&self) -> f64 {
        self.test_rmse
    }

    /// Original fingerprint columns of the coefficients, in order.
    pub fn feature_indices(&self) -> &[usize] {
        &self.feature_indices
    }

    /// Coefficients in raw fingerprint-count units: the change in predicted
    /// log CMC per additional occurrence of each subgraph.
    pub fn unnormalized_contributions(&self) -> Array1<f64> {
        &self.coefs / &self.feature_scale
    }

    /// Maps raw-unit contributions back onto the standardized scale.
    pub fn standardize_contributions(&self, contributions: ArrayView1<f64>) -> Array1<f64> {
        &contributions * &self.feature_scale
    }

    /// Weight annotations over all `n_features` catalog entries.
    pub fn annotations(&self, n_features: usize) -> CatalogPatch {
        let mut weights = vec![None; n_features];
        let mut contributions = vec![None; n_features];
        let raw = self.unnormalized_contributions();
        for ((&index, &weight), &contribution) in self
            .feature_indices
            .iter()
            .zip(self.coefs.iter())
            .zip(raw.iter())
        {
            weights[index] = Some(weight);
            contributions[index] = Some(contribution);
        }
        CatalogPatch::Weights {
            weights,
            contributions,
        }
    }
}

impl fmt::Display for RidgeResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Best train RMSE: {}\nBest alpha: {}\nTest RMSE: {}",
            self.best_rmse, self.alpha, self.test_rmse
        )
    }
}

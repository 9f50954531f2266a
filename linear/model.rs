//! # Linear fingerprint model of log CMC
//!
//! [`LinearCmcModel`] sequences the pipeline over one training/test split:
//!
//! 1. [`remove_low_freq_subgraphs`](LinearCmcModel::remove_low_freq_subgraphs)
//!    (optional) drops subgraphs that rarely occur in the training molecules.
//! 2. [`elastic_feature_select`](LinearCmcModel::elastic_feature_select)
//!    standardizes the surviving columns and keeps the subgraphs whose
//!    elastic-net coefficient magnitude reaches the mean magnitude.
//! 3. [`ridge_model_train_test`](LinearCmcModel::ridge_model_train_test) fits
//!    ridge regression on the selection and scores the held-out split.
//! 4. [`predict`](LinearCmcModel::predict) serves inference from the fitted
//!    composition.
//!
//! Running a stage again recomputes it from the latest upstream output and
//! discards everything downstream. A stage that fails leaves the previous
//! state as it was. Each stage returns the catalog annotations it produced
//! in a [`StageOutput`].

use crate::catalog::CatalogPatch;
use crate::config::PipelineConfig;
use crate::elastic_net::ElasticNetCv;
use crate::estimator::{EstimationError, Estimator, FittedEstimator, rmse};
use crate::frequency::{FrequencyFilter, Threshold};
use crate::results::RidgeResults;
use crate::ridge::RidgeCv;
use crate::scaler::StandardScaler;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(
        "Invalid occurrence threshold {0}: fractions must lie in [0, 1] and counts must be non-negative."
    )]
    InvalidThreshold(String),

    #[error(
        "Cannot run {operation} while the model is {stage}: run elastic_feature_select first."
    )]
    Sequencing {
        operation: &'static str,
        stage: PipelineStage,
    },

    #[error("Fingerprints have {found} feature columns, but the model was trained on {expected}.")]
    InputShape { found: usize, expected: usize },

    #[error("The model has not been fitted. Call ridge_model_train_test before predicting.")]
    NotFitted,

    #[error("No features are left to fit after {stage}.")]
    EmptySelection { stage: &'static str },

    #[error("Fingerprint matrix has {rows} rows but {targets} targets were provided.")]
    TargetLength { rows: usize, targets: usize },

    #[error("Estimator failed: {0}")]
    Estimation(#[from] EstimationError),
}

/// Where a model is in its fit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Unfitted,
    Filtered,
    Selected,
    Fitted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Unfitted => "unfitted",
            PipelineStage::Filtered => "filtered",
            PipelineStage::Selected => "selected",
            PipelineStage::Fitted => "fitted",
        };
        f.write_str(name)
    }
}

/// A stage's return value together with the catalog annotations it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub value: T,
    pub annotations: CatalogPatch,
}

/// Fingerprints and log CMC targets for one split.
#[derive(Debug, Clone)]
pub struct Split {
    pub fingerprints: Array2<f64>,
    pub targets: Array1<f64>,
}

impl Split {
    pub fn new(fingerprints: Array2<f64>, targets: Array1<f64>) -> Result<Self, ModelError> {
        if fingerprints.nrows() != targets.len() {
            return Err(ModelError::TargetLength {
                rows: fingerprints.nrows(),
                targets: targets.len(),
            });
        }
        Ok(Self {
            fingerprints,
            targets,
        })
    }
}

/// Output of the selection stage. Indices refer to original columns.
#[derive(Debug, Clone)]
struct Selection<F> {
    filter: Option<FrequencyFilter>,
    candidates: Vec<usize>,
    /// Fitted on the candidate columns of the training split.
    scaler: StandardScaler,
    selector: F,
    /// Positions within `candidates` that were selected.
    support: Vec<usize>,
}

impl<F> Selection<F> {
    fn selected_columns(&self) -> Vec<usize> {
        self.support.iter().map(|&k| self.candidates[k]).collect()
    }

    /// Candidate columns → standardization → selected columns.
    fn design(&self, fingerprints: ArrayView2<f64>) -> Array2<f64> {
        let candidates = fingerprints.select(Axis(1), &self.candidates);
        self.scaler
            .transform(candidates.view())
            .select(Axis(1), &self.support)
    }
}

#[derive(Debug, Clone)]
struct Fitted<F, G> {
    selection: Selection<F>,
    estimator: G,
    results: RidgeResults,
    test_predictions: Array1<f64>,
}

#[derive(Debug, Clone)]
enum ModelState<F, G> {
    Unfitted,
    Filtered(FrequencyFilter),
    Selected(Selection<F>),
    Fitted(Box<Fitted<F, G>>),
}

/// Feature selection and ridge regression over subgraph fingerprints.
///
/// Generic over the selector `S` and final regressor `R`; the defaults are a
/// cross-validated elastic net and leave-one-out ridge regression.
pub struct LinearCmcModel<S: Estimator = ElasticNetCv, R: Estimator = RidgeCv> {
    train: Split,
    test: Split,
    selector: S,
    regressor: R,
    state: ModelState<S::Fitted, R::Fitted>,
}

impl LinearCmcModel {
    /// A model with the default estimators.
    pub fn new(train: Split, test: Split) -> Result<Self, ModelError> {
        Self::with_estimators(train, test, ElasticNetCv::default(), RidgeCv::default())
    }

    /// A model whose estimators follow `config`.
    pub fn from_config(train: Split, test: Split, config: &PipelineConfig) -> Result<Self, ModelError> {
        Self::with_estimators(
            train,
            test,
            ElasticNetCv::new(config.selector.clone()),
            RidgeCv::new(config.ridge.alphas.clone()),
        )
    }
}

impl<S: Estimator, R: Estimator> LinearCmcModel<S, R> {
    pub fn with_estimators(train: Split, test: Split, selector: S, regressor: R) -> Result<Self, ModelError> {
        for split in [&train, &test] {
            if split.fingerprints.nrows() != split.targets.len() {
                return Err(ModelError::TargetLength {
                    rows: split.fingerprints.nrows(),
                    targets: split.targets.len(),
                });
            }
        }
        if test.fingerprints.ncols() != train.fingerprints.ncols() {
            return Err(ModelError::InputShape {
                found: test.fingerprints.ncols(),
                expected: train.fingerprints.ncols(),
            });
        }
        Ok(Self {
            train,
            test,
            selector,
            regressor,
            state: ModelState::Unfitted,
        })
    }

    pub fn n_features(&self) -> usize {
        self.train.fingerprints.ncols()
    }

    pub fn stage(&self) -> PipelineStage {
        match self.state {
            ModelState::Unfitted => PipelineStage::Unfitted,
            ModelState::Filtered(_) => PipelineStage::Filtered,
            ModelState::Selected(_) => PipelineStage::Selected,
            ModelState::Fitted(_) => PipelineStage::Fitted,
        }
    }

    /// Marks subgraphs that occur in no more than `threshold` training
    /// molecules as below threshold.
    ///
    /// Returns the number of such subgraphs. Discards any selection or fit.
    pub fn remove_low_freq_subgraphs(&mut self, threshold: Threshold) -> Result<StageOutput<usize>, ModelError> {
        let filter = FrequencyFilter::fit(self.train.fingerprints.view(), threshold)?;
        let removed = filter.removed();
        log::info!(
            "Removed {} of {} subgraphs occurring in at most {} training molecules (threshold: {}).",
            removed,
            self.n_features(),
            filter.cutoff(),
            threshold
        );
        let annotations = filter.annotations();
        self.state = ModelState::Filtered(filter);
        Ok(StageOutput {
            value: removed,
            annotations,
        })
    }

    fn current_filter(&self) -> Option<&FrequencyFilter> {
        match &self.state {
            ModelState::Unfitted => None,
            ModelState::Filtered(filter) => Some(filter),
            ModelState::Selected(selection) => selection.filter.as_ref(),
            ModelState::Fitted(fitted) => fitted.selection.filter.as_ref(),
        }
    }

    /// Selects subgraphs by elastic-net coefficient magnitude.
    ///
    /// Only subgraphs kept by the frequency filter (all of them if it never
    /// ran) are candidates. A candidate is selected when its absolute
    /// coefficient is at least the mean over all candidates. Returns how
    /// many candidates were excluded. Discards any fit.
    pub fn elastic_feature_select(&mut self) -> Result<StageOutput<usize>, ModelError> {
        let filter = self.current_filter().cloned();
        let candidates: Vec<usize> = match &filter {
            Some(filter) => filter.retained_indices(),
            None => (0..self.n_features()).collect(),
        };
        if candidates.is_empty() {
            return Err(ModelError::EmptySelection {
                stage: "frequency filtering",
            });
        }

        let candidate_fps = self.train.fingerprints.select(Axis(1), &candidates);
        let scaler = StandardScaler::fit(candidate_fps.view());
        let standardized = scaler.transform(candidate_fps.view());
        let selector = self.selector.fit(standardized.view(), self.train.targets.view())?;

        let importances = selector.importances();
        let threshold = importances.mean().unwrap_or(0.0);
        let support: Vec<usize> = importances
            .iter()
            .enumerate()
            .filter(|(_, importance)| **importance >= threshold)
            .map(|(k, _)| k)
            .collect();
        let excluded = candidates.len() - support.len();
        log::info!(
            "Elastic-net selection kept {} of {} candidate subgraphs (importance threshold {:.4e}).",
            support.len(),
            candidates.len(),
            threshold
        );

        let selection = Selection {
            filter,
            candidates,
            scaler,
            selector,
            support,
        };
        let mut selected = vec![false; self.n_features()];
        for column in selection.selected_columns() {
            selected[column] = true;
        }
        self.state = ModelState::Selected(selection);
        Ok(StageOutput {
            value: excluded,
            annotations: CatalogPatch::Selection { selected },
        })
    }

    /// Fits the regressor on the selected subgraphs and scores the test split.
    ///
    /// Requires a selection. Refitting reuses the current selection.
    pub fn ridge_model_train_test(&mut self) -> Result<StageOutput<RidgeResults>, ModelError> {
        let selection = match &self.state {
            ModelState::Selected(selection) => selection.clone(),
            ModelState::Fitted(fitted) => fitted.selection.clone(),
            ModelState::Unfitted | ModelState::Filtered(_) => {
                return Err(ModelError::Sequencing {
                    operation: "ridge_model_train_test",
                    stage: self.stage(),
                });
            }
        };
        if selection.support.is_empty() {
            return Err(ModelError::EmptySelection {
                stage: "elastic-net selection",
            });
        }

        let train_design = selection.design(self.train.fingerprints.view());
        let estimator = self.regressor.fit(train_design.view(), self.train.targets.view())?;

        let test_design = selection.design(self.test.fingerprints.view());
        let test_predictions = estimator.predict(test_design.view());
        let test_rmse = rmse(self.test.targets.view(), test_predictions.view());

        let results = RidgeResults::new(
            estimator.cv_rmse(),
            estimator.alpha(),
            estimator.coefficients().to_owned(),
            test_rmse,
            selection.selected_columns(),
            selection.scaler.select(&selection.support).scale().to_owned(),
        );
        log::info!(
            "Ridge fit on {} subgraphs: CV RMSE {:.4}, test RMSE {:.4}.",
            selection.support.len(),
            results.best_rmse(),
            results.test_rmse()
        );

        let annotations = results.annotations(self.n_features());
        self.state = ModelState::Fitted(Box::new(Fitted {
            selection,
            estimator,
            results: results.clone(),
            test_predictions,
        }));
        Ok(StageOutput {
            value: results,
            annotations,
        })
    }

    fn fitted(&self) -> Result<&Fitted<S::Fitted, R::Fitted>, ModelError> {
        match &self.state {
            ModelState::Fitted(fitted) => Ok(fitted.as_ref()),
            _ => Err(ModelError::NotFitted),
        }
    }

    /// Predicts log CMC for fingerprints with the training column layout.
    pub fn predict(&self, fingerprints: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        let fitted = self.fitted()?;
        if fingerprints.ncols() != self.n_features() {
            return Err(ModelError::InputShape {
                found: fingerprints.ncols(),
                expected: self.n_features(),
            });
        }
        let design = fitted.selection.design(fingerprints);
        Ok(fitted.estimator.predict(design.view()))
    }

    pub fn results(&self) -> Option<&RidgeResults> {
        self.fitted().ok().map(|fitted| &fitted.results)
    }

    /// Predictions for the test split from the latest fit.
    pub fn test_predictions(&self) -> Option<ArrayView1<'_, f64>> {
        self.fitted().ok().map(|fitted| fitted.test_predictions.view())
    }

    /// Original column indices of the selected subgraphs.
    pub fn selected_features(&self) -> Option<Vec<usize>> {
        match &self.state {
            ModelState::Selected(selection) => Some(selection.selected_columns()),
            ModelState::Fitted(fitted) => Some(fitted.selection.selected_columns()),
            _ => None,
        }
    }

    /// The fitted selector, once selection has run.
    pub fn selector_fit(&self) -> Option<&S::Fitted> {
        match &self.state {
            ModelState::Selected(selection) => Some(&selection.selector),
            ModelState::Fitted(fitted) => Some(&fitted.selection.selector),
            _ => None,
        }
    }

    pub fn train(&self) -> &Split {
        &self.train
    }

    pub fn test(&self) -> &Split {
        &self.test
    }
}

//! Subgraph catalog annotations.
//!
//! The catalog maps each fingerprint column to its subgraph identifier and
//! carries the annotations the pipeline produces for reporting. Pipeline
//! stages never touch a catalog directly: each returns a [`CatalogPatch`],
//! which the owner applies in place with [`FeatureCatalog::apply`] or to a
//! fresh snapshot with [`FeatureCatalog::patched`].

use serde::Serialize;
use thiserror::Error;

/// Annotations for a single fingerprint column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub feature_id: String,
    /// Number of training molecules in which the subgraph occurs.
    pub occurrence_count: Option<usize>,
    pub above_threshold: bool,
    /// Never true when `above_threshold` is false.
    pub selected: bool,
    /// Ridge coefficient on the standardized scale.
    pub weight: Option<f64>,
    /// Ridge coefficient in raw fingerprint-count units.
    pub unnormalized_contribution: Option<f64>,
}

impl CatalogEntry {
    fn new(feature_id: String) -> Self {
        Self {
            feature_id,
            occurrence_count: None,
            above_threshold: true,
            selected: true,
            weight: None,
            unnormalized_contribution: None,
        }
    }

    fn clear_weights(&mut self) {
        self.weight = None;
        self.unnormalized_contribution = None;
    }
}

/// Annotations produced by one pipeline stage, one value per catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogPatch {
    /// Output of frequency filtering. Resets `selected` to `above_threshold`.
    Occurrence {
        counts: Vec<usize>,
        above_threshold: Vec<bool>,
    },
    /// Output of regularized selection.
    Selection { selected: Vec<bool> },
    /// Output of the ridge fit. `None` for every unselected feature.
    Weights {
        weights: Vec<Option<f64>>,
        contributions: Vec<Option<f64>>,
    },
}

impl CatalogPatch {
    /// Number of catalog entries the patch covers.
    pub fn len(&self) -> usize {
        match self {
            CatalogPatch::Occurrence { counts, .. } => counts.len(),
            CatalogPatch::Selection { selected } => selected.len(),
            CatalogPatch::Weights { weights, .. } => weights.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_shape(&self) -> Result<(), CatalogError> {
        let (first, second) = match self {
            CatalogPatch::Occurrence {
                counts,
                above_threshold,
            } => (counts.len(), above_threshold.len()),
            CatalogPatch::Selection { selected } => (selected.len(), selected.len()),
            CatalogPatch::Weights {
                weights,
                contributions,
            } => (weights.len(), contributions.len()),
        };
        if first != second {
            return Err(CatalogError::MalformedPatch {
                first,
                second,
            });
        }
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CatalogError {
    #[error("The catalog has {catalog} entries but the annotations cover {patch} features.")]
    LengthMismatch { catalog: usize, patch: usize },

    #[error("Annotation columns have different lengths ({first} vs {second}).")]
    MalformedPatch { first: usize, second: usize },

    #[error(
        "Feature {index} ('{feature_id}') would be selected although it is below the occurrence threshold."
    )]
    SelectionInvariant { index: usize, feature_id: String },

    #[error("Feature {index} ('{feature_id}') would receive a weight although it is not selected.")]
    UnselectedWeight { index: usize, feature_id: String },
}

/// The ordered catalog of fingerprint features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCatalog {
    entries: Vec<CatalogEntry>,
}

impl FeatureCatalog {
    /// Creates a catalog with every feature selected and above threshold.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: ids
                .into_iter()
                .map(|id| CatalogEntry::new(id.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.selected)
            .map(|(i, _)| i)
            .collect()
    }

    /// Applies a stage's annotations in place.
    ///
    /// The patch is validated against the whole catalog before anything is
    /// written, so a rejected patch leaves the catalog unchanged.
    pub fn apply(&mut self, patch: &CatalogPatch) -> Result<(), CatalogError> {
        patch.check_shape()?;
        if patch.len() != self.len() {
            return Err(CatalogError::LengthMismatch {
                catalog: self.len(),
                patch: patch.len(),
            });
        }

        match patch {
            CatalogPatch::Occurrence {
                counts,
                above_threshold,
            } => {
                for ((entry, &count), &above) in
                    self.entries.iter_mut().zip(counts).zip(above_threshold)
                {
                    entry.occurrence_count = Some(count);
                    entry.above_threshold = above;
                    entry.selected = above;
                    entry.clear_weights();
                }
            }
            CatalogPatch::Selection { selected } => {
                if let Some((index, entry)) = self
                    .entries
                    .iter()
                    .enumerate()
                    .find(|(i, entry)| selected[*i] && !entry.above_threshold)
                {
                    return Err(CatalogError::SelectionInvariant {
                        index,
                        feature_id: entry.feature_id.clone(),
                    });
                }
                for (entry, &keep) in self.entries.iter_mut().zip(selected) {
                    entry.selected = keep;
                    entry.clear_weights();
                }
            }
            CatalogPatch::Weights {
                weights,
                contributions,
            } => {
                if let Some((index, entry)) = self.entries.iter().enumerate().find(|(i, entry)| {
                    (weights[*i].is_some() || contributions[*i].is_some()) && !entry.selected
                }) {
                    return Err(CatalogError::UnselectedWeight {
                        index,
                        feature_id: entry.feature_id.clone(),
                    });
                }
                for ((entry, &weight), &contribution) in
                    self.entries.iter_mut().zip(weights).zip(contributions)
                {
                    entry.weight = weight;
                    entry.unnormalized_contribution = contribution;
                }
            }
        }
        Ok(())
    }

    /// Returns a new catalog with the annotations applied, leaving `self` as is.
    pub fn patched(&self, patch: &CatalogPatch) -> Result<Self, CatalogError> {
        let mut snapshot = self.clone();
        snapshot.apply(patch)?;
        Ok(snapshot)
    }
}

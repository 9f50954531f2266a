use crate::catalog::CatalogPatch;
use crate::model::ModelError;
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minimum number of training molecules a subgraph must exceed to be kept.
///
/// In TOML and on the command line an integer is read as a count and a
/// decimal as a fraction of the training rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Count(usize),
    Fraction(f64),
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Count(1)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Count(count) => write!(f, "{count} molecules"),
            Threshold::Fraction(fraction) => write!(f, "{fraction} of molecules"),
        }
    }
}

impl Threshold {
    /// Builds a count threshold from a signed value, rejecting negatives.
    pub fn count(value: i64) -> Result<Self, ModelError> {
        usize::try_from(value)
            .map(Threshold::Count)
            .map_err(|_| ModelError::InvalidThreshold(value.to_string()))
    }

    /// Checks the fraction bounds.
    pub fn validate(&self) -> Result<(), ModelError> {
        match *self {
            Threshold::Fraction(fraction) if !(0.0..=1.0).contains(&fraction) => {
                Err(ModelError::InvalidThreshold(fraction.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Converts the threshold to an absolute count for `n_samples` training rows.
    pub fn resolve(&self, n_samples: usize) -> Result<usize, ModelError> {
        self.validate()?;
        Ok(match *self {
            Threshold::Count(count) => count,
            Threshold::Fraction(fraction) => (fraction * n_samples as f64).floor() as usize,
        })
    }
}

#[derive(Error, Debug)]
#[error("invalid threshold '{0}': expected a non-negative integer count or a fraction in [0, 1]")]
pub struct ParseThresholdError(String);

impl FromStr for Threshold {
    type Err = ParseThresholdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let invalid = || ParseThresholdError(trimmed.to_string());
        let looks_fractional = trimmed.contains(['.', 'e', 'E']);
        let threshold = if looks_fractional {
            Threshold::Fraction(trimmed.parse::<f64>().map_err(|_| invalid())?)
        } else {
            Threshold::Count(trimmed.parse::<usize>().map_err(|_| invalid())?)
        };
        threshold.validate().map_err(|_| invalid())?;
        Ok(threshold)
    }
}

/// Number of rows in which each column is nonzero.
pub fn occurrence_counts(fingerprints: ArrayView2<f64>) -> Vec<usize> {
    fingerprints
        .axis_iter(Axis(1))
        .map(|column| column.iter().filter(|&&v| v != 0.0).count())
        .collect()
}

/// Outcome of frequency filtering over the full training column space.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyFilter {
    counts: Vec<usize>,
    retained: Vec<bool>,
    cutoff: usize,
}

impl FrequencyFilter {
    /// Keeps the columns whose occurrence count exceeds the resolved threshold.
    pub fn fit(fingerprints: ArrayView2<f64>, threshold: Threshold) -> Result<Self, ModelError> {
        let cutoff = threshold.resolve(fingerprints.nrows())?;
        let counts = occurrence_counts(fingerprints);
        let retained = counts.iter().map(|&count| count > cutoff).collect();
        Ok(Self {
            counts,
            retained,
            cutoff,
        })
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn retained(&self) -> &[bool] {
        &self.retained
    }

    /// The absolute count a feature had to exceed.
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    pub fn retained_indices(&self) -> Vec<usize> {
        self.retained
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of features below the threshold.
    pub fn removed(&self) -> usize {
        self.retained.iter().filter(|keep| !**keep).count()
    }

    pub fn annotations(&self) -> CatalogPatch {
        CatalogPatch::Occurrence {
            counts: self.counts.clone(),
            above_threshold: self.retained.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    #[test]
    fn zero_threshold_removes_only_absent_features() {
        let x = array![[0.0, 1.0, 0.0, 2.0], [0.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 3.0]];
        let filter = FrequencyFilter::fit(x.view(), Threshold::Count(0)).unwrap();
        assert_eq!(filter.counts(), &[0, 1, 0, 3]);
        assert_eq!(filter.retained_indices(), vec![1, 3]);
        assert_eq!(filter.removed(), 2);

        let fractional = FrequencyFilter::fit(x.view(), Threshold::Fraction(0.0)).unwrap();
        assert_eq!(fractional.retained(), filter.retained());
    }

    #[test]
    fn fraction_matches_floored_count() {
        let x = Array2::from_shape_fn((20, 12), |(i, j)| if i < j + 2 { 1.0 } else { 0.0 });
        for step in 0..=20 {
            let fraction = step as f64 / 20.0;
            let as_fraction = FrequencyFilter::fit(x.view(), Threshold::Fraction(fraction)).unwrap();
            let count = (fraction * 20.0).floor() as usize;
            let as_count = FrequencyFilter::fit(x.view(), Threshold::Count(count)).unwrap();
            assert_eq!(as_fraction.retained(), as_count.retained(), "fraction {fraction}");
            assert_eq!(as_fraction.cutoff(), count);
        }
    }

    #[test]
    fn threshold_at_sample_count_keeps_nothing() {
        let x = Array2::<f64>::ones((5, 3));
        let filter = FrequencyFilter::fit(x.view(), Threshold::Count(5)).unwrap();
        assert_eq!(filter.removed(), 3);
        assert!(filter.retained_indices().is_empty());
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let x = Array2::<f64>::ones((4, 2));
        for bad in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                FrequencyFilter::fit(x.view(), Threshold::Fraction(bad)),
                Err(ModelError::InvalidThreshold(_))
            ));
        }
        assert!(matches!(
            Threshold::count(-3),
            Err(ModelError::InvalidThreshold(_))
        ));
        assert_eq!(Threshold::count(2).unwrap(), Threshold::Count(2));
    }

    #[test]
    fn thresholds_parse_from_text() {
        assert_eq!("3".parse::<Threshold>().unwrap(), Threshold::Count(3));
        assert_eq!("0.05".parse::<Threshold>().unwrap(), Threshold::Fraction(0.05));
        assert_eq!("1.0".parse::<Threshold>().unwrap(), Threshold::Fraction(1.0));
        assert!("-1".parse::<Threshold>().is_err());
        assert!("2.5".parse::<Threshold>().is_err());
        assert!("many".parse::<Threshold>().is_err());
    }

    #[test]
    fn annotations_cover_every_feature() {
        let x = array![[1.0, 0.0], [1.0, 0.0]];
        let filter = FrequencyFilter::fit(x.view(), Threshold::Count(1)).unwrap();
        assert_eq!(
            filter.annotations(),
            CatalogPatch::Occurrence {
                counts: vec![2, 0],
                above_threshold: vec![true, false],
            }
        );
    }
}

//! Tab-separated reports: the annotated subgraph catalog and the
//! observed-versus-predicted table behind the parity plot.

use crate::catalog::FeatureCatalog;
use ndarray::ArrayView1;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write report row: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Report columns have different lengths: {ids} ids, {observed} observed, {predicted} predicted.")]
    LengthMismatch {
        ids: usize,
        observed: usize,
        predicted: usize,
    },
}

/// Which split a prediction row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Train,
    Test,
}

/// One row of the predictions report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub id: String,
    pub exp: f64,
    pub pred: f64,
    pub traintest: Subset,
}

/// Pairs identifiers with observed and predicted values for one split.
pub fn prediction_rows(
    ids: &[String],
    observed: ArrayView1<f64>,
    predicted: ArrayView1<f64>,
    subset: Subset,
) -> Result<Vec<PredictionRow>, ReportError> {
    if ids.len() != observed.len() || observed.len() != predicted.len() {
        return Err(ReportError::LengthMismatch {
            ids: ids.len(),
            observed: observed.len(),
            predicted: predicted.len(),
        });
    }
    Ok(ids
        .iter()
        .zip(observed.iter().zip(predicted.iter()))
        .map(|(id, (&exp, &pred))| PredictionRow {
            id: id.clone(),
            exp,
            pred,
            traintest: subset,
        })
        .collect())
}

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer)
}

/// Writes one row per catalog entry. Absent annotations are empty cells.
pub fn write_catalog<W: Write>(catalog: &FeatureCatalog, writer: W) -> Result<(), ReportError> {
    let mut tsv = tsv_writer(writer);
    for entry in catalog.entries() {
        tsv.serialize(entry)?;
    }
    tsv.flush()?;
    Ok(())
}

pub fn write_predictions<W: Write>(rows: &[PredictionRow], writer: W) -> Result<(), ReportError> {
    let mut tsv = tsv_writer(writer);
    for row in rows {
        tsv.serialize(row)?;
    }
    tsv.flush()?;
    Ok(())
}

pub fn save_catalog(catalog: &FeatureCatalog, path: &Path) -> Result<(), ReportError> {
    write_catalog(catalog, File::create(path)?)?;
    log::info!("Wrote subgraph catalog to '{}'", path.display());
    Ok(())
}

pub fn save_predictions(rows: &[PredictionRow], path: &Path) -> Result<(), ReportError> {
    write_predictions(rows, File::create(path)?)?;
    log::info!("Wrote {} predictions to '{}'", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogPatch;
    use ndarray::array;

    #[test]
    fn catalog_report_has_one_row_per_feature() {
        let mut catalog = FeatureCatalog::from_ids(["C-C", "C=O", "C-N"]);
        catalog
            .apply(&CatalogPatch::Occurrence {
                counts: vec![5, 0, 2],
                above_threshold: vec![true, false, true],
            })
            .unwrap();
        catalog
            .apply(&CatalogPatch::Weights {
                weights: vec![Some(0.5), None, None],
                contributions: vec![Some(0.25), None, None],
            })
            .unwrap();

        let mut buffer = Vec::new();
        write_catalog(&catalog, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "feature_id\toccurrence_count\tabove_threshold\tselected\tweight\tunnormalized_contribution",
                "C-C\t5\ttrue\ttrue\t0.5\t0.25",
                "C=O\t0\tfalse\tfalse\t\t",
                "C-N\t2\ttrue\ttrue\t\t",
            ]
        );
    }

    #[test]
    fn prediction_report_labels_each_split() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut rows = prediction_rows(&ids, array![1.0, 2.0].view(), array![1.5, 2.5].view(), Subset::Train)
            .unwrap();
        rows.extend(
            prediction_rows(&ids[..1], array![3.0].view(), array![2.75].view(), Subset::Test).unwrap(),
        );

        let mut buffer = Vec::new();
        write_predictions(&rows, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "id\texp\tpred\ttraintest\na\t1.0\t1.5\ttrain\nb\t2.0\t2.5\ttrain\na\t3.0\t2.75\ttest\n"
        );
    }

    #[test]
    fn mismatched_prediction_columns_are_rejected() {
        let ids = vec!["a".to_string()];
        let result = prediction_rows(&ids, array![1.0, 2.0].view(), array![1.0, 2.0].view(), Subset::Test);
        assert!(matches!(
            result,
            Err(ReportError::LengthMismatch { ids: 1, .. })
        ));
    }

    #[test]
    fn saved_reports_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.tsv");
        save_catalog(&FeatureCatalog::from_ids(["x"]), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("feature_id\t"));
        assert!(text.contains("x\t\ttrue\ttrue\t\t"));
    }
}

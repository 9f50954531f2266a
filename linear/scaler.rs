use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Scales below this are treated as constant columns and left unscaled.
const SCALE_FLOOR: f64 = 10.0 * f64::EPSILON;

/// Per-column standardization to zero mean and unit variance.
///
/// Statistics come from the training matrix only and are reapplied unchanged
/// to any later matrix with the same columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fits column means and population standard deviations.
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let n_features = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: Array1::zeros(n_features),
                scale: Array1::ones(n_features),
            };
        }
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < SCALE_FLOOR { 1.0 } else { s });
        Self { mean, scale }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        assert_eq!(
            x.ncols(),
            self.n_features(),
            "Column count mismatch in StandardScaler::transform"
        );
        (&x - &self.mean) / &self.scale
    }

    /// Restricts the scaler to a subset of its columns, in the given order.
    pub fn select(&self, columns: &[usize]) -> Self {
        Self {
            mean: self.mean.select(Axis(0), columns),
            scale: self.scale.select(Axis(0), columns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn transformed_training_columns_are_standardized() {
        let x = array![[1.0, 10.0, 3.0], [2.0, 20.0, 3.0], [3.0, 60.0, 3.0]];
        let scaler = StandardScaler::fit(x.view());
        let z = scaler.transform(x.view());

        let means = z.mean_axis(Axis(0)).unwrap();
        for &m in means.iter() {
            assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(z.column(0).std(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.column(1).std(0.0), 1.0, epsilon = 1e-12);
        // Constant column: centered, scale left at one.
        assert_eq!(scaler.scale()[2], 1.0);
        assert!(z.column(2).iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn test_statistics_are_not_refit() {
        let train = array![[0.0], [2.0]];
        let scaler = StandardScaler::fit(train.view());
        let test = array![[4.0]];
        // mean 1, population std 1
        assert_abs_diff_eq!(scaler.transform(test.view())[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn select_keeps_requested_columns_in_order() {
        let x = array![[1.0, 5.0, 9.0], [3.0, 7.0, 13.0]];
        let scaler = StandardScaler::fit(x.view());
        let subset = scaler.select(&[2, 0]);
        assert_eq!(subset.mean().to_vec(), vec![11.0, 2.0]);
        assert_eq!(subset.scale().to_vec(), vec![2.0, 1.0]);
    }
}

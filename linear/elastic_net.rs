//! # Cross-validated elastic net
//!
//! Fits `1/(2n)‖y − Xw − b‖² + αρ‖w‖₁ + α(1−ρ)/2 ‖w‖²` by cyclic coordinate
//! descent. For every mixing ratio `ρ` a descending, log-spaced path of
//! strengths `α` is scored by K-fold cross-validation, warm-starting each
//! strength from the previous solution. The best `(ρ, α)` pair is then refit
//! on all rows.
//!
//! Folds are contiguous and unshuffled, so the fit is a deterministic
//! function of its inputs.

use crate::config::SelectorConfig;
use crate::estimator::{EstimationError, Estimator, FittedEstimator};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::ops::Range;

/// Elastic net with cross-validated strength and mixing ratio.
#[derive(Debug, Clone, Default)]
pub struct ElasticNetCv {
    settings: SelectorConfig,
}

/// The refit elastic net at the cross-validated optimum.
#[derive(Debug, Clone)]
pub struct ElasticNetFit {
    coefficients: Array1<f64>,
    intercept: f64,
    alpha: f64,
    l1_ratio: f64,
    cv_mse: f64,
}

impl ElasticNetFit {
    /// The mixing ratio chosen by cross-validation.
    pub fn l1_ratio(&self) -> f64 {
        self.l1_ratio
    }

    /// Mean squared error across folds at the chosen `(ρ, α)`.
    pub fn cv_mse(&self) -> f64 {
        self.cv_mse
    }
}

impl FittedEstimator for ElasticNetFit {
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
        self.cv_mse.sqrt()
    }
}

impl ElasticNetCv {
    pub fn new(settings: SelectorConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SelectorConfig {
        &self.settings
    }

    fn check_settings(&self) -> Result<(), EstimationError> {
        let s = &self.settings;
        if s.l1_ratios.is_empty() {
            return Err(EstimationError::EmptyGrid("l1_ratio"));
        }
        if let Some(bad) = s.l1_ratios.iter().find(|&&r| !(r > 0.0 && r <= 1.0)) {
            return Err(EstimationError::InvalidHyperparameter(format!(
                "l1_ratio {bad} is outside (0, 1]"
            )));
        }
        if s.n_alphas == 0 {
            return Err(EstimationError::EmptyGrid("alpha"));
        }
        if s.cv_folds < 2 {
            return Err(EstimationError::InvalidHyperparameter(format!(
                "cv_folds must be at least 2, got {}",
                s.cv_folds
            )));
        }
        Ok(())
    }
}

impl Estimator for ElasticNetCv {
    type Fitted = ElasticNetFit;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<ElasticNetFit, EstimationError> {
        self.check_settings()?;
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
        let settings = &self.settings;
        if n_samples < settings.cv_folds {
            return Err(EstimationError::InsufficientSamples {
                found: n_samples,
                required: settings.cv_folds,
            });
        }

        let folds = kfold_ranges(n_samples, settings.cv_folds);
        let paths: Vec<(f64, Array1<f64>)> = settings
            .l1_ratios
            .iter()
            .map(|&l1_ratio| {
                let alphas = alpha_grid(x, y, l1_ratio, settings.n_alphas, settings.eps);
                (l1_ratio, alphas)
            })
            .collect();

        // Mean held-out MSE for every (ratio, strength) pair.
        let mut mse_paths: Vec<Array1<f64>> = Vec::with_capacity(paths.len());
        for (l1_ratio, alphas) in &paths {
            let mut mse = Array1::<f64>::zeros(alphas.len());
            for test in &folds {
                let train_rows: Vec<usize> = (0..n_samples).filter(|i| !test.contains(i)).collect();
                let test_rows: Vec<usize> = test.clone().collect();
                let x_train = x.select(Axis(0), &train_rows);
                let y_train = y.select(Axis(0), &train_rows);
                let x_test = x.select(Axis(0), &test_rows);
                let y_test = y.select(Axis(0), &test_rows);

                let path = fit_path(
                    x_train.view(),
                    y_train.view(),
                    alphas.view(),
                    *l1_ratio,
                    settings,
                );
                for (k, fit) in path.iter().enumerate() {
                    let predictions = x_test.dot(&fit.coefficients) + fit.intercept;
                    let residual = &y_test - &predictions;
                    mse[k] += residual.dot(&residual) / test_rows.len() as f64;
                }
            }
            mse /= folds.len() as f64;
            log::debug!(
                "l1_ratio {:.2}: best CV MSE {:.6}",
                l1_ratio,
                mse.iter().copied().fold(f64::INFINITY, f64::min)
            );
            mse_paths.push(mse);
        }

        // First minimum wins on ties, scanning ratios then strengths in order.
        let (best_ratio_idx, best_alpha_idx) = (0..paths.len())
            .cartesian_product(0..settings.n_alphas)
            .min_by(|&(ra, aa), &(rb, ab)| mse_paths[ra][aa].total_cmp(&mse_paths[rb][ab]))
            .ok_or(EstimationError::EmptyGrid("alpha"))?;
        let (l1_ratio, alphas) = &paths[best_ratio_idx];
        let alpha = alphas[best_alpha_idx];
        let cv_mse = mse_paths[best_ratio_idx][best_alpha_idx];

        let mut coefficients = Array1::zeros(n_features);
        let intercept = fit_single(x, y, alpha, *l1_ratio, settings, &mut coefficients);
        log::info!(
            "Elastic net chose l1_ratio = {:.2}, alpha = {:.4e} (CV RMSE {:.4}); {} of {} coefficients are nonzero.",
            l1_ratio,
            alpha,
            cv_mse.sqrt(),
            coefficients.iter().filter(|&&c| c != 0.0).count(),
            n_features
        );

        Ok(ElasticNetFit {
            coefficients,
            intercept,
            alpha,
            l1_ratio: *l1_ratio,
            cv_mse,
        })
    }
}

/// Contiguous folds; the first `n % k` folds hold one extra row.
fn kfold_ranges(n_samples: usize, n_folds: usize) -> Vec<Range<usize>> {
    let base = n_samples / n_folds;
    let extra = n_samples % n_folds;
    let mut start = 0;
    (0..n_folds)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Descending log-spaced strengths from the smallest `α` that zeroes every
/// coefficient down to `eps` times that value.
fn alpha_grid(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    l1_ratio: f64,
    n_alphas: usize,
    eps: f64,
) -> Array1<f64> {
    let n_samples = x.nrows() as f64;
    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let y_centered = y.mapv(|v| v - y_mean);
    let xty = (&x - &x_mean).t().dot(&y_centered);
    let alpha_max = xty.iter().fold(0.0_f64, |m, v| m.max(v.abs())) / (n_samples * l1_ratio);

    if alpha_max <= f64::EPSILON {
        return Array1::from_elem(n_alphas, f64::EPSILON);
    }
    if n_alphas == 1 {
        return Array1::from_elem(1, alpha_max);
    }
    let log_max = alpha_max.log10();
    let log_min = (alpha_max * eps).log10();
    Array1::linspace(log_max, log_min, n_alphas).mapv(|e| 10f64.powf(e))
}

struct PathPoint {
    coefficients: Array1<f64>,
    intercept: f64,
}

/// Fits every strength on the path, warm-starting from the previous one.
fn fit_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alphas: ArrayView1<f64>,
    l1_ratio: f64,
    settings: &SelectorConfig,
) -> Vec<PathPoint> {
    let mut coefficients = Array1::zeros(x.ncols());
    alphas
        .iter()
        .map(|&alpha| {
            let intercept = fit_single(x, y, alpha, l1_ratio, settings, &mut coefficients);
            PathPoint {
                coefficients: coefficients.clone(),
                intercept,
            }
        })
        .collect()
}

/// Centers the data, runs coordinate descent from the current
/// `coefficients`, and returns the intercept.
fn fit_single(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
    l1_ratio: f64,
    settings: &SelectorConfig,
    coefficients: &mut Array1<f64>,
) -> f64 {
    let n_samples = x.nrows() as f64;
    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = &x - &x_mean;
    let y_centered = y.mapv(|v| v - y_mean);

    let l1_penalty = alpha * l1_ratio * n_samples;
    let l2_penalty = alpha * (1.0 - l1_ratio) * n_samples;
    let converged = coordinate_descent(
        x_centered.view(),
        y_centered.view(),
        coefficients,
        l1_penalty,
        l2_penalty,
        settings.tolerance,
        settings.max_iterations,
    );
    if !converged {
        log::warn!(
            "Coordinate descent did not converge within {} iterations (alpha = {:.4e}, l1_ratio = {:.2}).",
            settings.max_iterations,
            alpha,
            l1_ratio
        );
    }
    y_mean - x_mean.dot(&*coefficients)
}

/// Cyclic coordinate descent on centered data for
/// `½‖y − Xw‖² + l1‖w‖₁ + ½·l2‖w‖²`.
///
/// Stops once the duality gap falls below `tolerance · ‖y‖²`. Returns whether
/// that happened within `max_iterations` sweeps.
fn coordinate_descent(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    w: &mut Array1<f64>,
    l1_penalty: f64,
    l2_penalty: f64,
    tolerance: f64,
    max_iterations: usize,
) -> bool {
    let column_norms: Vec<f64> = x.axis_iter(Axis(1)).map(|c| c.dot(&c)).collect();
    let mut residual = &y - &x.dot(&*w);
    let gap_tolerance = tolerance * y.dot(&y);

    for iteration in 0..max_iterations {
        let mut w_max = 0.0_f64;
        let mut dw_max = 0.0_f64;
        for (j, &norm) in column_norms.iter().enumerate() {
            if norm == 0.0 {
                continue;
            }
            let column = x.column(j);
            let w_old = w[j];
            if w_old != 0.0 {
                residual.scaled_add(w_old, &column);
            }
            let rho = column.dot(&residual);
            let w_new = soft_threshold(rho, l1_penalty) / (norm + l2_penalty);
            if w_new != 0.0 {
                residual.scaled_add(-w_new, &column);
            }
            w[j] = w_new;
            dw_max = dw_max.max((w_new - w_old).abs());
            w_max = w_max.max(w_new.abs());
        }

        let sweep_settled = w_max == 0.0 || dw_max / w_max < tolerance;
        if sweep_settled || iteration + 1 == max_iterations {
            let gap = duality_gap(x, y, w.view(), residual.view(), l1_penalty, l2_penalty);
            if gap <= gap_tolerance {
                return true;
            }
        }
    }
    false
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

fn duality_gap(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    w: ArrayView1<f64>,
    residual: ArrayView1<f64>,
    l1_penalty: f64,
    l2_penalty: f64,
) -> f64 {
    let xta = x.t().dot(&residual) - &w.mapv(|v| v * l2_penalty);
    let dual_norm = xta.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let r_norm2 = residual.dot(&residual);
    let w_norm2 = w.dot(&w);
    let (scale, mut gap) = if dual_norm > l1_penalty {
        let scale = l1_penalty / dual_norm;
        (scale, 0.5 * (r_norm2 + r_norm2 * scale * scale))
    } else {
        (1.0, r_norm2)
    };
    let l1_norm: f64 = w.iter().map(|v| v.abs()).sum();
    gap += l1_penalty * l1_norm - scale * residual.dot(&y)
        + 0.5 * l2_penalty * (1.0 + scale * scale) * w_norm2;
    gap
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn settings() -> SelectorConfig {
        SelectorConfig::default()
    }

    #[test]
    fn folds_partition_rows_like_unshuffled_kfold() {
        let folds = kfold_ranges(11, 5);
        assert_eq!(folds, vec![0..3, 3..5, 5..7, 7..9, 9..11]);
        assert_eq!(folds.iter().map(|f| f.len()).sum::<usize>(), 11);
    }

    #[test]
    fn alpha_grid_starts_where_all_coefficients_vanish() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let y = array![2.0, 1.0, -2.0, -1.0];
        let grid = alpha_grid(x.view(), y.view(), 0.5, 5, 1e-2);
        // max |x_j·y| = 4, n = 4, ratio 0.5
        assert_abs_diff_eq!(grid[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid[4], 0.02, epsilon = 1e-12);
        assert!(grid.windows(2).into_iter().all(|w| w[0] > w[1]));

        let mut w = Array1::zeros(2);
        fit_single(x.view(), y.view(), grid[0], 0.5, &settings(), &mut w);
        assert!(w.iter().all(|&c| c.abs() < 1e-12));
    }

    #[test]
    fn lasso_on_orthogonal_design_soft_thresholds_least_squares() {
        // Orthogonal columns with squared norm n: lasso solution is
        // sign(b)·max(|b| − α, 0) where b is the least-squares coefficient.
        let x = array![
            [1.0, 1.0],
            [1.0, -1.0],
            [-1.0, 1.0],
            [-1.0, -1.0]
        ];
        let y = array![3.0, 1.0, -1.0, -3.0]; // y = 2·x0 + 1·x1
        let mut w = Array1::zeros(2);
        let mut s = settings();
        s.tolerance = 1e-10;
        let intercept = fit_single(x.view(), y.view(), 0.5, 1.0, &s, &mut w);
        assert_abs_diff_eq!(w[0], 1.5, epsilon = 1e-8);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(intercept, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ridge_like_mix_shrinks_by_penalty_ratio() {
        let x = array![
            [1.0, 1.0],
            [1.0, -1.0],
            [-1.0, 1.0],
            [-1.0, -1.0]
        ];
        let y = array![3.0, 1.0, -1.0, -3.0];
        let mut w = Array1::zeros(2);
        let mut s = settings();
        s.tolerance = 1e-10;
        // ρ = 0.5, α = 1: w = S(n·b, nαρ) / (n + nα(1−ρ)) = (b − 0.5) / 1.5
        fit_single(x.view(), y.view(), 1.0, 0.5, &s, &mut w);
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(w[1], 1.0 / 3.0, epsilon = 1e-8);
    }

    #[test]
    fn cross_validation_recovers_sparse_signal() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let n = 80;
        let x = Array2::from_shape_fn((n, 6), |_| rng.gen_range(-1.0..1.0));
        let y = Array1::from_shape_fn(n, |i| 2.0 * x[[i, 0]] - 1.0 * x[[i, 3]] + noise.sample(&mut rng));

        let fit = ElasticNetCv::default().fit(x.view(), y.view()).unwrap();
        let coefs = fit.coefficients();
        assert!(coefs[0] > 1.5, "coef 0 = {}", coefs[0]);
        assert!(coefs[3] < -0.5, "coef 3 = {}", coefs[3]);
        for j in [1, 2, 4, 5] {
            assert!(coefs[j].abs() < 0.2, "noise coef {j} = {}", coefs[j]);
        }
        assert!(fit.cv_rmse() < 0.3);
        assert!(crate::config::DEFAULT_L1_RATIOS.contains(&fit.l1_ratio()));
    }

    #[test]
    fn identical_inputs_give_identical_fits() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = Array2::from_shape_fn((30, 4), |_| rng.gen_range(0.0..3.0));
        let y = Array1::from_shape_fn(30, |i| x[[i, 1]] + 0.1 * i as f64);
        let first = ElasticNetCv::default().fit(x.view(), y.view()).unwrap();
        let second = ElasticNetCv::default().fit(x.view(), y.view()).unwrap();
        assert_eq!(first.coefficients(), second.coefficients());
        assert_eq!(first.alpha(), second.alpha());
        assert_eq!(first.l1_ratio(), second.l1_ratio());
    }

    #[test]
    fn too_few_rows_for_folds_is_an_error() {
        let x = Array2::<f64>::ones((3, 2));
        let y = Array1::<f64>::zeros(3);
        assert!(matches!(
            ElasticNetCv::default().fit(x.view(), y.view()),
            Err(EstimationError::InsufficientSamples {
                found: 3,
                required: 5
            })
        ));
    }

    #[test]
    fn constant_target_gives_zero_coefficients() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 0.0], [4.0, 5.0], [5.0, 1.0], [6.0, 2.0]];
        let y = Array1::from_elem(6, 1.25);
        let mut s = settings();
        s.cv_folds = 3;
        let fit = ElasticNetCv::new(s).fit(x.view(), y.view()).unwrap();
        assert!(fit.coefficients().iter().all(|&c| c.abs() < 1e-9));
        assert_abs_diff_eq!(fit.intercept(), 1.25, epsilon = 1e-9);
    }
}

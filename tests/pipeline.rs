use camcann::catalog::FeatureCatalog;
use camcann::estimator::rmse;
use camcann::frequency::Threshold;
use camcann::model::{LinearCmcModel, ModelError, PipelineStage, Split};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Random subgraph counts in 0..4 with targets `3·x₀ + noise`.
fn linear_split(rng: &mut StdRng, n: usize, p: usize) -> Split {
    let noise = Normal::new(0.0, 0.1).unwrap();
    let fingerprints = Array2::from_shape_fn((n, p), |_| rng.gen_range(0..4) as f64);
    let targets = fingerprints.column(0).mapv(|x| 3.0 * x) + Array1::from_shape_fn(n, |_| noise.sample(rng));
    Split::new(fingerprints, targets).unwrap()
}

fn synthetic_model(seed: u64) -> LinearCmcModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let train = linear_split(&mut rng, 80, 10);
    let test = linear_split(&mut rng, 40, 10);
    LinearCmcModel::new(train, test).unwrap()
}

fn catalog_for(model: &LinearCmcModel) -> FeatureCatalog {
    FeatureCatalog::from_ids((0..model.n_features()).map(|j| format!("subgraph_{j}")))
}

#[test]
fn rare_subgraph_is_removed_at_threshold_one() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut fingerprints = Array2::from_shape_fn((100, 10), |_| rng.gen_range(1..4) as f64);
    fingerprints.column_mut(7).fill(0.0);
    fingerprints[[42, 7]] = 1.0;
    let targets = Array1::from_shape_fn(100, |i| i as f64 / 100.0);
    let split = Split::new(fingerprints, targets).unwrap();
    let mut model = LinearCmcModel::new(split.clone(), split).unwrap();

    let output = model.remove_low_freq_subgraphs(Threshold::Count(1)).unwrap();
    assert_eq!(output.value, 1);

    let mut catalog = catalog_for(&model);
    catalog.apply(&output.annotations).unwrap();
    for (j, entry) in catalog.entries().iter().enumerate() {
        assert_eq!(entry.above_threshold, j != 7, "feature {j}");
    }
    assert_eq!(catalog.get(7).unwrap().occurrence_count, Some(1));
    assert_eq!(catalog.get(0).unwrap().occurrence_count, Some(100));
}

#[test]
fn fraction_threshold_matches_floored_count() {
    let mut model = synthetic_model(11);
    let by_fraction = model.remove_low_freq_subgraphs(Threshold::Fraction(0.25)).unwrap();
    let by_count = model.remove_low_freq_subgraphs(Threshold::Count(20)).unwrap();
    assert_eq!(by_fraction, by_count);
}

#[test]
fn full_pipeline_recovers_the_informative_subgraph() {
    let mut model = synthetic_model(2024);
    let mut catalog = catalog_for(&model);

    let filtered = model.remove_low_freq_subgraphs(Threshold::Count(1)).unwrap();
    catalog.apply(&filtered.annotations).unwrap();
    let selected = model.elastic_feature_select().unwrap();
    catalog.apply(&selected.annotations).unwrap();
    let fitted = model.ridge_model_train_test().unwrap();
    catalog.apply(&fitted.annotations).unwrap();
    let results = fitted.value;

    let chosen = model.selected_features().unwrap();
    assert!(chosen.contains(&0), "selected {chosen:?}");
    assert_eq!(results.feature_indices(), chosen.as_slice());

    let test = model.test();
    let mean = model.train().targets.mean().unwrap();
    let baseline = rmse(test.targets.view(), Array1::from_elem(test.targets.len(), mean).view());
    assert!(
        results.test_rmse() < baseline,
        "test RMSE {} vs baseline {}",
        results.test_rmse(),
        baseline
    );
    assert!(results.test_rmse() < 0.5);
    assert!(results.best_rmse() > 0.0);

    let contribution = catalog.get(0).unwrap().unnormalized_contribution.unwrap();
    assert!((contribution - 3.0).abs() < 0.1, "contribution {contribution}");

    let noise = &catalog.entries()[1..];
    let negligible = noise
        .iter()
        .filter(|entry| {
            entry.weight.is_none() || entry.unnormalized_contribution.is_some_and(|c| c.abs() < 0.1)
        })
        .count();
    assert!(
        2 * negligible > noise.len(),
        "only {negligible} of {} noise subgraphs have negligible weight",
        noise.len()
    );

    for entry in catalog.entries() {
        assert!(!entry.selected || entry.above_threshold);
        assert_eq!(entry.weight.is_some(), entry.selected);
    }
}

#[test]
fn predictions_match_stored_test_predictions() {
    let mut model = synthetic_model(5);
    model.elastic_feature_select().unwrap();
    model.ridge_model_train_test().unwrap();

    let predicted = model.predict(model.test().fingerprints.view()).unwrap();
    let stored = model.test_predictions().unwrap();
    for (a, b) in predicted.iter().zip(stored.iter()) {
        assert!((a - b).abs() < 1e-10);
    }

    let subset = model.test().fingerprints.select(Axis(0), &[0, 3]);
    let partial = model.predict(subset.view()).unwrap();
    assert!((partial[1] - stored[3]).abs() < 1e-10);
}

#[test]
fn selection_is_deterministic() {
    let mut first = synthetic_model(99);
    let mut second = synthetic_model(99);
    for model in [&mut first, &mut second] {
        model.remove_low_freq_subgraphs(Threshold::Count(0)).unwrap();
    }
    let a = first.elastic_feature_select().unwrap();
    let b = second.elastic_feature_select().unwrap();
    assert_eq!(a, b);

    let again = first.elastic_feature_select().unwrap();
    assert_eq!(a, again);

    let fit_a = first.ridge_model_train_test().unwrap();
    let fit_b = second.ridge_model_train_test().unwrap();
    assert_eq!(fit_a, fit_b);
}

#[test]
fn prediction_requires_a_fitted_model_and_matching_width() {
    let mut model = synthetic_model(3);
    let fingerprints = model.test().fingerprints.clone();
    assert!(matches!(
        model.predict(fingerprints.view()),
        Err(ModelError::NotFitted)
    ));

    model.elastic_feature_select().unwrap();
    model.ridge_model_train_test().unwrap();
    let narrow = fingerprints.select(Axis(1), &[0, 1, 2]);
    assert!(matches!(
        model.predict(narrow.view()),
        Err(ModelError::InputShape { found: 3, expected: 10 })
    ));
}

#[test]
fn ridge_before_selection_is_a_sequencing_error() {
    let mut model = synthetic_model(4);
    assert!(matches!(
        model.ridge_model_train_test(),
        Err(ModelError::Sequencing {
            stage: PipelineStage::Unfitted,
            ..
        })
    ));
    assert_eq!(model.stage(), PipelineStage::Unfitted);
}

#[test]
fn refiltering_invalidates_the_fit() {
    let mut model = synthetic_model(8);
    model.remove_low_freq_subgraphs(Threshold::Count(1)).unwrap();
    model.elastic_feature_select().unwrap();
    model.ridge_model_train_test().unwrap();
    assert_eq!(model.stage(), PipelineStage::Fitted);

    model.remove_low_freq_subgraphs(Threshold::Count(2)).unwrap();
    assert_eq!(model.stage(), PipelineStage::Filtered);
    assert!(model.results().is_none());
    assert!(model.test_predictions().is_none());
    assert!(matches!(
        model.predict(model.test().fingerprints.view()),
        Err(ModelError::NotFitted)
    ));
}

#[test]
fn invalid_threshold_leaves_state_untouched() {
    let mut model = synthetic_model(12);
    model.elastic_feature_select().unwrap();
    assert!(matches!(
        model.remove_low_freq_subgraphs(Threshold::Fraction(1.5)),
        Err(ModelError::InvalidThreshold(_))
    ));
    assert_eq!(model.stage(), PipelineStage::Selected);
}

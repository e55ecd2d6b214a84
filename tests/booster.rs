//! End-to-end handle tests: boosting rounds, flag semantics, score
//! readout, the round state machine, and interaction detection.

use approx::assert_relative_eq;
use glassboost::{
    Booster, BoosterConfig, BoostFlags, Dataset, DetectorConfig, Error, InteractionDetector,
    InteractionFlags, SampleBag,
};

/// Three bins whose targets are exactly bin-determined; half the samples
/// validate.
fn stepwise_regression() -> (Dataset, SampleBag) {
    let mut bins = Vec::new();
    let mut targets = Vec::new();
    let mut bag = Vec::new();
    for i in 0..30u16 {
        let bin = i % 3;
        bins.push(bin);
        targets.push(match bin {
            0 => -1.0,
            1 => 0.5,
            _ => 2.0,
        });
        bag.push(if i < 20 { 1 } else { -1 });
    }
    let dataset = Dataset::builder()
        .numeric_feature(3, bins)
        .regression_targets(targets)
        .build()
        .unwrap();
    (dataset, SampleBag::new(bag))
}

#[test]
fn rmse_boosting_drives_validation_metric_down() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        seed: 3,
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    let mut metrics = Vec::new();
    for _ in 0..20 {
        let gain = booster
            .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
            .unwrap();
        assert!(gain >= 0.0);
        metrics.push(booster.apply_term_update().unwrap());
    }
    // Targets are bin-determined, so the residuals go to zero.
    assert!(metrics[0] > metrics[19]);
    assert!(metrics[19] < 1e-3, "final metric {}", metrics[19]);

    // The fitted shape function recovers the per-bin targets.
    let scores = booster.current_term_scores(0).unwrap();
    assert_relative_eq!(scores[0], -1.0, epsilon = 1e-2);
    assert_relative_eq!(scores[1], 0.5, epsilon = 1e-2);
    assert_relative_eq!(scores[2], 2.0, epsilon = 1e-2);
}

#[test]
fn single_sample_first_round_update() {
    // One training sample at bin 1 with target 4 and init score 1:
    // its residual is -3, and with a unit learning rate and no split
    // the whole axis gets a +3 Newton step.
    let dataset = Dataset::builder()
        .numeric_feature(3, vec![1])
        .regression_targets(vec![4.0])
        .build()
        .unwrap();
    let terms = vec![vec![0]];
    let init_scores = [1.0];
    let mut booster = Booster::new(BoosterConfig {
        init_scores: Some(&init_scores),
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    booster
        .generate_term_update(0, BoostFlags::NONE, 1.0, 1, 1)
        .unwrap();
    // No validation samples: the metric read is NaN by construction.
    let metric = booster.apply_term_update().unwrap();
    assert!(metric.is_nan());

    let scores = booster.current_term_scores(0).unwrap();
    for bin in 0..3 {
        assert_relative_eq!(scores[bin], 3.0, epsilon = 1e-12);
    }
}

#[test]
fn gradient_sums_flag_freezes_the_model() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    let gain = booster
        .generate_term_update(0, BoostFlags::GRADIENT_SUMS, 0.5, 1, 2)
        .unwrap();
    assert_eq!(gain, 0.0);
    let first = booster.apply_term_update().unwrap();

    // Model unchanged, and a second frozen round reads the same metric.
    assert!(booster
        .current_term_scores(0)
        .unwrap()
        .iter()
        .all(|&s| s == 0.0));
    booster
        .generate_term_update(0, BoostFlags::GRADIENT_SUMS, 0.5, 1, 2)
        .unwrap();
    let second = booster.apply_term_update().unwrap();
    assert_eq!(first, second);
}

#[test]
fn set_term_update_overrides_the_candidate() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    booster
        .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
        .unwrap();
    let forced = [0.25, -0.5, 1.0];
    booster.set_term_update(0, &forced).unwrap();
    booster.apply_term_update().unwrap();

    let scores = booster.current_term_scores(0).unwrap();
    assert_eq!(scores, forced.to_vec());
}

#[test]
fn round_state_machine_is_strict() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0], vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    // Apply with nothing pending.
    assert!(matches!(
        booster.apply_term_update(),
        Err(Error::InvalidOperation(_))
    ));

    booster
        .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 2)
        .unwrap();
    // Generating again while pending is interleaving.
    assert!(matches!(
        booster.generate_term_update(1, BoostFlags::NONE, 0.5, 1, 2),
        Err(Error::InvalidOperation(_))
    ));
    // Overriding a different term's update is interleaving too.
    assert!(matches!(
        booster.set_term_update(1, &[0.0; 3]),
        Err(Error::InvalidOperation(_))
    ));
    booster.apply_term_update().unwrap();

    // Back to fresh gradients: the cycle restarts cleanly.
    booster
        .generate_term_update(1, BoostFlags::NONE, 0.5, 1, 2)
        .unwrap();
    booster.apply_term_update().unwrap();
}

#[test]
fn best_scores_track_the_best_validation_round() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    for _ in 0..10 {
        booster
            .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
            .unwrap();
        booster.apply_term_update().unwrap();
    }
    let best_before = booster.best_term_scores(0).unwrap();

    // Force a huge destructive update; validation worsens, so the best
    // snapshot must not move while the current scores do.
    booster.set_term_update(0, &[100.0, 100.0, 100.0]).unwrap();
    booster.apply_term_update().unwrap();

    assert_eq!(booster.best_term_scores(0).unwrap(), best_before);
    assert!(booster.current_term_scores(0).unwrap()[0] > 50.0);
}

#[test]
fn binary_classification_learns_the_split() {
    let mut bins = Vec::new();
    let mut classes = Vec::new();
    let mut bag = Vec::new();
    for i in 0..40u16 {
        let bin = i % 2;
        bins.push(bin);
        classes.push(bin as u32);
        bag.push(if i < 30 { 1 } else { -1 });
    }
    let dataset = Dataset::builder()
        .numeric_feature(2, bins)
        .classification_targets(2, classes)
        .build()
        .unwrap();
    let bag = SampleBag::new(bag);
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "log_loss", &terms)
    })
    .unwrap();

    let mut last = f64::INFINITY;
    for _ in 0..30 {
        booster
            .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 2)
            .unwrap();
        last = booster.apply_term_update().unwrap();
    }
    assert!(last < 0.1, "log loss stayed at {last}");

    // Bin 0 pushes toward class 0 (negative logit), bin 1 toward class 1.
    let scores = booster.current_term_scores(0).unwrap();
    assert!(scores[0] < -1.0);
    assert!(scores[1] > 1.0);
}

#[test]
fn multiclass_scores_have_one_record_per_bin() {
    let bins: Vec<u16> = (0..30).map(|i| (i % 3) as u16).collect();
    let classes: Vec<u32> = bins.iter().map(|&b| b as u32).collect();
    let dataset = Dataset::builder()
        .numeric_feature(3, bins)
        .classification_targets(3, classes)
        .build()
        .unwrap();
    let bag = SampleBag::new((0..30).map(|i| if i % 5 == 4 { -1 } else { 1 }).collect());
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        ..BoosterConfig::new(&dataset, "log_loss", &terms)
    })
    .unwrap();

    let mut last = f64::INFINITY;
    for _ in 0..25 {
        booster
            .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
            .unwrap();
        last = booster.apply_term_update().unwrap();
    }
    assert!(last < 0.3, "multiclass log loss stayed at {last}");

    let scores = booster.current_term_scores(0).unwrap();
    assert_eq!(scores.len(), 3 * 3);
    // Each bin's own class should carry the largest logit.
    for bin in 0..3 {
        let record = &scores[bin * 3..(bin + 1) * 3];
        let argmax = record
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(argmax, bin);
    }
}

#[test]
fn inner_bags_average_but_still_learn() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        n_inner_bags: 4,
        seed: 11,
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .unwrap();

    let mut last = f64::INFINITY;
    for _ in 0..20 {
        booster
            .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
            .unwrap();
        last = booster.apply_term_update().unwrap();
    }
    assert!(last < 0.1, "inner-bagged metric stayed at {last}");
}

#[test]
fn construction_errors_are_structured() {
    let (dataset, bag) = stepwise_regression();
    let terms = vec![vec![0]];

    assert!(matches!(
        Booster::new(BoosterConfig::new(&dataset, "squared_hinge", &terms)),
        Err(Error::UnknownObjective(_))
    ));
    assert!(matches!(
        Booster::new(BoosterConfig {
            differentially_private: true,
            ..BoosterConfig::new(&dataset, "rmse", &terms)
        }),
        Err(Error::Unsupported(_))
    ));
    let bad_terms = vec![vec![7]];
    assert!(matches!(
        Booster::new(BoosterConfig::new(&dataset, "rmse", &bad_terms)),
        Err(Error::FeatureIndexOutOfRange { .. })
    ));
    let short_bag = SampleBag::new(vec![1, 1]);
    assert!(matches!(
        Booster::new(BoosterConfig {
            bag: Some(&short_bag),
            ..BoosterConfig::new(&dataset, "rmse", &terms)
        }),
        Err(Error::BadDataset(_))
    ));
    // A validation-only bag leaves nothing to train on.
    let val_only = SampleBag::new(vec![-1; dataset.n_samples()]);
    assert!(matches!(
        Booster::new(BoosterConfig {
            bag: Some(&val_only),
            ..BoosterConfig::new(&dataset, "rmse", &terms)
        }),
        Err(Error::BadDataset(_))
    ));
    drop(bag);
}

// =============================================================================
// Interaction detection
// =============================================================================

fn pair_dataset(joint: bool) -> Dataset {
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut y = Vec::new();
    for i in 0..2u16 {
        for j in 0..2u16 {
            for _ in 0..6 {
                a.push(i);
                b.push(j);
                y.push(if joint {
                    if (i ^ j) == 1 {
                        1.0
                    } else {
                        -1.0
                    }
                } else {
                    i as f64 * 2.0 - j as f64
                });
            }
        }
    }
    Dataset::builder()
        .numeric_feature(2, a)
        .numeric_feature(2, b)
        .regression_targets(y)
        .build()
        .unwrap()
}

#[test]
fn detector_separates_joint_from_additive_targets() {
    let additive = pair_dataset(false);
    let mut detector =
        InteractionDetector::new(DetectorConfig::new(&additive, "rmse")).unwrap();
    let weak = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert!(weak <= 1e-9, "additive strength {weak}");

    let joint = pair_dataset(true);
    let mut detector = InteractionDetector::new(DetectorConfig::new(&joint, "rmse")).unwrap();
    let strong = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert!(strong > 0.1, "joint strength {strong}");
}

#[test]
fn detector_weighted_path_premultiplies_once() {
    // Uniform weights scale gains and the weight total together, so the
    // averaged strength is invariant. Double multiplication (init and
    // kernel both applying the weight) would show up as a 2x factor.
    let base = pair_dataset(true);
    let mut plain = InteractionDetector::new(DetectorConfig::new(&base, "rmse")).unwrap();
    let unweighted = plain
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();

    let n = base.n_samples();
    let weighted = {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut y = Vec::new();
        for i in 0..2u16 {
            for j in 0..2u16 {
                for _ in 0..6 {
                    a.push(i);
                    b.push(j);
                    y.push(if (i ^ j) == 1 { 1.0 } else { -1.0 });
                }
            }
        }
        Dataset::builder()
            .numeric_feature(2, a)
            .numeric_feature(2, b)
            .weights(vec![2.0; n])
            .regression_targets(y)
            .build()
            .unwrap()
    };
    let mut detector =
        InteractionDetector::new(DetectorConfig::new(&weighted, "rmse")).unwrap();
    let strength = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert_relative_eq!(strength, unweighted, epsilon = 1e-9);
}

#[test]
fn detector_uses_both_bag_signs() {
    let dataset = pair_dataset(true);
    // Splitting the bag into train and validation halves must not hide
    // any samples from the detector.
    let bag = SampleBag::new(
        (0..dataset.n_samples())
            .map(|i| if i % 2 == 0 { 1 } else { -1 })
            .collect(),
    );
    let mut detector = InteractionDetector::new(DetectorConfig {
        bag: Some(&bag),
        ..DetectorConfig::new(&dataset, "rmse")
    })
    .unwrap();
    assert_eq!(detector.n_samples(), dataset.n_samples());
    let strength = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert!(strength > 0.1);
}

#[test]
fn detector_rejects_bad_feature_sets() {
    let dataset = pair_dataset(false);
    let mut detector = InteractionDetector::new(DetectorConfig::new(&dataset, "rmse")).unwrap();

    assert!(matches!(
        detector.calc_interaction_strength(&[], InteractionFlags::NONE, 1),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        detector.calc_interaction_strength(&[0, 0], InteractionFlags::NONE, 1),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        detector.calc_interaction_strength(&[0, 9], InteractionFlags::NONE, 1),
        Err(Error::FeatureIndexOutOfRange { .. })
    ));
}

#[test]
fn single_bin_features_score_zero_strength() {
    let dataset = Dataset::builder()
        .numeric_feature(1, vec![0, 0, 0, 0])
        .numeric_feature(2, vec![0, 1, 0, 1])
        .regression_targets(vec![1.0, -1.0, 1.0, -1.0])
        .build()
        .unwrap();
    let mut detector = InteractionDetector::new(DetectorConfig::new(&dataset, "rmse")).unwrap();
    let strength = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert_eq!(strength, 0.0);
}

#[test]
fn classification_detector_runs_end_to_end() {
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut classes = Vec::new();
    for i in 0..2u16 {
        for j in 0..2u16 {
            for _ in 0..8 {
                a.push(i);
                b.push(j);
                classes.push((i ^ j) as u32);
            }
        }
    }
    let dataset = Dataset::builder()
        .numeric_feature(2, a)
        .numeric_feature(2, b)
        .classification_targets(2, classes)
        .build()
        .unwrap();
    let mut detector =
        InteractionDetector::new(DetectorConfig::new(&dataset, "log_loss")).unwrap();
    let strength = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 1)
        .unwrap();
    assert!(strength > 0.01, "classification xor strength {strength}");
}

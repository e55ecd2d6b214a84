//! Train a small additive model on synthetic regression data and probe
//! a pairwise interaction.
//!
//! Run with: cargo run --example train_regression

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use glassboost::{
    Booster, BoosterConfig, BoostFlags, Dataset, DetectorConfig, InteractionDetector,
    InteractionFlags, SampleBag, Verbosity,
};

fn main() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let n_samples = 2000;
    let n_bins = 8usize;

    // Two binned features; the target carries a main effect on each plus
    // a joint term on the pair.
    let a: Vec<u16> = (0..n_samples)
        .map(|_| rng.gen_range(0..n_bins as u16))
        .collect();
    let b: Vec<u16> = (0..n_samples)
        .map(|_| rng.gen_range(0..n_bins as u16))
        .collect();
    let targets: Vec<f64> = a
        .iter()
        .zip(&b)
        .map(|(&a, &b)| {
            let main = (a as f64) * 0.5 - (b as f64) * 0.25;
            let joint = if (a % 2) == (b % 2) { 1.0 } else { -1.0 };
            main + joint + rng.gen_range(-0.1..0.1)
        })
        .collect();

    // Last quarter of the samples validates.
    let bag = SampleBag::new(
        (0..n_samples)
            .map(|i| if i < 3 * n_samples / 4 { 1 } else { -1 })
            .collect(),
    );

    let dataset = Dataset::builder()
        .numeric_feature(n_bins, a)
        .numeric_feature(n_bins, b)
        .regression_targets(targets)
        .build()
        .expect("valid dataset");

    let terms = vec![vec![0], vec![1], vec![0, 1]];
    let mut booster = Booster::new(BoosterConfig {
        bag: Some(&bag),
        seed: 7,
        verbosity: Verbosity::Silent,
        ..BoosterConfig::new(&dataset, "rmse", &terms)
    })
    .expect("valid booster");

    let mut metric = f64::NAN;
    for round in 0..100 {
        for term in 0..booster.n_terms() {
            booster
                .generate_term_update(term, BoostFlags::NONE, 0.25, 5, 4)
                .expect("update");
            metric = booster.apply_term_update().expect("apply");
        }
        if round % 20 == 0 {
            println!("round {round:3}: validation rmse {metric:.4}");
        }
    }
    println!("final validation rmse: {metric:.4}");

    let mut detector =
        InteractionDetector::new(DetectorConfig::new(&dataset, "rmse")).expect("valid detector");
    let strength = detector
        .calc_interaction_strength(&[0, 1], InteractionFlags::NONE, 5)
        .expect("strength");
    println!("interaction strength of (0, 1): {strength:.4}");
}

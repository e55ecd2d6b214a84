//! glassboost: the histogram core of a gradient-boosted additive model
//! trainer.
//!
//! Models of this family fit one shape function per feature plus
//! low-order interaction terms, by repeatedly growing shallow splits
//! over histograms of pre-binned features. This crate implements the
//! numerical machinery that makes that cheap:
//!
//! - **BinSums**: for each term, a single pass over all samples folds
//!   counts, weights, gradients, and Hessians into a dense
//!   D-dimensional tensor of bins, through kernels monomorphized over
//!   the score and dimension counts (see [`training::bins`]).
//! - **Interaction strength**: a scalar score of how much joint
//!   modeling of a feature set beats the best additive treatment of the
//!   same axes (see [`training::interactions`]).
//! - **Gradient bookkeeping**: bag-driven expansion, closed-form
//!   gradients for RMSE and log-loss, and in-place refresh between
//!   rounds (see [`training::init`] and [`training::objectives`]).
//!
//! # Entry Points
//!
//! [`Booster`] drives boosting rounds (generate → apply, with an
//! optional override in between); [`InteractionDetector`] scores
//! candidate interactions. Both are created from a [`Dataset`] plus an
//! optional replication bag, and report construction problems as
//! [`Error`] values before any handle exists.
//!
//! # Example
//!
//! ```
//! use glassboost::{Booster, BoosterConfig, BoostFlags, Dataset, SampleBag};
//!
//! let dataset = Dataset::builder()
//!     .numeric_feature(3, vec![0, 1, 2, 1, 0, 2])
//!     .regression_targets(vec![1.0, 2.0, 3.0, 2.0, 1.0, 3.0])
//!     .build()
//!     .unwrap();
//! let bag = SampleBag::new(vec![1, 1, 1, 1, -1, -1]);
//! let terms = vec![vec![0]];
//!
//! let mut booster = Booster::new(BoosterConfig {
//!     bag: Some(&bag),
//!     ..BoosterConfig::new(&dataset, "rmse", &terms)
//! })
//! .unwrap();
//!
//! for _ in 0..10 {
//!     booster
//!         .generate_term_update(0, BoostFlags::NONE, 0.5, 1, 3)
//!         .unwrap();
//!     let metric = booster.apply_term_update().unwrap();
//!     assert!(metric.is_finite());
//! }
//! ```

pub mod booster;
pub mod data;
pub mod error;
pub mod training;
pub mod utils;

// High-level handle types
pub use booster::{
    Booster, BoosterConfig, BoostFlags, DetectorConfig, InteractionDetector, InteractionFlags,
    TrainingLogger, Verbosity,
};

// Data types (for preparing training data)
pub use data::{BagPass, Dataset, DatasetBuilder, FeatureMeta, SampleBag, Targets};

// Errors
pub use error::Error;

// Shared utilities
pub use utils::{run_with_threads, Parallelism};

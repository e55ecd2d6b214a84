//! Training internals: histogram aggregation, gradients, splits, and
//! interaction scoring.
//!
//! - [`bins`]: bin tensors, the BinSums kernel, tie-deferral scratch
//! - [`gradients`]: the per-sample gradient/Hessian buffer
//! - [`init`]: bag-driven expansion and gradient initialization
//! - [`objectives`]: closed-form gradients per loss, selected by name
//! - [`metrics`]: validation metrics
//! - [`split`]: gain formula and the 1-D split search
//! - [`interactions`]: interaction strength over aggregated tensors

pub mod bins;
pub mod gradients;
pub mod init;
pub mod interactions;
pub mod metrics;
pub mod objectives;
pub mod split;

pub use bins::{
    bin_sums, bin_sums_dynamic, bin_sums_parallel, tensor_index, BinAccum, BinLayout,
    BinSumsArgs, BinTensor, SweepScratch, TensorPool, DIMENSIONS_MAX,
};
pub use gradients::GradHessBuf;
pub use interactions::interaction_strength;
pub use objectives::{LogLoss, Objective, Rmse};
pub use split::{SplitOutcome, SplitParams};

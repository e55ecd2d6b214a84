//! Histogram tensors and the BinSums aggregation engine.
//!
//! - [`tensor`] - bin record layout, dense D-dimensional tensors, the
//!   inline accumulator, and the tensor pool
//! - [`sums`] - the aggregation kernel, its specialization dispatch, and
//!   the worker-parallel driver
//! - [`sweep`] - tie-deferral scratch for the split sweep

pub mod sums;
pub mod sweep;
pub mod tensor;

pub use sums::{
    bin_sums, bin_sums_dynamic, bin_sums_parallel, debug_check_weight_total, tensor_index,
    BinSumsArgs, SPECIALIZED_DIMS_MAX, SPECIALIZED_SCORES_MAX,
};
pub use sweep::{SweepScratch, TreeSweep};
pub use tensor::{BinAccum, BinLayout, BinTensor, TensorPool, DIMENSIONS_MAX};

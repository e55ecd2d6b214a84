//! Gradient initialization and bag-driven expansion.
//!
//! The boosting side of the trainer works over *expanded* sample arrays:
//! a bag entry of `+3` means the sample occupies three consecutive
//! positions in every training-side buffer. The walkers here consume the
//! source arrays with the exact cursor discipline the bag demands:
//! advance once per bag entry consumed, select only entries whose sign
//! matches the pass, write each accepted value `|replication|` times.
//!
//! Two initializer flavors exist, and they treat weights differently:
//!
//! - **Boosting** selects one sign of the bag and leaves gradients
//!   unweighted; the aggregation kernel multiplies by weight later,
//!   because the boosting weight array also carries inner-bag
//!   occurrence counts.
//! - **Interaction** takes every nonzero entry and, when a weight array
//!   is present, multiplies the gradient by the sample's weight *before*
//!   replication; the kernel then runs in `pre_weighted` mode.
//!
//! RMSE regression needs no scores at all: the gradient `init − target`
//! is stored once and updated incrementally every round.

use crate::data::{BagIter, BagPass, SampleBag};

// =============================================================================
// Bag-driven expansion
// =============================================================================

/// Expand one value per source sample into pass order.
pub fn expand_values(
    values: &[f64],
    bag: Option<&SampleBag>,
    pass: BagPass,
    expanded_len: usize,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(expanded_len);
    for (index, replication) in BagIter::new(bag, pass, values.len()) {
        for _ in 0..replication {
            out.push(values[index]);
        }
    }
    debug_assert_eq!(out.len(), expanded_len);
    out
}

/// Expand one class id per source sample into pass order.
pub fn expand_classes(
    classes: &[u32],
    bag: Option<&SampleBag>,
    pass: BagPass,
    expanded_len: usize,
) -> Vec<u32> {
    let mut out = Vec::with_capacity(expanded_len);
    for (index, replication) in BagIter::new(bag, pass, classes.len()) {
        for _ in 0..replication {
            out.push(classes[index]);
        }
    }
    debug_assert_eq!(out.len(), expanded_len);
    out
}

/// Expand fixed-width per-sample records (e.g. init-score vectors).
pub fn expand_records(
    records: &[f64],
    width: usize,
    n_samples: usize,
    bag: Option<&SampleBag>,
    pass: BagPass,
    expanded_len: usize,
) -> Vec<f64> {
    debug_assert_eq!(records.len(), width * n_samples);
    let mut out = Vec::with_capacity(expanded_len * width);
    for (index, replication) in BagIter::new(bag, pass, n_samples) {
        let record = &records[index * width..(index + 1) * width];
        for _ in 0..replication {
            out.extend_from_slice(record);
        }
    }
    debug_assert_eq!(out.len(), expanded_len * width);
    out
}

/// Expand bin columns for the features a pass will aggregate over.
pub fn expand_bins(
    bins: &[u16],
    bag: Option<&SampleBag>,
    pass: BagPass,
    expanded_len: usize,
) -> Vec<u16> {
    let mut out = Vec::with_capacity(expanded_len);
    for (index, replication) in BagIter::new(bag, pass, bins.len()) {
        for _ in 0..replication {
            out.push(bins[index]);
        }
    }
    debug_assert_eq!(out.len(), expanded_len);
    out
}

// =============================================================================
// RMSE initializers
// =============================================================================

/// Initialize RMSE gradients for one boosting pass.
///
/// `gradients` must already be sized to the pass's expanded count. For
/// each selected sample the gradient is `init_score − target`, written
/// `|replication|` times; the Hessian is implicitly 1 and not stored.
pub fn init_rmse_boosting(
    targets: &[f64],
    init_scores: Option<&[f64]>,
    bag: Option<&SampleBag>,
    pass: BagPass,
    gradients: &mut [f64],
) {
    debug_assert!(matches!(pass, BagPass::Training | BagPass::Validation));
    debug_assert!(init_scores.map_or(true, |s| s.len() == targets.len()));

    let mut cursor = 0usize;
    for (index, replication) in BagIter::new(bag, pass, targets.len()) {
        let init = init_scores.map_or(0.0, |scores| scores[index]);
        // Target may be NaN; it propagates and stops boosting at the
        // next metric read rather than here.
        let gradient = init - targets[index];
        for _ in 0..replication {
            debug_assert!(cursor < gradients.len());
            gradients[cursor] = gradient;
            cursor += 1;
        }
    }
    debug_assert_eq!(cursor, gradients.len());
}

/// Initialize RMSE gradients for interaction detection.
///
/// Differs from the boosting flavor in two ways that must be preserved
/// exactly: every nonzero bag entry is in scope (both signs), and when a
/// weight array is present the gradient is multiplied by the sample's
/// weight here, once, before replication. `weights` is in expanded
/// order; the cursor reads the first position of each replicated block.
pub fn init_rmse_interaction(
    targets: &[f64],
    init_scores: Option<&[f64]>,
    bag: Option<&SampleBag>,
    weights: Option<&[f64]>,
    gradients: &mut [f64],
) {
    debug_assert!(init_scores.map_or(true, |s| s.len() == targets.len()));
    debug_assert!(weights.map_or(true, |w| w.len() == gradients.len()));

    let mut cursor = 0usize;
    for (index, replication) in BagIter::new(bag, BagPass::All, targets.len()) {
        let init = init_scores.map_or(0.0, |scores| scores[index]);
        let mut gradient = init - targets[index];
        if let Some(weights) = weights {
            gradient *= weights[cursor];
        }
        for _ in 0..replication {
            debug_assert!(cursor < gradients.len());
            gradients[cursor] = gradient;
            cursor += 1;
        }
    }
    debug_assert_eq!(cursor, gradients.len());
}

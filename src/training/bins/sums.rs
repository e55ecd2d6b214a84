//! The BinSums aggregation kernel and its specialization dispatch.
//!
//! For one term, the kernel walks every sample, decodes the flat tensor
//! index from the term's bin columns, and folds the sample's count,
//! weight, gradients, and (classification) Hessians into the addressed
//! bin record.
//!
//! # Specialization
//!
//! The inner loop must not carry runtime bounds: the score count and the
//! dimension count are threaded through the [`Count`] trait, which is
//! implemented by both `Fixed<N>` (a compile-time constant the optimizer
//! unrolls against) and `Runtime` (reads the bound from the argument).
//! Dispatch walks a score-count ladder and then a dimension ladder,
//! selecting a fully monomorphized kernel for the common shapes and
//! falling back to the runtime-bound variant beyond them. Every variant
//! shares one generic body, so the specialized and dynamic kernels
//! produce bit-identical sums.
//!
//! The optional-weight presence check and the `pre_weighted` mode are
//! loop-invariant; both are hoisted out of the sample loop.
//!
//! # Numerics
//!
//! Accumulation is plain `f64` addition in sample order. `NaN` and
//! `±inf` propagate freely; nothing in the kernel checks for them.

use super::tensor::{BinLayout, BinTensor};
use crate::utils::Parallelism;

/// Dimension counts with their own fully unrolled kernels.
pub const SPECIALIZED_DIMS_MAX: usize = 3;
/// Score counts with their own fully unrolled kernels.
pub const SPECIALIZED_SCORES_MAX: usize = 8;

/// Below this many samples a parallel pass costs more than it saves.
const PARALLEL_MIN_SAMPLES: usize = 4096;

// =============================================================================
// Arguments
// =============================================================================

/// One BinSums invocation over a term's columns and a gradient buffer.
#[derive(Clone, Copy)]
pub struct BinSumsArgs<'a> {
    /// One bin column per term dimension, each `n_samples` long.
    pub columns: &'a [&'a [u16]],
    /// Bin count per term dimension, `>= 2` each.
    pub n_bins: &'a [usize],
    /// Per-sample gradient records: `[g0, g1, ...]` or interleaved
    /// `[g0, h0, g1, h1, ...]` when `with_hessians`.
    pub grad_hess: &'a [f64],
    /// Optional per-sample weights; absent means `w = 1.0` exactly.
    pub weights: Option<&'a [f64]>,
    pub n_scores: usize,
    pub with_hessians: bool,
    /// Gradients (and Hessians) were already multiplied by weight at
    /// initialization; skip the multiply but still accumulate the
    /// weight lane. The interaction path sets this.
    pub pre_weighted: bool,
}

impl BinSumsArgs<'_> {
    #[inline]
    pub fn pair_width(&self) -> usize {
        if self.with_hessians {
            2
        } else {
            1
        }
    }

    #[inline]
    pub fn gh_stride(&self) -> usize {
        self.pair_width() * self.n_scores
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.grad_hess.len() / self.gh_stride()
    }

    #[inline]
    pub fn layout(&self) -> BinLayout {
        BinLayout::new(self.n_scores, self.with_hessians)
    }
}

// =============================================================================
// Sample indexing
// =============================================================================

/// Flat tensor index of one sample: dimension 0 is fastest.
///
/// Fails fast (debug) on any out-of-range bin index.
#[inline]
pub fn tensor_index(columns: &[&[u16]], n_bins: &[usize], sample: usize) -> usize {
    debug_assert_eq!(columns.len(), n_bins.len());
    let mut index = 0usize;
    let mut stride = 1usize;
    for dim in 0..columns.len() {
        let bin = columns[dim][sample] as usize;
        debug_assert!(
            bin < n_bins[dim],
            "bin {bin} out of range for dimension {dim} ({} bins)",
            n_bins[dim]
        );
        index += stride * bin;
        stride *= n_bins[dim];
    }
    index
}

// =============================================================================
// Loop bounds
// =============================================================================

/// A loop bound known either at compile time or at run time.
trait Count: Copy {
    fn get(self) -> usize;
}

/// Compile-time bound; the optimizer sees a constant and unrolls.
#[derive(Clone, Copy)]
struct Fixed<const N: usize>;

impl<const N: usize> Count for Fixed<N> {
    #[inline(always)]
    fn get(self) -> usize {
        N
    }
}

/// Runtime bound read from the arguments.
#[derive(Clone, Copy)]
struct Runtime(usize);

impl Count for Runtime {
    #[inline(always)]
    fn get(self) -> usize {
        self.0
    }
}

// =============================================================================
// Kernel body
// =============================================================================

#[inline(always)]
#[allow(clippy::too_many_arguments)]
fn accumulate_one<K: Count, D: Count, const HESS: bool, const PRE: bool>(
    k: K,
    d: D,
    counts: &mut [u64],
    stats: &mut [f64],
    stats_stride: usize,
    columns: &[&[u16]],
    n_bins: &[usize],
    grad_hess: &[f64],
    sample: usize,
    weight: f64,
) {
    let pair_width = if HESS { 2 } else { 1 };

    let mut bin = 0usize;
    let mut stride = 1usize;
    for dim in 0..d.get() {
        let b = columns[dim][sample] as usize;
        debug_assert!(b < n_bins[dim], "bin {b} out of range in dimension {dim}");
        bin += stride * b;
        stride *= n_bins[dim];
    }

    counts[bin] += 1;
    let base = bin * stats_stride;
    let gh_base = sample * pair_width * k.get();
    debug_assert!(base + stats_stride <= stats.len());
    debug_assert!(gh_base + pair_width * k.get() <= grad_hess.len());

    // SAFETY: `bin` was bounds-checked by the `counts` access above;
    // `base + stats_stride <= stats.len()` and the gradient record lies
    // within `grad_hess` per the asserts. Offsets below stay inside one
    // record.
    unsafe {
        *stats.get_unchecked_mut(base) += weight;
        for score in 0..k.get() {
            let g = *grad_hess.get_unchecked(gh_base + pair_width * score);
            // Gradients can be NaN; classification keeps them in [-1, 1],
            // regression can run to infinity. Either way they just add up.
            let bump = if PRE { g } else { g * weight };
            *stats.get_unchecked_mut(base + 1 + pair_width * score) += bump;
            if HESS {
                let h = *grad_hess.get_unchecked(gh_base + 2 * score + 1);
                let bump = if PRE { h } else { h * weight };
                *stats.get_unchecked_mut(base + 2 * score + 2) += bump;
            }
        }
    }
}

fn accumulate_range<K: Count, D: Count, const HESS: bool, const PRE: bool>(
    k: K,
    d: D,
    counts: &mut [u64],
    stats: &mut [f64],
    stats_stride: usize,
    args: &BinSumsArgs<'_>,
) {
    let n_samples = args.n_samples();
    // The weight check is loop-invariant: hoist it and run one of two
    // monomorphic sample loops.
    match args.weights {
        None => {
            for sample in 0..n_samples {
                accumulate_one::<K, D, HESS, PRE>(
                    k,
                    d,
                    counts,
                    stats,
                    stats_stride,
                    args.columns,
                    args.n_bins,
                    args.grad_hess,
                    sample,
                    1.0,
                );
            }
        }
        Some(weights) => {
            debug_assert_eq!(weights.len(), n_samples);
            for sample in 0..n_samples {
                accumulate_one::<K, D, HESS, PRE>(
                    k,
                    d,
                    counts,
                    stats,
                    stats_stride,
                    args.columns,
                    args.n_bins,
                    args.grad_hess,
                    sample,
                    weights[sample],
                );
            }
        }
    }
}

// =============================================================================
// Dispatch ladders
// =============================================================================

fn run_kernel<K: Count, D: Count>(k: K, d: D, tensor: &mut BinTensor, args: &BinSumsArgs<'_>) {
    let stats_stride = tensor.layout().stats_stride();
    let (counts, stats) = tensor.lanes_mut();
    match (args.with_hessians, args.pre_weighted) {
        (false, false) => {
            accumulate_range::<K, D, false, false>(k, d, counts, stats, stats_stride, args)
        }
        (false, true) => {
            accumulate_range::<K, D, false, true>(k, d, counts, stats, stats_stride, args)
        }
        (true, false) => {
            accumulate_range::<K, D, true, false>(k, d, counts, stats, stats_stride, args)
        }
        (true, true) => {
            accumulate_range::<K, D, true, true>(k, d, counts, stats, stats_stride, args)
        }
    }
}

fn dispatch_dims<K: Count>(k: K, tensor: &mut BinTensor, args: &BinSumsArgs<'_>) {
    match args.columns.len() {
        1 => run_kernel(k, Fixed::<1>, tensor, args),
        2 => run_kernel(k, Fixed::<2>, tensor, args),
        3 => run_kernel(k, Fixed::<3>, tensor, args),
        d => run_kernel(k, Runtime(d), tensor, args),
    }
}

fn validate(tensor: &BinTensor, args: &BinSumsArgs<'_>) {
    debug_assert_eq!(tensor.layout(), args.layout());
    debug_assert_eq!(tensor.shape(), args.n_bins);
    debug_assert!(!args.columns.is_empty());
    debug_assert!(args.n_bins.iter().all(|&n| n >= 2), "single-bin dimension");
    debug_assert!(args
        .columns
        .iter()
        .all(|c| c.len() == args.n_samples()));
}

/// Aggregate all samples into `tensor`, which must be zeroed and shaped
/// for the term.
///
/// Dispatches down the score-count ladder, then the dimension ladder,
/// so the hot loop's bounds are compile-time constants for the common
/// shapes.
pub fn bin_sums(tensor: &mut BinTensor, args: &BinSumsArgs<'_>) {
    validate(tensor, args);
    match args.n_scores {
        1 => dispatch_dims(Fixed::<1>, tensor, args),
        2 => dispatch_dims(Fixed::<2>, tensor, args),
        3 => dispatch_dims(Fixed::<3>, tensor, args),
        4 => dispatch_dims(Fixed::<4>, tensor, args),
        5 => dispatch_dims(Fixed::<5>, tensor, args),
        6 => dispatch_dims(Fixed::<6>, tensor, args),
        7 => dispatch_dims(Fixed::<7>, tensor, args),
        8 => dispatch_dims(Fixed::<8>, tensor, args),
        n => dispatch_dims(Runtime(n), tensor, args),
    }
}

/// Reference variant with runtime loop bounds everywhere.
///
/// The specialized ladder must match this bit for bit; tests hold the
/// two against each other.
pub fn bin_sums_dynamic(tensor: &mut BinTensor, args: &BinSumsArgs<'_>) {
    validate(tensor, args);
    run_kernel(
        Runtime(args.n_scores),
        Runtime(args.columns.len()),
        tensor,
        args,
    );
}

// =============================================================================
// Parallel driver
// =============================================================================

/// Aggregate with the sample range partitioned across rayon workers.
///
/// Each worker owns a private tensor for its contiguous chunk and
/// processes its samples in index order; the partials are then summed
/// into `tensor` in chunk order. The reduction order across workers is
/// an implementation detail; callers must not rely on bit-exact
/// reproducibility across thread counts.
pub fn bin_sums_parallel(
    parallelism: Parallelism,
    tensor: &mut BinTensor,
    args: &BinSumsArgs<'_>,
) {
    let n_samples = args.n_samples();
    if !parallelism.is_parallel() || n_samples < PARALLEL_MIN_SAMPLES {
        bin_sums(tensor, args);
        return;
    }

    let n_chunks = rayon::current_num_threads().max(1);
    let chunk_len = n_samples.div_ceil(n_chunks);
    let layout = tensor.layout();
    let shape: Vec<usize> = tensor.shape().to_vec();
    let gh = args.gh_stride();

    let partials = parallelism.maybe_par_map(0..n_chunks, |chunk| {
        let lo = chunk * chunk_len;
        let hi = n_samples.min(lo + chunk_len);
        let mut partial = BinTensor::new(layout, &shape).expect("result tensor had this shape");
        if lo < hi {
            let columns: Vec<&[u16]> = args.columns.iter().map(|c| &c[lo..hi]).collect();
            let chunk_args = BinSumsArgs {
                columns: &columns,
                grad_hess: &args.grad_hess[lo * gh..hi * gh],
                weights: args.weights.map(|w| &w[lo..hi]),
                ..*args
            };
            bin_sums(&mut partial, &chunk_args);
        }
        partial
    });

    for partial in &partials {
        tensor.merge(partial);
    }
}

// =============================================================================
// Debug probes
// =============================================================================

/// Debug-only cross-check of the aggregated weight lane against the
/// dataset's precomputed total. A correctness probe, not a runtime
/// feature: it compiles to nothing in release builds.
#[inline]
pub fn debug_check_weight_total(tensor: &BinTensor, expected: f64) {
    #[cfg(debug_assertions)]
    {
        if expected.is_finite() && expected > 0.0 {
            let total = tensor.total_weight();
            debug_assert!(
                (total - expected).abs() <= 1e-3 * expected,
                "aggregated weight {total} drifted from dataset total {expected}"
            );
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (tensor, expected);
    }
}

// =============================================================================
// Tests
// =============================================================================

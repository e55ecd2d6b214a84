//! Split search over 1-D histograms and Newton updates.
//!
//! The splitter is a policy over the aggregated tensor: it never touches
//! samples. Main-effect terms get a greedy multi-leaf partition of the
//! bin axis (repeatedly split the segment whose best boundary gains the
//! most) and each final segment receives a Newton step. Higher-order
//! terms receive a per-bin Newton step directly.
//!
//! Gain of a region is `Σ_k G_k² / H_k` with `H` the Hessian sum for
//! classification and the weight sum for RMSE (where the Hessian is
//! identically 1 per unit weight). A split's gain is the children's
//! partial gains minus the parent's, never negative up to rounding.
//!
//! Boundaries whose gain exactly ties the running best are deferred into
//! the [`SweepScratch`] and resolved with one uniform draw after the
//! sweep.

use rand::Rng;

use super::bins::{BinAccum, BinTensor, SweepScratch};

/// Denominators below this produce no step and no gain.
const HESS_MIN: f64 = 1e-12;

/// Splitter knobs forwarded from the update entry point.
#[derive(Clone, Copy, Debug)]
pub struct SplitParams {
    pub learning_rate: f64,
    pub min_samples_leaf: u64,
    pub leaves_max: usize,
}

/// Result of one term's split search.
#[derive(Clone, Debug)]
pub struct SplitOutcome {
    /// Additive update per bin record: `n_bins × n_scores`.
    pub update: Vec<f64>,
    /// Total realized split gain across the grown leaves.
    pub gain_total: f64,
    /// Number of leaves in the final partition.
    pub n_leaves: usize,
}

// =============================================================================
// Gain
// =============================================================================

/// Partial gain of one aggregated region.
pub fn partial_gain(accum: &BinAccum) -> f64 {
    let layout = accum.layout();
    let mut gain = 0.0;
    for k in 0..layout.n_scores() {
        let g = accum.grad(k);
        let h = if layout.with_hessians() {
            accum.hess(k)
        } else {
            accum.weight()
        };
        if h >= HESS_MIN {
            gain += g * g / h;
        }
    }
    gain
}

/// Newton step for score `k` of one region, scaled by the learning rate.
fn newton_step(accum: &BinAccum, k: usize, learning_rate: f64) -> f64 {
    let layout = accum.layout();
    let g = accum.grad(k);
    let h = if layout.with_hessians() {
        accum.hess(k)
    } else {
        accum.weight()
    };
    if h >= HESS_MIN {
        -g / h * learning_rate
    } else {
        0.0
    }
}

// =============================================================================
// 1-D split search
// =============================================================================

fn segment_accum(tensor: &BinTensor, lo: usize, hi: usize) -> BinAccum {
    let mut accum = BinAccum::zeroed(tensor.layout());
    for bin in lo..hi {
        accum.add_bin(tensor, bin);
    }
    accum
}

/// Best boundary within `[lo, hi)`, ties resolved through the scratch.
///
/// Returns `(boundary, gain)` with bins `[lo, boundary)` on the left, or
/// `None` when no boundary satisfies the leaf-size constraint.
fn best_split<R: Rng>(
    tensor: &BinTensor,
    lo: usize,
    hi: usize,
    total: &BinAccum,
    min_samples_leaf: u64,
    scratch: &mut SweepScratch,
    rng: &mut R,
) -> Option<(usize, f64)> {
    debug_assert!(hi - lo >= 2);
    scratch.reset_with_layout(tensor.layout());
    let parent_gain = partial_gain(total);

    let mut left = BinAccum::zeroed(tensor.layout());
    let mut right = BinAccum::zeroed(tensor.layout());
    let mut best_gain = f64::NEG_INFINITY;

    for boundary in lo + 1..hi {
        left.add_bin(tensor, boundary - 1);
        if left.count() < min_samples_leaf {
            continue;
        }
        right.assign_diff(total, &left);
        if right.count() < min_samples_leaf {
            // Left only grows; no later boundary can satisfy the right.
            break;
        }
        let gain = partial_gain(&left) + partial_gain(&right) - parent_gain;
        if gain > best_gain {
            best_gain = gain;
            scratch.reset();
            scratch.record(boundary, &left);
        } else if gain == best_gain {
            scratch.record(boundary, &left);
        }
    }

    if scratch.is_empty() {
        return None;
    }
    let boundary = scratch.choose(rng).boundary();
    Some((boundary, best_gain))
}

/// Greedy multi-leaf partition of a 1-D tensor plus Newton updates.
pub fn split_main_effect<R: Rng>(
    tensor: &BinTensor,
    params: &SplitParams,
    scratch: &mut SweepScratch,
    rng: &mut R,
) -> SplitOutcome {
    let n_bins = tensor.n_bins();
    let n_scores = tensor.layout().n_scores();
    debug_assert_eq!(tensor.shape().len(), 1);

    // (lo, hi, aggregate) per current leaf segment.
    let mut segments: Vec<(usize, usize, BinAccum)> =
        vec![(0, n_bins, segment_accum(tensor, 0, n_bins))];
    let mut gain_total = 0.0;
    let leaves_max = params.leaves_max.max(1);

    while segments.len() < leaves_max {
        let mut best: Option<(usize, usize, f64)> = None; // (segment, boundary, gain)
        for (index, (lo, hi, accum)) in segments.iter().enumerate() {
            if hi - lo < 2 {
                continue;
            }
            if let Some((boundary, gain)) = best_split(
                tensor,
                *lo,
                *hi,
                accum,
                params.min_samples_leaf,
                scratch,
                rng,
            ) {
                if best.map_or(true, |(_, _, best_gain)| gain > best_gain) {
                    best = Some((index, boundary, gain));
                }
            }
        }
        let Some((index, boundary, gain)) = best else {
            break;
        };
        if gain <= 0.0 {
            break;
        }
        let (lo, hi) = (segments[index].0, segments[index].1);
        segments[index] = (lo, boundary, segment_accum(tensor, lo, boundary));
        segments.insert(
            index + 1,
            (boundary, hi, segment_accum(tensor, boundary, hi)),
        );
        gain_total += gain;
    }

    let mut update = vec![0.0; n_bins * n_scores];
    for (lo, hi, accum) in &segments {
        for k in 0..n_scores {
            let step = newton_step(accum, k, params.learning_rate);
            for bin in *lo..*hi {
                update[bin * n_scores + k] = step;
            }
        }
    }

    SplitOutcome {
        update,
        gain_total,
        n_leaves: segments.len(),
    }
}

// =============================================================================
// Per-bin updates (terms with two or more dimensions)
// =============================================================================

/// One Newton step per bin, no joint partition.
pub fn newton_update_per_bin(tensor: &BinTensor, learning_rate: f64) -> Vec<f64> {
    let n_scores = tensor.layout().n_scores();
    let mut update = vec![0.0; tensor.n_bins() * n_scores];
    let mut accum = BinAccum::zeroed(tensor.layout());
    for bin in 0..tensor.n_bins() {
        accum.reset();
        accum.add_bin(tensor, bin);
        for k in 0..n_scores {
            update[bin * n_scores + k] = newton_step(&accum, k, learning_rate);
        }
    }
    update
}

/// Gain of the per-bin partition relative to no partition.
pub fn per_bin_gain(tensor: &BinTensor) -> f64 {
    let mut accum = BinAccum::zeroed(tensor.layout());
    let mut children = 0.0;
    for bin in 0..tensor.n_bins() {
        accum.reset();
        accum.add_bin(tensor, bin);
        children += partial_gain(&accum);
    }
    let total = segment_accum(tensor, 0, tensor.n_bins());
    (children - partial_gain(&total)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::bins::BinLayout;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// 1-D regression tensor from (count, weight, grad) triples.
    fn tensor_1d(bins: &[(u64, f64, f64)]) -> BinTensor {
        let layout = BinLayout::new(1, false);
        let mut tensor = BinTensor::new(layout, &[bins.len()]).unwrap();
        let (counts, stats) = tensor.lanes_mut();
        for (bin, &(count, weight, grad)) in bins.iter().enumerate() {
            counts[bin] = count;
            stats[bin * 2] = weight;
            stats[bin * 2 + 1] = grad;
        }
        tensor
    }

    fn params(leaves_max: usize) -> SplitParams {
        SplitParams {
            learning_rate: 1.0,
            min_samples_leaf: 1,
            leaves_max,
        }
    }

    #[test]
    fn obvious_boundary_is_found() {
        // Gradients flip sign between bins 1 and 2.
        let tensor = tensor_1d(&[
            (4, 4.0, -4.0),
            (4, 4.0, -4.0),
            (4, 4.0, 4.0),
            (4, 4.0, 4.0),
        ]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let outcome = split_main_effect(&tensor, &params(2), &mut scratch, &mut rng);

        assert_eq!(outcome.n_leaves, 2);
        // Left mean residual is -1, right is +1; Newton flips the sign.
        assert_relative_eq!(outcome.update[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[2], -1.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[3], -1.0, epsilon = 1e-12);
        // gain = 64/8 + 64/8 - 0 = 16
        assert_relative_eq!(outcome.gain_total, 16.0, epsilon = 1e-12);
    }

    #[test]
    fn learning_rate_scales_updates() {
        let tensor = tensor_1d(&[(2, 2.0, -2.0), (2, 2.0, 2.0)]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let outcome = split_main_effect(
            &tensor,
            &SplitParams {
                learning_rate: 0.25,
                min_samples_leaf: 1,
                leaves_max: 2,
            },
            &mut scratch,
            &mut rng,
        );
        assert_relative_eq!(outcome.update[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[1], -0.25, epsilon = 1e-12);
    }

    #[test]
    fn min_samples_leaf_blocks_thin_splits() {
        // The only gainful boundary isolates a single sample.
        let tensor = tensor_1d(&[(1, 1.0, -9.0), (5, 5.0, 0.5), (5, 5.0, 0.5)]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let outcome = split_main_effect(
            &tensor,
            &SplitParams {
                learning_rate: 1.0,
                min_samples_leaf: 2,
                leaves_max: 4,
            },
            &mut scratch,
            &mut rng,
        );
        // Boundary 1 is forbidden; only boundary 2 remains legal.
        assert_eq!(outcome.n_leaves, 2);
        assert_relative_eq!(outcome.update[2], -0.1, epsilon = 1e-12);
    }

    #[test]
    fn greedy_growth_reaches_leaves_max() {
        let tensor = tensor_1d(&[
            (2, 2.0, -6.0),
            (2, 2.0, -2.0),
            (2, 2.0, 2.0),
            (2, 2.0, 6.0),
        ]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let outcome = split_main_effect(&tensor, &params(4), &mut scratch, &mut rng);
        assert_eq!(outcome.n_leaves, 4);
        // Every bin ends up in its own leaf.
        assert_relative_eq!(outcome.update[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[2], -1.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.update[3], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn symmetric_ties_draw_from_both_boundaries() {
        // A perfectly symmetric histogram: boundaries 1 and 3 tie.
        let tensor = tensor_1d(&[
            (2, 2.0, -4.0),
            (2, 2.0, 0.0),
            (2, 2.0, 0.0),
            (2, 2.0, 4.0),
        ]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut seen = std::collections::HashSet::new();
        for seed in 0..40 {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            let total = segment_accum(&tensor, 0, 4);
            let (boundary, _) =
                best_split(&tensor, 0, 4, &total, 1, &mut scratch, &mut rng).unwrap();
            seen.insert(boundary);
        }
        assert!(seen.contains(&1));
        assert!(seen.contains(&3));
        assert!(!seen.contains(&2));
    }

    #[test]
    fn flat_gradients_produce_no_split() {
        let tensor = tensor_1d(&[(3, 3.0, 1.0), (3, 3.0, 1.0), (3, 3.0, 1.0)]);
        let mut scratch = SweepScratch::new(tensor.layout());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let outcome = split_main_effect(&tensor, &params(8), &mut scratch, &mut rng);
        assert_eq!(outcome.n_leaves, 1);
        assert_eq!(outcome.gain_total, 0.0);
        // Single Newton step over the whole axis: -3/9.
        assert_relative_eq!(outcome.update[0], -(1.0 / 3.0), epsilon = 1e-12);
    }

    #[test]
    fn empty_bins_get_no_update_under_per_bin_newton() {
        let tensor = tensor_1d(&[(2, 2.0, -1.0), (0, 0.0, 0.0)]);
        let update = newton_update_per_bin(&tensor, 0.5);
        assert_relative_eq!(update[0], 0.25, epsilon = 1e-12);
        assert_eq!(update[1], 0.0);
    }

    #[test]
    fn per_bin_gain_nonnegative() {
        let tensor = tensor_1d(&[(2, 2.0, -3.0), (2, 2.0, 3.0)]);
        assert_relative_eq!(per_bin_gain(&tensor), 9.0, epsilon = 1e-12);

        let flat = tensor_1d(&[(2, 2.0, 1.0), (2, 2.0, 1.0)]);
        assert_relative_eq!(per_bin_gain(&flat), 0.5 + 0.5 - 1.0, epsilon = 1e-12);
    }
}

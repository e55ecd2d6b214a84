//! Interaction strength scoring.
//!
//! Given a fully aggregated tensor for a term of two or more features,
//! the scorer answers: how much does the best *joint* partition beat the
//! best purely additive treatment of the same axes?
//!
//! Both sides use the splitter's gain formula (`Σ_k G_k²/H_k` per
//! region). The joint side searches one cut per axis, partitioning the
//! tensor into `2^D` cells. The additive baseline combines each axis's
//! best marginal binary split over its 1-D projection:
//!
//! ```text
//! strength = max(0, bestJoint − (Σ_d bestMarginal_d − (D−1)·totalGain))
//!            / weightTotal
//! ```
//!
//! For gradients that are additive across independent axes, the joint
//! gain of any cut tuple decomposes exactly into the marginal gains
//! minus the shared total, so the strength is zero; a joint-only signal
//! (XOR-like) leaves the marginals blind and scores strictly positive.
//! Permuting bins within an axis permutes candidate cuts on both sides
//! equally and cannot manufacture strength on additive data.

use super::bins::{BinAccum, BinLayout, BinTensor};
use super::split::partial_gain;

/// Interaction strength of an aggregated tensor, averaged per unit of
/// dataset weight. Returns 0 for degenerate shapes.
pub fn interaction_strength(tensor: &BinTensor, min_samples_leaf: u64) -> f64 {
    let shape = tensor.shape();
    if shape.len() < 2 || shape.iter().any(|&n| n < 2) {
        return 0.0;
    }

    let mut total = BinAccum::zeroed(tensor.layout());
    for bin in 0..tensor.n_bins() {
        total.add_bin(tensor, bin);
    }
    let weight_total = total.weight();
    if !(weight_total > 0.0) {
        return 0.0;
    }
    let total_gain = partial_gain(&total);

    // Additive baseline: best binary split per axis, over projections.
    let mut marginal_sum = 0.0;
    for dim in 0..shape.len() {
        let projection = tensor.project(dim);
        marginal_sum += best_marginal_gain(&projection, min_samples_leaf, total_gain);
    }
    let additive = marginal_sum - (shape.len() as f64 - 1.0) * total_gain;

    let joint = match shape.len() {
        2 => best_joint_gain_2d(tensor, min_samples_leaf),
        _ => best_joint_gain_nd(tensor, min_samples_leaf),
    };
    let Some(joint) = joint else {
        return 0.0;
    };

    ((joint - additive) / weight_total).max(0.0)
}

/// Best `pg(left) + pg(right)` over one axis; the unsplit parent when no
/// boundary is admissible.
fn best_marginal_gain(projection: &BinTensor, min_samples_leaf: u64, parent_gain: f64) -> f64 {
    let n_bins = projection.n_bins();
    let mut total = BinAccum::zeroed(projection.layout());
    for bin in 0..n_bins {
        total.add_bin(projection, bin);
    }

    let mut left = BinAccum::zeroed(projection.layout());
    let mut right = BinAccum::zeroed(projection.layout());
    let mut best = f64::NEG_INFINITY;
    for boundary in 1..n_bins {
        left.add_bin(projection, boundary - 1);
        if left.count() < min_samples_leaf {
            continue;
        }
        right.assign_diff(&total, &left);
        if right.count() < min_samples_leaf {
            break;
        }
        let gain = partial_gain(&left) + partial_gain(&right);
        if gain > best {
            best = gain;
        }
    }
    if best.is_finite() {
        best
    } else {
        parent_gain
    }
}

// =============================================================================
// Joint search, two dimensions
// =============================================================================

/// Prefix sums over a 2-D tensor: entry `(i, j)` aggregates every bin
/// with `a < i` and `b < j`, so any axis-aligned cell is four lookups.
struct CumGrid {
    layout: BinLayout,
    n_a: usize,
    counts: Vec<u64>,
    stats: Vec<f64>,
}

impl CumGrid {
    fn build(tensor: &BinTensor) -> Self {
        let layout = tensor.layout();
        let stride = layout.stats_stride();
        let [n_a, n_b] = [tensor.shape()[0], tensor.shape()[1]];
        let rows = n_a + 1;
        let cols = n_b + 1;
        let mut counts = vec![0u64; rows * cols];
        let mut stats = vec![0.0f64; rows * cols * stride];
        for a in 0..n_a {
            for b in 0..n_b {
                let bin = a + n_a * b;
                let cell = (a + 1) + rows * (b + 1);
                let left = a + rows * (b + 1);
                let below = (a + 1) + rows * b;
                let corner = a + rows * b;
                counts[cell] = tensor.count(bin) + counts[left] + counts[below] - counts[corner];
                for slot in 0..stride {
                    let value = bin_stat(tensor, bin, slot);
                    stats[cell * stride + slot] = value + stats[left * stride + slot]
                        + stats[below * stride + slot]
                        - stats[corner * stride + slot];
                }
            }
        }
        Self {
            layout,
            n_a,
            counts,
            stats,
        }
    }

    /// Cell `[a0, a1) × [b0, b1)` into `accum`, via `scratch`.
    fn cell(
        &self,
        a0: usize,
        a1: usize,
        b0: usize,
        b1: usize,
        scratch: &mut [f64],
        accum: &mut BinAccum,
    ) {
        let rows = self.n_a + 1;
        let stride = self.layout.stats_stride();
        debug_assert_eq!(scratch.len(), stride);
        let idx = |a: usize, b: usize| a + rows * b;
        let count = (self.counts[idx(a1, b1)] - self.counts[idx(a0, b1)])
            - (self.counts[idx(a1, b0)] - self.counts[idx(a0, b0)]);
        for (slot, value) in scratch.iter_mut().enumerate() {
            *value = self.stats[idx(a1, b1) * stride + slot]
                - self.stats[idx(a0, b1) * stride + slot]
                - self.stats[idx(a1, b0) * stride + slot]
                + self.stats[idx(a0, b0) * stride + slot];
        }
        accum.set_raw(count, scratch);
    }
}

fn bin_stat(tensor: &BinTensor, bin: usize, slot: usize) -> f64 {
    let layout = tensor.layout();
    if slot == 0 {
        tensor.weight(bin)
    } else if layout.with_hessians() {
        let k = (slot - 1) / 2;
        if (slot - 1) % 2 == 0 {
            tensor.grad(bin, k)
        } else {
            tensor.hess(bin, k)
        }
    } else {
        tensor.grad(bin, slot - 1)
    }
}

fn best_joint_gain_2d(tensor: &BinTensor, min_samples_leaf: u64) -> Option<f64> {
    let [n_a, n_b] = [tensor.shape()[0], tensor.shape()[1]];
    let grid = CumGrid::build(tensor);
    let mut cell = BinAccum::zeroed(tensor.layout());
    let mut scratch = vec![0.0; tensor.layout().stats_stride()];
    let mut best: Option<f64> = None;

    for cut_a in 1..n_a {
        for cut_b in 1..n_b {
            let mut gain = 0.0;
            let mut admissible = true;
            for (a0, a1) in [(0, cut_a), (cut_a, n_a)] {
                for (b0, b1) in [(0, cut_b), (cut_b, n_b)] {
                    grid.cell(a0, a1, b0, b1, &mut scratch, &mut cell);
                    if cell.count() < min_samples_leaf {
                        admissible = false;
                        break;
                    }
                    gain += partial_gain(&cell);
                }
                if !admissible {
                    break;
                }
            }
            if admissible && best.map_or(true, |b| gain > b) {
                best = Some(gain);
            }
        }
    }
    best
}

// =============================================================================
// Joint search, three or more dimensions
// =============================================================================

fn best_joint_gain_nd(tensor: &BinTensor, min_samples_leaf: u64) -> Option<f64> {
    let shape = tensor.shape().to_vec();
    let n_dims = shape.len();
    let n_cells = 1usize << n_dims;
    let mut cells: Vec<BinAccum> = (0..n_cells)
        .map(|_| BinAccum::zeroed(tensor.layout()))
        .collect();

    // Odometer over one cut position per axis.
    let mut cuts: Vec<usize> = vec![1; n_dims];
    let mut best: Option<f64> = None;
    loop {
        for cell in cells.iter_mut() {
            cell.reset();
        }
        for bin in 0..tensor.n_bins() {
            let mut remainder = bin;
            let mut cell_index = 0usize;
            for (dim, &n) in shape.iter().enumerate() {
                let coordinate = remainder % n;
                remainder /= n;
                if coordinate >= cuts[dim] {
                    cell_index |= 1 << dim;
                }
            }
            cells[cell_index].add_bin(tensor, bin);
        }
        if cells.iter().all(|c| c.count() >= min_samples_leaf) {
            let gain: f64 = cells.iter().map(partial_gain).sum();
            if best.map_or(true, |b| gain > b) {
                best = Some(gain);
            }
        }

        // Advance the odometer.
        let mut dim = 0;
        loop {
            if dim == n_dims {
                return best;
            }
            cuts[dim] += 1;
            if cuts[dim] < shape[dim] {
                break;
            }
            cuts[dim] = 1;
            dim += 1;
        }
    }
}

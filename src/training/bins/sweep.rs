//! Tie-deferral scratch for the split sweep.
//!
//! While sweeping candidate boundaries over a sorted bin sequence, the
//! splitter often finds several boundaries with exactly equal gain. Each
//! record here holds one such boundary together with the left-side
//! statistics accumulated up to it, so the final choice between ties can
//! be made once, after the sweep, without rescanning the histogram. The
//! inline bin payload is sized by the tensor's [`BinLayout`], the same
//! way the tensor's own records are.
//!
//! Tie resolution draws uniformly from the recorded boundaries with the
//! handle RNG. This is the one place the splitter consumes randomness.

use rand::Rng;

use super::tensor::{BinAccum, BinLayout};

/// One candidate boundary with its accumulated left-side statistics.
#[derive(Clone, Debug)]
pub struct TreeSweep {
    boundary: usize,
    best_left: BinAccum,
}

impl TreeSweep {
    #[inline]
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    #[inline]
    pub fn best_left(&self) -> &BinAccum {
        &self.best_left
    }
}

/// Reusable array of sweep records.
///
/// `reset` keeps the backing allocations (including each record's inline
/// bin buffer) alive across sweeps; a boosting run performs one sweep per
/// candidate leaf per term per round, so the records recycle constantly.
#[derive(Debug)]
pub struct SweepScratch {
    layout: BinLayout,
    records: Vec<TreeSweep>,
    len: usize,
}

impl SweepScratch {
    pub fn new(layout: BinLayout) -> Self {
        Self {
            layout,
            records: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn layout(&self) -> BinLayout {
        self.layout
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop all records, keeping their buffers.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Reset for a (possibly different) bin layout.
    pub fn reset_with_layout(&mut self, layout: BinLayout) {
        if layout != self.layout {
            self.layout = layout;
            self.records.clear();
        }
        self.len = 0;
    }

    /// Append a tied boundary and a copy of its left-side statistics.
    pub fn record(&mut self, boundary: usize, left: &BinAccum) {
        debug_assert_eq!(left.layout(), self.layout);
        if self.len < self.records.len() {
            let slot = &mut self.records[self.len];
            slot.boundary = boundary;
            slot.best_left.assign(left);
        } else {
            self.records.push(TreeSweep {
                boundary,
                best_left: left.clone(),
            });
        }
        self.len += 1;
    }

    #[inline]
    pub fn get(&self, index: usize) -> &TreeSweep {
        debug_assert!(index < self.len);
        &self.records[index]
    }

    /// Resolve the tie: draw one recorded boundary uniformly.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> &TreeSweep {
        debug_assert!(self.len > 0, "choose on an empty sweep scratch");
        let index = if self.len == 1 {
            0
        } else {
            rng.gen_range(0..self.len)
        };
        &self.records[index]
    }
}

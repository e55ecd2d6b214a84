//! Sample replication bags.
//!
//! A bag is a per-sample array of signed multiplicities: positive entries
//! replicate a sample into the training set, negative entries into the
//! validation set, and zero excludes it. Every sample-level walk in the
//! trainer honors these multiplicities, so the expanded training and
//! validation sets can be larger or smaller than the source dataset.

/// Which side of a bag a walk selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BagPass {
    /// Entries with positive multiplicity.
    Training,
    /// Entries with negative multiplicity.
    Validation,
    /// Every nonzero entry. Used by interaction detection, which scores
    /// over the full bagged dataset rather than one side of it.
    All,
}

impl BagPass {
    #[inline]
    fn matches(self, replication: i32) -> bool {
        match self {
            BagPass::Training => replication > 0,
            BagPass::Validation => replication < 0,
            BagPass::All => replication != 0,
        }
    }
}

/// Per-sample replication multiplicities.
#[derive(Clone, Debug)]
pub struct SampleBag {
    entries: Vec<i32>,
}

impl SampleBag {
    pub fn new(entries: Vec<i32>) -> Self {
        Self { entries }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    /// Number of expanded samples a pass over this bag produces.
    pub fn expanded_count(&self, pass: BagPass) -> usize {
        self.entries
            .iter()
            .filter(|&&r| pass.matches(r))
            .map(|&r| r.unsigned_abs() as usize)
            .sum()
    }
}

/// Iterator over the source samples a pass selects.
///
/// Yields `(source_index, multiplicity)` for each bag entry matching the
/// pass; callers emit each selected sample `multiplicity` times into
/// contiguous positions of whatever buffer they are filling. When no bag
/// is supplied every sample counts once toward training, which is exactly
/// what an all-ones bag would produce.
pub struct BagIter<'a> {
    entries: Option<&'a [i32]>,
    pass: BagPass,
    pos: usize,
    n_samples: usize,
}

impl<'a> BagIter<'a> {
    pub fn new(bag: Option<&'a SampleBag>, pass: BagPass, n_samples: usize) -> Self {
        debug_assert!(bag.map_or(true, |b| b.len() == n_samples));
        Self {
            entries: bag.map(|b| b.entries()),
            pass,
            pos: 0,
            n_samples,
        }
    }
}

impl Iterator for BagIter<'_> {
    /// (source sample index, replication magnitude)
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self.entries {
            None => {
                // No bag: every sample trains once, validation is empty.
                if self.pass == BagPass::Validation || self.pos >= self.n_samples {
                    return None;
                }
                let item = (self.pos, 1);
                self.pos += 1;
                Some(item)
            }
            Some(entries) => {
                while self.pos < entries.len() {
                    let index = self.pos;
                    let replication = entries[index];
                    self.pos += 1;
                    if self.pass.matches(replication) {
                        return Some((index, replication.unsigned_abs() as usize));
                    }
                }
                None
            }
        }
    }
}

/// Expanded sample count for an optional bag.
pub fn expanded_count(bag: Option<&SampleBag>, pass: BagPass, n_samples: usize) -> usize {
    match bag {
        Some(bag) => bag.expanded_count(pass),
        None => match pass {
            BagPass::Validation => 0,
            _ => n_samples,
        },
    }
}

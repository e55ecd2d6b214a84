//! The boosting handle.
//!
//! A [`Booster`] owns everything one boosting run needs: the expanded
//! training and validation sides of the bag, the gradient buffers, the
//! per-term score tensors, the RNG, and the scratch structures the
//! splitter works in. The caller drives it round by round:
//!
//! 1. [`Booster::generate_term_update`] aggregates the term's histogram
//!    over the training samples and derives a candidate update,
//! 2. optionally, [`Booster::set_term_update`] overrides the candidate,
//! 3. [`Booster::apply_term_update`] folds the update into the model
//!    and the per-sample scores, refreshes gradients, and reads the
//!    validation metric.
//!
//! The three calls form a strict per-round cycle; generating a second
//! update while one is pending, or applying with none pending, is an
//! error. Every round ends back in the fresh-gradients state.

mod detector;
mod flags;
mod logger;

pub use detector::{DetectorConfig, InteractionDetector};
pub use flags::{BoostFlags, InteractionFlags};
pub use logger::{TrainingLogger, Verbosity};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{expanded_count, BagPass, Dataset, SampleBag, Targets};
use crate::error::Error;
use crate::training::bins::{
    bin_sums_parallel, debug_check_weight_total, tensor_index, BinLayout, BinSumsArgs,
    SweepScratch, TensorPool, DIMENSIONS_MAX,
};
use crate::training::gradients::GradHessBuf;
use crate::training::init::{
    expand_bins, expand_classes, expand_records, expand_values, init_rmse_boosting,
};
use crate::training::objectives::Objective;
use crate::training::split::{
    newton_update_per_bin, per_bin_gain, split_main_effect, SplitParams,
};
use crate::utils::Parallelism;

// =============================================================================
// Configuration
// =============================================================================

/// Everything needed to create a [`Booster`].
#[derive(Clone, Debug)]
pub struct BoosterConfig<'a> {
    pub dataset: &'a Dataset,
    /// Objective name, e.g. `"rmse"` or `"log_loss"`.
    pub objective: &'a str,
    /// Signed replication bag; `None` trains on every sample once.
    pub bag: Option<&'a SampleBag>,
    /// Per-sample initial score records (`n_scores` wide), or `None`.
    pub init_scores: Option<&'a [f64]>,
    /// Term shapes: the ordered feature indices of each term.
    pub terms: &'a [Vec<usize>],
    /// Bootstrap count for inner bagging; 0 disables it.
    pub n_inner_bags: usize,
    /// Differential-privacy request; not available in this build.
    pub differentially_private: bool,
    /// Reference class selection for classification scores.
    pub i_zero_logit: Option<usize>,
    pub seed: u64,
    pub parallelism: Parallelism,
    pub verbosity: Verbosity,
}

impl<'a> BoosterConfig<'a> {
    pub fn new(dataset: &'a Dataset, objective: &'a str, terms: &'a [Vec<usize>]) -> Self {
        Self {
            dataset,
            objective,
            bag: None,
            init_scores: None,
            terms,
            n_inner_bags: 0,
            differentially_private: false,
            i_zero_logit: None,
            seed: 0,
            parallelism: Parallelism::Sequential,
            verbosity: Verbosity::Silent,
        }
    }
}

// =============================================================================
// Internal pieces
// =============================================================================

/// A term with its single-bin dimensions stripped.
///
/// Stripped dimensions contribute a factor of 1 to the tensor size, so
/// the exposed score tensor and the aggregation tensor have identical
/// extents either way.
#[derive(Clone, Debug)]
struct TermInfo {
    features: Vec<usize>,
    significant: Vec<usize>,
    shape: Vec<usize>,
    n_tensor_bins: usize,
}

/// One bootstrap replicate of the training set, carried as weights.
///
/// The occurrence counts ride on the weight array; this is why the
/// boosting kernel multiplies gradients by weight at accumulation time
/// rather than at initialization.
#[derive(Clone, Debug)]
struct InnerBag {
    weights: Vec<f64>,
    weight_total: f64,
}

#[derive(Clone, Debug)]
struct PendingUpdate {
    term: usize,
    update: Vec<f64>,
}

/// Objective-specific per-sample state.
///
/// RMSE keeps no scores: the gradient is the residual and absorbs
/// applied updates directly. Classification keeps logits per sample and
/// rewrites the gradient/Hessian pairs after every apply.
#[derive(Clone, Debug)]
enum SampleState {
    Rmse {
        train_gradients: GradHessBuf,
        val_gradients: Vec<f64>,
    },
    Classification {
        train_scores: Vec<f64>,
        train_classes: Vec<u32>,
        train_grad_hess: GradHessBuf,
        val_scores: Vec<f64>,
        val_classes: Vec<u32>,
    },
}

// =============================================================================
// Booster
// =============================================================================

/// A boosting run over one dataset, bag, and term list.
pub struct Booster {
    objective: Objective,
    terms: Vec<TermInfo>,

    train_columns: Vec<Vec<u16>>,
    train_weights: Option<Vec<f64>>,
    train_weight_total: f64,
    n_train: usize,

    val_columns: Vec<Vec<u16>>,
    val_weights: Option<Vec<f64>>,
    n_val: usize,

    state: SampleState,
    inner_bags: Vec<InnerBag>,

    term_scores: Vec<Vec<f64>>,
    best_term_scores: Vec<Vec<f64>>,
    best_metric: f64,
    pending: Option<PendingUpdate>,

    rng: Xoshiro256PlusPlus,
    scratch: SweepScratch,
    pool: TensorPool,
    parallelism: Parallelism,
    logger: TrainingLogger,
    round: u64,
}

impl Booster {
    /// Create a boosting handle. All construction errors surface here;
    /// no handle is produced on failure.
    pub fn new(config: BoosterConfig<'_>) -> Result<Self, Error> {
        if config.differentially_private {
            return Err(Error::Unsupported("differential privacy"));
        }
        let dataset = config.dataset;
        let n_samples = dataset.n_samples();

        let objective =
            Objective::from_name(config.objective, dataset.targets(), config.i_zero_logit)?;
        let n_scores = objective.n_scores();
        let layout = BinLayout::new(n_scores, objective.with_hessians());
        if layout.is_overflow() {
            return Err(Error::BinRecordOverflow { n_scores });
        }

        if let Some(bag) = config.bag {
            if bag.len() != n_samples {
                return Err(Error::BadDataset(format!(
                    "bag has {} entries, dataset has {n_samples} samples",
                    bag.len()
                )));
            }
        }
        if let Some(init_scores) = config.init_scores {
            if init_scores.len() != n_samples * n_scores {
                return Err(Error::BadDataset(format!(
                    "init scores have {} entries, expected {}",
                    init_scores.len(),
                    n_samples * n_scores
                )));
            }
        }

        let terms = config
            .terms
            .iter()
            .map(|features| Self::build_term(dataset, features))
            .collect::<Result<Vec<_>, _>>()?;

        let n_train = expanded_count(config.bag, BagPass::Training, n_samples);
        let n_val = expanded_count(config.bag, BagPass::Validation, n_samples);
        if n_train == 0 {
            return Err(Error::BadDataset("bag selects no training samples".into()));
        }

        let expand_feature = |pass: BagPass, expanded: usize| -> Vec<Vec<u16>> {
            (0..dataset.n_features())
                .map(|f| expand_bins(dataset.feature(f).bins(), config.bag, pass, expanded))
                .collect()
        };
        let train_columns = expand_feature(BagPass::Training, n_train);
        let val_columns = expand_feature(BagPass::Validation, n_val);

        let train_weights = dataset
            .weights()
            .map(|w| expand_values(w, config.bag, BagPass::Training, n_train));
        let val_weights = dataset
            .weights()
            .map(|w| expand_values(w, config.bag, BagPass::Validation, n_val));
        let train_weight_total = match &train_weights {
            Some(w) => w.iter().sum(),
            None => n_train as f64,
        };

        let state = match (&objective, dataset.targets()) {
            (Objective::Rmse(_), Targets::Regression(targets)) => {
                let mut train_gradients = GradHessBuf::new(n_train, 1, false);
                init_rmse_boosting(
                    targets,
                    config.init_scores,
                    config.bag,
                    BagPass::Training,
                    train_gradients.as_mut_slice(),
                );
                let mut val_gradients = vec![0.0; n_val];
                init_rmse_boosting(
                    targets,
                    config.init_scores,
                    config.bag,
                    BagPass::Validation,
                    &mut val_gradients,
                );
                SampleState::Rmse {
                    train_gradients,
                    val_gradients,
                }
            }
            (Objective::LogLoss(log_loss), Targets::Classification { classes, .. }) => {
                let train_classes = expand_classes(classes, config.bag, BagPass::Training, n_train);
                let val_classes = expand_classes(classes, config.bag, BagPass::Validation, n_val);
                let expand_scores = |pass: BagPass, expanded: usize| match config.init_scores {
                    Some(scores) => {
                        expand_records(scores, n_scores, n_samples, config.bag, pass, expanded)
                    }
                    None => vec![0.0; expanded * n_scores],
                };
                let train_scores = expand_scores(BagPass::Training, n_train);
                let val_scores = expand_scores(BagPass::Validation, n_val);
                let mut train_grad_hess = GradHessBuf::new(n_train, n_scores, true);
                log_loss.refresh_grad_hess(&train_scores, &train_classes, &mut train_grad_hess);
                SampleState::Classification {
                    train_scores,
                    train_classes,
                    train_grad_hess,
                    val_scores,
                    val_classes,
                }
            }
            _ => unreachable!("objective resolution enforces target kind"),
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let inner_bags = (0..config.n_inner_bags)
            .map(|_| Self::draw_inner_bag(&mut rng, n_train, train_weights.as_deref()))
            .collect();

        let term_scores: Vec<Vec<f64>> = terms
            .iter()
            .map(|t| vec![0.0; t.n_tensor_bins * n_scores])
            .collect();

        Ok(Self {
            objective,
            best_term_scores: term_scores.clone(),
            term_scores,
            terms,
            train_columns,
            train_weights,
            train_weight_total,
            n_train,
            val_columns,
            val_weights,
            n_val,
            state,
            inner_bags,
            best_metric: f64::INFINITY,
            pending: None,
            rng,
            scratch: SweepScratch::new(layout),
            pool: TensorPool::new(),
            parallelism: config.parallelism,
            logger: TrainingLogger::new(config.verbosity),
            round: 0,
        })
    }

    fn build_term(dataset: &Dataset, features: &[usize]) -> Result<TermInfo, Error> {
        if features.len() > DIMENSIONS_MAX {
            return Err(Error::TooManyDimensions(features.len(), DIMENSIONS_MAX));
        }
        let mut significant = Vec::new();
        let mut shape = Vec::new();
        let mut n_tensor_bins = 1usize;
        for &feature in features {
            if feature >= dataset.n_features() {
                return Err(Error::FeatureIndexOutOfRange {
                    feature,
                    n_features: dataset.n_features(),
                });
            }
            let n_bins = dataset.feature(feature).n_bins();
            // Single-bin features carry no information; strip them here
            // so the kernel never sees a one-bin dimension.
            if n_bins >= 2 {
                significant.push(feature);
                shape.push(n_bins);
                n_tensor_bins = n_tensor_bins
                    .checked_mul(n_bins)
                    .ok_or_else(|| Error::BadDataset("term tensor overflows".into()))?;
            }
        }
        Ok(TermInfo {
            features: features.to_vec(),
            significant,
            shape,
            n_tensor_bins,
        })
    }

    fn draw_inner_bag(
        rng: &mut Xoshiro256PlusPlus,
        n_train: usize,
        base_weights: Option<&[f64]>,
    ) -> InnerBag {
        let mut counts = vec![0u32; n_train];
        for _ in 0..n_train {
            counts[rng.gen_range(0..n_train)] += 1;
        }
        let weights: Vec<f64> = counts
            .iter()
            .enumerate()
            .map(|(sample, &count)| {
                base_weights.map_or(1.0, |w| w[sample]) * count as f64
            })
            .collect();
        let weight_total = weights.iter().sum();
        InnerBag {
            weights,
            weight_total,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn n_train_samples(&self) -> usize {
        self.n_train
    }

    #[inline]
    pub fn n_validation_samples(&self) -> usize {
        self.n_val
    }

    pub fn objective_name(&self) -> &'static str {
        self.objective.name()
    }

    /// Feature indices of a term, as given at creation.
    pub fn term_features(&self, term: usize) -> &[usize] {
        &self.terms[term].features
    }

    // =========================================================================
    // Round operations
    // =========================================================================

    /// Aggregate a term's histogram and derive a candidate update.
    ///
    /// Returns the average gain per unit of training weight, averaged
    /// across inner bags when those are configured. The update is held
    /// pending until [`apply_term_update`](Self::apply_term_update).
    pub fn generate_term_update(
        &mut self,
        term: usize,
        flags: BoostFlags,
        learning_rate: f64,
        min_samples_leaf: u64,
        leaves_max: usize,
    ) -> Result<f64, Error> {
        if term >= self.terms.len() {
            return Err(Error::InvalidArgument("term index out of range"));
        }
        if self.pending.is_some() {
            return Err(Error::InvalidOperation(
                "an update is already pending; apply it first",
            ));
        }
        if !learning_rate.is_finite() {
            return Err(Error::InvalidArgument("learning_rate must be finite"));
        }

        let n_scores = self.objective.n_scores();
        let info = self.terms[term].clone();
        let update_len = info.n_tensor_bins * n_scores;

        if info.significant.is_empty() {
            self.pending = Some(PendingUpdate {
                term,
                update: vec![0.0; update_len],
            });
            return Ok(0.0);
        }

        let layout = BinLayout::new(n_scores, self.objective.with_hessians());
        let columns: Vec<&[u16]> = info
            .significant
            .iter()
            .map(|&f| self.train_columns[f].as_slice())
            .collect();
        let grad_hess = match &self.state {
            SampleState::Rmse {
                train_gradients, ..
            } => train_gradients.as_slice(),
            SampleState::Classification { train_grad_hess, .. } => train_grad_hess.as_slice(),
        };

        let n_variants = self.inner_bags.len().max(1);
        let mut update_avg = vec![0.0; update_len];
        let mut gain_avg = 0.0;

        for variant in 0..n_variants {
            let (weights, weight_total) = match self.inner_bags.get(variant) {
                Some(bag) => (Some(bag.weights.as_slice()), bag.weight_total),
                None => (self.train_weights.as_deref(), self.train_weight_total),
            };
            let args = BinSumsArgs {
                columns: &columns,
                n_bins: &info.shape,
                grad_hess,
                weights,
                n_scores,
                with_hessians: self.objective.with_hessians(),
                pre_weighted: false,
            };
            let mut tensor = self.pool.acquire(layout, &info.shape)?;
            bin_sums_parallel(self.parallelism, &mut tensor, &args);
            debug_check_weight_total(&tensor, weight_total);

            let (update, gain, n_leaves) = if flags.contains(BoostFlags::GRADIENT_SUMS) {
                // Sum-only diagnostic round: the model must not move.
                (vec![0.0; update_len], 0.0, 1)
            } else if info.shape.len() == 1 {
                let outcome = split_main_effect(
                    &tensor,
                    &SplitParams {
                        learning_rate,
                        min_samples_leaf,
                        leaves_max,
                    },
                    &mut self.scratch,
                    &mut self.rng,
                );
                (outcome.update, outcome.gain_total, outcome.n_leaves)
            } else {
                let update = newton_update_per_bin(&tensor, learning_rate);
                let gain = per_bin_gain(&tensor);
                let n_leaves = tensor.n_bins();
                (update, gain, n_leaves)
            };
            self.pool.release(tensor);
            self.logger.term_update(term, gain, n_leaves);

            for (dst, src) in update_avg.iter_mut().zip(&update) {
                *dst += src;
            }
            gain_avg += gain / weight_total;
        }

        let scale = 1.0 / n_variants as f64;
        for value in &mut update_avg {
            *value *= scale;
        }
        self.pending = Some(PendingUpdate {
            term,
            update: update_avg,
        });
        Ok(gain_avg * scale)
    }

    /// Override the pending update (or install one directly).
    ///
    /// `scores` must cover the term's full tensor: one record of
    /// `n_scores` values per bin.
    pub fn set_term_update(&mut self, term: usize, scores: &[f64]) -> Result<(), Error> {
        if term >= self.terms.len() {
            return Err(Error::InvalidArgument("term index out of range"));
        }
        let expected = self.terms[term].n_tensor_bins * self.objective.n_scores();
        if scores.len() != expected {
            return Err(Error::InvalidArgument("update tensor has the wrong size"));
        }
        if let Some(pending) = &self.pending {
            if pending.term != term {
                return Err(Error::InvalidOperation(
                    "a different term's update is pending",
                ));
            }
        }
        self.pending = Some(PendingUpdate {
            term,
            update: scores.to_vec(),
        });
        Ok(())
    }

    /// Apply the pending update and read the validation metric.
    ///
    /// A `NaN` metric (numerical overflow upstream, or an empty
    /// validation set) is the signal to stop boosting.
    pub fn apply_term_update(&mut self) -> Result<f64, Error> {
        let Some(PendingUpdate { term, update }) = self.pending.take() else {
            return Err(Error::InvalidOperation("no update pending"));
        };
        let info = &self.terms[term];
        let n_scores = self.objective.n_scores();

        for (current, delta) in self.term_scores[term].iter_mut().zip(&update) {
            *current += delta;
        }

        let train_columns: Vec<&[u16]> = info
            .significant
            .iter()
            .map(|&f| self.train_columns[f].as_slice())
            .collect();
        let val_columns: Vec<&[u16]> = info
            .significant
            .iter()
            .map(|&f| self.val_columns[f].as_slice())
            .collect();

        match &mut self.state {
            SampleState::Rmse {
                train_gradients,
                val_gradients,
            } => {
                // The residual is the gradient: moving the score by
                // delta moves the gradient by delta.
                let gradients = train_gradients.as_mut_slice();
                for sample in 0..self.n_train {
                    let bin = tensor_index(&train_columns, &info.shape, sample);
                    gradients[sample] += update[bin];
                }
                for sample in 0..self.n_val {
                    let bin = tensor_index(&val_columns, &info.shape, sample);
                    val_gradients[sample] += update[bin];
                }
            }
            SampleState::Classification {
                train_scores,
                train_classes,
                train_grad_hess,
                val_scores,
                val_classes: _,
            } => {
                for sample in 0..self.n_train {
                    let bin = tensor_index(&train_columns, &info.shape, sample);
                    for k in 0..n_scores {
                        train_scores[sample * n_scores + k] += update[bin * n_scores + k];
                    }
                }
                for sample in 0..self.n_val {
                    let bin = tensor_index(&val_columns, &info.shape, sample);
                    for k in 0..n_scores {
                        val_scores[sample * n_scores + k] += update[bin * n_scores + k];
                    }
                }
                if let Objective::LogLoss(log_loss) = &self.objective {
                    log_loss.refresh_grad_hess(train_scores, train_classes, train_grad_hess);
                }
            }
        }

        let metric = match &self.state {
            SampleState::Rmse { val_gradients, .. } => match &self.objective {
                Objective::Rmse(rmse) => {
                    rmse.validation_metric(val_gradients, self.val_weights.as_deref())
                }
                _ => unreachable!(),
            },
            SampleState::Classification {
                val_scores,
                val_classes,
                ..
            } => match &self.objective {
                Objective::LogLoss(log_loss) => {
                    log_loss.validation_metric(val_scores, val_classes, self.val_weights.as_deref())
                }
                _ => unreachable!(),
            },
        };

        if self.n_val == 0 || metric < self.best_metric {
            self.best_metric = metric;
            for (best, current) in self.best_term_scores.iter_mut().zip(&self.term_scores) {
                best.copy_from_slice(current);
            }
        }
        self.round += 1;
        self.logger
            .round_metric(self.round, self.objective.name(), metric);
        Ok(metric)
    }

    // =========================================================================
    // Score readout
    // =========================================================================

    /// Current model scores for one term, after every applied update.
    pub fn current_term_scores(&self, term: usize) -> Result<Vec<f64>, Error> {
        if term >= self.terms.len() {
            return Err(Error::InvalidArgument("term index out of range"));
        }
        Ok(self.render(self.term_scores[term].clone()))
    }

    /// Term scores of the model snapshot with the best validation
    /// metric seen so far.
    pub fn best_term_scores(&self, term: usize) -> Result<Vec<f64>, Error> {
        if term >= self.terms.len() {
            return Err(Error::InvalidArgument("term index out of range"));
        }
        Ok(self.render(self.best_term_scores[term].clone()))
    }

    fn render(&self, mut scores: Vec<f64>) -> Vec<f64> {
        if let Objective::LogLoss(log_loss) = &self.objective {
            log_loss.render_scores(&mut scores);
        }
        scores
    }
}

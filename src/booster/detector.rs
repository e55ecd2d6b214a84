//! The interaction-detection handle.
//!
//! Interaction detection scores candidate feature sets against a frozen
//! model: gradients are initialized once from the init scores and never
//! refreshed, and every nonzero bag entry is in scope, so the detector
//! looks at the whole bagged dataset rather than one side of it.
//!
//! When a weight array is present the gradients (and Hessians) are
//! multiplied by weight here, at initialization, and the aggregation
//! kernel runs in `pre_weighted` mode. The boosting handle does the
//! opposite: it multiplies during accumulation, because its weight
//! array also carries inner-bag counts. Exactly one side applies the
//! weight; which side depends on the handle.

use crate::data::{expanded_count, BagPass, Dataset, SampleBag, Targets};
use crate::error::Error;
use crate::training::bins::{
    bin_sums_parallel, debug_check_weight_total, BinLayout, BinSumsArgs, TensorPool,
    DIMENSIONS_MAX,
};
use crate::training::gradients::GradHessBuf;
use crate::training::init::{
    expand_bins, expand_classes, expand_records, expand_values, init_rmse_interaction,
};
use crate::training::interactions::interaction_strength;
use crate::training::objectives::Objective;
use crate::utils::Parallelism;

use super::flags::InteractionFlags;

/// Everything needed to create an [`InteractionDetector`].
#[derive(Clone, Debug)]
pub struct DetectorConfig<'a> {
    pub dataset: &'a Dataset,
    /// Objective name, e.g. `"rmse"` or `"log_loss"`.
    pub objective: &'a str,
    /// Signed replication bag; every nonzero entry is in scope.
    pub bag: Option<&'a SampleBag>,
    /// Per-sample initial score records (`n_scores` wide), or `None`.
    pub init_scores: Option<&'a [f64]>,
    /// Reference class selection for classification scores.
    pub i_zero_logit: Option<usize>,
    pub parallelism: Parallelism,
}

impl<'a> DetectorConfig<'a> {
    pub fn new(dataset: &'a Dataset, objective: &'a str) -> Self {
        Self {
            dataset,
            objective,
            bag: None,
            init_scores: None,
            i_zero_logit: None,
            parallelism: Parallelism::Sequential,
        }
    }
}

/// An interaction-strength scorer over one dataset and bag.
pub struct InteractionDetector {
    objective: Objective,
    columns: Vec<Vec<u16>>,
    feature_bins: Vec<usize>,
    weights: Option<Vec<f64>>,
    weight_total: f64,
    grad_hess: GradHessBuf,
    pool: TensorPool,
    parallelism: Parallelism,
}

impl InteractionDetector {
    /// Create a detection handle. All construction errors surface here;
    /// no handle is produced on failure.
    pub fn new(config: DetectorConfig<'_>) -> Result<Self, Error> {
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

        let n_expanded = expanded_count(config.bag, BagPass::All, n_samples);
        if n_expanded == 0 {
            return Err(Error::BadDataset("bag selects no samples".into()));
        }

        let columns: Vec<Vec<u16>> = (0..dataset.n_features())
            .map(|f| expand_bins(dataset.feature(f).bins(), config.bag, BagPass::All, n_expanded))
            .collect();
        let feature_bins: Vec<usize> = (0..dataset.n_features())
            .map(|f| dataset.feature(f).n_bins())
            .collect();
        let weights = dataset
            .weights()
            .map(|w| expand_values(w, config.bag, BagPass::All, n_expanded));
        let weight_total = match &weights {
            Some(w) => w.iter().sum(),
            None => n_expanded as f64,
        };

        let grad_hess = match (&objective, dataset.targets()) {
            (Objective::Rmse(_), Targets::Regression(targets)) => {
                let mut buf = GradHessBuf::new(n_expanded, 1, false);
                init_rmse_interaction(
                    targets,
                    config.init_scores,
                    config.bag,
                    weights.as_deref(),
                    buf.as_mut_slice(),
                );
                buf
            }
            (Objective::LogLoss(log_loss), Targets::Classification { classes, .. }) => {
                let expanded_classes =
                    expand_classes(classes, config.bag, BagPass::All, n_expanded);
                let scores = match config.init_scores {
                    Some(scores) => expand_records(
                        scores,
                        n_scores,
                        n_samples,
                        config.bag,
                        BagPass::All,
                        n_expanded,
                    ),
                    None => vec![0.0; n_expanded * n_scores],
                };
                let mut buf = GradHessBuf::new(n_expanded, n_scores, true);
                log_loss.refresh_grad_hess(&scores, &expanded_classes, &mut buf);
                if let Some(weights) = &weights {
                    // Fold the weights in once, up front; the kernel
                    // then runs pre-weighted.
                    let stride = buf.stride();
                    let data = buf.as_mut_slice();
                    for (sample, &w) in weights.iter().enumerate() {
                        for slot in &mut data[sample * stride..(sample + 1) * stride] {
                            *slot *= w;
                        }
                    }
                }
                buf
            }
            _ => unreachable!("objective resolution enforces target kind"),
        };

        Ok(Self {
            objective,
            columns,
            feature_bins,
            weights,
            weight_total,
            grad_hess,
            pool: TensorPool::new(),
            parallelism: config.parallelism,
        })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.grad_hess.n_samples()
    }

    pub fn objective_name(&self) -> &'static str {
        self.objective.name()
    }

    /// Interaction strength of a candidate feature set.
    ///
    /// Returns 0 when any named feature has fewer than two bins.
    pub fn calc_interaction_strength(
        &mut self,
        features: &[usize],
        _flags: InteractionFlags,
        min_samples_leaf: u64,
    ) -> Result<f64, Error> {
        if features.is_empty() {
            return Err(Error::InvalidArgument("empty feature set"));
        }
        if features.len() > DIMENSIONS_MAX {
            return Err(Error::TooManyDimensions(features.len(), DIMENSIONS_MAX));
        }
        for (position, &feature) in features.iter().enumerate() {
            if feature >= self.columns.len() {
                return Err(Error::FeatureIndexOutOfRange {
                    feature,
                    n_features: self.columns.len(),
                });
            }
            if features[..position].contains(&feature) {
                return Err(Error::InvalidArgument("duplicate feature in set"));
            }
        }
        if features
            .iter()
            .any(|&feature| self.feature_bins[feature] < 2)
        {
            return Ok(0.0);
        }

        let shape: Vec<usize> = features.iter().map(|&f| self.feature_bins[f]).collect();
        let columns: Vec<&[u16]> = features.iter().map(|&f| self.columns[f].as_slice()).collect();
        let layout = BinLayout::new(
            self.objective.n_scores(),
            self.objective.with_hessians(),
        );
        let args = BinSumsArgs {
            columns: &columns,
            n_bins: &shape,
            grad_hess: self.grad_hess.as_slice(),
            weights: self.weights.as_deref(),
            n_scores: self.objective.n_scores(),
            with_hessians: self.objective.with_hessians(),
            pre_weighted: self.weights.is_some(),
        };
        let mut tensor = self.pool.acquire(layout, &shape)?;
        bin_sums_parallel(self.parallelism, &mut tensor, &args);
        debug_check_weight_total(&tensor, self.weight_total);

        let strength = interaction_strength(&tensor, min_samples_leaf);
        self.pool.release(tensor);
        Ok(strength)
    }
}

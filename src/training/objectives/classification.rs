//! Log-loss classification objectives.

use crate::training::gradients::GradHessBuf;
use crate::training::metrics::{binary_log_loss, multiclass_log_loss};

/// Binary and multiclass cross-entropy.
///
/// Binary classification uses the single-logit convention: one stored
/// score argues for the positive class against the reference class, and
/// `i_zero_logit` selects which class plays the reference role
/// (class 0 by default). Multiclass stores all K logits; the
/// reference-class subtraction is a rendering convention applied when
/// scores are read out, never during training.
///
/// Per sample and score:
/// - Gradient: `p − y`, always in `[-1, 1]`
/// - Hessian: `p · (1 − p)`, always in `[0, 0.25]`
#[derive(Clone, Debug)]
pub struct LogLoss {
    n_classes: usize,
    i_zero_logit: Option<usize>,
}

impl LogLoss {
    pub fn new(n_classes: usize, i_zero_logit: Option<usize>) -> Self {
        debug_assert!(n_classes >= 2);
        debug_assert!(i_zero_logit.map_or(true, |z| z < n_classes));
        Self {
            n_classes,
            i_zero_logit,
        }
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[inline]
    pub fn n_scores(&self) -> usize {
        if self.n_classes == 2 {
            1
        } else {
            self.n_classes
        }
    }

    #[inline]
    pub fn i_zero_logit(&self) -> Option<usize> {
        self.i_zero_logit
    }

    /// The class the stored binary logit argues for.
    #[inline]
    pub fn positive_class(&self) -> u32 {
        debug_assert_eq!(self.n_classes, 2);
        match self.i_zero_logit {
            Some(1) => 0,
            _ => 1,
        }
    }

    #[inline]
    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    /// Rewrite the gradient/Hessian pairs from current scores.
    ///
    /// `scores` holds one record of `n_scores()` logits per sample in
    /// sample order; `classes` the target class ids. Reused between
    /// rounds by rewriting in place.
    pub fn refresh_grad_hess(&self, scores: &[f64], classes: &[u32], buf: &mut GradHessBuf) {
        let n_scores = self.n_scores();
        debug_assert_eq!(scores.len(), n_scores * classes.len());
        debug_assert_eq!(buf.n_samples(), classes.len());
        debug_assert_eq!(buf.n_scores(), n_scores);
        debug_assert!(buf.with_hessians());

        if self.n_classes == 2 {
            let positive = self.positive_class();
            for (sample, (&score, &class)) in scores.iter().zip(classes).enumerate() {
                let p = Self::sigmoid(score);
                let y = (class == positive) as u32 as f64;
                buf.set_pair(sample, 0, p - y, p * (1.0 - p));
            }
        } else {
            let mut probs = vec![0.0f64; n_scores];
            for (sample, &class) in classes.iter().enumerate() {
                let record = &scores[sample * n_scores..(sample + 1) * n_scores];
                softmax_into(record, &mut probs);
                for (k, &p) in probs.iter().enumerate() {
                    let y = (k == class as usize) as u32 as f64;
                    buf.set_pair(sample, k, p - y, p * (1.0 - p));
                }
            }
        }
    }

    /// Validation metric: weighted mean log-loss over current scores.
    pub fn validation_metric(
        &self,
        scores: &[f64],
        classes: &[u32],
        weights: Option<&[f64]>,
    ) -> f64 {
        if self.n_classes == 2 {
            binary_log_loss(scores, classes, self.positive_class(), weights)
        } else {
            multiclass_log_loss(scores, self.n_classes, classes, weights)
        }
    }

    /// Apply the reference-class rendering convention to a score record.
    ///
    /// Multiclass only; binary scores already live in reference-relative
    /// form.
    pub fn render_scores(&self, record: &mut [f64]) {
        if self.n_classes > 2 {
            if let Some(zero) = self.i_zero_logit {
                debug_assert_eq!(record.len() % self.n_classes, 0);
                for chunk in record.chunks_exact_mut(self.n_classes) {
                    let reference = chunk[zero];
                    for score in chunk.iter_mut() {
                        *score -= reference;
                    }
                }
            }
        }
    }
}

/// Numerically stable softmax into a scratch buffer.
fn softmax_into(logits: &[f64], probs: &mut [f64]) {
    debug_assert_eq!(logits.len(), probs.len());
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (p, &z) in probs.iter_mut().zip(logits) {
        *p = (z - max).exp();
        sum += *p;
    }
    for p in probs.iter_mut() {
        *p /= sum;
    }
}

//! Validation metrics.
//!
//! Each objective pairs with one metric, computed over the validation
//! side of the bag. All metrics are lower-is-better and are reported in
//! the dataset's natural units (weighted means). `NaN` or `±inf`
//! anywhere in the inputs flows straight through; a non-finite metric
//! is the trainer's signal to stop boosting.

/// Weighted root-mean-square of the residuals.
///
/// For RMSE training the per-sample gradient *is* the residual
/// `score − target`, so the metric reads the gradient buffer directly.
pub fn rmse_of_residuals(residuals: &[f64], weights: Option<&[f64]>) -> f64 {
    debug_assert!(weights.map_or(true, |w| w.len() == residuals.len()));
    let mut sum_sq = 0.0;
    let mut sum_w = 0.0;
    match weights {
        None => {
            for &r in residuals {
                sum_sq += r * r;
            }
            sum_w = residuals.len() as f64;
        }
        Some(weights) => {
            for (&r, &w) in residuals.iter().zip(weights) {
                sum_sq += w * r * r;
                sum_w += w;
            }
        }
    }
    (sum_sq / sum_w).sqrt()
}

/// `ln(1 + e^x)` without overflow for large `x`.
#[inline]
pub fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Weighted mean binary log-loss over single-logit scores.
///
/// `positive` names the class the stored logit argues for.
pub fn binary_log_loss(
    scores: &[f64],
    classes: &[u32],
    positive: u32,
    weights: Option<&[f64]>,
) -> f64 {
    debug_assert_eq!(scores.len(), classes.len());
    let mut sum_loss = 0.0;
    let mut sum_w = 0.0;
    for (sample, (&score, &class)) in scores.iter().zip(classes).enumerate() {
        let w = weights.map_or(1.0, |w| w[sample]);
        // -ln σ(z) = softplus(-z); -ln(1-σ(z)) = softplus(z)
        let loss = if class == positive {
            softplus(-score)
        } else {
            softplus(score)
        };
        sum_loss += w * loss;
        sum_w += w;
    }
    sum_loss / sum_w
}

/// Weighted mean multiclass log-loss over K-logit score records.
pub fn multiclass_log_loss(
    scores: &[f64],
    n_classes: usize,
    classes: &[u32],
    weights: Option<&[f64]>,
) -> f64 {
    debug_assert_eq!(scores.len(), n_classes * classes.len());
    let mut sum_loss = 0.0;
    let mut sum_w = 0.0;
    for (sample, &class) in classes.iter().enumerate() {
        let record = &scores[sample * n_classes..(sample + 1) * n_classes];
        let max = record.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let log_sum_exp = max
            + record
                .iter()
                .map(|&z| (z - max).exp())
                .sum::<f64>()
                .ln();
        let w = weights.map_or(1.0, |w| w[sample]);
        sum_loss += w * (log_sum_exp - record[class as usize]);
        sum_w += w;
    }
    sum_loss / sum_w
}

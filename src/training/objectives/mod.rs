//! Objective adapters: closed-form gradients per loss.
//!
//! An objective knows its score-vector width, whether it stores
//! Hessians, how to rewrite the gradient buffer from current scores, and
//! how to read a validation metric. Objectives are selected by name
//! string at handle creation; unknown names surface as a structured
//! error before any handle exists.
//!
//! RMSE regression is the odd one out: its Hessian is
//! constant 1 and its gradient is the running residual, so the trainer
//! keeps no score buffer for it at all and nudges the gradients directly
//! when an update is applied. Classification keeps per-sample logits and
//! recomputes the gradient/Hessian pairs after every applied update.

mod classification;
mod regression;

pub use classification::LogLoss;
pub use regression::Rmse;

use crate::data::Targets;
use crate::error::Error;

/// A selected objective.
#[derive(Clone, Debug)]
pub enum Objective {
    Rmse(Rmse),
    LogLoss(LogLoss),
}

impl Objective {
    /// Resolve an objective by name against the dataset's targets.
    ///
    /// `i_zero_logit` selects which class plays the reference role for
    /// classification scores; `None` keeps the default (class 0).
    pub fn from_name(
        name: &str,
        targets: &Targets,
        i_zero_logit: Option<usize>,
    ) -> Result<Self, Error> {
        match name {
            "rmse" => match targets {
                Targets::Regression(_) => Ok(Objective::Rmse(Rmse)),
                Targets::Classification { .. } => Err(Error::ObjectiveMismatch {
                    objective: "rmse",
                    expected: "regression",
                }),
            },
            "log_loss" => match targets {
                Targets::Classification { n_classes, .. } => {
                    if let Some(zero) = i_zero_logit {
                        if zero >= *n_classes {
                            return Err(Error::InvalidArgument(
                                "i_zero_logit out of class range",
                            ));
                        }
                    }
                    Ok(Objective::LogLoss(LogLoss::new(*n_classes, i_zero_logit)))
                }
                Targets::Regression(_) => Err(Error::ObjectiveMismatch {
                    objective: "log_loss",
                    expected: "classification",
                }),
            },
            other => Err(Error::UnknownObjective(other.to_string())),
        }
    }

    /// Width of the per-sample score vector.
    #[inline]
    pub fn n_scores(&self) -> usize {
        match self {
            Objective::Rmse(_) => 1,
            Objective::LogLoss(inner) => inner.n_scores(),
        }
    }

    /// Whether gradient records carry Hessians.
    #[inline]
    pub fn with_hessians(&self) -> bool {
        match self {
            Objective::Rmse(_) => false,
            Objective::LogLoss(_) => true,
        }
    }

    #[inline]
    pub fn is_classification(&self) -> bool {
        matches!(self, Objective::LogLoss(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Rmse(_) => "rmse",
            Objective::LogLoss(_) => "log_loss",
        }
    }
}

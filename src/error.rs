//! Error types for handle construction and dataset decoding.
//!
//! Only recoverable, caller-facing conditions live here. Invariant
//! violations inside the aggregation kernels (out-of-range bins, wrong
//! tensor shapes) are programmer errors and are checked with
//! `debug_assert!` at the point of use. Numerical overflow to `±inf` or
//! `NaN` is not an error at all: it propagates through the sums and
//! surfaces as a `NaN` validation metric.

/// Errors reported from handle-creation and dataset entry points.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The objective name was not recognized.
    #[error("unknown objective '{0}'")]
    UnknownObjective(String),

    /// The objective does not match the dataset's target kind.
    #[error("objective '{objective}' requires {expected} targets")]
    ObjectiveMismatch {
        objective: &'static str,
        expected: &'static str,
    },

    /// A structural problem with the dataset or its inputs.
    #[error("invalid dataset: {0}")]
    BadDataset(String),

    /// The serialized dataset blob could not be decoded.
    #[error("invalid dataset blob: {0}")]
    BadBlob(&'static str),

    /// A term referenced a feature index outside the dataset.
    #[error("term references feature {feature}, dataset has {n_features}")]
    FeatureIndexOutOfRange { feature: usize, n_features: usize },

    /// A term has more dimensions than the engine supports.
    #[error("term has {0} dimensions, maximum is {1}")]
    TooManyDimensions(usize, usize),

    /// The per-bin record size would overflow for this score count.
    #[error("bin record size overflows for {n_scores} scores")]
    BinRecordOverflow { n_scores: usize },

    /// An argument failed validation at a handle boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An operation was called out of order on a handle.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// A requested capability is not available in this build.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

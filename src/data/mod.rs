//! Data input abstractions: pre-binned datasets and replication bags.
//!
//! The trainer never sees raw feature values. Upstream binning produces
//! per-feature bin indices; this module stores them together with
//! targets, optional sample weights, and the signed replication bag that
//! partitions samples into training and validation.

mod bag;
mod dataset;

pub use bag::{expanded_count, BagIter, BagPass, SampleBag};
pub use dataset::{
    Dataset, DatasetBuilder, FeatureColumn, FeatureMeta, Targets, MAX_BINS,
};

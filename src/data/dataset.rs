//! Pre-binned dataset container and builder.
//!
//! Features arrive already discretized: each feature is a column of bin
//! indices in `[0, n_bins)`, with bin 0 conventionally holding missing
//! values. Bin indices are stored as `u16` for every feature (one
//! storage width for the whole dataset, wide enough for the largest
//! feature) so the aggregation kernels stay monomorphic over the index
//! type. Features with more than `u16::MAX + 1` bins are rejected at
//! construction.
//!
//! Besides direct in-memory construction, [`DatasetBuilder`] supports the
//! two-phase blob protocol used across process boundaries: `measure()`
//! returns the exact byte size, `fill()` writes a self-describing
//! little-endian blob into a caller-provided buffer, and
//! [`Dataset::from_blob`] reconstructs the dataset.

use crate::error::Error;

/// Maximum number of bins a single feature may carry.
pub const MAX_BINS: usize = u16::MAX as usize + 1;

// =============================================================================
// Feature metadata
// =============================================================================

/// Per-feature metadata carried alongside the bin indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureMeta {
    /// Number of bin categories, `>= 1`. Bin 0 denotes "missing".
    pub n_bins: usize,
    /// Whether the feature actually contains missing values.
    pub missing: bool,
    /// Whether an "unknown" category is reserved for unseen values.
    pub unknown: bool,
    /// Whether the bins are nominal (unordered) categories.
    pub nominal: bool,
}

impl FeatureMeta {
    pub fn numeric(n_bins: usize) -> Self {
        Self {
            n_bins,
            missing: false,
            unknown: false,
            nominal: false,
        }
    }

    fn flags(&self) -> u8 {
        (self.missing as u8) | (self.unknown as u8) << 1 | (self.nominal as u8) << 2
    }

    fn from_flags(n_bins: usize, flags: u8) -> Self {
        Self {
            n_bins,
            missing: flags & 1 != 0,
            unknown: flags & 2 != 0,
            nominal: flags & 4 != 0,
        }
    }
}

/// One pre-binned feature column.
#[derive(Clone, Debug)]
pub struct FeatureColumn {
    meta: FeatureMeta,
    bins: Vec<u16>,
}

impl FeatureColumn {
    #[inline]
    pub fn meta(&self) -> &FeatureMeta {
        &self.meta
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.meta.n_bins
    }

    #[inline]
    pub fn bins(&self) -> &[u16] {
        &self.bins
    }
}

// =============================================================================
// Targets
// =============================================================================

/// Training targets: float values for regression, class ids for
/// classification.
#[derive(Clone, Debug)]
pub enum Targets {
    Regression(Vec<f64>),
    Classification { classes: Vec<u32>, n_classes: usize },
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Regression(v) => v.len(),
            Targets::Classification { classes, .. } => classes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, Targets::Classification { .. })
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// An immutable pre-binned dataset.
#[derive(Clone, Debug)]
pub struct Dataset {
    features: Vec<FeatureColumn>,
    weights: Option<Vec<f64>>,
    targets: Targets,
    n_samples: usize,
    weight_total: f64,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn feature(&self, index: usize) -> &FeatureColumn {
        &self.features[index]
    }

    #[inline]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    #[inline]
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Precomputed total sample weight (sample count when unweighted).
    #[inline]
    pub fn weight_total(&self) -> f64 {
        self.weight_total
    }

    /// Decode a dataset from a blob produced by [`DatasetBuilder::fill`].
    pub fn from_blob(blob: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(blob);
        if reader.u32()? != BLOB_MAGIC {
            return Err(Error::BadBlob("bad magic"));
        }
        if reader.u32()? != BLOB_VERSION {
            return Err(Error::BadBlob("unsupported version"));
        }
        let n_features = reader.u32()? as usize;
        let n_samples = reader.u32()? as usize;
        let has_weights = reader.u8()? != 0;
        let target_kind = reader.u8()?;

        let mut builder = DatasetBuilder::new();
        for _ in 0..n_features {
            let n_bins = reader.u32()? as usize;
            let flags = reader.u8()?;
            let mut bins = Vec::with_capacity(n_samples);
            for _ in 0..n_samples {
                bins.push(reader.u16()?);
            }
            builder = builder.feature(FeatureMeta::from_flags(n_bins, flags), bins);
        }
        if has_weights {
            let mut weights = Vec::with_capacity(n_samples);
            for _ in 0..n_samples {
                weights.push(reader.f64()?);
            }
            builder = builder.weights(weights);
        }
        match target_kind {
            0 => {
                let mut targets = Vec::with_capacity(n_samples);
                for _ in 0..n_samples {
                    targets.push(reader.f64()?);
                }
                builder = builder.regression_targets(targets);
            }
            1 => {
                let n_classes = reader.u32()? as usize;
                let mut classes = Vec::with_capacity(n_samples);
                for _ in 0..n_samples {
                    classes.push(reader.u32()?);
                }
                builder = builder.classification_targets(n_classes, classes);
            }
            _ => return Err(Error::BadBlob("unknown target kind")),
        }
        if !reader.is_exhausted() {
            return Err(Error::BadBlob("trailing bytes"));
        }
        builder.build()
    }
}

// =============================================================================
// Builder
// =============================================================================

const BLOB_MAGIC: u32 = 0x4742_4431; // "GBD1"
const BLOB_VERSION: u32 = 1;

/// Builder for [`Dataset`].
#[derive(Clone, Debug, Default)]
pub struct DatasetBuilder {
    features: Vec<FeatureColumn>,
    weights: Option<Vec<f64>>,
    targets: Option<Targets>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-binned feature column.
    pub fn feature(mut self, meta: FeatureMeta, bins: Vec<u16>) -> Self {
        self.features.push(FeatureColumn { meta, bins });
        self
    }

    /// Convenience: add a numeric feature with no special flags.
    pub fn numeric_feature(self, n_bins: usize, bins: Vec<u16>) -> Self {
        self.feature(FeatureMeta::numeric(n_bins), bins)
    }

    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn regression_targets(mut self, targets: Vec<f64>) -> Self {
        self.targets = Some(Targets::Regression(targets));
        self
    }

    pub fn classification_targets(mut self, n_classes: usize, classes: Vec<u32>) -> Self {
        self.targets = Some(Targets::Classification { classes, n_classes });
        self
    }

    fn validate(&self) -> Result<(usize, &Targets), Error> {
        let targets = self
            .targets
            .as_ref()
            .ok_or_else(|| Error::BadDataset("no targets".into()))?;
        let n_samples = targets.len();
        if n_samples == 0 {
            return Err(Error::BadDataset("empty dataset".into()));
        }
        for (i, feature) in self.features.iter().enumerate() {
            if feature.meta.n_bins == 0 {
                return Err(Error::BadDataset(format!("feature {i} has zero bins")));
            }
            if feature.meta.n_bins > MAX_BINS {
                return Err(Error::BadDataset(format!(
                    "feature {i} has {} bins, maximum is {MAX_BINS}",
                    feature.meta.n_bins
                )));
            }
            if feature.bins.len() != n_samples {
                return Err(Error::BadDataset(format!(
                    "feature {i} has {} rows, expected {n_samples}",
                    feature.bins.len()
                )));
            }
            if let Some(&bad) = feature
                .bins
                .iter()
                .find(|&&b| b as usize >= feature.meta.n_bins)
            {
                return Err(Error::BadDataset(format!(
                    "feature {i} contains bin {bad}, n_bins is {}",
                    feature.meta.n_bins
                )));
            }
        }
        if let Some(weights) = &self.weights {
            if weights.len() != n_samples {
                return Err(Error::BadDataset(format!(
                    "weight column has {} rows, expected {n_samples}",
                    weights.len()
                )));
            }
            if weights.iter().any(|&w| w < 0.0) {
                return Err(Error::BadDataset("negative sample weight".into()));
            }
        }
        if let Targets::Classification { classes, n_classes } = targets {
            if let Some(&bad) = classes.iter().find(|&&c| c as usize >= *n_classes) {
                return Err(Error::BadDataset(format!(
                    "class id {bad} out of range for {n_classes} classes"
                )));
            }
            if *n_classes < 2 {
                return Err(Error::BadDataset("fewer than 2 classes".into()));
            }
        }
        Ok((n_samples, targets))
    }

    /// Build the dataset in place.
    pub fn build(self) -> Result<Dataset, Error> {
        let (n_samples, _) = self.validate()?;
        let weight_total = match &self.weights {
            Some(weights) => weights.iter().sum(),
            None => n_samples as f64,
        };
        Ok(Dataset {
            features: self.features,
            weights: self.weights,
            targets: self.targets.expect("validated"),
            n_samples,
            weight_total,
        })
    }

    /// Size in bytes of the blob `fill` would write.
    pub fn measure(&self) -> Result<usize, Error> {
        let (n_samples, targets) = self.validate()?;
        let mut size = 4 + 4 + 4 + 4 + 1 + 1; // magic, version, counts, flags
        for _ in &self.features {
            size += 4 + 1 + 2 * n_samples; // n_bins, flags, u16 indices
        }
        if self.weights.is_some() {
            size += 8 * n_samples;
        }
        size += match targets {
            Targets::Regression(_) => 8 * n_samples,
            Targets::Classification { .. } => 4 + 4 * n_samples,
        };
        Ok(size)
    }

    /// Write the self-describing blob into `buf`.
    ///
    /// `buf` must be exactly `measure()` bytes long.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), Error> {
        let (n_samples, targets) = self.validate()?;
        if buf.len() != self.measure()? {
            return Err(Error::InvalidArgument("blob buffer size mismatch"));
        }
        let mut writer = ByteWriter::new(buf);
        writer.u32(BLOB_MAGIC);
        writer.u32(BLOB_VERSION);
        writer.u32(self.features.len() as u32);
        writer.u32(n_samples as u32);
        writer.u8(self.weights.is_some() as u8);
        writer.u8(targets.is_classification() as u8);
        for feature in &self.features {
            writer.u32(feature.meta.n_bins as u32);
            writer.u8(feature.meta.flags());
            for &bin in &feature.bins {
                writer.u16(bin);
            }
        }
        if let Some(weights) = &self.weights {
            for &w in weights {
                writer.f64(w);
            }
        }
        match targets {
            Targets::Regression(values) => {
                for &v in values {
                    writer.f64(v);
                }
            }
            Targets::Classification { classes, n_classes } => {
                writer.u32(*n_classes as u32);
                for &c in classes {
                    writer.u32(c);
                }
            }
        }
        debug_assert!(writer.is_full());
        Ok(())
    }
}

// =============================================================================
// Little-endian byte cursors
// =============================================================================

struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.put(&v.to_le_bytes());
    }

    fn is_full(&self) -> bool {
        self.pos == self.buf.len()
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::BadBlob("truncated"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_builder() -> DatasetBuilder {
        Dataset::builder()
            .numeric_feature(3, vec![0, 1, 2, 1])
            .feature(
                FeatureMeta {
                    n_bins: 2,
                    missing: true,
                    unknown: false,
                    nominal: true,
                },
                vec![1, 0, 1, 1],
            )
            .weights(vec![1.0, 2.0, 0.5, 1.5])
            .regression_targets(vec![0.5, -1.0, 2.0, 0.0])
    }

    #[test]
    fn build_basic() {
        let ds = sample_builder().build().unwrap();
        assert_eq!(ds.n_samples(), 4);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.feature(0).n_bins(), 3);
        assert_eq!(ds.weight_total(), 5.0);
    }

    #[test]
    fn rejects_out_of_range_bin() {
        let err = Dataset::builder()
            .numeric_feature(2, vec![0, 2])
            .regression_targets(vec![0.0, 1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadDataset(_)));
    }

    #[test]
    fn rejects_row_count_mismatch() {
        let err = Dataset::builder()
            .numeric_feature(2, vec![0, 1, 1])
            .regression_targets(vec![0.0, 1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadDataset(_)));
    }

    #[test]
    fn rejects_bad_class_id() {
        let err = Dataset::builder()
            .numeric_feature(2, vec![0, 1])
            .classification_targets(2, vec![0, 2])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadDataset(_)));
    }

    #[test]
    fn blob_round_trip() {
        let builder = sample_builder();
        let size = builder.measure().unwrap();
        let mut blob = vec![0u8; size];
        builder.fill(&mut blob).unwrap();

        let ds = Dataset::from_blob(&blob).unwrap();
        assert_eq!(ds.n_samples(), 4);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.feature(0).bins(), &[0, 1, 2, 1]);
        assert_eq!(ds.feature(1).n_bins(), 2);
        assert!(ds.feature(1).meta().missing);
        assert!(ds.feature(1).meta().nominal);
        assert_eq!(ds.weights(), Some(&[1.0, 2.0, 0.5, 1.5][..]));
        match ds.targets() {
            Targets::Regression(v) => assert_eq!(v, &[0.5, -1.0, 2.0, 0.0]),
            _ => panic!("expected regression targets"),
        }
    }

    #[test]
    fn blob_round_trip_classification() {
        let builder = Dataset::builder()
            .numeric_feature(4, vec![0, 1, 2, 3])
            .classification_targets(3, vec![0, 2, 1, 0]);
        let mut blob = vec![0u8; builder.measure().unwrap()];
        builder.fill(&mut blob).unwrap();

        let ds = Dataset::from_blob(&blob).unwrap();
        match ds.targets() {
            Targets::Classification { classes, n_classes } => {
                assert_eq!(*n_classes, 3);
                assert_eq!(classes, &[0, 2, 1, 0]);
            }
            _ => panic!("expected classification targets"),
        }
    }

    #[test]
    fn blob_rejects_corruption() {
        let builder = sample_builder();
        let mut blob = vec![0u8; builder.measure().unwrap()];
        builder.fill(&mut blob).unwrap();

        assert!(Dataset::from_blob(&blob[..blob.len() - 1]).is_err());
        let mut bad_magic = blob.clone();
        bad_magic[0] ^= 0xff;
        assert!(Dataset::from_blob(&bad_magic).is_err());
    }
}

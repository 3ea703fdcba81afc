//! Contiguous dataset helpers and pre-processing utilities.
//!
//! `Inputs` and `Dataset` provide validated, row-major storage for feature
//! matrices and one-hot label matrices. The training loop slices single rows
//! out of them; evaluation turns them into column-major [`Matrix`] batches.
//!
//! The utilities at the bottom ([`one_hot`], [`Standardizer`],
//! [`split_train_val`]) cover the usual classification pre-processing:
//! encoding integer class labels, standardizing features (fit on the training
//! split only), and carving out a validation split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::matrix::Matrix;
use crate::{Error, Result};

/// A collection of feature vectors (X).
///
/// Stored as a contiguous buffer with row-major layout:
/// `features.len() == len * feature_dim`.
#[derive(Debug, Clone)]
pub struct Inputs {
    features: Vec<f32>,
    len: usize,
    feature_dim: usize,
}

impl Inputs {
    /// Build inputs from a flat buffer with shape `(len, feature_dim)`.
    pub fn from_flat(features: Vec<f32>, feature_dim: usize) -> Result<Self> {
        if feature_dim == 0 {
            return Err(Error::InvalidData("feature_dim must be > 0".to_owned()));
        }
        if features.len() % feature_dim != 0 {
            return Err(Error::InvalidData(format!(
                "features length {} is not divisible by feature_dim {feature_dim}",
                features.len()
            )));
        }

        let len = features.len() / feature_dim;
        Ok(Self {
            features,
            len,
            feature_dim,
        })
    }

    /// Build inputs from per-example rows (copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }

        let feature_dim = rows[0].len();
        if feature_dim == 0 {
            return Err(Error::InvalidData("feature_dim must be > 0".to_owned()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != feature_dim {
                return Err(Error::InvalidData(format!(
                    "feature row {i} has len {}, expected {feature_dim}",
                    row.len()
                )));
            }
        }

        let mut features = Vec::with_capacity(rows.len() * feature_dim);
        for row in rows {
            features.extend_from_slice(row);
        }

        Ok(Self {
            features,
            len: rows.len(),
            feature_dim,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// The `idx`-th feature row. Panics if `idx >= len`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.feature_dim;
        &self.features[start..start + self.feature_dim]
    }

    /// All examples as one `(feature_dim, len)` matrix — examples become
    /// columns, the layout the network's forward pass consumes.
    pub fn as_columns(&self) -> Matrix {
        let mut m = Matrix::zeros(self.feature_dim, self.len);
        for idx in 0..self.len {
            for (f, &v) in self.row(idx).iter().enumerate() {
                m.set(f, idx, v);
            }
        }
        m
    }
}

/// A labeled classification dataset: features (X) and one-hot labels (Y).
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Inputs,
    /// Row-major `(len, num_classes)`, each row one-hot.
    labels: Vec<f32>,
    num_classes: usize,
}

impl Dataset {
    /// Build a dataset from flat buffers.
    ///
    /// `features` is `(len, feature_dim)` and `labels` is `(len,
    /// num_classes)` with exactly one `1.0` per row.
    pub fn from_flat(
        features: Vec<f32>,
        labels: Vec<f32>,
        feature_dim: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let features = Inputs::from_flat(features, feature_dim)?;
        if num_classes == 0 {
            return Err(Error::InvalidData("num_classes must be > 0".to_owned()));
        }
        if labels.len() != features.len() * num_classes {
            return Err(Error::InvalidData(format!(
                "labels length {} does not match len * num_classes ({} * {num_classes})",
                labels.len(),
                features.len()
            )));
        }

        for idx in 0..features.len() {
            let row = &labels[idx * num_classes..(idx + 1) * num_classes];
            let ones = row.iter().filter(|&&v| v == 1.0).count();
            if ones != 1 || row.iter().any(|&v| v != 0.0 && v != 1.0) {
                return Err(Error::InvalidData(format!(
                    "label row {idx} is not one-hot: {row:?}"
                )));
            }
        }

        Ok(Self {
            features,
            labels,
            num_classes,
        })
    }

    /// Build a dataset from per-example rows (copies into contiguous storage).
    pub fn from_rows(features: &[Vec<f32>], labels: &[Vec<f32>]) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "features/labels length mismatch: {} vs {}",
                features.len(),
                labels.len()
            )));
        }

        let inputs = Inputs::from_rows(features)?;
        let num_classes = labels.first().map(|r| r.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(labels.len() * num_classes);
        for row in labels {
            if row.len() != num_classes {
                return Err(Error::InvalidData(format!(
                    "label rows have inconsistent lengths ({} vs {num_classes})",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }

        let dim = inputs.feature_dim;
        Self::from_flat(inputs.features, flat, dim, num_classes)
    }

    /// Pair standardized/transformed inputs with existing one-hot labels.
    pub fn from_parts(features: Inputs, labels: Vec<f32>, num_classes: usize) -> Result<Self> {
        let dim = features.feature_dim();
        Self::from_flat(features.features, labels, dim, num_classes)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[inline]
    pub fn feature_dim(&self) -> usize {
        self.features.feature_dim()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn inputs(&self) -> &Inputs {
        &self.features
    }

    /// The `idx`-th feature row. Panics if `idx >= len`.
    #[inline]
    pub fn features(&self, idx: usize) -> &[f32] {
        self.features.row(idx)
    }

    /// The `idx`-th one-hot label row. Panics if `idx >= len`.
    #[inline]
    pub fn label(&self, idx: usize) -> &[f32] {
        let start = idx * self.num_classes;
        &self.labels[start..start + self.num_classes]
    }

    /// Class index of the `idx`-th example.
    pub fn label_class(&self, idx: usize) -> usize {
        let row = self.label(idx);
        row.iter()
            .position(|&v| v == 1.0)
            .expect("label rows are validated as one-hot")
    }

    /// Features as a `(feature_dim, len)` column-per-example matrix.
    #[inline]
    pub fn features_matrix(&self) -> Matrix {
        self.features.as_columns()
    }

    /// Labels as a `(num_classes, len)` column-per-example matrix.
    pub fn labels_matrix(&self) -> Matrix {
        let mut m = Matrix::zeros(self.num_classes, self.len());
        for idx in 0..self.len() {
            for (c, &v) in self.label(idx).iter().enumerate() {
                m.set(c, idx, v);
            }
        }
        m
    }
}

/// One-hot encode integer class labels into a flat `(labels.len(),
/// num_classes)` row-major buffer, suitable for [`Dataset::from_flat`].
pub fn one_hot(classes: &[usize], num_classes: usize) -> Result<Vec<f32>> {
    if num_classes == 0 {
        return Err(Error::InvalidData("num_classes must be > 0".to_owned()));
    }

    let mut out = vec![0.0_f32; classes.len() * num_classes];
    for (idx, &class) in classes.iter().enumerate() {
        if class >= num_classes {
            return Err(Error::InvalidData(format!(
                "class {class} at index {idx} is out of range for {num_classes} classes"
            )));
        }
        out[idx * num_classes + class] = 1.0;
    }
    Ok(out)
}

/// Per-feature zero-mean/unit-variance scaling.
///
/// Fit on the training inputs only; apply the fitted transform identically to
/// validation and test inputs.
#[derive(Debug, Clone)]
pub struct Standardizer {
    means: Vec<f32>,
    stds: Vec<f32>,
}

impl Standardizer {
    /// Compute per-feature means and standard deviations.
    pub fn fit(inputs: &Inputs) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::InvalidData(
                "cannot fit a standardizer on empty inputs".to_owned(),
            ));
        }

        let dim = inputs.feature_dim();
        let n = inputs.len() as f32;

        let mut means = vec![0.0_f32; dim];
        for idx in 0..inputs.len() {
            for (f, &v) in inputs.row(idx).iter().enumerate() {
                means[f] += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0_f32; dim];
        for idx in 0..inputs.len() {
            for (f, &v) in inputs.row(idx).iter().enumerate() {
                let d = v - means[f];
                stds[f] += d * d;
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // Constant features would otherwise divide by zero.
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    /// Apply the fitted scaling to `inputs`.
    pub fn transform(&self, inputs: &Inputs) -> Result<Inputs> {
        if inputs.feature_dim() != self.means.len() {
            return Err(Error::InvalidShape(format!(
                "inputs have feature_dim {}, standardizer was fit on {}",
                inputs.feature_dim(),
                self.means.len()
            )));
        }

        let dim = inputs.feature_dim();
        let mut out = Vec::with_capacity(inputs.len() * dim);
        for idx in 0..inputs.len() {
            for (f, &v) in inputs.row(idx).iter().enumerate() {
                out.push((v - self.means[f]) / self.stds[f]);
            }
        }
        Inputs::from_flat(out, dim)
    }
}

/// Split a dataset into training and validation parts using a seeded
/// permutation. `val_fraction` must leave both splits non-empty.
pub fn split_train_val(
    data: &Dataset,
    val_fraction: f32,
    seed: u64,
) -> Result<(Dataset, Dataset)> {
    if !(val_fraction.is_finite() && 0.0 < val_fraction && val_fraction < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "val_fraction must be in (0, 1), got {val_fraction}"
        )));
    }

    let n_val = (val_fraction * data.len() as f32) as usize;
    if n_val == 0 || n_val == data.len() {
        return Err(Error::InvalidConfig(format!(
            "val_fraction {val_fraction} leaves an empty split for {} examples",
            data.len()
        )));
    }

    let mut indices: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let gather = |idxs: &[usize]| -> Result<Dataset> {
        let mut features = Vec::with_capacity(idxs.len() * data.feature_dim());
        let mut labels = Vec::with_capacity(idxs.len() * data.num_classes());
        for &i in idxs {
            features.extend_from_slice(data.features(i));
            labels.extend_from_slice(data.label(i));
        }
        Dataset::from_flat(features, labels, data.feature_dim(), data.num_classes())
    };

    let val = gather(&indices[..n_val])?;
    let train = gather(&indices[n_val..])?;
    Ok((train, val))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dataset() -> Dataset {
        let features = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![2.0, 3.0],
            vec![3.0, 2.0],
        ];
        let labels = one_hot(&[0, 1, 0, 1], 2).unwrap();
        Dataset::from_flat(
            features.into_iter().flatten().collect(),
            labels,
            2,
            2,
        )
        .unwrap()
    }

    #[test]
    fn from_flat_validates_shapes_and_one_hot_rows() {
        let ok = Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 0.0, 0.0, 1.0], 2, 2);
        assert!(ok.is_ok());

        let bad_len = Dataset::from_flat(vec![0.0, 1.0, 2.0], vec![1.0, 0.0], 2, 2);
        assert!(bad_len.is_err());

        let not_one_hot =
            Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0.5, 0.5, 0.0, 1.0], 2, 2);
        assert!(not_one_hot.is_err());

        let two_hot = Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 1.0, 0.0, 1.0], 2, 2);
        assert!(two_hot.is_err());
    }

    #[test]
    fn one_hot_encodes_and_rejects_out_of_range() {
        let encoded = one_hot(&[2, 0], 3).unwrap();
        assert_eq!(encoded, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn label_class_recovers_the_encoded_index() {
        let data = toy_dataset();
        assert_eq!(data.label_class(0), 0);
        assert_eq!(data.label_class(1), 1);
    }

    #[test]
    fn column_matrices_transpose_the_row_storage() {
        let data = toy_dataset();
        let x = data.features_matrix();
        assert_eq!((x.rows(), x.cols()), (2, 4));
        assert_eq!(x.get(0, 2), 2.0);
        assert_eq!(x.get(1, 2), 3.0);

        let y = data.labels_matrix();
        assert_eq!((y.rows(), y.cols()), (2, 4));
        assert_eq!(y.get(1, 1), 1.0);
    }

    #[test]
    fn standardizer_centers_and_scales_the_fit_inputs() {
        let inputs = Inputs::from_rows(&[vec![1.0, 10.0], vec![3.0, 10.0]]).unwrap();
        let scaler = Standardizer::fit(&inputs).unwrap();
        let out = scaler.transform(&inputs).unwrap();

        // Feature 0: mean 2, std 1. Feature 1 is constant, left centered at 0.
        assert_eq!(out.row(0), &[-1.0, 0.0]);
        assert_eq!(out.row(1), &[1.0, 0.0]);
    }

    #[test]
    fn standardizer_rejects_mismatched_dims() {
        let inputs = Inputs::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let scaler = Standardizer::fit(&inputs).unwrap();
        let other = Inputs::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(scaler.transform(&other).is_err());
    }

    #[test]
    fn split_preserves_examples_and_is_seeded() {
        let data = toy_dataset();
        let (train, val) = split_train_val(&data, 0.25, 7).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(val.len(), 1);

        let (train2, val2) = split_train_val(&data, 0.25, 7).unwrap();
        assert_eq!(train.features(0), train2.features(0));
        assert_eq!(val.features(0), val2.features(0));

        assert!(split_train_val(&data, 0.0, 0).is_err());
        assert!(split_train_val(&data, 1.0, 0).is_err());
    }
}

//! Network: an ordered composition of layers built from a width sequence.
//!
//! For widths `[d0, d1, …, dk]` the stack is
//! `Affine(d0, d1), Relu, …, Affine(d_{k-1}, dk), Softmax` — every hidden
//! affine is followed by a ReLU, the last affine is not, and exactly one
//! softmax terminates the stack.
//!
//! The topology is fixed at construction; only parameters change afterwards.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layer::{Affine, AffineGrads, BiasRule, Context, Layer};
use crate::matrix::Matrix;
use crate::{Dataset, Error, Result};

/// Clip bound for predicted probabilities inside the cost function.
const COST_CLIP_EPSILON: f32 = 1e-12;
/// Additive smoothing inside the cost function's logarithm.
const COST_LOG_EPSILON: f32 = 1e-9;

#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    bias_rule: BiasRule,
}

/// Forward contexts for one pass, one entry per layer, in layer order.
///
/// A tape is only meaningful for the forward pass that produced it.
#[derive(Debug, Clone)]
pub struct Tape {
    contexts: Vec<Context>,
}

/// Parameter gradients for one backward pass, indexed like the layer stack.
///
/// Non-parametric layers hold `None`.
#[derive(Debug, Clone)]
pub struct Gradients {
    per_layer: Vec<Option<AffineGrads>>,
}

impl Network {
    /// Build a network from a width sequence with a deterministic seed.
    pub fn new_with_seed(widths: &[usize], seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(widths, &mut rng)
    }

    /// Build a network from a width sequence using the provided RNG.
    pub fn new_with_rng<R: Rng + ?Sized>(widths: &[usize], rng: &mut R) -> Result<Self> {
        if widths.len() < 2 {
            return Err(Error::InvalidConfig(
                "widths must include input and output dims".to_owned(),
            ));
        }
        if widths.contains(&0) {
            return Err(Error::InvalidConfig("all widths must be > 0".to_owned()));
        }

        let mut layers = Vec::with_capacity(2 * (widths.len() - 1));
        for (i, w) in widths.windows(2).enumerate() {
            layers.push(Layer::Affine(Affine::new_with_rng(w[0], w[1], rng)?));
            if i + 2 < widths.len() {
                layers.push(Layer::Relu);
            }
        }
        layers.push(Layer::Softmax);

        Ok(Self {
            layers,
            bias_rule: BiasRule::default(),
        })
    }

    /// Rebuild a network from affine parameters alone; ReLU and softmax
    /// layers are re-interleaved.
    pub fn from_affine_layers(affines: Vec<Affine>) -> Result<Self> {
        if affines.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one affine layer".to_owned(),
            ));
        }
        for i in 1..affines.len() {
            if affines[i].in_dim() != affines[i - 1].out_dim() {
                return Err(Error::InvalidShape(format!(
                    "affine {i} in_dim {} does not match previous out_dim {}",
                    affines[i].in_dim(),
                    affines[i - 1].out_dim()
                )));
            }
        }

        let n = affines.len();
        let mut layers = Vec::with_capacity(2 * n);
        for (i, affine) in affines.into_iter().enumerate() {
            layers.push(Layer::Affine(affine));
            if i + 1 < n {
                layers.push(Layer::Relu);
            }
        }
        layers.push(Layer::Softmax);

        Ok(Self {
            layers,
            bias_rule: BiasRule::default(),
        })
    }

    /// Select the bias behavior for backward/update steps.
    #[inline]
    pub fn with_bias_rule(mut self, rule: BiasRule) -> Self {
        self.bias_rule = rule;
        self
    }

    #[inline]
    pub fn bias_rule(&self) -> BiasRule {
        self.bias_rule
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        match self.layers.first() {
            Some(Layer::Affine(a)) => a.in_dim(),
            _ => unreachable!("network always starts with an affine layer"),
        }
    }

    /// Output dimension, i.e. the number of classes.
    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers
            .iter()
            .rev()
            .find_map(|l| match l {
                Layer::Affine(a) => Some(a.out_dim()),
                _ => None,
            })
            .expect("network always contains an affine layer")
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    /// Forward pass: thread `x` (shape `(input_dim, batch)`) through every
    /// layer in order.
    ///
    /// Returns the predicted class distribution per column plus the [`Tape`]
    /// of per-layer contexts the backward pass needs.
    ///
    /// Fails fast on a feature-dimension mismatch and on non-finite values in
    /// the output rather than letting NaNs propagate into training.
    pub fn forward(&self, x: &Matrix) -> Result<(Matrix, Tape)> {
        if x.rows() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "input has {} rows, network expects {}",
                x.rows(),
                self.input_dim()
            )));
        }

        let mut contexts = Vec::with_capacity(self.layers.len());
        let mut current = x.clone();
        for layer in &self.layers {
            let (out, ctx) = layer.forward(&current);
            contexts.push(ctx);
            current = out;
        }

        if !current.all_finite() {
            return Err(Error::NonFinite(
                "forward pass produced NaN or infinite values".to_owned(),
            ));
        }

        Ok((current, Tape { contexts }))
    }

    /// Mean negative log-likelihood of `labels` under `predicted`.
    ///
    /// Probabilities are clipped to `[1e-12, 1 - 1e-12]` and smoothed by
    /// `1e-9` inside the logarithm; the sum over classes and batch columns is
    /// divided by the batch size.
    pub fn cost(&self, predicted: &Matrix, labels: &Matrix) -> f32 {
        assert_eq!(
            (predicted.rows(), predicted.cols()),
            (labels.rows(), labels.cols()),
            "predicted shape ({}, {}) does not match labels ({}, {})",
            predicted.rows(),
            predicted.cols(),
            labels.rows(),
            labels.cols()
        );

        let n = predicted.cols();
        assert!(n > 0, "cost requires at least one example");

        let mut sum = 0.0_f32;
        for r in 0..predicted.rows() {
            for c in 0..n {
                let y = labels.get(r, c);
                if y != 0.0 {
                    let p = predicted
                        .get(r, c)
                        .clamp(COST_CLIP_EPSILON, 1.0 - COST_CLIP_EPSILON);
                    sum += y * (p + COST_LOG_EPSILON).ln();
                }
            }
        }
        -sum / n as f32
    }

    /// Backward pass: feed the one-hot `labels` into the terminal softmax,
    /// then thread the returned gradient through every prior layer in
    /// reverse order.
    ///
    /// `tape` must come from the forward pass being differentiated.
    pub fn backward(&self, labels: &Matrix, tape: &Tape) -> Gradients {
        assert_eq!(
            tape.contexts.len(),
            self.layers.len(),
            "tape has {} contexts, network has {} layers",
            tape.contexts.len(),
            self.layers.len()
        );

        let mut per_layer = vec![None; self.layers.len()];
        let mut signal = labels.clone();
        for idx in (0..self.layers.len()).rev() {
            let (next, grads) = self.layers[idx].backward(&signal, &tape.contexts[idx], self.bias_rule);
            per_layer[idx] = grads;
            signal = next;
        }

        Gradients { per_layer }
    }

    /// Apply `grads` to every parameterized layer; ReLU and softmax layers
    /// are skipped.
    pub fn apply_gradients(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            grads.per_layer.len(),
            self.layers.len(),
            "gradients have {} entries, network has {} layers",
            grads.per_layer.len(),
            self.layers.len()
        );

        for (layer, grads) in self.layers.iter_mut().zip(&grads.per_layer) {
            if let (Layer::Affine(affine), Some(g)) = (layer, grads) {
                affine.apply(g, lr);
            }
        }
    }

    /// Forward pass without the tape. Training and inference share the same
    /// deterministic forward computation.
    pub fn predict(&self, x: &Matrix) -> Result<Matrix> {
        let (out, _) = self.forward(x)?;
        Ok(out)
    }

    /// Fraction of examples whose argmax prediction matches the argmax of
    /// the one-hot label.
    pub fn accuracy(&self, data: &Dataset) -> Result<f32> {
        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }

        let predicted = self.predict(&data.features_matrix())?;
        let mut correct = 0usize;
        for idx in 0..data.len() {
            if predicted.col_argmax(idx) == data.label_class(idx) {
                correct += 1;
            }
        }
        Ok(correct as f32 / data.len() as f32)
    }
}

impl Gradients {
    /// Gradients for the layer at `idx`, if it has parameters.
    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&AffineGrads> {
        self.per_layer.get(idx).and_then(|g| g.as_ref())
    }
}

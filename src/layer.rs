//! Layer variants and the forward/backward protocol.
//!
//! Layers are pure function pairs: `forward` returns the output plus a
//! [`Context`] capturing what `backward` will need, and `backward` consumes
//! that context together with the incoming signal. No layer mutates itself
//! during a forward/backward round-trip, so a single layer value can serve
//! any number of in-flight passes.
//!
//! The incoming `backward` signal is the upstream gradient for [`Affine`] and
//! ReLU; the terminal softmax layer instead takes the one-hot true labels and
//! produces the fused softmax + cross-entropy gradient in one step (the fused
//! form is numerically better than chaining the two derivatives).

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::matrix::Matrix;
use crate::{Error, Result};

/// Initial value for every bias unit.
pub const BIAS_INIT: f32 = 0.01;

/// How affine layers treat their bias during backward/update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiasRule {
    /// During backward the bias produces a *replacement* value equal to
    /// `upstream ⊙ bias`, installed verbatim by the update step. The
    /// learning rate never touches the bias under this rule.
    #[default]
    Rescale,
    /// Standard descent: the bias gradient is the batch mean of the upstream
    /// gradient, applied as `b -= lr * db`.
    Gradient,
}

/// Dense layer: `output = W · input + b`.
#[derive(Debug, Clone)]
pub struct Affine {
    in_dim: usize,
    out_dim: usize,
    /// Shape `(out_dim, in_dim)`.
    weights: Matrix,
    /// Shape `(out_dim, 1)`.
    bias: Matrix,
}

impl Affine {
    /// Create a layer with `Normal(0, sqrt(2 / in_dim))` weights and
    /// [`BIAS_INIT`] biases.
    pub fn new_with_rng<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "affine dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let std = (2.0 / in_dim as f32).sqrt();
        let dist = Normal::new(0.0, std)
            .map_err(|e| Error::InvalidConfig(format!("invalid weight distribution: {e}")))?;

        let weights = Matrix::from_vec(
            out_dim,
            in_dim,
            (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect(),
        );
        let bias = Matrix::from_vec(out_dim, 1, vec![BIAS_INIT; out_dim]);

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            bias,
        })
    }

    /// Rebuild a layer from raw parameters, validating shape and finiteness.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "affine dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if bias.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "bias length {} does not match out_dim {out_dim}",
                bias.len()
            )));
        }
        if weights.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite(
                "weights must contain only finite values".to_owned(),
            ));
        }
        if bias.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite(
                "bias must contain only finite values".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights: Matrix::from_vec(out_dim, in_dim, weights),
            bias: Matrix::from_vec(out_dim, 1, bias),
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.weights
    }

    #[inline]
    pub fn bias_mut(&mut self) -> &mut Matrix {
        &mut self.bias
    }

    /// `W · x + b`, bias broadcast across the batch columns.
    fn forward(&self, x: &Matrix) -> Matrix {
        assert_eq!(
            x.rows(),
            self.in_dim,
            "input has {} rows, layer expects {}",
            x.rows(),
            self.in_dim
        );
        self.weights.matmul(x).add_col_broadcast(&self.bias)
    }

    /// Apply accumulated gradients: `W -= lr * dW`; the bias follows the
    /// rule baked into `grads.bias`.
    pub(crate) fn apply(&mut self, grads: &AffineGrads, lr: f32) {
        self.weights.add_scaled(-lr, &grads.d_weights);
        match &grads.bias {
            BiasTerm::Replacement(b) => self.bias = b.clone(),
            BiasTerm::Gradient(db) => self.bias.add_scaled(-lr, db),
        }
    }
}

/// One unit of the network stack.
#[derive(Debug, Clone)]
pub enum Layer {
    Affine(Affine),
    Relu,
    Softmax,
}

/// Per-call forward state, handed back to `backward`.
///
/// A context is only meaningful for the forward call that produced it.
#[derive(Debug, Clone)]
pub enum Context {
    Affine { input: Matrix },
    Relu { output: Matrix },
    Softmax { output: Matrix },
}

/// Parameter gradients produced by an affine backward step.
#[derive(Debug, Clone)]
pub struct AffineGrads {
    /// Shape `(out_dim, in_dim)`: `upstream · inputᵗ`.
    pub d_weights: Matrix,
    pub bias: BiasTerm,
}

/// The bias part of [`AffineGrads`], shaped by the active [`BiasRule`].
#[derive(Debug, Clone)]
pub enum BiasTerm {
    /// New bias value to install verbatim ([`BiasRule::Rescale`]).
    Replacement(Matrix),
    /// Bias gradient to descend along ([`BiasRule::Gradient`]).
    Gradient(Matrix),
}

impl Layer {
    /// Whether the update step has anything to apply for this variant.
    #[inline]
    pub fn has_parameters(&self) -> bool {
        matches!(self, Layer::Affine(_))
    }

    /// Forward pass. Returns the output and the context `backward` needs.
    pub fn forward(&self, x: &Matrix) -> (Matrix, Context) {
        match self {
            Layer::Affine(affine) => {
                let out = affine.forward(x);
                (out, Context::Affine { input: x.clone() })
            }
            Layer::Relu => {
                let out = x.map(|v| v.max(0.0));
                (out.clone(), Context::Relu { output: out })
            }
            Layer::Softmax => {
                let out = softmax(x);
                (out.clone(), Context::Softmax { output: out })
            }
        }
    }

    /// Backward pass.
    ///
    /// `signal` is the upstream gradient, except for `Softmax` where it is
    /// the one-hot true labels. Returns the gradient to propagate to the
    /// previous layer, plus parameter gradients for affine variants.
    ///
    /// Panics if `ctx` was not produced by this layer kind.
    pub fn backward(
        &self,
        signal: &Matrix,
        ctx: &Context,
        bias_rule: BiasRule,
    ) -> (Matrix, Option<AffineGrads>) {
        match (self, ctx) {
            (Layer::Affine(affine), Context::Affine { input }) => {
                debug_assert_eq!(signal.rows(), affine.out_dim);
                debug_assert_eq!(signal.cols(), input.cols());

                let d_weights = signal.matmul_t_rhs(input);
                let bias = match bias_rule {
                    BiasRule::Rescale => BiasTerm::Replacement(signal.hadamard(&affine.bias)),
                    BiasRule::Gradient => BiasTerm::Gradient(signal.col_mean()),
                };
                let d_input = affine.weights.matmul_t_lhs(signal);
                (d_input, Some(AffineGrads { d_weights, bias }))
            }
            (Layer::Relu, Context::Relu { output }) => {
                // Exact zeros in the cached output mark inactive units
                // (subgradient 0 at the kink).
                let mask = output.map(|v| if v == 0.0 { 0.0 } else { 1.0 });
                (signal.hadamard(&mask), None)
            }
            (Layer::Softmax, Context::Softmax { output }) => {
                // Fused softmax + cross-entropy derivative, averaged over the
                // batch and reshaped to a single column.
                (output.sub(signal).col_mean(), None)
            }
            _ => panic!("forward context does not match layer kind"),
        }
    }
}

/// Numerically stabilized column-wise softmax: subtract the per-column max
/// before exponentiating, then normalize each column to sum to 1.
fn softmax(x: &Matrix) -> Matrix {
    let mut out = x.clone();
    for c in 0..x.cols() {
        let mut max = f32::NEG_INFINITY;
        for r in 0..x.rows() {
            max = max.max(x.get(r, c));
        }

        let mut sum = 0.0_f32;
        for r in 0..x.rows() {
            let e = (x.get(r, c) - max).exp();
            out.set(r, c, e);
            sum += e;
        }

        let inv = 1.0 / sum;
        for r in 0..x.rows() {
            out.set(r, c, out.get(r, c) * inv);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_slice_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "actual={actual:?} expected={expected:?}");
        }
    }

    #[test]
    fn affine_init_has_expected_shapes_and_biases() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Affine::new_with_rng(4, 3, &mut rng).unwrap();
        assert_eq!(layer.weights().rows(), 3);
        assert_eq!(layer.weights().cols(), 4);
        assert_eq!(layer.bias().data(), &[BIAS_INIT; 3]);
        assert!(layer.weights().all_finite());
    }

    #[test]
    fn affine_rejects_zero_dims_and_bad_parts() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Affine::new_with_rng(0, 3, &mut rng).is_err());
        assert!(Affine::from_parts(2, 2, vec![0.0; 3], vec![0.0; 2]).is_err());
        assert!(Affine::from_parts(2, 2, vec![f32::NAN; 4], vec![0.0; 2]).is_err());
    }

    #[test]
    fn affine_forward_broadcasts_bias_across_batch() {
        let affine = Affine::from_parts(2, 2, vec![1.0, 0.0, 0.0, 1.0], vec![0.5, -0.5]).unwrap();
        let layer = Layer::Affine(affine);
        let x = Matrix::from_vec(2, 2, vec![1.0, 3.0, 2.0, 4.0]);
        let (out, _) = layer.forward(&x);
        assert_slice_close(out.data(), &[1.5, 3.5, 1.5, 3.5], 1e-6);
    }

    #[test]
    fn relu_backward_zeroes_exactly_where_forward_output_was_zero() {
        let layer = Layer::Relu;
        let x = Matrix::column(&[-1.0, 0.0, 2.0]);
        let (out, ctx) = layer.forward(&x);
        assert_eq!(out.data(), &[0.0, 0.0, 2.0]);

        let upstream = Matrix::column(&[0.7, 0.8, 0.9]);
        let (d, grads) = layer.backward(&upstream, &ctx, BiasRule::default());
        assert!(grads.is_none());
        assert_eq!(d.data(), &[0.0, 0.0, 0.9]);
    }

    #[test]
    fn softmax_columns_are_distributions() {
        let layer = Layer::Softmax;
        let x = Matrix::from_vec(3, 2, vec![1.0, 100.0, 2.0, 100.0, 3.0, 100.0]);
        let (out, _) = layer.forward(&x);

        for c in 0..2 {
            let mut sum = 0.0;
            for r in 0..3 {
                let p = out.get(r, c);
                assert!(p >= 0.0);
                sum += p;
            }
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_backward_is_output_minus_labels_for_two_classes() {
        let layer = Layer::Softmax;
        let x = Matrix::column(&[1.0, -1.0]);
        let (out, ctx) = layer.forward(&x);

        // softmax([1, -1]) = [e^0, e^-2] / (1 + e^-2)
        let p0 = 1.0 / (1.0 + (-2.0_f32).exp());
        assert!((out.get(0, 0) - p0).abs() < 1e-6);

        let labels = Matrix::column(&[1.0, 0.0]);
        let (d, grads) = layer.backward(&labels, &ctx, BiasRule::default());
        assert!(grads.is_none());
        assert_slice_close(d.data(), &[p0 - 1.0, 1.0 - p0], 1e-6);
    }

    #[test]
    fn softmax_backward_averages_over_the_batch() {
        let layer = Layer::Softmax;
        // Two identical columns: the averaged gradient equals the per-column one.
        let x = Matrix::from_vec(2, 2, vec![0.5, 0.5, -0.5, -0.5]);
        let (out, ctx) = layer.forward(&x);

        let labels = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        let (d, _) = layer.backward(&labels, &ctx, BiasRule::default());
        assert_eq!(d.cols(), 1);

        let p0 = out.get(0, 0);
        // Column 0 contributes (p0 - 1, p1), column 1 contributes (p0, p1 - 1).
        assert_slice_close(d.data(), &[p0 - 0.5, (1.0 - p0) - 0.5], 1e-6);
    }

    #[test]
    fn affine_backward_produces_outer_product_and_transposed_signal() {
        let affine =
            Affine::from_parts(2, 2, vec![0.1, 0.2, 0.3, 0.4], vec![0.01, 0.02]).unwrap();
        let layer = Layer::Affine(affine);

        let x = Matrix::column(&[1.0, 2.0]);
        let (_, ctx) = layer.forward(&x);

        let g = Matrix::column(&[0.5, -1.0]);
        let (d_input, grads) = layer.backward(&g, &ctx, BiasRule::Rescale);
        let grads = grads.unwrap();

        assert_slice_close(grads.d_weights.data(), &[0.5, 1.0, -1.0, -2.0], 1e-6);
        // Wᵗ · g
        assert_slice_close(
            d_input.data(),
            &[0.1 * 0.5 + 0.3 * -1.0, 0.2 * 0.5 + 0.4 * -1.0],
            1e-6,
        );
        match grads.bias {
            BiasTerm::Replacement(b) => assert_slice_close(b.data(), &[0.005, -0.02], 1e-6),
            BiasTerm::Gradient(_) => panic!("rescale rule must produce a replacement"),
        }
    }

    #[test]
    fn gradient_bias_rule_takes_the_batch_mean() {
        let affine = Affine::from_parts(1, 2, vec![0.1, 0.2], vec![0.01, 0.02]).unwrap();
        let layer = Layer::Affine(affine);

        let x = Matrix::from_vec(1, 2, vec![1.0, 3.0]);
        let (_, ctx) = layer.forward(&x);

        let g = Matrix::from_vec(2, 2, vec![1.0, 3.0, -2.0, -4.0]);
        let (_, grads) = layer.backward(&g, &ctx, BiasRule::Gradient);
        match grads.unwrap().bias {
            BiasTerm::Gradient(db) => assert_slice_close(db.data(), &[2.0, -3.0], 1e-6),
            BiasTerm::Replacement(_) => panic!("gradient rule must produce a gradient"),
        }
    }
}

//! A small feed-forward classifier crate.
//!
//! `ffnet` is a from-scratch implementation of a dense feed-forward network
//! for multi-class classification, trained by hand-derived backpropagation
//! and plain stochastic gradient descent — no automatic differentiation.
//!
//! # Design goals
//!
//! - Pure layers: `forward` returns `(output, context)` and `backward`
//!   consumes the context, so no layer carries hidden per-call state.
//! - Clear contracts: shapes are explicit and validated at the API boundary;
//!   numeric blow-ups surface as errors instead of silent NaNs.
//! - Faithful numerics: the softmax + cross-entropy boundary is computed as
//!   one fused, stabilized step.
//!
//! # Panics vs `Result`
//!
//! This crate intentionally exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse): [`Matrix`] operations and
//!   [`Layer::forward`] / [`Layer::backward`]. Shape mismatches are treated
//!   as programmer error and panic via `assert!`.
//! - High-level APIs (shape-checked): [`Network::forward`],
//!   [`Network::fit`], [`Network::predict`], [`Network::accuracy`] and the
//!   [`Dataset`] constructors validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - [`Dataset`] and [`Inputs`] store examples contiguously in row-major
//!   layout: features `(examples, feature_dim)`, labels one-hot
//!   `(examples, num_classes)`.
//! - The network itself computes on column-per-example matrices: inputs
//!   `(feature_dim, batch)`, outputs `(num_classes, batch)`. Affine weights
//!   are row-major with shape `(out_dim, in_dim)`.
//!
//! # Logging
//!
//! Training progress is reported through the [`log`] facade; install any
//! `log`-compatible logger to see the periodic loss/accuracy lines.
//!
//! # Quick start
//!
//! ```rust
//! use ffnet::{Dataset, FitConfig, Network};
//!
//! # fn main() -> ffnet::Result<()> {
//! let xs = vec![
//!     vec![1.0, -1.0],
//!     vec![-1.0, 1.0],
//!     vec![0.8, -0.6],
//!     vec![-0.9, 0.7],
//! ];
//! let ys = vec![
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//! ];
//! let train = Dataset::from_rows(&xs, &ys)?;
//!
//! let mut net = Network::new_with_seed(&[2, 8, 2], 0)?;
//! let report = net.fit(
//!     &train,
//!     None,
//!     FitConfig {
//!         iters: 200,
//!         lr: 0.05,
//!         ..Default::default()
//!     },
//! )?;
//! assert!(report.final_loss.is_finite());
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod error;
pub mod layer;
pub mod matrix;
pub mod network;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use data::{one_hot, split_train_val, Dataset, Inputs, Standardizer};
pub use error::{Error, Result};
pub use layer::{Affine, AffineGrads, BiasRule, BiasTerm, Context, Layer};
pub use matrix::Matrix;
pub use network::{Gradients, Network, Tape};
pub use train::{FitConfig, FitReport};

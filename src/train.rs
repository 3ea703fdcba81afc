//! Training loop: single-example SGD with periodic progress reporting.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::matrix::Matrix;
use crate::{Dataset, Error, Network, Result};

#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    /// Number of single-example SGD steps.
    pub iters: usize,
    /// Learning rate.
    pub lr: f32,
    /// Recognized for interface compatibility but inert: the loop updates
    /// parameters after every single example regardless of this value.
    pub batch_size: usize,
    /// Seed for the example-order permutation.
    pub seed: u64,
    /// Report cadence: a progress line is logged whenever
    /// `iter % report_every == 0`.
    pub report_every: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            iters: 2000,
            lr: 1e-2,
            batch_size: 100,
            seed: 0,
            report_every: 1999,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    /// Mean training loss over the final reporting window.
    pub final_loss: f32,
    /// Training-set accuracy after the last update.
    pub train_accuracy: f32,
}

impl Network {
    /// Run `cfg.iters` single-example SGD steps over `train`.
    ///
    /// The example order is one permutation drawn up front from `cfg.seed`
    /// and cycled via modulo for the whole run; it is not reshuffled per
    /// epoch. Every iteration runs forward, cost, backward, and update on
    /// exactly one example.
    ///
    /// Whenever `iter % cfg.report_every == 0` a progress line is emitted via
    /// `log::info!` with the mean training loss since the last report, the
    /// training-set accuracy, and — when `val` is given — validation loss
    /// and accuracy. The report reads parameters before that iteration's
    /// update.
    pub fn fit(
        &mut self,
        train: &Dataset,
        val: Option<&Dataset>,
        cfg: FitConfig,
    ) -> Result<FitReport> {
        if train.is_empty() {
            return Err(Error::InvalidData(
                "train dataset must not be empty".to_owned(),
            ));
        }
        if train.feature_dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "train feature_dim {} does not match network input_dim {}",
                train.feature_dim(),
                self.input_dim()
            )));
        }
        if train.num_classes() != self.output_dim() {
            return Err(Error::InvalidData(format!(
                "train num_classes {} does not match network output_dim {}",
                train.num_classes(),
                self.output_dim()
            )));
        }
        if let Some(val) = val {
            if val.is_empty() {
                return Err(Error::InvalidData(
                    "validation dataset must not be empty".to_owned(),
                ));
            }
            if val.feature_dim() != train.feature_dim()
                || val.num_classes() != train.num_classes()
            {
                return Err(Error::InvalidData(format!(
                    "validation shapes ({}, {}) do not match train ({}, {})",
                    val.feature_dim(),
                    val.num_classes(),
                    train.feature_dim(),
                    train.num_classes()
                )));
            }
        }
        if cfg.iters == 0 {
            return Err(Error::InvalidConfig("iters must be > 0".to_owned()));
        }
        if !(cfg.lr.is_finite() && cfg.lr > 0.0) {
            return Err(Error::InvalidConfig("lr must be finite and > 0".to_owned()));
        }
        if cfg.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if cfg.report_every == 0 {
            return Err(Error::InvalidConfig(
                "report_every must be > 0".to_owned(),
            ));
        }

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        order.shuffle(&mut rng);

        let mut window_loss = 0.0_f32;
        let mut window_count = 0usize;
        let mut last_window_mean = 0.0_f32;

        for iter in 0..cfg.iters {
            let idx = order[iter % train.len()];
            let x = Matrix::column(train.features(idx));
            let y = Matrix::column(train.label(idx));

            let (predicted, tape) = self.forward(&x)?;
            let loss = self.cost(&predicted, &y);
            window_loss += loss;
            window_count += 1;

            let grads = self.backward(&y, &tape);

            if iter % cfg.report_every == 0 {
                last_window_mean = window_loss / window_count as f32;
                let train_accuracy = self.accuracy(train)?;

                match val {
                    Some(val) => {
                        let val_predicted = self.predict(&val.features_matrix())?;
                        let val_loss = self.cost(&val_predicted, &val.labels_matrix());
                        let val_accuracy = self.accuracy(val)?;
                        log::info!(
                            "iter {iter}: train loss {last_window_mean:.3}, train accuracy {train_accuracy:.3}, val loss {val_loss:.3}, val accuracy {val_accuracy:.3}"
                        );
                    }
                    None => {
                        log::info!(
                            "iter {iter}: train loss {last_window_mean:.3}, train accuracy {train_accuracy:.3}"
                        );
                    }
                }

                window_loss = 0.0;
                window_count = 0;
            }

            self.apply_gradients(&grads, cfg.lr);
        }

        let final_loss = if window_count > 0 {
            window_loss / window_count as f32
        } else {
            last_window_mean
        };

        Ok(FitReport {
            final_loss,
            train_accuracy: self.accuracy(train)?,
        })
    }
}

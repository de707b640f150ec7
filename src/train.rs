use tracing::{debug, trace};

use crate::optim::validate_learning_rate;
use crate::tensor::Tensor;
use crate::{Error, Loss, Mlp, Optimizer, Result};

#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub epochs: usize,
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub lr: f32,
}

impl Default for FitConfig {
    fn default() -> Self {
        let optimizer = Optimizer::default();
        Self {
            epochs: 10,
            optimizer,
            loss: Loss::MeanSquaredError,
            lr: optimizer.default_learning_rate(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitReport {
    /// Mean per-row training loss of every epoch, in order.
    pub history: Vec<f32>,
}

impl FitReport {
    #[inline]
    pub fn final_loss(&self) -> f32 {
        self.history.last().copied().unwrap_or(0.0)
    }
}

impl Mlp {
    fn check_inputs(&self, x: &Tensor) -> Result<()> {
        if x.shape()[1..] != *self.input_shape() {
            return Err(Error::InvalidShape(format!(
                "input samples have shape {:?}, model expects {:?}",
                &x.shape()[1..],
                self.input_shape()
            )));
        }
        Ok(())
    }

    fn check_targets(&self, x: &Tensor, y: &Tensor) -> Result<()> {
        self.check_inputs(x)?;
        if y.shape()[1..] != self.output_shape()[..] {
            return Err(Error::InvalidShape(format!(
                "target samples have shape {:?}, model produces {:?}",
                &y.shape()[1..],
                self.output_shape()
            )));
        }
        if x.rows() != y.rows() {
            return Err(Error::InvalidShape(format!(
                "{} input samples but {} target samples",
                x.rows(),
                y.rows()
            )));
        }
        Ok(())
    }

    /// Train in place, one optimizer step per row, samples in order.
    pub fn fit(&mut self, x: &Tensor, y: &Tensor, cfg: &FitConfig) -> Result<FitReport> {
        self.check_targets(x, y)?;
        if cfg.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        validate_learning_rate(cfg.lr)?;

        let (in_dim, out_dim) = (self.input_dim(), self.output_dim());
        let rows = x.rows() * self.rows_per_sample();
        let mut trainer = self.trainer();
        let mut opt = cfg.optimizer.state(self);
        let mut history = Vec::with_capacity(cfg.epochs);

        for epoch in 0..cfg.epochs {
            let mut epoch_loss = 0.0_f32;
            for (input, target) in x
                .data()
                .chunks_exact(in_dim)
                .zip(y.data().chunks_exact(out_dim))
            {
                self.forward(input, &mut trainer.scratch);
                epoch_loss += cfg.loss.backward(
                    trainer.scratch.output(),
                    target,
                    trainer.grads.d_output_mut(),
                );
                self.backward(input, &trainer.scratch, &mut trainer.grads);
                opt.step(self, &mut trainer.grads, cfg.lr);
            }
            let mean = epoch_loss / rows as f32;
            trace!(epoch, loss = mean, "epoch finished");
            history.push(mean);
        }

        debug!(
            epochs = cfg.epochs,
            rows,
            optimizer = ?cfg.optimizer,
            final_loss = history.last().copied().unwrap_or_default(),
            "fit finished"
        );
        Ok(FitReport { history })
    }

    /// Predict every sample of `x`. The result has shape `[n] ++ output_shape()`.
    pub fn predict(&self, x: &Tensor) -> Result<Tensor> {
        self.check_inputs(x)?;

        let mut scratch = self.scratch();
        let mut preds = Vec::with_capacity(x.rows() * self.rows_per_sample() * self.output_dim());
        for input in x.data().chunks_exact(self.input_dim()) {
            preds.extend_from_slice(self.forward(input, &mut scratch));
        }

        let mut shape = vec![x.rows()];
        shape.extend(self.output_shape());
        Tensor::new(preds, shape)
    }

    /// Mean per-row `loss` over a dataset.
    pub fn evaluate(&self, x: &Tensor, y: &Tensor, loss: Loss) -> Result<f32> {
        self.check_targets(x, y)?;

        let mut scratch = self.scratch();
        let mut total = 0.0_f32;
        let mut rows = 0_usize;
        for (input, target) in x
            .data()
            .chunks_exact(self.input_dim())
            .zip(y.data().chunks_exact(self.output_dim()))
        {
            self.forward(input, &mut scratch);
            total += loss.forward(scratch.output(), target);
            rows += 1;
        }
        Ok(total / rows as f32)
    }
}

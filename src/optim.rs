//! Optimizers.
//!
//! [`Optimizer`] is the name stored in the configuration (`"sgd"`,
//! `"momentum"`, `"adam"`). Calling [`Optimizer::state`] allocates the
//! per-parameter buffers that the training loop reuses across steps; the model
//! itself never holds optimizer state.

use serde::{Deserialize, Serialize};

use crate::{Error, Gradients, Mlp, Result};

const MOMENTUM: f32 = 0.9;
const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// SGD with momentum 0.9.
    Momentum,
    /// Adam (bias-corrected), beta1 0.9, beta2 0.999.
    #[default]
    Adam,
}

impl Optimizer {
    /// Learning rate used when the configuration does not name one.
    #[inline]
    pub fn default_learning_rate(self) -> f32 {
        match self {
            Optimizer::Sgd | Optimizer::Momentum => 0.01,
            Optimizer::Adam => 0.001,
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &Mlp) -> OptimizerState {
        match self {
            Optimizer::Sgd => OptimizerState::Sgd,
            Optimizer::Momentum => {
                let (v_weights, v_biases) = zeros_like_params(model);
                OptimizerState::Momentum {
                    momentum: MOMENTUM,
                    v_weights,
                    v_biases,
                }
            }
            Optimizer::Adam => {
                let (m_weights, m_biases) = zeros_like_params(model);
                let (v_weights, v_biases) = zeros_like_params(model);
                OptimizerState::Adam {
                    beta1: ADAM_BETA1,
                    beta2: ADAM_BETA2,
                    eps: ADAM_EPS,
                    beta1_pow: 1.0,
                    beta2_pow: 1.0,
                    m_weights,
                    m_biases,
                    v_weights,
                    v_biases,
                }
            }
        }
    }
}

/// Validate a learning rate before training starts.
pub fn validate_learning_rate(lr: f32) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
/// Owned optimizer state.
pub enum OptimizerState {
    Sgd,
    Momentum {
        momentum: f32,
        v_weights: Vec<Vec<f32>>,
        v_biases: Vec<Vec<f32>>,
    },
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        beta1_pow: f32,
        beta2_pow: f32,
        m_weights: Vec<Vec<f32>>,
        m_biases: Vec<Vec<f32>>,
        v_weights: Vec<Vec<f32>>,
        v_biases: Vec<Vec<f32>>,
    },
}

impl OptimizerState {
    /// Apply one optimizer step.
    ///
    /// `grads` may be overwritten with the update direction.
    pub fn step(&mut self, model: &mut Mlp, grads: &mut Gradients, lr: f32) {
        match self {
            OptimizerState::Sgd => model.sgd_step(grads, lr),
            OptimizerState::Momentum {
                momentum,
                v_weights,
                v_biases,
            } => {
                debug_assert_eq!(v_weights.len(), model.num_layers());

                // v = momentum * v + g, then step along v.
                for layer_idx in 0..model.num_layers() {
                    let vw = &mut v_weights[layer_idx];
                    for (v, g) in vw.iter_mut().zip(grads.d_weights_mut(layer_idx)) {
                        *v = momentum.mul_add(*v, *g);
                        *g = *v;
                    }
                    let vb = &mut v_biases[layer_idx];
                    for (v, g) in vb.iter_mut().zip(grads.d_biases_mut(layer_idx)) {
                        *v = momentum.mul_add(*v, *g);
                        *g = *v;
                    }
                }
                model.sgd_step(grads, lr);
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m_weights,
                m_biases,
                v_weights,
                v_biases,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let moments = AdamMoments {
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    corr1: 1.0 - *beta1_pow,
                    corr2: 1.0 - *beta2_pow,
                };

                for layer_idx in 0..model.num_layers() {
                    moments.apply(
                        grads.d_weights_mut(layer_idx),
                        &mut m_weights[layer_idx],
                        &mut v_weights[layer_idx],
                    );
                    moments.apply(
                        grads.d_biases_mut(layer_idx),
                        &mut m_biases[layer_idx],
                        &mut v_biases[layer_idx],
                    );
                }
                model.sgd_step(grads, lr);
            }
        }
    }
}

struct AdamMoments {
    beta1: f32,
    beta2: f32,
    eps: f32,
    corr1: f32,
    corr2: f32,
}

impl AdamMoments {
    /// Overwrites `grads` with the bias-corrected Adam direction.
    #[inline]
    fn apply(&self, grads: &mut [f32], m: &mut [f32], v: &mut [f32]) {
        debug_assert_eq!(grads.len(), m.len());
        debug_assert_eq!(grads.len(), v.len());
        for i in 0..grads.len() {
            let g = grads[i];
            m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
            v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * (g * g);
            let m_hat = m[i] / self.corr1;
            let v_hat = v[i] / self.corr2;
            grads[i] = m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

fn zeros_like_params(model: &Mlp) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    model
        .layers()
        .iter()
        .map(|layer| {
            (
                vec![0.0; layer.in_dim() * layer.out_dim()],
                vec![0.0; layer.out_dim()],
            )
        })
        .unzip()
}

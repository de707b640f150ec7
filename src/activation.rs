//! Activation functions.
//!
//! A dense layer computes `z = W x + b` and then applies an activation
//! element-wise: `y = activation(z)`. Only the post-activation output `y` is
//! cached during the forward pass; backprop derives `dy/dz` from `y`.
//!
//! On the wire activations use their config names: `"sigmoid"`, `"relu"`,
//! `"tanh"`, `"linear"` and `{"leakyRelu": {"alpha": 0.1}}`.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Element-wise activation function.
pub enum Activation {
    Sigmoid,
    Relu,
    Tanh,
    /// Identity. Dense layers without an explicit activation use this.
    #[default]
    Linear,
    LeakyRelu {
        alpha: f32,
    },
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyRelu { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky relu alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Sigmoid | Activation::Relu | Activation::Tanh | Activation::Linear => {}
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Sigmoid => sigmoid(x),
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }

    /// `dy/dz` expressed through the cached output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Linear => 1.0,
            Activation::LeakyRelu { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable for large |x|.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

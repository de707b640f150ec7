//! Regression losses.
//!
//! Used like:
//!
//! - run `model.forward(...)`
//! - compute `d_output` via [`Loss::backward`]
//! - run `model.backward(...)`
//! - update parameters with an optimizer

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Supported loss functions, named as in the configuration.
pub enum Loss {
    /// `mean((pred - target)^2)`.
    MeanSquaredError,
    /// `mean(|pred - target|)`.
    MeanAbsoluteError,
}

impl Loss {
    /// Compute a loss value.
    ///
    /// Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::MeanSquaredError => mse(pred, target),
            Loss::MeanAbsoluteError => mae(pred, target),
        }
    }

    /// Compute loss + gradient w.r.t `pred`.
    ///
    /// Writes `dL/d(pred)` into `d_pred` and returns the loss.
    #[inline]
    pub fn backward(self, pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
        match self {
            Loss::MeanSquaredError => mse_backward(pred, target, d_pred),
            Loss::MeanAbsoluteError => mae_backward(pred, target, d_pred),
        }
    }
}

#[inline]
fn check_lens(pred: &[f32], target: &[f32]) {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
}

/// Mean squared error.
#[inline]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum_sq = 0.0_f32;
    for (p, t) in pred.iter().zip(target) {
        let diff = p - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    sum_sq / pred.len() as f32
}

/// MSE + gradient: `d_pred[i] = 2 * (pred[i] - target[i]) / N`.
#[inline]
pub fn mse_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    assert_eq!(pred.len(), d_pred.len(), "d_pred len mismatch");
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum_sq = diff.mul_add(diff, sum_sq);
        d_pred[i] = 2.0 * diff * inv_n;
    }
    sum_sq * inv_n
}

/// Mean absolute error.
#[inline]
pub fn mae(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let sum: f32 = pred.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
    sum / pred.len() as f32
}

/// MAE + subgradient (0 at `pred == target`).
#[inline]
pub fn mae_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    assert_eq!(pred.len(), d_pred.len(), "d_pred len mismatch");
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum += diff.abs();
        d_pred[i] = if diff > 0.0 {
            inv_n
        } else if diff < 0.0 {
            -inv_n
        } else {
            0.0
        };
    }
    sum * inv_n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_is_zero_when_equal() {
        let pred = [1.0_f32, -2.0, 0.5];
        assert_eq!(mse(&pred, &pred), 0.0);
    }

    #[test]
    fn mse_backward_matches_expected_gradient() {
        let pred = [1.0_f32, 3.0];
        let target = [2.0_f32, 1.0];
        let mut d_pred = [0.0_f32; 2];
        let loss = mse_backward(&pred, &target, &mut d_pred);

        // mean([1, 4]) = 2.5
        assert!((loss - 2.5).abs() < 1e-6);
        assert!((d_pred[0] - (-1.0)).abs() < 1e-6);
        assert!((d_pred[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn mae_backward_uses_sign() {
        let mut d = [0.0_f32; 3];
        let loss = mae_backward(&[1.0, 0.0, 2.0], &[0.0, 0.0, 4.0], &mut d);
        assert!((loss - 1.0).abs() < 1e-6);
        assert_eq!(d, [1.0 / 3.0, 0.0, -1.0 / 3.0]);
    }

    #[test]
    fn config_names() {
        let l: Loss = serde_json::from_str(r#""meanSquaredError""#).unwrap();
        assert_eq!(l, Loss::MeanSquaredError);
    }
}

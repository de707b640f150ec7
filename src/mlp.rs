use crate::Layer;
use crate::{Error, Result};

/// A stack of dense layers applied to the last axis of each sample.
///
/// A sample has shape `input_shape`. Its leading axes are treated as
/// independent rows of `input_dim()` features, so the output of one sample has
/// shape `input_shape[..n-1] ++ [output_dim()]`.
#[derive(Debug, Clone)]
pub struct Mlp {
    input_shape: Vec<usize>,
    layers: Vec<Layer>,
}

/// Reusable buffers for `Mlp::forward`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for an `Mlp` (overwrite semantics).
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Gradient w.r.t each layer output, including the final one; `backward`
    // reads the upstream gradient from the last entry.
    d_layer_outputs: Vec<Vec<f32>>,

    d_input: Vec<f32>,
}

impl Mlp {
    /// Assemble a model from already-built layers.
    pub fn from_layers(input_shape: Vec<usize>, layers: Vec<Layer>) -> Result<Self> {
        let Some(&in_dim) = input_shape.last() else {
            return Err(Error::InvalidShape(
                "model input shape must not be empty".to_owned(),
            ));
        };
        if input_shape.contains(&0) {
            return Err(Error::InvalidShape(format!(
                "model input shape must not contain 0, got {input_shape:?}"
            )));
        }
        let Some(first) = layers.first() else {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        };
        if first.in_dim() != in_dim {
            return Err(Error::InvalidShape(format!(
                "first layer in_dim {} does not match input shape {input_shape:?}",
                first.in_dim()
            )));
        }
        for (i, w) in layers.windows(2).enumerate() {
            if w[1].in_dim() != w[0].out_dim() {
                return Err(Error::InvalidShape(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    w[1].in_dim(),
                    w[0].out_dim()
                )));
            }
        }
        Ok(Self {
            input_shape,
            layers,
        })
    }

    /// Shape of one input sample.
    #[inline]
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Shape of one output sample.
    pub fn output_shape(&self) -> Vec<usize> {
        let mut shape = self.input_shape[..self.input_shape.len() - 1].to_vec();
        shape.push(self.output_dim());
        shape
    }

    /// Rows per sample: product of the leading sample axes.
    #[inline]
    pub fn rows_per_sample(&self) -> usize {
        self.input_shape[..self.input_shape.len() - 1]
            .iter()
            .product()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Allocate all per-step training buffers.
    #[inline]
    pub fn trainer(&self) -> Trainer {
        Trainer::new(self)
    }

    /// Forward pass for a single row.
    ///
    /// Writes intermediate activations into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Mlp`
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx == 0 {
                layer.forward(input, &mut scratch.layer_outputs[0]);
            } else {
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                layer.forward(&left[idx - 1], &mut right[0]);
            }
        }

        scratch.output()
    }

    /// Backward pass for a single row.
    ///
    /// Call `forward` first with the same `input` and `scratch`, and write
    /// `dL/d(output)` into `grads.d_output_mut()`. `grads` is overwritten.
    ///
    /// Returns dL/d(input).
    pub fn backward<'a>(
        &self,
        input: &[f32],
        scratch: &Scratch,
        grads: &'a mut Gradients,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} layers, model has {}",
            grads.d_weights.len(),
            self.layers.len()
        );

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.layer_outputs[idx - 1]
            };
            let layer_output: &[f32] = &scratch.layer_outputs[idx];

            if idx == 0 {
                layer.backward(
                    layer_input,
                    layer_output,
                    &grads.d_layer_outputs[0],
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                // d_inputs of this layer is d_outputs of the previous one.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                layer.backward(
                    layer_input,
                    layer_output,
                    &right[0],
                    &mut left[idx - 1],
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// Applies an SGD update to all layers.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.sgd_step(&grads.d_weights[i], &grads.d_biases[i], lr);
        }
    }
}

/// Scratch + gradients for training a specific `Mlp`.
#[derive(Debug, Clone)]
pub struct Trainer {
    pub scratch: Scratch,
    pub grads: Gradients,
}

impl Trainer {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            scratch: Scratch::new(mlp),
            grads: Gradients::new(mlp),
        }
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            layer_outputs: mlp.layers.iter().map(|l| vec![0.0; l.out_dim()]).collect(),
        }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        match self.layer_outputs.last() {
            Some(out) => out,
            None => &[],
        }
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp) -> Self {
        let mut d_weights = Vec::with_capacity(mlp.layers.len());
        let mut d_biases = Vec::with_capacity(mlp.layers.len());
        let mut d_layer_outputs = Vec::with_capacity(mlp.layers.len());

        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }

        Self {
            d_weights,
            d_biases,
            d_layer_outputs,
            d_input: vec![0.0; mlp.input_dim()],
        }
    }

    /// Upstream gradient buffer for the final model output.
    ///
    /// Typical flow: `forward`, loss writes into `d_output_mut()`, `backward`.
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        match self.d_layer_outputs.last_mut() {
            Some(d) => d,
            None => &mut [],
        }
    }

    #[inline]
    pub fn d_input(&self) -> &[f32] {
        &self.d_input
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, Loss, MlpBuilder};

    fn loss_at(mlp: &Mlp, input: &[f32], target: &[f32], scratch: &mut Scratch) -> f32 {
        mlp.forward(input, scratch);
        Loss::MeanSquaredError.forward(scratch.output(), target)
    }

    #[test]
    fn seeded_build_is_deterministic() {
        let build = || {
            MlpBuilder::new(vec![2])
                .unwrap()
                .add_layer(3, Activation::Tanh, true)
                .unwrap()
                .add_layer(1, Activation::Linear, true)
                .unwrap()
                .build_with_seed(123)
                .unwrap()
        };
        let (a, b) = (build(), build());
        let input = [0.3_f32, -0.7];
        let out_a = a.forward(&input, &mut a.scratch()).to_vec();
        let out_b = b.forward(&input, &mut b.scratch()).to_vec();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn backward_matches_numeric_weight_gradients() {
        let mut mlp = MlpBuilder::new(vec![2])
            .unwrap()
            .add_layer(3, Activation::Sigmoid, true)
            .unwrap()
            .add_layer(1, Activation::Linear, true)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let mut scratch = mlp.scratch();
        let mut grads = mlp.gradients();
        let input = [0.3_f32, -0.7];
        let target = [0.2_f32];

        mlp.forward(&input, &mut scratch);
        Loss::MeanSquaredError.backward(scratch.output(), &target, grads.d_output_mut());
        mlp.backward(&input, &scratch, &mut grads);

        let eps = 1e-3_f32;
        let mut tmp = mlp.scratch();
        for layer_idx in 0..mlp.num_layers() {
            let n = grads.d_weights(layer_idx).len();
            for p in 0..n {
                let orig = mlp.layer(layer_idx).unwrap().weights()[p];
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig + eps;
                let plus = loss_at(&mlp, &input, &target, &mut tmp);
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig - eps;
                let minus = loss_at(&mlp, &input, &target, &mut tmp);
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                let analytic = grads.d_weights(layer_idx)[p];
                let diff = (analytic - numeric).abs();
                assert!(
                    diff <= 1e-3 || diff / analytic.abs().max(1.0) <= 1e-2,
                    "layer {layer_idx} param {p}: analytic={analytic} numeric={numeric}"
                );
            }
        }
    }

    #[test]
    fn output_shape_keeps_leading_axes() {
        let mlp = MlpBuilder::new(vec![3, 2])
            .unwrap()
            .add_layer(4, Activation::Linear, true)
            .unwrap()
            .add_layer(1, Activation::Linear, true)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        assert_eq!(mlp.rows_per_sample(), 3);
        assert_eq!(mlp.output_shape(), vec![3, 1]);
    }

    #[test]
    fn from_layers_rejects_mismatched_chain() {
        let a = Layer::from_parts(2, 3, Activation::Linear, true, vec![0.0; 6], vec![0.0; 3])
            .unwrap();
        let b = Layer::from_parts(2, 1, Activation::Linear, true, vec![0.0; 2], vec![0.0])
            .unwrap();
        assert!(Mlp::from_layers(vec![2], vec![a, b]).is_err());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mlp = MlpBuilder::new(vec![2])
            .unwrap()
            .add_layer(1, Activation::Linear, true)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let mut scratch = mlp.scratch();
        mlp.forward(&[0.0_f32; 3], &mut scratch);
    }
}

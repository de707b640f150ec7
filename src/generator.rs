//! Dense layer stack derivation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Activation, Error, Result};

/// One dense layer as it appears in `override` and `generated.layers`.
///
/// `inputShape` is the per-sample shape the layer consumes. Only the first
/// layer of a stack needs it; later layers take the previous layer's output.
/// A missing `activation` means linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub units: usize,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Vec<usize>>,
}

fn default_use_bias() -> bool {
    true
}

impl LayerSpec {
    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation.unwrap_or_default()
    }
}

/// Derive a symmetric stack of `amount` dense layers of `nodes` units.
///
/// `x_dims` and `y_dims` are full tensor shapes with the sample axis first.
/// Only the last layer carries `activation`; the others are linear.
pub fn symmetric_stack(
    amount: usize,
    nodes: usize,
    bias: bool,
    activation: Activation,
    x_dims: &[usize],
    y_dims: &[usize],
) -> Result<Vec<LayerSpec>> {
    if amount == 0 {
        return Err(Error::DnnGenerator("layer amount must be > 0".to_owned()));
    }
    if nodes == 0 {
        return Err(Error::DnnGenerator("node count must be > 0".to_owned()));
    }
    if x_dims.len() < 2 || y_dims.len() < 2 {
        return Err(Error::DnnGenerator(format!(
            "feature and label shapes need a unit axis, got {x_dims:?} and {y_dims:?}"
        )));
    }
    let x_lead = &x_dims[1..x_dims.len() - 1];
    let y_lead = &y_dims[1..y_dims.len() - 1];
    if x_lead != y_lead {
        return Err(Error::DnnGenerator(format!(
            "feature sample shape {:?} and label sample shape {:?} disagree on leading axes",
            &x_dims[1..],
            &y_dims[1..]
        )));
    }

    let input = x_dims[1..].to_vec();
    let mut hidden = x_lead.to_vec();
    hidden.push(nodes);
    let Some(&label_units) = y_dims.last() else {
        return Err(Error::DnnGenerator("label shape is empty".to_owned()));
    };

    let specs = (0..amount)
        .map(|i| {
            let first = i == 0;
            let last = i == amount - 1;
            LayerSpec {
                units: if last { label_units } else { nodes },
                use_bias: bias,
                activation: last.then_some(activation),
                input_shape: Some(if first { input.clone() } else { hidden.clone() }),
            }
        })
        .collect::<Vec<_>>();

    debug!(amount, nodes, ?input, label_units, "derived symmetric layer stack");
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_layer_stack_for_two_features_one_label() {
        let specs = symmetric_stack(3, 10, true, Activation::Sigmoid, &[20, 2], &[20, 1]).unwrap();
        assert_eq!(specs.len(), 3);

        assert_eq!(specs[0].units, 10);
        assert_eq!(specs[0].input_shape, Some(vec![2]));
        assert_eq!(specs[0].activation, None);

        assert_eq!(specs[1].units, 10);
        assert_eq!(specs[1].input_shape, Some(vec![10]));

        assert_eq!(specs[2].units, 1);
        assert_eq!(specs[2].activation, Some(Activation::Sigmoid));
        assert_eq!(specs[2].input_shape, Some(vec![10]));
        assert!(specs.iter().all(|s| s.use_bias));
    }

    #[test]
    fn single_layer_maps_input_to_label_units() {
        let specs = symmetric_stack(1, 4, false, Activation::Tanh, &[8, 3], &[8, 2]).unwrap();
        assert_eq!(
            specs,
            vec![LayerSpec {
                units: 2,
                use_bias: false,
                activation: Some(Activation::Tanh),
                input_shape: Some(vec![3]),
            }]
        );
    }

    #[test]
    fn higher_rank_samples_keep_leading_axes() {
        let specs = symmetric_stack(2, 5, true, Activation::Relu, &[4, 3, 2], &[4, 3, 1]).unwrap();
        assert_eq!(specs[0].input_shape, Some(vec![3, 2]));
        assert_eq!(specs[1].input_shape, Some(vec![3, 5]));
        assert_eq!(specs[1].units, 1);
    }

    #[test]
    fn rejects_degenerate_requests() {
        let gen_err = |r: Result<Vec<LayerSpec>>| matches!(r, Err(Error::DnnGenerator(_)));
        assert!(gen_err(symmetric_stack(0, 10, true, Activation::Sigmoid, &[2, 1], &[2, 1])));
        assert!(gen_err(symmetric_stack(2, 0, true, Activation::Sigmoid, &[2, 1], &[2, 1])));
        assert!(gen_err(symmetric_stack(2, 3, true, Activation::Sigmoid, &[2], &[2, 1])));
        assert!(gen_err(symmetric_stack(2, 3, true, Activation::Sigmoid, &[2, 3, 1], &[2, 4, 1])));
    }

    #[test]
    fn layer_spec_json_uses_camel_case() {
        let spec: LayerSpec =
            serde_json::from_str(r#"{"units": 4, "inputShape": [2], "activation": "relu"}"#)
                .unwrap();
        assert!(spec.use_bias);
        assert_eq!(spec.input_shape, Some(vec![2]));
        assert_eq!(spec.activation(), Activation::Relu);
    }
}

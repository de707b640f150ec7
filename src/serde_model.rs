//! Model artifact format.
//!
//! The persisted artifact is a versioned JSON document, decoupled from the
//! in-memory `Mlp`/`Layer` structs. Loading validates the format version,
//! dimensions, parameter lengths and that every parameter is finite.

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMlp {
    pub format_version: u32,
    /// Shape of one input sample.
    pub input_shape: Vec<usize>,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: Activation,
    pub use_bias: bool,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl SerializedMlp {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {MODEL_FORMAT_VERSION}",
                self.format_version
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }
        if self.input_shape.last() != Some(&self.layers[0].in_dim) {
            return Err(Error::InvalidData(format!(
                "input shape {:?} does not end in first layer in_dim {}",
                self.input_shape, self.layers[0].in_dim
            )));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].in_dim != pair[0].out_dim {
                return Err(Error::InvalidData(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    pair[1].in_dim,
                    pair[0].out_dim
                )));
            }
        }
        Ok(())
    }
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            input_shape: model.input_shape().to_vec(),
            layers: model.layers().iter().map(SerializedLayer::from).collect(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: layer.activation(),
            use_bias: layer.use_bias(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl TryFrom<SerializedMlp> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedMlp) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let layers = value
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, l)| {
                // from_parts checks lengths and finiteness.
                Layer::from_parts(
                    l.in_dim,
                    l.out_dim,
                    l.activation,
                    l.use_bias,
                    l.weights,
                    l.biases,
                )
                .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Mlp::from_layers(value.input_shape, layers)
            .map_err(|e| Error::InvalidData(format!("model invalid: {e}")))
    }
}

impl Mlp {
    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&SerializedMlp::from(self))?)
    }

    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&SerializedMlp::from(self))?)
    }

    /// Parse and validate a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedMlp = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer() -> Mlp {
        let l1 = Layer::from_parts(
            2,
            3,
            Activation::Tanh,
            true,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![0.1, 0.2, 0.3],
        )
        .unwrap();
        let l2 = Layer::from_parts(3, 1, Activation::Sigmoid, false, vec![7.0, 8.0, 9.0], vec![0.0])
            .unwrap();
        Mlp::from_layers(vec![2], vec![l1, l2]).unwrap()
    }

    #[test]
    fn json_roundtrip_preserves_predictions() {
        let mlp = two_layer();
        let json = mlp.to_json_string().unwrap();
        let loaded = Mlp::from_json_str(&json).unwrap();

        let input = [0.25_f32, -0.5];
        let a = mlp.forward(&input, &mut mlp.scratch()).to_vec();
        let b = loaded.forward(&input, &mut loaded.scratch()).to_vec();
        assert_eq!(a, b);
        assert!(!loaded.layer(1).unwrap().use_bias());
        assert_eq!(loaded.input_shape(), &[2]);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"input_shape":[1],"layers":[]}"#;
        let err = Mlp::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_non_finite_parameters() {
        let mut ser = SerializedMlp::from(&two_layer());
        ser.layers[0].weights[0] = f32::INFINITY;
        assert!(Mlp::try_from(ser).is_err());
    }

    #[test]
    fn rejects_input_shape_mismatch() {
        let mut ser = SerializedMlp::from(&two_layer());
        ser.input_shape = vec![3];
        assert!(matches!(Mlp::try_from(ser), Err(Error::InvalidData(_))));
    }
}

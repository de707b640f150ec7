//! Model builder.
//!
//! `MlpBuilder` turns a list of dense layer descriptions into an `Mlp`,
//! choosing a weight initializer per activation:
//!
//! - `tanh` / `sigmoid` / `linear`: Xavier/Glorot
//! - `relu` / `leaky relu`: He/Kaiming

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::generator::LayerSpec;
use crate::{Activation, Error, Init, Layer, Mlp, Result};

#[derive(Debug, Clone, Copy)]
struct Planned {
    out_dim: usize,
    activation: Activation,
    use_bias: bool,
}

#[derive(Debug, Clone)]
/// Builder for an `Mlp`.
///
/// ```rust
/// use mlp_session::{Activation, MlpBuilder};
///
/// # fn main() -> mlp_session::Result<()> {
/// let mlp = MlpBuilder::new(vec![2])?
///     .add_layer(8, Activation::Relu, true)?
///     .add_layer(1, Activation::Sigmoid, true)?
///     .build_with_seed(0)?;
/// assert_eq!(mlp.output_shape(), vec![1]);
/// # Ok(())
/// # }
/// ```
pub struct MlpBuilder {
    input_shape: Vec<usize>,
    layers: Vec<Planned>,
}

impl MlpBuilder {
    /// Start building a model whose samples have shape `input_shape`.
    pub fn new(input_shape: Vec<usize>) -> Result<Self> {
        if input_shape.is_empty() || input_shape.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "input shape must be non-empty with dims > 0, got {input_shape:?}"
            )));
        }
        Ok(Self {
            input_shape,
            layers: Vec::new(),
        })
    }

    /// Start from layer specs, as produced by the generator or an override list.
    ///
    /// The first spec must carry `inputShape`. Later specs may carry it too, in
    /// which case it must equal the previous layer's output shape.
    pub fn from_specs(specs: &[LayerSpec]) -> Result<Self> {
        let Some(first) = specs.first() else {
            return Err(Error::InvalidConfig(
                "layer list must not be empty".to_owned(),
            ));
        };
        let Some(input_shape) = first.input_shape.clone() else {
            return Err(Error::InvalidConfig(
                "first layer must declare inputShape".to_owned(),
            ));
        };

        let lead = input_shape[..input_shape.len().saturating_sub(1)].to_vec();
        let mut b = Self::new(input_shape)?;
        let mut current = b.input_shape.clone();
        for (i, spec) in specs.iter().enumerate() {
            if let Some(declared) = &spec.input_shape {
                if *declared != current {
                    return Err(Error::InvalidConfig(format!(
                        "layer {i} declares inputShape {declared:?}, previous layer yields {current:?}"
                    )));
                }
            }
            b = b.add_layer(spec.units, spec.activation(), spec.use_bias)?;
            current = lead.clone();
            current.push(spec.units);
        }
        Ok(b)
    }

    /// Add a dense layer with `out_dim` units.
    pub fn add_layer(
        mut self,
        out_dim: usize,
        activation: Activation,
        use_bias: bool,
    ) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer units must be > 0".to_owned()));
        }
        activation.validate()?;

        self.layers.push(Planned {
            out_dim,
            activation,
            use_bias,
        });
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        let Some(&in_dim) = self.input_shape.last() else {
            return Err(Error::InvalidConfig("input shape is empty".to_owned()));
        };

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = in_dim;
        for p in self.layers {
            let init = Init::for_activation(p.activation);
            layers.push(Layer::new_with_rng(
                in_dim,
                p.out_dim,
                init,
                p.activation,
                p.use_bias,
                rng,
            )?);
            in_dim = p.out_dim;
        }

        Mlp::from_layers(self.input_shape, layers)
    }
}

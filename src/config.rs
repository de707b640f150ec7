//! Session configuration.
//!
//! Users describe a session with a [`UserConfig`], where every training knob is
//! optional. [`resolve`] fills each missing knob with its default and yields a
//! complete [`Config`]. The `generated` section is output only: the session
//! writes resolved layers, losses, timings and provenance into it.
//!
//! Both types use camelCase keys on the wire:
//!
//! ```json
//! {
//!   "neural": {
//!     "model": { "epochs": 10, "loss": "meanSquaredError", "optimizer": "adam", "ttSplit": 2 },
//!     "layers": { "amount": 3, "nodes": 10, "bias": true, "activation": "sigmoid" }
//!   },
//!   "system": { "visual": false, "params": [["a", "b"], "c"], "csvPath": "data.csv" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Params;
use crate::generator::LayerSpec;
use crate::shape::{Adjusted, DeferredDim, Dim, ShapePair, TensorShape};
use crate::{Activation, Loss, Optimizer, Result};

pub const DEFAULT_EPOCHS: usize = 10;
pub const DEFAULT_LOSS: Loss = Loss::MeanSquaredError;
pub const DEFAULT_OPTIMIZER: Optimizer = Optimizer::Adam;
pub const DEFAULT_TT_SPLIT: usize = 2;
pub const DEFAULT_BIAS: bool = true;
pub const DEFAULT_ACTIVATION: Activation = Activation::Sigmoid;
pub const DEFAULT_AMOUNT: usize = 3;
pub const DEFAULT_NODES: usize = 10;

/// Label recorded in `generated.normalized.with`.
pub const NORMALIZATION_METHOD: &str = "global-min-max";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default)]
    pub neural: Option<UserNeural>,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNeural {
    #[serde(default)]
    pub model: Option<UserModel>,
    #[serde(default)]
    pub layers: Option<UserLayers>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserModel {
    pub epochs: Option<usize>,
    pub loss: Option<Loss>,
    pub optimizer: Option<Optimizer>,
    pub tt_split: Option<usize>,
    pub learning_rate: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLayers {
    pub amount: Option<usize>,
    pub nodes: Option<usize>,
    pub bias: Option<bool>,
    pub activation: Option<Activation>,
    pub tensor_shapes: Option<ShapePair>,
    #[serde(rename = "override")]
    pub override_layers: Option<Vec<LayerSpec>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub visual: bool,
    pub params: Params,
    pub csv_path: String,
    /// Seed for shuffling and weight init. Drawn per training run when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl UserConfig {
    /// A configuration with only the required `system` keys.
    pub fn new(params: Params, csv_path: impl Into<String>) -> Self {
        Self {
            neural: None,
            system: SystemConfig {
                visual: false,
                params,
                csv_path: csv_path.into(),
                seed: None,
            },
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Complete configuration, as produced by [`resolve`] and as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub neural: NeuralConfig,
    pub system: SystemConfig,
    #[serde(default)]
    pub generated: Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralConfig {
    pub model: ModelConfig,
    pub layers: LayersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub epochs: usize,
    pub loss: Loss,
    pub optimizer: Optimizer,
    /// Number of equal partitions along the sample axis; the first trains, the
    /// second tests.
    pub tt_split: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f32>,
}

impl ModelConfig {
    /// Configured learning rate, else the optimizer's default.
    #[inline]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
            .unwrap_or_else(|| self.optimizer.default_learning_rate())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayersConfig {
    pub amount: usize,
    pub nodes: usize,
    pub bias: bool,
    pub activation: Activation,
    pub tensor_shapes: ShapePair,
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_layers: Option<Vec<LayerSpec>>,
}

/// Output written by training runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossReport>,
    /// Wall-clock duration of the last training run, e.g. `"0.42s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizationReport>,
    #[serde(default)]
    pub adjusted: Adjusted,
    /// Seed the training run shuffled its points with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub train: f32,
    pub test: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub was: bool,
    pub with: String,
    pub sample: NormalizationSample,
}

/// First few feature samples before and after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSample {
    pub original: Vec<f32>,
    pub normal: Vec<f32>,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Copy of the configuration as stored next to a model: without the losses
    /// of the run that produced it.
    pub fn for_snapshot(&self) -> Self {
        let mut out = self.clone();
        out.generated.loss = None;
        out
    }

    /// Feature columns per sample.
    #[inline]
    pub fn input_columns(&self) -> usize {
        self.system.params.feature().column_count()
    }
}

/// Default shape pair: `[[max(1), feature columns], [max(1), label columns]]`.
pub fn default_tensor_shapes(params: &Params) -> ShapePair {
    let side = |columns: usize| {
        TensorShape(vec![
            Dim::Deferred(DeferredDim::max(1)),
            Dim::Literal(columns),
        ])
    };
    ShapePair(
        side(params.feature().column_count()),
        side(params.label().column_count()),
    )
}

/// Rewrite a single legacy `neural.layers.tensorShapes` shape into a pair.
///
/// Works on raw configuration JSON. Returns whether anything changed.
pub fn migrate_legacy_shapes(raw: &mut serde_json::Value) -> bool {
    let Some(shapes) = raw.pointer_mut("/neural/layers/tensorShapes") else {
        return false;
    };
    let is_pair = shapes
        .as_array()
        .is_some_and(|items| items.len() == 2 && items.iter().all(|s| s.is_array()));
    if is_pair || !shapes.is_array() {
        return false;
    }
    let single = shapes.take();
    *shapes = serde_json::Value::Array(vec![single.clone(), single]);
    true
}

/// Fill every missing recognized key with its default.
///
/// Present keys are kept as given. Logs a notice when neither `neural.model`
/// nor `neural.layers` carries any key.
pub fn resolve(user: UserConfig) -> Config {
    let neural = user.neural.unwrap_or_default();
    let model = neural.model.unwrap_or_default();
    let layers = neural.layers.unwrap_or_default();

    if model == UserModel::default() && layers == UserLayers::default() {
        info!(
            "using the default preset for a standard regression task; \
             set neural.model / neural.layers to customize"
        );
    }

    let tensor_shapes = layers
        .tensor_shapes
        .unwrap_or_else(|| default_tensor_shapes(&user.system.params));

    Config {
        neural: NeuralConfig {
            model: ModelConfig {
                epochs: model.epochs.unwrap_or(DEFAULT_EPOCHS),
                loss: model.loss.unwrap_or(DEFAULT_LOSS),
                optimizer: model.optimizer.unwrap_or(DEFAULT_OPTIMIZER),
                tt_split: model.tt_split.unwrap_or(DEFAULT_TT_SPLIT),
                learning_rate: model.learning_rate,
            },
            layers: LayersConfig {
                amount: layers.amount.unwrap_or(DEFAULT_AMOUNT),
                nodes: layers.nodes.unwrap_or(DEFAULT_NODES),
                bias: layers.bias.unwrap_or(DEFAULT_BIAS),
                activation: layers.activation.unwrap_or(DEFAULT_ACTIVATION),
                tensor_shapes,
                override_layers: layers.override_layers,
            },
        },
        system: user.system,
        generated: Generated::default(),
    }
}

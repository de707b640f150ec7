//! Training sessions for small dense regression models.
//!
//! A [`Session`] turns a partial configuration and a tabular dataset into a
//! trained dense network, and keeps everything needed to use that network
//! again later:
//!
//! - the configuration, with every missing knob filled by [`config::resolve`]
//!   and every deferred tensor dimension resolved against the data;
//! - the global min-max statistics of the feature and label tensors, reused to
//!   normalize inputs and denormalize predictions;
//! - a snapshot (config, point records, model artifact) in a [`BlobStore`], so
//!   another session can restore the model by name.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mlp_session::{CsvSource, MemoryStore, Params, Session, UserConfig};
//!
//! # fn main() -> mlp_session::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let user = UserConfig::new(Params::new(&["rooms", "age"][..], "price"), "houses.csv");
//!
//! let mut trainer = Session::new(user.clone(), store.clone(), Box::new(CsvSource));
//! trainer.train(Some("houses"))?;
//!
//! // A fresh session restores the snapshot on first use.
//! let mut other = Session::new(user, store, Box::new(CsvSource));
//! let price = other.predict(&[3.0, 12.0], "houses")?;
//! println!("{price:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Dense backend
//!
//! The network itself is a plain stack of dense layers acting on the last
//! axis of each sample. Hot-path methods ([`Mlp::forward`], [`Mlp::backward`])
//! reuse caller-owned buffers and panic on shape misuse; the convenience APIs
//! ([`Mlp::fit`], [`Mlp::predict`], [`Mlp::evaluate`]) validate shapes and
//! return [`Result`].
//!
//! ```rust
//! use mlp_session::{Activation, Loss, MlpBuilder};
//!
//! # fn main() -> mlp_session::Result<()> {
//! let mut mlp = MlpBuilder::new(vec![3])?
//!     .add_layer(8, Activation::Tanh, true)?
//!     .add_layer(2, Activation::Linear, true)?
//!     .build_with_seed(0)?;
//!
//! let mut trainer = mlp.trainer();
//! let x = [0.1_f32, -0.2, 0.3];
//! let t = [0.0_f32, 1.0];
//!
//! let y = mlp.forward(&x, &mut trainer.scratch);
//! let _loss = Loss::MeanSquaredError.backward(y, &t, trainer.grads.d_output_mut());
//! mlp.backward(&x, &trainer.scratch, &mut trainer.grads);
//! mlp.sgd_step(&trainer.grads, 1e-2);
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate reports through `tracing` and never installs a subscriber.

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod generator;
pub mod layer;
pub mod loss;
pub mod mlp;
pub mod normalize;
pub mod optim;
pub mod plot;
pub mod reference;
pub mod serde_model;
pub mod session;
pub mod shape;
pub mod snapshot;
pub mod store;
pub mod tensor;
pub mod train;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use config::{Config, UserConfig};
pub use data::{CsvSource, DatasetSource, Params, PointRecord, Selector, Value};
pub use error::{Error, Result};
pub use generator::LayerSpec;
pub use layer::{Init, Layer};
pub use loss::Loss;
pub use mlp::{Gradients, Mlp, Scratch, Trainer};
pub use normalize::{NormStats, NormalizationCache};
pub use optim::{Optimizer, OptimizerState};
pub use plot::{AxisLabels, LogPlotter, PlotPoint, Plotter};
pub use reference::{ANONYMOUS, ModelRef, NamedRef, Predictor};
pub use session::{RestoreOptions, Session};
pub use shape::{DeferredDim, Dim, Side, TensorShape};
pub use store::{BlobStore, FsStore, MemoryStore};
pub use tensor::Tensor;
pub use train::{FitConfig, FitReport};

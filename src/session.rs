//! Training sessions.
//!
//! A [`Session`] owns one resolved configuration, the point records of its last
//! training run or restore, and the normalization statistics derived from
//! them. Sessions share trained models only through their blob store.
//!
//! Every mutating entry point builds the new state on the side and commits it
//! at the very end, so an error leaves the session as it was.

use std::sync::Arc;
use std::time::Instant;

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::builder::MlpBuilder;
use crate::config::{
    Config, LossReport, NORMALIZATION_METHOD, NormalizationReport, NormalizationSample,
    UserConfig, resolve,
};
use crate::data::{self, DatasetSource, PointRecord};
use crate::generator::symmetric_stack;
use crate::normalize::{NormStats, NormalizationCache, denormalize, normalize};
use crate::plot::{AxisLabels, PlotPoint, Plotter};
use crate::reference::{self, ANONYMOUS, ModelRef, Predictor};
use crate::shape::Side;
use crate::snapshot;
use crate::store::BlobStore;
use crate::tensor::{BuildContext, Tensor, build_tensor};
use crate::train::FitConfig;
use crate::{Error, Result};

/// Feature samples recorded in `generated.normalized`.
const PROVENANCE_SAMPLES: usize = 3;
/// Samples drawn along the feature range for the prediction line.
const PREDICTION_LINE_SAMPLES: usize = 100;

/// How [`Session::restore_snapshot_with`] repopulates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Read the persisted point records instead of re-ingesting the dataset.
    pub fast_path: bool,
    /// Use the session's own config when none is persisted for the model.
    pub allow_config_fallback: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            fast_path: false,
            allow_config_fallback: true,
        }
    }
}

pub struct Session {
    config: Config,
    points: Vec<PointRecord>,
    cache: NormalizationCache,
    active: Option<Predictor>,
    store: Arc<dyn BlobStore>,
    source: Box<dyn DatasetSource>,
    plotter: Option<Box<dyn Plotter>>,
}

impl Session {
    /// Resolve `user` and create an empty session.
    pub fn new(
        user: UserConfig,
        store: Arc<dyn BlobStore>,
        source: Box<dyn DatasetSource>,
    ) -> Self {
        let config = resolve(user);
        debug!(csv_path = %config.system.csv_path, "session created");
        Self {
            config,
            points: Vec::new(),
            cache: NormalizationCache::new(),
            active: None,
            store,
            source,
            plotter: None,
        }
    }

    /// Attach a plotting sink. Charts are only rendered when `system.visual` is set.
    pub fn with_plotter(mut self, plotter: impl Plotter + 'static) -> Self {
        self.plotter = Some(Box::new(plotter));
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    #[inline]
    pub fn cache(&self) -> &NormalizationCache {
        &self.cache
    }

    /// The model trained or restored last, if any.
    #[inline]
    pub fn active(&self) -> Option<&Predictor> {
        self.active.as_ref()
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.name == name)
    }

    /// Train a model on the configured dataset.
    ///
    /// Named runs are persisted as a snapshot; unnamed runs produce an
    /// [`ANONYMOUS`] model that only lives in this session.
    pub fn train(&mut self, name: Option<&str>) -> Result<Predictor> {
        let started = Instant::now();
        let model_name = name.unwrap_or(ANONYMOUS);
        info!(model = model_name, csv_path = %self.config.system.csv_path, "training started");

        let mut config = self.config.clone();
        let seed = config
            .system
            .seed
            .unwrap_or_else(|| rand::thread_rng().next_u64());
        let points = data::ingest(
            self.source.as_ref(),
            &config.system.csv_path,
            &config.system.params,
            seed,
        )?;
        config.generated.shuffle_seed = Some(seed);

        let mut cache = NormalizationCache::new();
        let (x, y) = build_pair(&mut config, &mut cache, &points)?;
        config.generated.normalized = Some(provenance(&x, &points));

        let parts = config.neural.model.tt_split;
        let (x_train, x_test) = x.split(parts)?;
        let (y_train, y_test) = y.split(parts)?;

        let layers = &config.neural.layers;
        let specs = match &layers.override_layers {
            Some(specs) => specs.clone(),
            None => symmetric_stack(
                layers.amount,
                layers.nodes,
                layers.bias,
                layers.activation,
                x.shape(),
                y.shape(),
            )?,
        };
        let mut model = MlpBuilder::from_specs(&specs)?.build_with_seed(seed)?;

        let model_cfg = &config.neural.model;
        let fit_cfg = FitConfig {
            epochs: model_cfg.epochs,
            optimizer: model_cfg.optimizer,
            loss: model_cfg.loss,
            lr: model_cfg.learning_rate(),
        };
        let report = model.fit(&x_train, &y_train, &fit_cfg)?;
        let test_loss = model.evaluate(&x_test, &y_test, fit_cfg.loss)?;

        let losses = LossReport {
            train: report.final_loss(),
            test: test_loss,
        };
        config.generated.loss = Some(losses);
        config.generated.layers = Some(specs);
        config.generated.performance = Some(format!("{:.2}s", started.elapsed().as_secs_f32()));

        let predictor = Predictor::new(model_name, model);
        if name.is_some() {
            snapshot::save_snapshot(
                self.store.as_ref(),
                model_name,
                &predictor.model,
                &config,
                &points,
            )?;
        }

        info!(
            model = model_name,
            train_loss = losses.train,
            test_loss = losses.test,
            performance = config.generated.performance.as_deref().unwrap_or_default(),
            "training finished"
        );

        self.config = config;
        self.points = points;
        self.cache = cache;
        self.active = Some(predictor.clone());

        if self.config.system.visual {
            self.render_training_charts(losses);
        }
        Ok(predictor)
    }

    fn render_training_charts(&mut self, losses: LossReport) {
        if let Err(e) = self.merge_plot(false, true, ModelRef::Implicit) {
            warn!(error = %e, "could not render the prediction chart");
        }
        if let Some(plotter) = self.plotter.as_mut() {
            plotter.bars(
                "Loss",
                &[
                    ("train".to_owned(), losses.train),
                    ("test".to_owned(), losses.test),
                ],
            );
        }
    }

    /// Predict one sample given in original units; the result is in original
    /// label units.
    pub fn predict(&mut self, values: &[f32], reference: impl Into<ModelRef>) -> Result<Vec<f32>> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::IncorrectInputType { index });
        }

        let reference: ModelRef = reference.into();
        let current = match reference.name() {
            None => Some(self.active.clone().ok_or(Error::NoModelAvailable)?),
            Some(name) if self.is_active(name) => self.active.clone(),
            Some(_) => None,
        };
        let target = match current {
            Some(active) => active,
            None => {
                let target = reference::unpack(&reference, self.store.as_ref())?
                    .ok_or(Error::NoModelAvailable)?;
                self.restore_resolved(
                    &target.name,
                    RestoreOptions {
                        fast_path: true,
                        allow_config_fallback: true,
                    },
                    Some(target.clone()),
                )?;
                target
            }
        };

        let expected = self.config.input_columns();
        if values.len() != expected {
            return Err(Error::BadInput {
                model: target.name,
                expected,
                actual: values.len(),
            });
        }

        let dims = self
            .config
            .neural
            .layers
            .tensor_shapes
            .get(Side::X)
            .single_sample()?;
        let feature_stats = cache_entry(&self.cache, Side::X)?;
        let label_stats = cache_entry(&self.cache, Side::Y)?;

        let x = normalize(&Tensor::new(values.to_vec(), dims)?, Some(&feature_stats));
        let out = target.model.predict(&x)?;
        let result = denormalize(&out, &label_stats).into_data();
        debug!(model = %target.name, inputs = ?values, outputs = ?result, "prediction");
        Ok(result)
    }

    /// Restore the snapshot persisted under `name`, allowing the session
    /// config as a fallback when none is persisted.
    pub fn restore_snapshot(&mut self, name: &str, fast_path: bool) -> Result<()> {
        self.restore_snapshot_with(
            name,
            RestoreOptions {
                fast_path,
                ..RestoreOptions::default()
            },
        )
    }

    /// Make the snapshot persisted under `name` the session's active state.
    ///
    /// A no-op, without any store access, when `name` is already active.
    pub fn restore_snapshot_with(&mut self, name: &str, opts: RestoreOptions) -> Result<()> {
        self.restore_resolved(name, opts, None)
    }

    fn restore_resolved(
        &mut self,
        name: &str,
        opts: RestoreOptions,
        resolved: Option<Predictor>,
    ) -> Result<()> {
        if self.is_active(name) {
            debug!(model = name, "snapshot already active");
            return Ok(());
        }

        let store = self.store.as_ref();
        let fallback = opts.allow_config_fallback.then_some(&self.config);
        let mut config = snapshot::load_config(store, name, fallback)?;

        let predictor = match resolved {
            Some(p) => p,
            None => reference::unpack(&ModelRef::from(name), store)?
                .ok_or(Error::NoModelAvailable)?,
        };

        let points = if opts.fast_path {
            snapshot::load_points(store, name)?
        } else {
            let seed = config
                .generated
                .shuffle_seed
                .or(config.system.seed)
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "no shuffle seed recorded for model '{name}'; restore with the fast path"
                    ))
                })?;
            data::ingest(
                self.source.as_ref(),
                &config.system.csv_path,
                &config.system.params,
                seed,
            )?
        };

        let mut cache = NormalizationCache::new();
        build_pair(&mut config, &mut cache, &points)?;

        info!(
            model = name,
            fast_path = opts.fast_path,
            points = points.len(),
            "restored snapshot"
        );
        self.config = config;
        self.points = points;
        self.cache = cache;
        self.active = Some(predictor);
        Ok(())
    }

    /// Render the session's points, optionally with a model's prediction line.
    ///
    /// Returns `false` when nothing was rendered because the session is not
    /// visual or has no plotter.
    pub fn merge_plot(
        &mut self,
        aggregate: bool,
        predict: bool,
        reference: impl Into<ModelRef>,
    ) -> Result<bool> {
        let reference: ModelRef = reference.into();
        let (aggregate, reference) = match reference {
            ModelRef::Implicit => match &self.active {
                Some(active) if active.is_anonymous() => (false, ModelRef::ByHandle(active.clone())),
                Some(active) => (false, ModelRef::from(active.name.as_str())),
                None => return Err(Error::InstanceNotTrainedYet),
            },
            other => (aggregate, other),
        };

        if !self.config.system.visual || self.plotter.is_none() {
            return Ok(false);
        }

        let target = reference::unpack(&reference, self.store.as_ref())?;
        if predict && target.is_none() {
            return Err(Error::NoPredictionModel);
        }
        if aggregate {
            let Some(t) = &target else {
                return Err(Error::NoAggregationModel);
            };
            self.restore_resolved(
                &t.name,
                RestoreOptions {
                    fast_path: true,
                    allow_config_fallback: true,
                },
                Some(t.clone()),
            )?;
        }

        let axes = self.axis_labels(target.as_ref())?;
        let original: Vec<PlotPoint> = self
            .points
            .iter()
            .filter_map(|p| {
                Some(PlotPoint {
                    x: p.x.first()?,
                    y: p.y.first()?,
                })
            })
            .collect();

        let mut series = vec![original];
        let mut labels = vec!["original"];
        if predict {
            if let Some(t) = &target {
                series.push(self.prediction_line(t)?);
                labels.push("predicted");
            }
        }

        let title = match &target {
            Some(t) => format!("Model: {}", t.name),
            None => "Data".to_owned(),
        };
        if let Some(plotter) = self.plotter.as_mut() {
            plotter.scatter(&title, &series, &labels, &axes);
        }
        Ok(true)
    }

    fn axis_labels(&self, target: Option<&Predictor>) -> Result<AxisLabels> {
        let params = match target {
            Some(t) => {
                snapshot::load_config(self.store.as_ref(), &t.name, Some(&self.config))?
                    .system
                    .params
            }
            None => self.config.system.params.clone(),
        };
        Ok(AxisLabels {
            x: params.feature().to_string(),
            y: params.label().to_string(),
        })
    }

    /// Points of the prediction line of the referenced model, falling back to
    /// the active one. Empty when there is no model.
    pub fn prediction_points(&self, reference: impl Into<ModelRef>) -> Result<Vec<PlotPoint>> {
        let reference: ModelRef = reference.into();
        let resolved = reference::unpack(&reference, self.store.as_ref())?;
        match resolved.as_ref().or(self.active.as_ref()) {
            Some(p) => self.prediction_line(p),
            None => Ok(Vec::new()),
        }
    }

    fn prediction_line(&self, predictor: &Predictor) -> Result<Vec<PlotPoint>> {
        let feature_stats = cache_entry(&self.cache, Side::X)?;
        let label_stats = cache_entry(&self.cache, Side::Y)?;

        let sample_shape = predictor.model.input_shape();
        let mut shape = vec![PREDICTION_LINE_SAMPLES];
        shape.extend_from_slice(sample_shape);
        let n = shape.iter().product();
        let xs = Tensor::new(Tensor::linspace(0.0, 1.0, n), shape)?;

        let preds = denormalize(&predictor.model.predict(&xs)?, &label_stats);
        let xs = denormalize(&xs, &feature_stats);
        Ok(xs
            .data()
            .iter()
            .zip(preds.data())
            .map(|(&x, &y)| PlotPoint { x, y })
            .collect())
    }

    /// Names of every model persisted in the store.
    pub fn saved_models(&self) -> Result<Vec<String>> {
        snapshot::saved_models(self.store.as_ref())
    }
}

/// Build the feature tensor, then the label tensor, into a fresh cache.
fn build_pair(
    config: &mut Config,
    cache: &mut NormalizationCache,
    points: &[PointRecord],
) -> Result<(Tensor, Tensor)> {
    let mut ctx = BuildContext { config, cache };
    let x_shape = ctx.config.neural.layers.tensor_shapes.get(Side::X).clone();
    let x = build_tensor(x_shape, points, Side::X, Some(&mut ctx))?;
    let y_shape = ctx.config.neural.layers.tensor_shapes.get(Side::Y).clone();
    let y = build_tensor(y_shape, points, Side::Y, Some(&mut ctx))?;
    Ok((x, y))
}

fn cache_entry(cache: &NormalizationCache, side: Side) -> Result<NormStats> {
    cache.get(side).copied().ok_or_else(|| {
        Error::InvalidData(format!(
            "no {side:?} normalization statistics; train or restore a model first"
        ))
    })
}

fn provenance(x: &Tensor, points: &[PointRecord]) -> NormalizationReport {
    let n = x.sample_len() * x.rows().min(PROVENANCE_SAMPLES);
    let normal = x.data()[..n].to_vec();
    let mut original = Vec::new();
    for point in points.iter().take(PROVENANCE_SAMPLES) {
        point.x.extend_into(&mut original);
    }
    NormalizationReport {
        was: true,
        with: NORMALIZATION_METHOD.to_owned(),
        sample: NormalizationSample { original, normal },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Params, Selector, Value};
    use crate::store::MemoryStore;

    /// In-memory dataset: `y = x0 + x1` over `rows` rows.
    struct Fixed {
        rows: usize,
    }

    impl DatasetSource for Fixed {
        fn read(&self, _: &str, _: &Selector, _: &Selector) -> Result<Vec<PointRecord>> {
            Ok((0..self.rows)
                .map(|i| {
                    let (a, b) = (i as f32, (i % 5) as f32);
                    PointRecord {
                        x: Value::Array(vec![a, b]),
                        y: Value::Scalar(a + b),
                    }
                })
                .collect())
        }
    }

    fn session(rows: usize) -> Session {
        let mut user = UserConfig::new(Params::new(&["a", "b"][..], "c"), "mem");
        user.system.seed = Some(11);
        Session::new(user, Arc::new(MemoryStore::new()), Box::new(Fixed { rows }))
    }

    #[test]
    fn anonymous_training_is_not_persisted() {
        let mut s = session(21);
        let p = s.train(None).unwrap();
        assert_eq!(p.name, ANONYMOUS);
        assert!(s.saved_models().unwrap().is_empty());
        assert_eq!(s.points().len(), 20);
        assert!(s.cache().is_complete());
    }

    #[test]
    fn training_records_generated_output() {
        let mut s = session(21);
        s.train(Some("m")).unwrap();
        let generated = &s.config().generated;
        assert!(generated.loss.is_some());
        assert_eq!(generated.layers.as_ref().map(Vec::len), Some(3));
        assert_eq!(generated.shuffle_seed, Some(11));
        let normalized = generated.normalized.as_ref().unwrap();
        assert_eq!(normalized.sample.normal.len(), 6);
        let raw: Vec<f32> = s.points()[..3]
            .iter()
            .flat_map(|p| match &p.x {
                Value::Scalar(v) => vec![*v],
                Value::Array(v) => v.clone(),
            })
            .collect();
        assert_eq!(normalized.sample.original, raw);
        assert_eq!(s.saved_models().unwrap(), vec!["m"]);
    }

    #[test]
    fn handle_named_like_the_active_model_uses_the_active_model() {
        let mut s = session(21);
        s.train(Some("m")).unwrap();
        let expected = s.predict(&[3.0, 4.0], ModelRef::Implicit).unwrap();

        let stale = crate::builder::MlpBuilder::new(vec![2])
            .unwrap()
            .add_layer(1, crate::Activation::Linear, true)
            .unwrap()
            .build_with_seed(99)
            .unwrap();
        let got = s.predict(&[3.0, 4.0], Predictor::new("m", stale)).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn predict_without_any_model_fails() {
        let mut s = session(21);
        let err = s.predict(&[1.0, 2.0], ModelRef::Implicit).unwrap_err();
        assert_eq!(err.code(), "NoModelAvailable");
    }

    #[test]
    fn failed_training_leaves_state_untouched() {
        // Two rows leave one point: too few for two partitions.
        let mut s = session(2);
        assert!(s.train(Some("m")).is_err());
        assert!(s.active().is_none());
        assert!(s.points().is_empty());
        assert!(s.cache().is_empty());
        assert!(s.saved_models().unwrap().is_empty());
    }

    #[test]
    fn merge_plot_without_model_is_an_error() {
        let mut s = session(21);
        let err = s.merge_plot(false, true, ModelRef::Implicit).unwrap_err();
        assert_eq!(err.code(), "InstanceNotTrainedYet");
    }

    #[test]
    fn merge_plot_returns_false_when_not_visual() {
        let mut s = session(21);
        s.train(None).unwrap();
        assert!(!s.merge_plot(false, true, ModelRef::Implicit).unwrap());
    }
}

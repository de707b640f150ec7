//! Snapshot persistence.
//!
//! A snapshot is three blobs keyed by model name: the configuration (without
//! run losses), the point records the model was trained on, and the model
//! artifact. Each lives under its own namespace so a store can hold any number
//! of models side by side.

use tracing::{debug, info, warn};

use crate::config::{Config, migrate_legacy_shapes};
use crate::data::PointRecord;
use crate::store::BlobStore;
use crate::{Error, Mlp, Result};

pub const CONFIG_NAMESPACE: &str = "mlp-session/config/";
pub const POINTS_NAMESPACE: &str = "mlp-session/points/";
pub const MODEL_NAMESPACE: &str = "mlp-session/model/";

#[inline]
pub fn config_key(name: &str) -> String {
    format!("{CONFIG_NAMESPACE}{name}")
}

#[inline]
pub fn points_key(name: &str) -> String {
    format!("{POINTS_NAMESPACE}{name}")
}

#[inline]
pub fn model_key(name: &str) -> String {
    format!("{MODEL_NAMESPACE}{name}")
}

/// Persist model, configuration and points under `name`, replacing any
/// previous snapshot of that name.
///
/// The model artifact is written last; its presence marks a complete snapshot.
pub fn save_snapshot(
    store: &dyn BlobStore,
    name: &str,
    model: &Mlp,
    config: &Config,
    points: &[PointRecord],
) -> Result<()> {
    store.set(&config_key(name), config.for_snapshot().to_json_string()?)?;
    store.set(&points_key(name), serde_json::to_string(points)?)?;
    store.set(&model_key(name), model.to_json_string()?)?;
    info!(model = name, points = points.len(), "saved snapshot");
    Ok(())
}

/// Load the configuration persisted for `name`.
///
/// Falls back to `fallback` when nothing is stored; without a fallback a
/// missing configuration is [`Error::ConfigLookupFailure`].
pub fn load_config(store: &dyn BlobStore, name: &str, fallback: Option<&Config>) -> Result<Config> {
    match store.get(&config_key(name))? {
        Some(raw) => {
            debug!(model = name, "found persisted config");
            let mut value: serde_json::Value = serde_json::from_str(&raw)?;
            if migrate_legacy_shapes(&mut value) {
                debug!(model = name, "migrated single tensor shape to a pair");
            }
            Ok(serde_json::from_value(value)?)
        }
        None => match fallback {
            Some(config) => {
                warn!(model = name, "no persisted config, using the session config");
                Ok(config.clone())
            }
            None => Err(Error::ConfigLookupFailure {
                model: name.to_owned(),
            }),
        },
    }
}

/// Load the point records persisted for `name`.
pub fn load_points(store: &dyn BlobStore, name: &str) -> Result<Vec<PointRecord>> {
    let raw = store.get(&points_key(name))?.ok_or_else(|| {
        Error::InvalidData(format!("no persisted points for model '{name}'"))
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Load the model artifact for `name`, if any.
pub fn load_model(store: &dyn BlobStore, name: &str) -> Result<Option<Mlp>> {
    store
        .get(&model_key(name))?
        .map(|raw| Mlp::from_json_str(&raw))
        .transpose()
}

/// Names of every model with a persisted artifact, sorted.
pub fn saved_models(store: &dyn BlobStore) -> Result<Vec<String>> {
    let mut names: Vec<String> = store
        .list_keys()?
        .into_iter()
        .filter_map(|k| k.strip_prefix(MODEL_NAMESPACE).map(str::to_owned))
        .collect();
    names.sort();
    Ok(names)
}

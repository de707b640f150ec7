//! Point records and dataset ingestion.
//!
//! A dataset source turns a locator plus two column selectors into point
//! records. [`ingest`] then applies the ingestion policy: shuffle with a seeded
//! RNG and drop the last record.

use std::fmt;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::shape::Side;
use crate::{Error, Result};

/// Value extracted for one side of a record.
///
/// A single-column selector yields a scalar, a list selector an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f32),
    Array(Vec<f32>),
}

impl Value {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Array(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First element, used as the coordinate when plotting.
    #[inline]
    pub fn first(&self) -> Option<f32> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(v) => v.first().copied(),
        }
    }

    /// Append the flattened values to `out`.
    #[inline]
    pub fn extend_into(&self, out: &mut Vec<f32>) {
        match self {
            Value::Scalar(v) => out.push(*v),
            Value::Array(v) => out.extend_from_slice(v),
        }
    }
}

/// One ingested row reduced to its feature (`x`) and label (`y`) values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub x: Value,
    pub y: Value,
}

impl PointRecord {
    #[inline]
    pub fn get(&self, side: Side) -> &Value {
        match side {
            Side::X => &self.x,
            Side::Y => &self.y,
        }
    }
}

/// A column selector: one column name or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Single(String),
    Many(Vec<String>),
}

impl Selector {
    /// Number of columns this selector extracts.
    #[inline]
    pub fn column_count(&self) -> usize {
        match self {
            Selector::Single(_) => 1,
            Selector::Many(cols) => cols.len(),
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        match self {
            Selector::Single(c) => vec![c.as_str()],
            Selector::Many(cols) => cols.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Single(c) => f.write_str(c),
            Selector::Many(cols) => f.write_str(&cols.join(",")),
        }
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::Single(value.to_owned())
    }
}

impl From<&[&str]> for Selector {
    fn from(value: &[&str]) -> Self {
        Selector::Many(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

/// Feature and label selectors, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(pub Selector, pub Selector);

impl Params {
    pub fn new(feature: impl Into<Selector>, label: impl Into<Selector>) -> Self {
        Self(feature.into(), label.into())
    }

    #[inline]
    pub fn feature(&self) -> &Selector {
        &self.0
    }

    #[inline]
    pub fn label(&self) -> &Selector {
        &self.1
    }
}

/// Where point records come from.
pub trait DatasetSource {
    /// Read every row of `locator`, extracting `feature` into `x` and `label` into `y`.
    ///
    /// Column extraction must be deterministic; ordering is the source's own.
    fn read(&self, locator: &str, feature: &Selector, label: &Selector)
    -> Result<Vec<PointRecord>>;
}

/// Reads a headed CSV file from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSource;

impl DatasetSource for CsvSource {
    fn read(
        &self,
        locator: &str,
        feature: &Selector,
        label: &Selector,
    ) -> Result<Vec<PointRecord>> {
        let path = Path::new(locator);
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let column_index = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                Error::InvalidData(format!(
                    "column '{name}' not found in {}; available: {:?}",
                    path.display(),
                    headers.iter().collect::<Vec<_>>()
                ))
            })
        };
        let x_cols = feature
            .columns()
            .into_iter()
            .map(&column_index)
            .collect::<Result<Vec<_>>>()?;
        let y_cols = label
            .columns()
            .into_iter()
            .map(&column_index)
            .collect::<Result<Vec<_>>>()?;

        let mut points = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let cell = |idx: usize| -> Result<f32> {
                let raw = record.get(idx).unwrap_or("").trim();
                let value = raw.parse::<f32>().map_err(|e| {
                    Error::InvalidData(format!(
                        "row {} column '{}': cannot parse {raw:?} as a number: {e}",
                        row + 1,
                        &headers[idx]
                    ))
                })?;
                if !value.is_finite() {
                    return Err(Error::InvalidData(format!(
                        "row {} column '{}': {raw:?} is not a finite number",
                        row + 1,
                        &headers[idx]
                    )));
                }
                Ok(value)
            };
            let pick = |selector: &Selector, cols: &[usize]| -> Result<Value> {
                match selector {
                    Selector::Single(_) => cell(cols[0]).map(Value::Scalar),
                    Selector::Many(_) => cols
                        .iter()
                        .map(|&i| cell(i))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Array),
                }
            };
            points.push(PointRecord {
                x: pick(feature, &x_cols)?,
                y: pick(label, &y_cols)?,
            });
        }

        debug!(locator, rows = points.len(), "read csv dataset");
        Ok(points)
    }
}

/// Read a dataset and apply the ingestion policy.
///
/// Records are shuffled with `StdRng::seed_from_u64(seed)` and the last record
/// is dropped, so the same seed over the same source yields the same points.
pub fn ingest(
    source: &dyn DatasetSource,
    locator: &str,
    params: &Params,
    seed: u64,
) -> Result<Vec<PointRecord>> {
    let mut points = source.read(locator, params.feature(), params.label())?;
    let mut rng = StdRng::seed_from_u64(seed);
    points.shuffle(&mut rng);
    points.pop();
    Ok(points)
}

//! Dense row-major tensors and the feature/label tensor builder.

use tracing::debug;

use crate::config::Config;
use crate::data::PointRecord;
use crate::normalize::{NormStats, NormalizationCache, normalize};
use crate::shape::{Side, TensorShape, resolve_shape};
use crate::{Error, Result};

/// A row-major `f32` tensor. Axis 0 is the sample axis.
///
/// Invariant: `data.len() == shape.iter().product()` and every dim is > 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::InvalidShape("tensor rank must be > 0".to_owned()));
        }
        if shape.contains(&0) {
            return Err(Error::InvalidShape(format!(
                "tensor dims must be > 0, got {shape:?}"
            )));
        }
        let expected = element_count(&shape)?;
        if data.len() != expected {
            return Err(Error::InvalidShape(format!(
                "{} values do not fill shape {shape:?} ({expected} elements)",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of samples (size of axis 0).
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Number of scalars per sample.
    #[inline]
    pub fn sample_len(&self) -> usize {
        self.data.len() / self.shape[0]
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Element-wise map, same shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Split axis 0 into `parts` equal partitions and return the first two.
    ///
    /// Rows past `parts * (rows / parts)` belong to no partition.
    pub fn split(&self, parts: usize) -> Result<(Self, Self)> {
        if parts < 2 {
            return Err(Error::InvalidConfig(format!(
                "train/test split needs at least 2 partitions, got {parts}"
            )));
        }
        let chunk = self.rows() / parts;
        if chunk == 0 {
            return Err(Error::InvalidShape(format!(
                "{} samples cannot be split into {parts} partitions",
                self.rows()
            )));
        }
        let n = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = chunk;
        let first = Self {
            shape: shape.clone(),
            data: self.data[..chunk * n].to_vec(),
        };
        let second = Self {
            shape,
            data: self.data[chunk * n..2 * chunk * n].to_vec(),
        };
        Ok((first, second))
    }

    /// `n` evenly spaced values over `[start, end]`.
    pub fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
        match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f32;
                (0..n).map(|i| step.mul_add(i as f32, start)).collect()
            }
        }
    }
}

pub(crate) fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::InvalidShape(format!("shape {shape:?} overflows")))
}

/// Session state a tensor build writes into.
pub struct BuildContext<'a> {
    pub config: &'a mut Config,
    pub cache: &'a mut NormalizationCache,
}

/// Build the normalized tensor for one side of `points`.
///
/// Deferred dimensions of `shape` are resolved first. The side's values are
/// flattened and truncated to exactly `product(shape)` elements; a trailing
/// partial sample is dropped. With a context, the raw tensor's statistics are
/// appended to the cache, the resolved shape replaces the configured one and
/// the deferred function is recorded under `generated.adjusted`.
pub fn build_tensor(
    mut shape: TensorShape,
    points: &[PointRecord],
    side: Side,
    mut ctx: Option<&mut BuildContext<'_>>,
) -> Result<Tensor> {
    let adjusted = ctx.as_deref_mut().map(|c| &mut c.config.generated.adjusted);
    let dims = resolve_shape(&mut shape, points, side, adjusted)?;
    let expected = element_count(&dims)?;

    let mut values = Vec::with_capacity(expected);
    for p in points {
        p.get(side).extend_into(&mut values);
    }
    if values.len() < expected {
        return Err(Error::InvalidShape(format!(
            "{side:?} shape {dims:?} needs {expected} values, points provide {}",
            values.len()
        )));
    }
    if values.len() > expected {
        debug!(
            ?side,
            kept = expected,
            dropped = values.len() - expected,
            "truncating values to the resolved shape"
        );
        values.truncate(expected);
    }

    let raw = Tensor::new(values, dims.clone())?;
    let stats = NormStats::of(&raw);
    if let Some(ctx) = ctx {
        ctx.cache.record(side, stats)?;
        *ctx.config.neural.layers.tensor_shapes.get_mut(side) = TensorShape::literal(&dims);
    }
    Ok(normalize(&raw, Some(&stats)))
}

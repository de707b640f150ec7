//! Global min-max normalization.
//!
//! Statistics are computed once, from the raw tensor produced by the first
//! build of a training run, and then reused for every normalize/denormalize
//! call of the session. Recomputing them from other data would silently shift
//! every prediction, so [`NormalizationCache`] only ever grows: feature entry
//! first, label entry second. Train and restore replace the whole cache.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::shape::Side;
use crate::tensor::Tensor;
use crate::{Error, Result};

/// Minimum and maximum over every value of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub min: f32,
    pub max: f32,
}

impl NormStats {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Statistics of the full value range of `tensor`.
    pub fn of(tensor: &Tensor) -> Self {
        let stats = Self {
            min: tensor.min(),
            max: tensor.max(),
        };
        if stats.max == stats.min {
            warn!(
                value = stats.min,
                "constant tensor; normalization falls back to a unit range"
            );
        }
        stats
    }

    /// `max - min`, or `1.0` when the range is empty.
    #[inline]
    pub fn range(&self) -> f32 {
        let r = self.max - self.min;
        if r == 0.0 { 1.0 } else { r }
    }

    #[inline]
    pub fn normalize_value(&self, v: f32) -> f32 {
        (v - self.min) / self.range()
    }

    #[inline]
    pub fn denormalize_value(&self, v: f32) -> f32 {
        v.mul_add(self.range(), self.min)
    }
}

/// `(t - min) / (max - min)`.
///
/// With `stats == None` the tensor's own statistics are used; only fresh builds
/// should do that.
pub fn normalize(tensor: &Tensor, stats: Option<&NormStats>) -> Tensor {
    let stats = stats.copied().unwrap_or_else(|| NormStats::of(tensor));
    tensor.map(|v| stats.normalize_value(v))
}

/// `t * (max - min) + min`.
pub fn denormalize(tensor: &Tensor, stats: &NormStats) -> Tensor {
    tensor.map(|v| stats.denormalize_value(v))
}

/// Per-session feature/label statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationCache {
    entries: Vec<NormStats>,
}

impl NormalizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the statistics for `side`.
    ///
    /// Entries must arrive in order (features, then labels) and are never
    /// replaced.
    pub fn record(&mut self, side: Side, stats: NormStats) -> Result<()> {
        if self.entries.len() != side.index() {
            return Err(Error::InvalidData(format!(
                "normalization cache holds {} entries, cannot record {side:?} statistics",
                self.entries.len()
            )));
        }
        self.entries.push(stats);
        Ok(())
    }

    #[inline]
    pub fn get(&self, side: Side) -> Option<&NormStats> {
        self.entries.get(side.index())
    }

    #[inline]
    pub fn feature(&self) -> Option<&NormStats> {
        self.get(Side::X)
    }

    #[inline]
    pub fn label(&self) -> Option<&NormStats> {
        self.get(Side::Y)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Both sides recorded.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.entries.len() == 2
    }
}

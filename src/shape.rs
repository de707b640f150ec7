//! Tensor shapes with data-dependent dimensions.
//!
//! A shape is a sequence of [`Dim`]s. A dimension is either a literal size or a
//! [`DeferredDim`]: a named function of the point set that is evaluated right
//! before a tensor is built. After [`resolve_shape`] the shape holds literals
//! only, and the session writes it back into its configuration so every later
//! build (and every prediction) sees the same sizes.
//!
//! Axis 0 is the sample axis. Prediction builds replace it with `1`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::PointRecord;
use crate::{Error, Result};

/// Which half of a point record a shape describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Features.
    X,
    /// Labels.
    Y,
}

impl Side {
    /// Position of this side in shape pairs and in the normalization cache.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::X => 0,
            Side::Y => 1,
        }
    }
}

/// A dimension whose size depends on the point set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum DeferredDim {
    /// `points.len() / param`.
    Max { param: u32 },
}

impl DeferredDim {
    /// `max(divisor)`.
    pub const fn max(divisor: u32) -> Self {
        DeferredDim::Max { param: divisor }
    }

    /// Display name recorded in the shape provenance.
    pub fn name(self) -> &'static str {
        match self {
            DeferredDim::Max { .. } => "max",
        }
    }

    pub fn param(self) -> u32 {
        match self {
            DeferredDim::Max { param } => param,
        }
    }

    /// Evaluate against the full point set.
    pub fn evaluate(self, points: &[PointRecord]) -> Result<usize> {
        match self {
            DeferredDim::Max { param } => {
                if param == 0 {
                    return Err(Error::InvalidShape(
                        "max() divisor must be > 0".to_owned(),
                    ));
                }
                Ok(points.len() / param as usize)
            }
        }
    }
}

/// One entry of a [`TensorShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Literal(usize),
    Deferred(DeferredDim),
}

impl From<usize> for Dim {
    fn from(value: usize) -> Self {
        Dim::Literal(value)
    }
}

impl From<DeferredDim> for Dim {
    fn from(value: DeferredDim) -> Self {
        Dim::Deferred(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorShape(pub Vec<Dim>);

impl TensorShape {
    /// A shape made of literal dimensions only.
    pub fn literal(dims: &[usize]) -> Self {
        Self(dims.iter().copied().map(Dim::Literal).collect())
    }

    /// Returns the literal sizes, or `None` while any dimension is still deferred.
    pub fn concrete(&self) -> Option<Vec<usize>> {
        self.0
            .iter()
            .map(|d| match d {
                Dim::Literal(n) => Some(*n),
                Dim::Deferred(_) => None,
            })
            .collect()
    }

    /// Shape of a single sample: `[1, dims[1..]]`.
    ///
    /// Fails while any non-sample dimension is still deferred.
    pub fn single_sample(&self) -> Result<Vec<usize>> {
        if self.0.is_empty() {
            return Err(Error::InvalidShape("shape must not be empty".to_owned()));
        }
        let mut out = Vec::with_capacity(self.0.len());
        out.push(1);
        for (i, d) in self.0.iter().enumerate().skip(1) {
            match d {
                Dim::Literal(n) => out.push(*n),
                Dim::Deferred(f) => {
                    return Err(Error::InvalidShape(format!(
                        "dimension {i} is still deferred ({}), train or restore first",
                        f.name()
                    )));
                }
            }
        }
        Ok(out)
    }
}

/// Feature and label shapes, in that order.
///
/// Deserializes from either a pair of shapes or a legacy single shape, which is
/// duplicated for both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ShapesRecord")]
pub struct ShapePair(pub TensorShape, pub TensorShape);

impl ShapePair {
    #[inline]
    pub fn get(&self, side: Side) -> &TensorShape {
        match side {
            Side::X => &self.0,
            Side::Y => &self.1,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, side: Side) -> &mut TensorShape {
        match side {
            Side::X => &mut self.0,
            Side::Y => &mut self.1,
        }
    }
}

/// On-disk forms of `tensorShapes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShapesRecord {
    Pair(TensorShape, TensorShape),
    Legacy(TensorShape),
}

impl From<ShapesRecord> for ShapePair {
    fn from(value: ShapesRecord) -> Self {
        match value {
            ShapesRecord::Pair(x, y) => ShapePair(x, y),
            ShapesRecord::Legacy(shape) => ShapePair(shape.clone(), shape),
        }
    }
}

/// Which deferred function produced a side's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub with: String,
    pub using: u32,
}

/// Per-side shape provenance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Adjusted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Adjustment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Adjustment>,
}

impl Adjusted {
    pub fn get(&self, side: Side) -> Option<&Adjustment> {
        match side {
            Side::X => self.x.as_ref(),
            Side::Y => self.y.as_ref(),
        }
    }

    fn set(&mut self, side: Side, adjustment: Adjustment) {
        match side {
            Side::X => self.x = Some(adjustment),
            Side::Y => self.y = Some(adjustment),
        }
    }
}

/// Resolve every deferred dimension of `shape` against `points`, in place.
///
/// When `adjusted` is supplied, the deferred function (name and parameter) is
/// recorded for `side`. Returns the concrete sizes; all of them are > 0.
pub fn resolve_shape(
    shape: &mut TensorShape,
    points: &[PointRecord],
    side: Side,
    mut adjusted: Option<&mut Adjusted>,
) -> Result<Vec<usize>> {
    if shape.0.is_empty() {
        return Err(Error::InvalidShape(format!(
            "{side:?} shape must not be empty"
        )));
    }

    for (i, dim) in shape.0.iter_mut().enumerate() {
        if let Dim::Deferred(f) = *dim {
            let value = f.evaluate(points)?;
            debug!(?side, dim = i, function = f.name(), param = f.param(), value, "resolved deferred dimension");
            if let Some(adjusted) = adjusted.as_deref_mut() {
                adjusted.set(
                    side,
                    Adjustment {
                        with: f.name().to_owned(),
                        using: f.param(),
                    },
                );
            }
            *dim = Dim::Literal(value);
        }
    }

    let concrete = shape.concrete().unwrap_or_default();
    if let Some(i) = concrete.iter().position(|&d| d == 0) {
        return Err(Error::InvalidShape(format!(
            "{side:?} dimension {i} resolved to 0 for {} points",
            points.len()
        )));
    }
    Ok(concrete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn points(n: usize) -> Vec<PointRecord> {
        (0..n)
            .map(|i| PointRecord {
                x: Value::Array(vec![i as f32, 1.0]),
                y: Value::Scalar(i as f32),
            })
            .collect()
    }

    #[test]
    fn max_divides_the_point_count() {
        let pts = points(20);
        assert_eq!(DeferredDim::max(1).evaluate(&pts).unwrap(), 20);
        assert_eq!(DeferredDim::max(4).evaluate(&pts).unwrap(), 5);
        assert!(DeferredDim::max(0).evaluate(&pts).is_err());
    }

    #[test]
    fn resolving_is_deterministic_and_records_provenance() {
        let pts = points(12);
        let template = TensorShape(vec![DeferredDim::max(2).into(), Dim::Literal(2)]);

        let mut adjusted = Adjusted::default();
        let mut a = template.clone();
        let mut b = template.clone();
        let ra = resolve_shape(&mut a, &pts, Side::X, Some(&mut adjusted)).unwrap();
        let rb = resolve_shape(&mut b, &pts, Side::X, None).unwrap();

        assert_eq!(ra, vec![6, 2]);
        assert_eq!(ra, rb);
        assert_eq!(a, TensorShape::literal(&[6, 2]));
        assert_eq!(
            adjusted.get(Side::X),
            Some(&Adjustment {
                with: "max".to_owned(),
                using: 2
            })
        );
        assert!(adjusted.get(Side::Y).is_none());
    }

    #[test]
    fn zero_sized_resolution_is_rejected() {
        let pts = points(1);
        let mut shape = TensorShape(vec![DeferredDim::max(2).into(), Dim::Literal(1)]);
        let err = resolve_shape(&mut shape, &pts, Side::Y, None).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));
    }

    #[test]
    fn deferred_dims_serialize_as_named_functions() {
        let shape = TensorShape(vec![DeferredDim::max(1).into(), Dim::Literal(3)]);
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(json, r#"[{"name":"max","param":1},3]"#);
        let back: TensorShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn legacy_single_shape_becomes_a_pair() {
        let pair: ShapePair = serde_json::from_str("[20, 2]").unwrap();
        assert_eq!(pair.get(Side::X), &TensorShape::literal(&[20, 2]));
        assert_eq!(pair.get(Side::Y), &TensorShape::literal(&[20, 2]));

        let pair: ShapePair = serde_json::from_str("[[20, 2], [20, 1]]").unwrap();
        assert_eq!(pair.get(Side::Y), &TensorShape::literal(&[20, 1]));
    }

    #[test]
    fn single_sample_replaces_axis_zero() {
        let shape = TensorShape(vec![DeferredDim::max(1).into(), Dim::Literal(2)]);
        assert_eq!(shape.single_sample().unwrap(), vec![1, 2]);
    }
}

use mlp_session::normalize::{denormalize, normalize};
use mlp_session::shape::resolve_shape;
use mlp_session::{DeferredDim, Dim, NormStats, PointRecord, Side, Tensor, TensorShape, Value};
use proptest::prelude::*;

fn tensor(values: &[f32]) -> Tensor {
    Tensor::new(values.to_vec(), vec![values.len(), 1]).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn denormalize_inverts_normalize(values in prop::collection::vec(-1000.0f32..1000.0, 2..64)) {
        let t = tensor(&values);
        let stats = NormStats::of(&t);
        prop_assume!(stats.min < stats.max);

        let normal = normalize(&t, Some(&stats));
        prop_assert!(normal.data().iter().all(|v| (-1e-6..=1.0 + 1e-6).contains(v)));

        let back = denormalize(&normal, &stats);
        let tol = 1e-4 * (stats.min.abs().max(stats.max.abs()) + 1.0);
        for (a, b) in back.data().iter().zip(&values) {
            prop_assert!((a - b).abs() <= tol, "{} vs {} (tol {})", a, b, tol);
        }
    }

    #[test]
    fn constant_tensors_stay_finite(value in -1000.0f32..1000.0, len in 1usize..16) {
        let t = tensor(&vec![value; len]);
        let stats = NormStats::of(&t);
        let normal = normalize(&t, None);
        prop_assert!(normal.data().iter().all(|v| *v == 0.0));
        let back = denormalize(&normal, &stats);
        prop_assert!(back.data().iter().all(|v| *v == value));
    }

    #[test]
    fn max_divides_point_count(n in 0usize..200, d in 1u32..10) {
        let points: Vec<PointRecord> = (0..n)
            .map(|i| PointRecord { x: Value::Scalar(i as f32), y: Value::Scalar(0.0) })
            .collect();
        prop_assert_eq!(DeferredDim::max(d).evaluate(&points).unwrap(), n / d as usize);

        let mut shape = TensorShape(vec![Dim::Deferred(DeferredDim::max(d)), Dim::Literal(1)]);
        if n / d as usize > 0 {
            let first = resolve_shape(&mut shape, &points, Side::X, None).unwrap();
            let again = resolve_shape(&mut shape, &points, Side::X, None).unwrap();
            prop_assert_eq!(first, again);
        } else {
            prop_assert!(resolve_shape(&mut shape, &points, Side::X, None).is_err());
        }
    }
}

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use mlp_session::tensor::build_tensor;
use mlp_session::{
    Activation, DatasetSource, MemoryStore, MlpBuilder, Params, PointRecord, Selector,
    Session, Side, TensorShape, UserConfig, Value, loss,
};

struct Synthetic {
    rows: usize,
}

impl DatasetSource for Synthetic {
    fn read(&self, _: &str, _: &Selector, _: &Selector) -> mlp_session::Result<Vec<PointRecord>> {
        Ok((0..self.rows)
            .map(|i| {
                let a = i as f32 * 0.01;
                PointRecord {
                    x: Value::Array(vec![a, a.sin()]),
                    y: Value::Scalar(a.cos()),
                }
            })
            .collect())
    }
}

fn points(rows: usize) -> Vec<PointRecord> {
    Synthetic { rows }
        .read("", &Selector::from("a"), &Selector::from("b"))
        .unwrap()
}

fn mlp_forward_backward_bench(c: &mut Criterion) {
    let mlp = MlpBuilder::new(vec![64])
        .unwrap()
        .add_layer(128, Activation::Tanh, true)
        .unwrap()
        .add_layer(8, Activation::Linear, true)
        .unwrap()
        .build_with_seed(0)
        .unwrap();
    let mut trainer = mlp.trainer();
    let input = vec![0.1_f32; mlp.input_dim()];
    let target = vec![0.0_f32; mlp.output_dim()];

    c.bench_function("mlp_forward_backward_64_128_8", |b| {
        b.iter(|| {
            mlp.forward(black_box(&input), &mut trainer.scratch);
            loss::mse_backward(trainer.scratch.output(), &target, trainer.grads.d_output_mut());
            let d_input = mlp.backward(black_box(&input), &trainer.scratch, &mut trainer.grads);
            black_box(d_input);
        })
    });
}

fn build_tensor_bench(c: &mut Criterion) {
    let pts = points(10_000);
    c.bench_function("build_tensor_10k_x", |b| {
        b.iter(|| {
            let t = build_tensor(
                TensorShape::literal(&[10_000, 2]),
                black_box(&pts),
                Side::X,
                None,
            )
            .unwrap();
            black_box(t);
        })
    });
}

fn session_train_predict_bench(c: &mut Criterion) {
    let mut user = UserConfig::new(Params::new(&["a", "b"][..], "c"), "synthetic");
    user.system.seed = Some(0);
    let mut session = Session::new(
        user,
        Arc::new(MemoryStore::new()),
        Box::new(Synthetic { rows: 201 }),
    );

    c.bench_function("session_train_200_points", |b| {
        b.iter(|| black_box(session.train(Some("bench")).unwrap()))
    });

    let input = [0.5_f32, 0.4];
    c.bench_function("session_predict", |b| {
        b.iter(|| black_box(session.predict(black_box(&input[..]), "bench").unwrap()))
    });
}

criterion_group!(
    benches,
    mlp_forward_backward_bench,
    build_tensor_bench,
    session_train_predict_bench
);
criterion_main!(benches);

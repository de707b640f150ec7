use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use mlp_session::{Activation, FitConfig, Loss, MlpBuilder, Optimizer, Tensor};

struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
    }

    fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

fn make_tensors(rows: usize, input_dim: usize, target_dim: usize) -> (Tensor, Tensor) {
    (
        Tensor::new(vec![0.1_f32; rows * input_dim], vec![rows, input_dim]).unwrap(),
        Tensor::new(vec![0.0_f32; rows * target_dim], vec![rows, target_dim]).unwrap(),
    )
}

#[test]
fn fit_allocations_do_not_grow_with_rows() {
    let (input_dim, hidden, output_dim) = (16, 32, 4);

    let base = MlpBuilder::new(vec![input_dim])
        .unwrap()
        .add_layer(hidden, Activation::Tanh, true)
        .unwrap()
        .add_layer(output_dim, Activation::Linear, true)
        .unwrap()
        .build_with_seed(0)
        .unwrap();

    let (x_small, y_small) = make_tensors(8, input_dim, output_dim);
    let (x_large, y_large) = make_tensors(8 * 64, input_dim, output_dim);

    for optimizer in [Optimizer::Sgd, Optimizer::Momentum, Optimizer::Adam] {
        let cfg = FitConfig {
            epochs: 2,
            optimizer,
            loss: Loss::MeanSquaredError,
            lr: 1e-2,
        };

        // Warm up one-time lazy initialization outside the measured runs.
        base.clone().fit(&x_small, &y_small, &cfg).unwrap();

        let mut small = base.clone();
        let mut large = base.clone();

        ALLOC.reset();
        small.fit(&x_small, &y_small, &cfg).unwrap();
        let alloc_small = ALLOC.alloc_events();

        ALLOC.reset();
        large.fit(&x_large, &y_large, &cfg).unwrap();
        let alloc_large = ALLOC.alloc_events();

        assert_eq!(
            alloc_small, alloc_large,
            "{optimizer:?}: allocation events should not depend on the number of steps"
        );
    }
}

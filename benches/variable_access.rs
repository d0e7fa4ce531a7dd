//! Variable access benchmarks
//!
//! Measures the per-access cost of the binding against the in-process demo
//! model, so the numbers isolate binding overhead from the loader.
//!
//! | Name             | What it measures                                  |
//! |------------------|---------------------------------------------------|
//! | `describe/*`     | Three native queries plus descriptor validation  |
//! | `get_var/*`      | Descriptor + address + view construction         |
//! | `get_var_copy`   | The above plus an owned copy                      |
//! | `set_var/*`      | Column-major copy and native `set_var`           |
//! | `update`         | One model step plus clock refresh                |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench variable_access
//! ```

use bmi_bridge::{ModelSession, StaticSymbols};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::arr2;

fn demo_session() -> ModelSession {
    let mut session =
        ModelSession::from_symbols(StaticSymbols::new("bench-demo", bmi_demo::entry_points()))
            .expect("demo entry points resolve");
    session.set_forward_native_logs(false);
    session.initialize("").expect("demo initializes");
    session
}

fn bench_variable_access(c: &mut Criterion) {
    let mut session = demo_session();

    c.bench_function("describe/scalar", |b| {
        b.iter(|| black_box(session.describe(black_box("var1")).unwrap()))
    });
    c.bench_function("describe/matrix", |b| {
        b.iter(|| black_box(session.describe(black_box("var4")).unwrap()))
    });

    c.bench_function("get_var/scalar", |b| {
        b.iter(|| black_box(session.get_var_as::<f64>("var1").unwrap()[[]]))
    });
    c.bench_function("get_var/matrix", |b| {
        b.iter(|| black_box(session.get_var_as::<f64>("var4").unwrap()[[1, 2]]))
    });
    c.bench_function("get_var_copy", |b| {
        b.iter(|| black_box(session.get_var_copy("var4").unwrap()))
    });

    let data = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
    c.bench_function("set_var/matrix", |b| {
        b.iter(|| session.set_var("var4", data.view()).unwrap())
    });

    c.bench_function("update", |b| b.iter(|| session.update(black_box(1e-9)).unwrap()));

    session.finalize().expect("demo finalizes");
}

criterion_group!(benches, bench_variable_access);
criterion_main!(benches);

//! Benchmarks the backward factorization sweep (spec.md §4.1, "C3") across
//! a few horizon lengths, mirroring the teacher's `criterion`-based
//! benchmark harness for its own solver hot path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DMatrix;

use proxddp_gar::gar::{allocate_stage_factors, backward, Dynamics, InitialConstraint, Knot, LQProblem};

fn lqr_problem(n: usize, nx: usize, nu: usize) -> LQProblem {
    let mut stages = Vec::with_capacity(n + 1);
    for _ in 0..n {
        let mut k = Knot::zeros_interior(nx, nu, 0, nx, 0);
        k.q = DMatrix::identity(nx, nx);
        k.r = DMatrix::identity(nu, nu);
        let dyn_ = k.dynamics.as_mut().unwrap();
        dyn_.a = DMatrix::identity(nx, nx);
        dyn_.b = DMatrix::from_fn(nx, nu, |i, j| if i == j { 1.0 } else { 0.0 });
        stages.push(k);
    }
    let mut kt = Knot::zeros_terminal(nx, 0, 0, 0);
    kt.q = DMatrix::identity(nx, nx);
    stages.push(kt);
    LQProblem {
        stages,
        init: InitialConstraint {
            g0: DMatrix::identity(nx, nx),
            g0v: nalgebra::DVector::zeros(nx),
        },
        nth: 0,
    }
}

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("riccati_backward");
    for &n in &[10usize, 50, 200] {
        let problem = lqr_problem(n, 6, 3);
        group.bench_with_input(BenchmarkId::from_parameter(n), &problem, |b, problem| {
            b.iter(|| {
                let mut datas = allocate_stage_factors(problem);
                backward(black_box(problem), &mut datas, 1e-2, 1e-2).unwrap();
                black_box(&datas);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_backward);
criterion_main!(benches);

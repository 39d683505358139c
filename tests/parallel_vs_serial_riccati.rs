//! Scenario 5 (spec.md §8): the parallel Riccati variant must produce
//! identical feedback/feedforward gains to the serial sweep, on a larger
//! horizon than the unit test in `src/gar/parallel.rs` exercises.

use nalgebra::DMatrix;

use proxddp_gar::gar::{allocate_stage_factors, backward, backward_parallel, Dynamics, InitialConstraint, Knot, LQProblem};

fn toy_problem(n: usize) -> LQProblem {
    let nx = 3;
    let nu = 2;
    let mut stages = Vec::new();
    for t in 0..n {
        let mut k = Knot::zeros_interior(nx, nu, 0, nx, 0);
        k.q = DMatrix::identity(nx, nx) * (1.0 + t as f64 * 0.1);
        k.r = DMatrix::identity(nu, nu);
        let dyn_ = k.dynamics.as_mut().unwrap();
        dyn_.a = DMatrix::identity(nx, nx);
        dyn_.b = DMatrix::from_row_slice(nx, nu, &[1.0, 0.0, 0.0, 1.0, 0.5, 0.5]);
        stages.push(k);
    }
    let mut kt = Knot::zeros_terminal(nx, 0, 0, 0);
    kt.q = DMatrix::identity(nx, nx) * 2.0;
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

#[test]
fn parallel_backward_matches_serial_on_a_longer_horizon() {
    let problem = toy_problem(20);

    let mut serial = allocate_stage_factors(&problem);
    backward(&problem, &mut serial, 1e-2, 1e-2).unwrap();

    let mut parallel = allocate_stage_factors(&problem);
    backward_parallel(&problem, &mut parallel, 1e-2, 1e-2, 4).unwrap();

    for t in 0..serial.len() {
        assert!(
            (&serial[t].vm.pmat - &parallel[t].vm.pmat).norm() < 1e-8,
            "Pmat mismatch at stage {t}"
        );
        assert!(
            (&serial[t].vm.pvec - &parallel[t].vm.pvec).norm() < 1e-8,
            "pvec mismatch at stage {t}"
        );
        assert!(
            (&serial[t].ff.data - &parallel[t].ff.data).norm() < 1e-8,
            "feedforward mismatch at stage {t}"
        );
        assert!(
            (&serial[t].fb.data - &parallel[t].fb.data).norm() < 1e-8,
            "feedback mismatch at stage {t}"
        );
    }
}

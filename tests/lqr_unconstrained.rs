//! Scenario 1 (spec.md §8): unconstrained LQR, N=10, nx=2, nu=1,
//! `A=[[1,1],[0,1]], B=[[0],[1]], Q=I, R=1, f=0`. Purely linear/quadratic,
//! so the very first Riccati solve is exact and the outer loop should
//! converge in very few augmented-Lagrangian iterations.

use nalgebra::{DMatrix, DVector};

use proxddp_gar::config::SolverSettings;
use proxddp_gar::cost::QuadraticCost;
use proxddp_gar::dynamics::LinearDynamics;
use proxddp_gar::manifold::VectorSpace;
use proxddp_gar::scalar::Scalar;
use proxddp_gar::solver::ProxDdpSolver;
use proxddp_gar::traits::{Problem, StageModel};

struct LqrProblem {
    horizon: usize,
    stage: StageModel,
    term_cost: QuadraticCost,
    x0: DVector<Scalar>,
}

impl Problem for LqrProblem {
    fn horizon(&self) -> usize {
        self.horizon
    }

    fn stage(&self, _i: usize) -> &StageModel {
        &self.stage
    }

    fn term_cost(&self) -> &dyn proxddp_gar::traits::Cost {
        &self.term_cost
    }

    fn get_init_state(&self) -> DVector<Scalar> {
        self.x0.clone()
    }

    fn check_integrity(&self) -> Result<(), proxddp_gar::error::SolveError> {
        Ok(())
    }
}

fn build_problem(n: usize, x0: DVector<Scalar>) -> LqrProblem {
    let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
    let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
    let dynamics = LinearDynamics { a, b };
    let stage_cost = QuadraticCost::running(
        DMatrix::identity(2, 2),
        DMatrix::identity(1, 1),
        DVector::zeros(2),
        DVector::zeros(1),
    );
    let term_cost = QuadraticCost::terminal(DMatrix::identity(2, 2), DVector::zeros(2));
    let stage = StageModel {
        cost: Box::new(stage_cost),
        dynamics: Some(Box::new(dynamics)),
        nc: 0,
        constraint_set: None,
        constraint_jacobian: None,
    };
    LqrProblem {
        horizon: n,
        stage,
        term_cost,
        x0,
    }
}

#[test]
fn unconstrained_lqr_converges_with_tiny_infeasibility() {
    let problem = build_problem(10, DVector::from_vec(vec![1.0, -0.5]));
    let manifold = VectorSpace::new(2);

    let mut settings = SolverSettings::default();
    settings.force_initial_condition = true;
    settings.target_tol = 1e-8;
    settings.max_al_iters = 20;
    settings.max_iters = 200;

    let mut solver = ProxDdpSolver::new(settings).unwrap();
    solver.setup(&problem).unwrap();

    let xs_init = vec![DVector::<Scalar>::zeros(2); problem.horizon() + 1];
    let us_init = vec![DVector::<Scalar>::zeros(1); problem.horizon()];
    let lams_init = vec![DVector::<Scalar>::zeros(2); problem.horizon() + 1];

    let results = solver.run(&problem, &manifold, &xs_init, &us_init, &lams_init).unwrap();

    assert!(results.converged, "expected the unconstrained LQR to converge");
    assert!(
        results.infeasibilities.last().unwrap().0 < 1e-6,
        "primal infeasibility should be tiny for a purely linear/quadratic problem: {:?}",
        results.infeasibilities.last()
    );
    assert_eq!(results.xs[0], problem.x0, "force_initial_condition must pin xs[0]");
}

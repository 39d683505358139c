//! Scenario 3 (spec.md §8): equality-constrained initial state. The
//! solver must return `xs[0] == x0_target` regardless of what `xs_init[0]`
//! was seeded with, whenever `force_initial_condition = true`.

use nalgebra::{DMatrix, DVector};

use proxddp_gar::config::SolverSettings;
use proxddp_gar::cost::QuadraticCost;
use proxddp_gar::dynamics::LinearDynamics;
use proxddp_gar::manifold::VectorSpace;
use proxddp_gar::scalar::Scalar;
use proxddp_gar::solver::ProxDdpSolver;
use proxddp_gar::traits::{Cost, Problem, StageModel};

struct ToyProblem {
    horizon: usize,
    stage: StageModel,
    term_cost: QuadraticCost,
    x0_target: DVector<Scalar>,
}

impl Problem for ToyProblem {
    fn horizon(&self) -> usize {
        self.horizon
    }

    fn stage(&self, _i: usize) -> &StageModel {
        &self.stage
    }

    fn term_cost(&self) -> &dyn Cost {
        &self.term_cost
    }

    fn get_init_state(&self) -> DVector<Scalar> {
        self.x0_target.clone()
    }

    fn check_integrity(&self) -> Result<(), proxddp_gar::error::SolveError> {
        Ok(())
    }
}

fn build_problem(n: usize, x0_target: DVector<Scalar>) -> ToyProblem {
    let dynamics = LinearDynamics {
        a: DMatrix::identity(1, 1),
        b: DMatrix::identity(1, 1),
    };
    let stage_cost = QuadraticCost::running(
        DMatrix::identity(1, 1),
        DMatrix::identity(1, 1),
        DVector::zeros(1),
        DVector::zeros(1),
    );
    let term_cost = QuadraticCost::terminal(DMatrix::identity(1, 1), DVector::zeros(1));
    let stage = StageModel {
        cost: Box::new(stage_cost),
        dynamics: Some(Box::new(dynamics)),
        nc: 0,
        constraint_set: None,
        constraint_jacobian: None,
    };
    ToyProblem {
        horizon: n,
        stage,
        term_cost,
        x0_target,
    }
}

#[test]
fn initial_state_is_pinned_regardless_of_seed() {
    let x0_target = DVector::from_vec(vec![3.5]);
    let problem = build_problem(3, x0_target.clone());
    let manifold = VectorSpace::new(1);

    let mut settings = SolverSettings::default();
    settings.force_initial_condition = true;
    settings.target_tol = 1e-8;

    let mut solver = ProxDdpSolver::new(settings).unwrap();
    solver.setup(&problem).unwrap();

    // Seed xs_init[0] far away from the target: the solver must still pin it.
    let mut xs_init = vec![DVector::<Scalar>::zeros(1); problem.horizon() + 1];
    xs_init[0] = DVector::from_vec(vec![-100.0]);
    let us_init = vec![DVector::<Scalar>::zeros(1); problem.horizon()];
    let lams_init = vec![DVector::<Scalar>::zeros(1); problem.horizon() + 1];

    let results = solver.run(&problem, &manifold, &xs_init, &us_init, &lams_init).unwrap();

    assert_eq!(results.xs[0], x0_target);
    assert_eq!(results.lams[0], DVector::zeros(1));
}

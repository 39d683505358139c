//! Accepted-trajectory summary returned from `ProxDdpSolver::run`
//! (spec.md §3 "Results"). Derives `Serialize` so a caller can persist
//! per-iteration statistics, mirroring the teacher's `#[derive(Serialize)]`
//! statistics structs exercised via `insta::assert_yaml_snapshot!` in
//! `src/ode_solver/mod.rs`.

use nalgebra::DVector;
use serde::Serialize;

use crate::gar::LQProblem;
use crate::scalar::Scalar;

#[derive(Clone, Debug, Serialize)]
pub struct Results {
    pub xs: Vec<DVector<Scalar>>,
    pub us: Vec<DVector<Scalar>>,
    pub vs: Vec<DVector<Scalar>>,
    pub lams: Vec<DVector<Scalar>>,

    pub last_cost: Scalar,
    pub last_merit: Scalar,

    pub num_iters: usize,
    pub al_iter: usize,
    pub converged: bool,

    /// `(prim_infeas, dual_infeas)` recorded at the end of each accepted
    /// inner iteration.
    pub infeasibilities: Vec<(Scalar, Scalar)>,
}

impl Results {
    pub fn new(problem: &LQProblem) -> Self {
        let xs = problem.stages.iter().map(|k| DVector::zeros(k.nx)).collect();
        let us = problem.stages.iter().map(|k| DVector::zeros(k.nu)).collect();
        let vs = problem.stages.iter().map(|k| DVector::zeros(k.nc)).collect();
        let nx0 = problem.stages[0].nx;
        let mut lams: Vec<DVector<Scalar>> = problem
            .stages
            .iter()
            .skip(1)
            .map(|k| DVector::zeros(k.nx))
            .collect();
        lams.insert(0, DVector::zeros(nx0));
        Self {
            xs,
            us,
            vs,
            lams,
            last_cost: 0.0,
            last_merit: 0.0,
            num_iters: 0,
            al_iter: 0,
            converged: false,
            infeasibilities: Vec::new(),
        }
    }

    pub fn record_infeasibility(&mut self, prim: Scalar, dual: Scalar) {
        self.infeasibilities.push((prim, dual));
    }
}

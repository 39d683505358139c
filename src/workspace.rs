//! Outer-solver scratch (spec.md §3 "Workspace"). Allocated once per
//! `ProxDdpSolver::setup` and resized to the problem's horizon; every
//! sequence field is indexed by stage exactly as the corresponding
//! `LQProblem`/`Knot` field, so no allocation is needed once `setup` has
//! run (spec.md §5 "no allocator calls occur" on the hot path).

use nalgebra::DVector;

use crate::gar::LQProblem;
use crate::linalg::ColBlockMatrix;
use crate::scalar::Scalar;
use crate::scaler::CstrProximalScaler;

/// Per-stage trajectory bundle shared by the trial iterate and the
/// previously accepted (proximal-center) iterate.
#[derive(Clone, Debug)]
pub struct Trajectory {
    pub xs: Vec<DVector<Scalar>>,
    pub us: Vec<DVector<Scalar>>,
    pub vs: Vec<DVector<Scalar>>,
    pub lams: Vec<DVector<Scalar>>,
}

impl Trajectory {
    fn zeros(problem: &LQProblem) -> Self {
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
        Self { xs, us, vs, lams }
    }
}

/// Scratch for the outer proximal/augmented-Lagrangian driver.
pub struct Workspace {
    pub trial: Trajectory,
    pub prev: Trajectory,

    /// Lagrangian gradients w.r.t. state/control at every stage.
    pub lxs: Vec<DVector<Scalar>>,
    pub lus: Vec<DVector<Scalar>>,
    /// Dynamics-multiplier gradient `Lds[t+1]`.
    pub lds: Vec<DVector<Scalar>>,
    /// Inequality-multiplier gradient `Lvs[t]`.
    pub lvs: Vec<DVector<Scalar>>,

    /// Projected-Jacobian blocks `[Jx | Ju]` per stage, only populated
    /// where `nc > 0`.
    pub projected_jacobians: Vec<Option<ColBlockMatrix>>,

    /// `shifted_constraints[t] = value[t] + scaler[t] * vs_prev[t]`.
    pub shifted_constraints: Vec<DVector<Scalar>>,

    pub lams_plus: Vec<DVector<Scalar>>,
    pub vs_plus: Vec<DVector<Scalar>>,
    pub lams_pdal: Vec<DVector<Scalar>>,
    pub vs_pdal: Vec<DVector<Scalar>>,

    /// Per-stage active-set mask over the inequality rows.
    pub active_set: Vec<Vec<bool>>,
    pub scalers: Vec<CstrProximalScaler>,

    /// Proximal gap fed to the (nonlinear) rollout's implicit-dynamics
    /// correction, `dyn_slacks[t] = mu * (lams_prev[t+1] - lams[t+1])`.
    pub dyn_slacks: Vec<DVector<Scalar>>,

    pub prim_infeas: Scalar,
    pub dual_infeas: Scalar,
    pub inner_criterion: Scalar,

    pub mu_penal: Scalar,
    pub rho_penal: Scalar,
    pub xreg: Scalar,
}

impl Workspace {
    /// Allocates every sequence at its final size; `LQProblem::horizon`
    /// fixes `N` for the lifetime of this workspace (spec.md §3
    /// "Lifecycle").
    pub fn new(problem: &LQProblem) -> Self {
        let n = problem.horizon();
        let trial = Trajectory::zeros(problem);
        let prev = trial.clone();

        let lxs = problem.stages.iter().map(|k| DVector::zeros(k.nx)).collect();
        let lus = problem.stages.iter().map(|k| DVector::zeros(k.nu)).collect();
        let nx0 = problem.stages[0].nx;
        let mut lds: Vec<DVector<Scalar>> = problem
            .stages
            .iter()
            .skip(1)
            .map(|k| DVector::zeros(k.nx))
            .collect();
        lds.insert(0, DVector::zeros(nx0));
        let lvs = problem.stages.iter().map(|k| DVector::zeros(k.nc)).collect();

        let projected_jacobians = problem
            .stages
            .iter()
            .map(|k| {
                if k.nc == 0 {
                    None
                } else {
                    Some(ColBlockMatrix::zeros(k.nc, vec![k.nx, k.nu]))
                }
            })
            .collect();

        let shifted_constraints = problem.stages.iter().map(|k| DVector::zeros(k.nc)).collect();
        let lams_plus = lds.clone();
        let vs_plus = lvs.clone();
        let lams_pdal = lds.clone();
        let vs_pdal = lvs.clone();
        let active_set = problem.stages.iter().map(|k| vec![false; k.nc]).collect();
        let scalers = problem
            .stages
            .iter()
            .map(|k| CstrProximalScaler::identity(k.nc.max(1)))
            .collect();
        let dyn_slacks = lds.clone();

        Self {
            trial,
            prev,
            lxs,
            lus,
            lds,
            lvs,
            projected_jacobians,
            shifted_constraints,
            lams_plus,
            vs_plus,
            lams_pdal,
            vs_pdal,
            active_set,
            scalers,
            dyn_slacks,
            prim_infeas: 0.0,
            dual_infeas: 0.0,
            inner_criterion: 0.0,
            mu_penal: 0.0,
            rho_penal: 0.0,
            xreg: 0.0,
        }
        .with_horizon_checked(n)
    }

    fn with_horizon_checked(self, n: usize) -> Self {
        debug_assert_eq!(self.trial.xs.len(), n + 1);
        self
    }

    /// Commits the trial trajectory as the new proximal center, as done
    /// after every accepted inner iteration (spec.md §4.6 step 2).
    pub fn accept_trial(&mut self) {
        self.prev = self.trial.clone();
    }
}

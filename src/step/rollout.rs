//! `forwardPass(alpha)` (spec.md §4.5): produces a trial iterate from the
//! feedback/feedforward gains of the last LQ solve, either by a linear
//! rollout (the affine laws of the Riccati solution, exact for
//! `rollout_type = Linear`) or a nonlinear rollout that re-evaluates the
//! true dynamics and corrects for the proximal gap, matching the
//! generalized-dynamics residual convention used throughout `src/gar`.

use nalgebra::DVector;

use crate::gar::stage_factor::{IDX_A, IDX_K, IDX_L, IDX_Z};
use crate::gar::StageFactor;
use crate::scalar::Scalar;
use crate::traits::{ExplicitDynamics, Manifold};
use crate::workspace::Trajectory;

/// A trial trajectory plus the state deviations against the accepted
/// iterate it was measured against (`dxs[t+1] = difference(accepted,
/// trial)`, used by the nonlinear dynamics correction at the next
/// stage).
pub struct RolloutResult {
    pub trial: Trajectory,
    pub dxs: Vec<DVector<Scalar>>,
}

/// Linear rollout: applies the exact affine laws from the Riccati
/// solution, scaled by `alpha` on the feedforward part, as spec.md §4.1
/// prescribes for `forward` but with an explicit step size.
pub fn linear_rollout(
    datas: &[StageFactor],
    alpha: Scalar,
    dx0: &DVector<Scalar>,
    prev: &Trajectory,
) -> RolloutResult {
    let n = datas.len() - 1;
    let mut xs = prev.xs.clone();
    let mut us = prev.us.clone();
    let mut vs = prev.vs.clone();
    let mut lams = prev.lams.clone();
    let mut dxs = vec![DVector::<Scalar>::zeros(0); n + 1];

    dxs[0] = dx0.clone();
    xs[0] = &prev.xs[0] + dx0;

    for t in 0..n {
        let d = &datas[t];
        let dxt = dxs[t].clone();

        let du = d.ff.segment(IDX_K) * alpha + d.fb.block_row(IDX_K) * &dxt;
        us[t] = &prev.us[t] + du;

        if d.nc > 0 {
            let dv = d.ff.segment(IDX_Z) * alpha + d.fb.block_row(IDX_Z) * &dxt;
            vs[t] = &prev.vs[t] + dv;
        }

        let dlam = d.ff.segment(IDX_L) * alpha + d.fb.block_row(IDX_L) * &dxt;
        lams[t + 1] = &prev.lams[t + 1] + dlam;

        let dx_next = d.ff.segment(IDX_A) * alpha + d.fb.block_row(IDX_A) * &dxt;
        dxs[t + 1] = dx_next.clone_owned();
        xs[t + 1] = &prev.xs[t + 1] + dx_next;
    }

    RolloutResult {
        trial: Trajectory { xs, us, vs, lams },
        dxs,
    }
}

/// One stage's worth of data needed by the nonlinear rollout: its
/// manifold, its explicit dynamics, and the proximal gap
/// `dyn_slacks[t] = mu * (lams_prev[t+1] - lams[t+1])`.
pub struct NonlinearStage<'a> {
    pub manifold: &'a dyn Manifold,
    pub dynamics: &'a dyn ExplicitDynamics,
    pub dyn_slack: &'a DVector<Scalar>,
}

/// Nonlinear rollout (spec.md §4.5 "Nonlinear rollout", branch (i)):
/// `du = alpha*kff + K*dx`, integrated via the manifold; the next state
/// is the explicit-dynamics prediction shifted by the proximal gap, and
/// `dxs[t+1]` is recomputed as the manifold difference against the
/// previously accepted `xs[t+1]`.
pub fn nonlinear_rollout(
    datas: &[StageFactor],
    stages: &[NonlinearStage<'_>],
    alpha: Scalar,
    dx0: &DVector<Scalar>,
    prev: &Trajectory,
) -> RolloutResult {
    let n = datas.len() - 1;
    let mut xs = prev.xs.clone();
    let mut us = prev.us.clone();
    let mut vs = prev.vs.clone();
    let mut lams = prev.lams.clone();
    let mut dxs = vec![DVector::<Scalar>::zeros(0); n + 1];

    dxs[0] = dx0.clone();
    xs[0] = stages[0].manifold.integrate(&prev.xs[0], dx0);

    for t in 0..n {
        let d = &datas[t];
        let stage = &stages[t];
        let dxt = dxs[t].clone();

        let du = d.ff.segment(IDX_K) * alpha + d.fb.block_row(IDX_K) * &dxt;
        us[t] = &prev.us[t] + du;

        if d.nc > 0 {
            let dv = d.ff.segment(IDX_Z) * alpha + d.fb.block_row(IDX_Z) * &dxt;
            vs[t] = &prev.vs[t] + dv;
        }

        let dlam = d.ff.segment(IDX_L) * alpha + d.fb.block_row(IDX_L) * &dxt;
        lams[t + 1] = &prev.lams[t + 1] + dlam;

        let predicted = stage.dynamics.forward(&xs[t], &us[t]);
        let x_trial_next = stage.manifold.integrate(&predicted, stage.dyn_slack);
        xs[t + 1] = x_trial_next.clone();
        dxs[t + 1] = stage.manifold.difference(&prev.xs[t + 1], &x_trial_next);
    }

    RolloutResult {
        trial: Trajectory { xs, us, vs, lams },
        dxs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gar::knot::{Dynamics, InitialConstraint, Knot, LQProblem};
    use crate::gar::{allocate_stage_factors, backward};
    use nalgebra::DMatrix;

    fn toy_problem() -> LQProblem {
        let mut stages = Vec::new();
        for _ in 0..2 {
            let mut k = Knot::zeros_interior(1, 1, 0, 1, 0);
            k.q = DMatrix::identity(1, 1);
            k.r = DMatrix::identity(1, 1);
            k.dynamics = Some(Dynamics {
                a: DMatrix::identity(1, 1),
                b: DMatrix::identity(1, 1),
                e: DMatrix::identity(1, 1),
                f: DVector::zeros(1),
            });
            stages.push(k);
        }
        let mut term = Knot::zeros_terminal(1, 0, 0, 0);
        term.q = DMatrix::identity(1, 1);
        stages.push(term);
        LQProblem {
            stages,
            init: InitialConstraint {
                g0: DMatrix::identity(1, 1),
                g0v: DVector::zeros(1),
            },
            nth: 0,
        }
    }

    #[test]
    fn linear_rollout_with_zero_dx0_and_alpha_one_moves_by_feedforward() {
        let problem = toy_problem();
        let mut datas = allocate_stage_factors(&problem);
        backward(&problem, &mut datas, 1e-8, 1e-8).unwrap();

        let prev = Trajectory {
            xs: vec![DVector::from_vec(vec![1.0]); 3],
            us: vec![DVector::zeros(1); 3],
            vs: vec![DVector::zeros(0); 3],
            lams: vec![DVector::zeros(1); 3],
        };
        let result = linear_rollout(&datas, 1.0, &DVector::zeros(1), &prev);
        assert_eq!(result.trial.xs.len(), 3);
        assert_eq!(result.dxs.len(), 3);
    }
}

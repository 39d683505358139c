//! Outer BCL/augmented-Lagrangian driver (spec.md §4.6-§4.7), grounded on
//! `SolverProxDDPTpl::run`/`innerLoop`/`computeInfeasibilities`/
//! `computeCriterion`. Per-iteration logging uses `tracing` spans in
//! place of the teacher's own `fmt`-based logging (the teacher repo has
//! no dedicated logging crate in the retrieved files; `tracing` is the
//! wider-ecosystem choice for this role — see DESIGN.md).

use nalgebra::DVector;

use crate::builder::{
    build_initial_constraint, build_interior_knot, build_terminal_knot, DynamicsHessian, InteriorStageData,
    TerminalStageData,
};
use crate::config::{HessianApprox, MultiplierUpdateMode, RolloutType, SolverSettings, StepAcceptanceStrategy};
use crate::error::SolveError;
use crate::gar::knot::LQProblem;
use crate::gar::{allocate_stage_factors, backward, backward_parallel, StageFactor};
use crate::linalg::ColBlockMatrix;
use crate::multiplier::{projected_jacobian_correction, update_dynamics_multipliers, update_inequality_multipliers};
use crate::results::Results;
use crate::scalar::Scalar;
use crate::step::{armijo_cubic_linesearch, linear_rollout, nonlinear_rollout, Filter, FilterEntry, NonlinearStage};
use crate::traits::{Manifold, Problem};
use crate::workspace::Workspace;

/// Per-inner-iteration instrumentation handed back to the caller via
/// [`crate::callbacks::CallbackRegistry`].
pub struct ProxDdpSolver {
    pub settings: SolverSettings,
    workspace: Option<Workspace>,
    results: Option<Results>,
    filter: Filter,
    prim_tol: Scalar,
    inner_tol: Scalar,
}

impl ProxDdpSolver {
    pub fn new(settings: SolverSettings) -> Result<Self, SolveError> {
        settings.validate()?;
        Ok(Self {
            settings,
            workspace: None,
            results: None,
            filter: Filter::new(1e-8),
            prim_tol: 1.0,
            inner_tol: 1.0,
        })
    }

    /// Allocates `Workspace`/`Results` once, sized from the problem's
    /// per-stage dimensions (spec.md §3 "Lifecycle").
    #[tracing::instrument(skip_all)]
    pub fn setup(&mut self, problem: &dyn Problem) -> Result<(), SolveError> {
        problem.check_integrity()?;
        let template = sizing_template(problem)?;
        self.workspace = Some(Workspace::new(&template));
        self.results = Some(Results::new(&template));
        self.prim_tol = self.settings.mu_init.powf(self.settings.bcl_params.prim_alpha);
        self.inner_tol = self.settings.mu_init.powf(self.settings.bcl_params.dual_alpha);
        tracing::info!(horizon = template.horizon(), "solver setup complete");
        Ok(())
    }

    pub fn results(&self) -> Option<&Results> {
        self.results.as_ref()
    }

    /// spec.md §4.6 `run(problem, xs_init, us_init, lams_init)`.
    #[tracing::instrument(skip_all)]
    pub fn run(
        &mut self,
        problem: &dyn Problem,
        manifold: &dyn Manifold,
        xs_init: &[DVector<Scalar>],
        us_init: &[DVector<Scalar>],
        lams_init: &[DVector<Scalar>],
    ) -> Result<&Results, SolveError> {
        let ws = self.workspace.as_mut().ok_or(SolveError::Uninitialized)?;
        let results = self.results.as_mut().ok_or(SolveError::Uninitialized)?;

        results.xs = xs_init.to_vec();
        results.us = us_init.to_vec();
        results.lams = lams_init.to_vec();
        if self.settings.force_initial_condition {
            results.xs[0] = problem.get_init_state();
            results.lams[0] = DVector::zeros(results.lams[0].len());
        }
        ws.prev.xs = results.xs.clone();
        ws.prev.us = results.us.clone();
        ws.prev.lams = results.lams.clone();
        ws.trial = ws.prev.clone();

        ws.mu_penal = self.settings.mu_init;
        ws.rho_penal = self.settings.rho_init;
        ws.xreg = self.settings.reg_init;

        results.al_iter = 0;
        results.num_iters = 0;
        results.converged = false;

        while results.al_iter < self.settings.max_al_iters && results.num_iters < self.settings.max_iters {
            let ws = self.workspace.as_mut().unwrap();
            let inner_outcome = run_inner_loop(
                &self.settings,
                problem,
                manifold,
                ws,
                &mut self.filter,
                self.prim_tol,
                self.inner_tol,
                self.results.as_mut().unwrap(),
            );

            match inner_outcome {
                Err(SolveError::InnerFailure { .. }) => {
                    let results = self.results.as_mut().unwrap();
                    results.al_iter += 1;
                    tracing::warn!(al_iter = results.al_iter, "inner loop failed, regularization saturated");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "outer loop aborted by runtime error");
                    return Err(e);
                }
                Ok(()) => {}
            }

            let ws = self.workspace.as_mut().unwrap();
            ws.accept_trial();
            let results = self.results.as_mut().unwrap();
            results.xs = ws.trial.xs.clone();
            results.us = ws.trial.us.clone();
            results.vs = ws.trial.vs.clone();
            results.lams = ws.trial.lams.clone();
            results.record_infeasibility(ws.prim_infeas, ws.dual_infeas);

            if ws.prim_infeas <= self.prim_tol {
                self.prim_tol = self.prim_tol * self.settings.bcl_params.prim_beta;
                self.update_multipliers(ws);
                if ws.dual_infeas.max(ws.prim_infeas) <= self.settings.target_tol {
                    results.converged = true;
                    tracing::info!(al_iter = results.al_iter, "converged");
                    break;
                }
            } else {
                let old_mu = ws.mu_penal;
                ws.mu_penal *= self.settings.bcl_params.mu_update_factor;
                if ws.mu_penal == old_mu {
                    // spec.md §9: preserve this exact-equality reset verbatim.
                    ws.mu_penal = self.settings.mu_init;
                }
                self.inner_tol = self.inner_tol * self.settings.bcl_params.dual_beta;
                tracing::debug!(mu_penal = ws.mu_penal, "BCL penalty increase");
            }
            ws.rho_penal *= self.settings.bcl_params.rho_update_factor;
            results.al_iter += 1;
        }

        Ok(self.results.as_ref().unwrap())
    }

    fn update_multipliers(&self, ws: &mut Workspace) {
        match self.settings.multiplier_update_mode {
            MultiplierUpdateMode::Primal => {
                ws.prev.vs = ws.vs_plus.clone();
            }
            MultiplierUpdateMode::Newton | MultiplierUpdateMode::PrimalDual => {
                ws.prev.vs = ws.vs_plus.clone();
                ws.prev.lams = ws.lams_plus.clone();
            }
        }
    }
}

/// Builds a zero-filled `LQProblem` whose shapes match `problem`, used
/// only to size `Workspace`/`Results` once at `setup`.
fn sizing_template(problem: &dyn Problem) -> Result<LQProblem, SolveError> {
    use crate::gar::knot::{InitialConstraint, Knot};

    let n = problem.horizon();
    let mut stages = Vec::with_capacity(n + 1);
    for t in 0..n {
        let stage = problem.stage(t);
        let nx = stage.cost.nx();
        let nu = stage.cost.nu();
        let nx_next = problem.stage(t + 1).cost.nx();
        stages.push(Knot::zeros_interior(nx, nu, stage.nc, nx_next, 0));
    }
    let term_nx = problem.term_cost().nx();
    stages.push(Knot::zeros_terminal(term_nx, 0, 0, 0));
    let nx0 = stages[0].nx;
    Ok(LQProblem {
        stages,
        init: InitialConstraint {
            g0: nalgebra::DMatrix::identity(nx0, nx0),
            g0v: DVector::zeros(nx0),
        },
        nth: 0,
    })
}

/// spec.md §4.6 "Inner loop".
#[allow(clippy::too_many_arguments)]
fn run_inner_loop(
    settings: &SolverSettings,
    problem: &dyn Problem,
    manifold: &dyn Manifold,
    ws: &mut Workspace,
    filter: &mut Filter,
    prim_tol: Scalar,
    inner_tol: Scalar,
    results: &mut Results,
) -> Result<(), SolveError> {
    let n = problem.horizon();

    loop {
        results.num_iters += 1;
        if results.num_iters > settings.max_iters {
            return Ok(());
        }

        // 1-2: derivatives + Lagrangian gradients, folding in the
        // multiplier engine's projected-Jacobian corrections.
        let mut lq_stages = Vec::with_capacity(n + 1);
        for t in 0..n {
            let stage = problem.stage(t);
            let (lx, lu) = stage.cost.compute_gradients(&ws.trial.xs[t], &ws.trial.us[t]);
            let (lxx, lxu, luu) = stage.cost.compute_hessians(&ws.trial.xs[t], &ws.trial.us[t]);
            let dyn_ = stage
                .dynamics
                .as_ref()
                .expect("interior stage must carry dynamics");
            let (jx, ju) = dyn_.d_forward(&ws.trial.xs[t], &ws.trial.us[t]);
            let predicted = dyn_.forward(&ws.trial.xs[t], &ws.trial.us[t]);
            let dd_value = manifold.difference(&ws.trial.xs[t + 1], &predicted);

            let mu_inv = 1.0 / ws.mu_penal;
            let dyn_upd =
                update_dynamics_multipliers(&ws.prev.lams[t + 1], &ws.trial.lams[t + 1], ws.mu_penal, mu_inv, &dd_value);
            ws.lams_plus[t + 1] = dyn_upd.lams_plus;
            ws.lams_pdal[t + 1] = dyn_upd.lams_pdal;
            ws.lds[t + 1] = dyn_upd.lds.clone();

            let mut lx_corr = DVector::zeros(lx.len());
            let mut lu_corr = DVector::zeros(lu.len());
            let (c, d, dv) = if stage.nc > 0 {
                let f = stage
                    .constraint_jacobian
                    .as_ref()
                    .expect("nc > 0 stage must supply a constraint jacobian");
                let (c, d, value) = f(&ws.trial.xs[t], &ws.trial.us[t]);
                let cs = stage
                    .constraint_set
                    .as_ref()
                    .expect("nc > 0 stage must supply a constraint set");
                let ineq_upd = update_inequality_multipliers(cs, &ws.scalers[t], &value, &ws.prev.vs[t], &ws.trial.vs[t]);
                ws.vs_plus[t] = ineq_upd.vs_plus;
                ws.vs_pdal[t] = ineq_upd.vs_pdal;
                ws.lvs[t] = ineq_upd.lvs.clone();
                ws.active_set[t] = ineq_upd.active_set;
                ws.shifted_constraints[t] = ineq_upd.shifted.clone();

                let mut jac = ColBlockMatrix::zeros(c.nrows(), vec![c.ncols(), d.ncols()]);
                jac.block_col_mut(0).copy_from(&c);
                jac.block_col_mut(1).copy_from(&d);
                let (lxc, luc) = projected_jacobian_correction(cs, &ws.scalers[t], &jac, &ineq_upd.shifted, &ws.lvs[t]);
                lx_corr = lxc;
                lu_corr = luc;
                ws.projected_jacobians[t] = Some(jac);
                (c, d, ws.lvs[t].clone())
            } else {
                (nalgebra::DMatrix::zeros(0, lx.len()), nalgebra::DMatrix::zeros(0, lu.len()), DVector::zeros(0))
            };

            ws.lxs[t] = lx.clone();
            ws.lus[t] = lu.clone();

            let dynamics_hessian = if settings.hess_approx == HessianApprox::Exact {
                let (hxx, hxu, huu) = dyn_.hessian_vjp(&ws.trial.xs[t], &ws.trial.us[t], &ws.trial.lams[t + 1]);
                Some(DynamicsHessian { hxx, hxu, huu })
            } else {
                None
            };

            let data = InteriorStageData {
                lxx: &lxx,
                lxu: &lxu,
                luu: &luu,
                lx: &lx,
                lu: &lu,
                jx: &jx,
                ju: &ju,
                jy: &nalgebra::DMatrix::identity(jx.nrows(), jx.nrows()),
                lds_next: &ws.lds[t + 1],
                constraint: if stage.nc > 0 { Some((&c, &d, &dv)) } else { None },
                lx_corr: &lx_corr,
                lu_corr: &lu_corr,
                dynamics_hessian: dynamics_hessian.as_ref(),
                params: None,
            };
            lq_stages.push(build_interior_knot(&data, ws.xreg, settings.ureg, settings.hess_approx));
        }

        {
            let term_cost = problem.term_cost();
            let (lx, _lu) = term_cost.compute_gradients(&ws.trial.xs[n], &DVector::zeros(0));
            let (lxx, _, _) = term_cost.compute_hessians(&ws.trial.xs[n], &DVector::zeros(0));
            let lx_corr = DVector::zeros(lx.len());
            ws.lxs[n] = lx.clone();
            let data = TerminalStageData {
                lxx: &lxx,
                lx: &lx,
                lx_corr: &lx_corr,
                constraint: None,
                params: None,
            };
            lq_stages.push(build_terminal_knot(&data, ws.xreg));
        }

        let nx0 = lq_stages[0].nx;
        let dx0_residual = manifold.difference(&problem.get_init_state(), &ws.trial.xs[0]);
        let init = build_initial_constraint(&nalgebra::DMatrix::identity(nx0, nx0), &dx0_residual);
        let lq = LQProblem {
            stages: lq_stages,
            init,
            nth: 0,
        };

        // 3: infeasibilities + criterion.
        ws.prim_infeas = (0..n)
            .map(|t| ws.lds[t + 1].amax())
            .fold(0.0, Scalar::max)
            .max((0..n).filter(|&t| lq.stages[t].nc > 0).map(|t| ws.lvs[t].amax()).fold(0.0, Scalar::max));
        ws.dual_infeas = (0..=n).map(|t| ws.lxs[t].amax()).fold(0.0, Scalar::max);
        ws.inner_criterion = ws.dual_infeas.max(ws.prim_infeas);

        if ws.inner_criterion <= inner_tol || ws.prim_infeas.max(ws.dual_infeas) <= settings.target_tol {
            return Ok(());
        }

        // 4: factorize + forward-solve.
        let mut datas: Vec<StageFactor> = allocate_stage_factors(&lq);
        match settings.linear_solver_choice {
            crate::config::LinearSolverChoice::Serial => {
                backward(&lq, &mut datas, ws.mu_penal, ws.mu_penal)?;
            }
            crate::config::LinearSolverChoice::Parallel => {
                backward_parallel(&lq, &mut datas, ws.mu_penal, ws.mu_penal, settings.num_threads)?;
            }
        }

        let dx0 = if settings.force_initial_condition {
            DVector::zeros(nx0)
        } else {
            dx0_residual.clone()
        };

        let nonlinear_stages: Vec<NonlinearStage<'_>> = if settings.rollout_type == RolloutType::Nonlinear {
            // spec.md §4.5 branch (i): the proximal gap fed to the
            // nonlinear rollout's implicit-dynamics correction, from the
            // multiplier estimates just computed above.
            for t in 0..n {
                ws.dyn_slacks[t] = (&ws.prev.lams[t + 1] - &ws.trial.lams[t + 1]) * ws.mu_penal;
            }
            (0..n)
                .map(|t| NonlinearStage {
                    manifold,
                    dynamics: problem.stage(t).dynamics.as_deref().expect("dynamics required"),
                    dyn_slack: &ws.dyn_slacks[t],
                })
                .collect()
        } else {
            Vec::new()
        };

        let full_step = if settings.rollout_type == RolloutType::Linear {
            linear_rollout(&datas, 1.0, &dx0, &ws.prev)
        } else {
            nonlinear_rollout(&datas, &nonlinear_stages, 1.0, &dx0, &ws.prev)
        };

        // Directional derivative of the merit function at alpha=0,
        // approximated from the first-order Lagrangian-gradient model
        // (documented simplification, see DESIGN.md).
        let dphi0: Scalar = (0..n)
            .map(|t| ws.lxs[t].dot(&full_step.dxs[t]) + ws.lus[t].dot(&(&full_step.trial.us[t] - &ws.prev.us[t])))
            .sum();

        if dphi0.abs() <= settings.ls_params.dphi_thresh {
            // Already (near-)stationary along the full Newton step: accept
            // it outright and let the next pass through the loop
            // re-evaluate the inner-convergence criterion at the new
            // iterate, rather than returning directly (spec.md §4.6 "Inner
            // loop" iterates until that test fires).
            ws.trial = full_step.trial;
            ws.xreg = settings.reg_init.max(ws.xreg * 0.5);
            continue;
        }

        let (phi0, _) = merit(ws, problem, manifold, &ws.prev, n);
        let accepted = match settings.sa_strategy {
            StepAcceptanceStrategy::Linesearch => {
                let result = armijo_cubic_linesearch(&settings.ls_params, phi0, dphi0.min(0.0), |alpha| {
                    let trial = if settings.rollout_type == RolloutType::Linear {
                        linear_rollout(&datas, alpha, &dx0, &ws.prev)
                    } else {
                        nonlinear_rollout(&datas, &nonlinear_stages, alpha, &dx0, &ws.prev)
                    };
                    merit(ws, problem, manifold, &trial.trial, n).0
                })?;
                Some(result.alpha)
            }
            StepAcceptanceStrategy::Filter => {
                let mut accepted_alpha = None;
                let mut alpha = 1.0;
                while alpha >= settings.ls_params.alpha_min {
                    let trial = if settings.rollout_type == RolloutType::Linear {
                        linear_rollout(&datas, alpha, &dx0, &ws.prev)
                    } else {
                        nonlinear_rollout(&datas, &nonlinear_stages, alpha, &dx0, &ws.prev)
                    };
                    let (merit_val, prim_infeas) = merit(ws, problem, manifold, &trial.trial, n);
                    let candidate = FilterEntry {
                        merit: merit_val,
                        prim_infeas,
                    };
                    if filter.try_accept(candidate) {
                        accepted_alpha = Some(alpha);
                        break;
                    }
                    alpha *= 0.5;
                }
                accepted_alpha
            }
        };

        match accepted {
            Some(alpha) => {
                let trial = if settings.rollout_type == RolloutType::Linear {
                    linear_rollout(&datas, alpha, &dx0, &ws.prev)
                } else {
                    nonlinear_rollout(&datas, &nonlinear_stages, alpha, &dx0, &ws.prev)
                };
                ws.trial = trial.trial;
                ws.xreg = settings.reg_init.max(ws.xreg * 0.5);
                // Continue the loop: the outer AL driver only sees a
                // result once the inner-convergence test at the top of
                // this loop fires (spec.md §4.6 "Inner loop").
            }
            None => {
                ws.xreg = (ws.xreg * 2.0).max(settings.reg_init.max(1e-12));
                if ws.xreg >= settings.reg_max {
                    tracing::error!(xreg = ws.xreg, "inner loop regularization saturated");
                    return Err(SolveError::InnerFailure {
                        alpha_min: settings.ls_params.alpha_min,
                        xreg: ws.xreg,
                        reg_max: settings.reg_max,
                    });
                }
                tracing::debug!(xreg = ws.xreg, "step rejected, regularization increased");
            }
        }

        let _ = prim_tol;
    }
}

/// PDAL merit function evaluated at a trial trajectory: re-runs the
/// multiplier engine's dynamics/inequality residual updates at `traj`
/// (spec.md §4.5 step b) rather than reusing the values frozen at the
/// linearization point, so both the AL penalty terms and the primal
/// infeasibility axis returned alongside them actually vary with the
/// rollout's step size. Returns `(merit, prim_infeas)`.
fn merit(
    ws: &Workspace,
    problem: &dyn Problem,
    manifold: &dyn Manifold,
    traj: &crate::workspace::Trajectory,
    n: usize,
) -> (Scalar, Scalar) {
    let mu_inv = 1.0 / ws.mu_penal;
    let mut total = 0.0;
    let mut prim_infeas: Scalar = 0.0;
    for t in 0..n {
        let stage = problem.stage(t);
        total += stage.cost.evaluate(&traj.xs[t], &traj.us[t]);

        let dyn_ = stage.dynamics.as_ref().expect("interior stage must carry dynamics");
        let predicted = dyn_.forward(&traj.xs[t], &traj.us[t]);
        let dd_value = manifold.difference(&traj.xs[t + 1], &predicted);
        let dyn_upd = update_dynamics_multipliers(&ws.prev.lams[t + 1], &traj.lams[t + 1], ws.mu_penal, mu_inv, &dd_value);
        total += 0.5 * ws.mu_penal * dyn_upd.lds.norm_squared();
        prim_infeas = prim_infeas.max(dyn_upd.lds.amax());

        if stage.nc > 0 {
            let f = stage
                .constraint_jacobian
                .as_ref()
                .expect("nc > 0 stage must supply a constraint jacobian");
            let (_, _, value) = f(&traj.xs[t], &traj.us[t]);
            let cs = stage
                .constraint_set
                .as_ref()
                .expect("nc > 0 stage must supply a constraint set");
            let ineq_upd = update_inequality_multipliers(cs, &ws.scalers[t], &value, &ws.prev.vs[t], &traj.vs[t]);
            total += 0.5 * ws.mu_penal * ineq_upd.lvs.norm_squared();
            prim_infeas = prim_infeas.max(ineq_upd.lvs.amax());
        }
    }
    total += problem.term_cost().evaluate(&traj.xs[n], &DVector::zeros(0));
    (total, prim_infeas)
}

//! Solver configuration (spec.md §6 "Configuration"). A plain struct with
//! public fields, mirroring the teacher's `OdeSolverProblem::new(...,
//! rtol, atol, ...)` constructor-argument style, with serde derives so
//! configurations can be persisted/round-tripped like the teacher's
//! statistics structs.

use serde::{Deserialize, Serialize};

use crate::error::SolveError;
use crate::scalar::Scalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutType {
    Linear,
    Nonlinear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverChoice {
    Serial,
    Parallel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HessianApprox {
    GaussNewton,
    Exact,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAcceptanceStrategy {
    Linesearch,
    Filter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiplierUpdateMode {
    Newton,
    Primal,
    PrimalDual,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BclParams {
    pub prim_alpha: Scalar,
    pub prim_beta: Scalar,
    pub dual_alpha: Scalar,
    pub dual_beta: Scalar,
    pub mu_update_factor: Scalar,
    pub rho_update_factor: Scalar,
}

impl Default for BclParams {
    fn default() -> Self {
        Self {
            prim_alpha: 0.1,
            prim_beta: 0.9,
            dual_alpha: 0.1,
            dual_beta: 0.9,
            mu_update_factor: 0.1,
            rho_update_factor: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LsParams {
    pub alpha_min: Scalar,
    pub max_num_steps: usize,
    pub dphi_thresh: Scalar,
}

impl Default for LsParams {
    fn default() -> Self {
        Self {
            alpha_min: 1e-7,
            max_num_steps: 20,
            dphi_thresh: 1e-13,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverSettings {
    pub target_tol: Scalar,
    pub mu_init: Scalar,
    pub rho_init: Scalar,
    pub max_iters: usize,
    pub max_al_iters: usize,
    pub rollout_type: RolloutType,
    pub linear_solver_choice: LinearSolverChoice,
    pub hess_approx: HessianApprox,
    pub sa_strategy: StepAcceptanceStrategy,
    pub multiplier_update_mode: MultiplierUpdateMode,
    pub bcl_params: BclParams,
    pub ls_params: LsParams,
    pub xreg: Scalar,
    pub ureg: Scalar,
    pub reg_init: Scalar,
    pub reg_max: Scalar,
    pub force_initial_condition: bool,
    pub num_threads: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            target_tol: 1e-8,
            mu_init: 1e-2,
            rho_init: 1e-10,
            max_iters: 100,
            max_al_iters: 50,
            rollout_type: RolloutType::Linear,
            linear_solver_choice: LinearSolverChoice::Serial,
            hess_approx: HessianApprox::GaussNewton,
            sa_strategy: StepAcceptanceStrategy::Linesearch,
            multiplier_update_mode: MultiplierUpdateMode::PrimalDual,
            bcl_params: BclParams::default(),
            ls_params: LsParams::default(),
            xreg: 0.0,
            ureg: 0.0,
            reg_init: 1e-9,
            reg_max: 1e9,
            force_initial_condition: false,
            num_threads: 1,
        }
    }
}

impl SolverSettings {
    /// Eagerly rejects configuration combinations invalid at `setup`
    /// (spec.md §4.2, §7 "Domain error ... raised eagerly").
    pub fn validate(&self) -> Result<(), SolveError> {
        if self.rollout_type == RolloutType::Nonlinear
            && self.linear_solver_choice == LinearSolverChoice::Parallel
        {
            return Err(SolveError::InvalidConfig(
                "parallel Riccati variant requires rollout_type = Linear".to_string(),
            ));
        }
        if self.mu_init <= 0.0 || self.rho_init <= 0.0 {
            return Err(SolveError::InvalidConfig(
                "mu_init and rho_init must be strictly positive".to_string(),
            ));
        }
        if self.max_iters == 0 || self.max_al_iters == 0 {
            return Err(SolveError::InvalidConfig(
                "max_iters and max_al_iters must be >= 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.bcl_params.mu_update_factor) {
            return Err(SolveError::InvalidConfig(
                "bcl_params.mu_update_factor must lie in (0, 1)".to_string(),
            ));
        }
        if self.num_threads == 0 {
            return Err(SolveError::InvalidConfig("num_threads must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        SolverSettings::default().validate().unwrap();
    }

    #[test]
    fn parallel_plus_nonlinear_is_rejected() {
        let mut s = SolverSettings::default();
        s.rollout_type = RolloutType::Nonlinear;
        s.linear_solver_choice = LinearSolverChoice::Parallel;
        assert!(s.validate().is_err());
    }

    #[test]
    fn non_positive_mu_init_is_rejected() {
        let mut s = SolverSettings::default();
        s.mu_init = 0.0;
        assert!(s.validate().is_err());
    }
}

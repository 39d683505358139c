//! Armijo linesearch with cubic-polynomial interpolation backtracking
//! (spec.md §4.5 "Linesearch"). The cubic-interpolation formula is
//! implemented directly since `proxsuite::nlp` is out of scope; the
//! bounded backtracking loop follows the same structure as the teacher's
//! `NewtonNonlinearSolver::solve_in_place` bounded retry loop
//! (`src/nonlinear_solver/newton.rs`): a `loop` that evaluates, checks
//! sufficient decrease, and narrows the step until success or exhaustion.

use crate::config::LsParams;
use crate::error::SolveError;
use crate::scalar::Scalar;

/// Armijo sufficient-decrease constant, matching common proxddp-family
/// defaults.
const ARMIJO_C1: Scalar = 1e-4;

pub struct LinesearchResult {
    pub alpha: Scalar,
    pub phi_alpha: Scalar,
    pub num_evals: usize,
}

/// `phi(alpha)` evaluates the PDAL merit function by running
/// `forwardPass(alpha)` and returning its merit value; `dphi0` is the
/// directional derivative `dphi/dalpha` at `alpha = 0`.
pub fn armijo_cubic_linesearch(
    params: &LsParams,
    phi0: Scalar,
    dphi0: Scalar,
    mut phi: impl FnMut(Scalar) -> Scalar,
) -> Result<LinesearchResult, SolveError> {
    debug_assert!(dphi0 <= 0.0, "linesearch requires a descent direction");

    let mut alpha = 1.0;
    let mut phi_alpha = phi(alpha);
    let mut num_evals = 1;

    if phi_alpha <= phi0 + ARMIJO_C1 * alpha * dphi0 {
        return Ok(LinesearchResult {
            alpha,
            phi_alpha,
            num_evals,
        });
    }

    // first backtrack: quadratic model using phi0, dphi0, phi(1)
    let mut alpha_prev = alpha;
    let mut phi_prev = phi_alpha;
    alpha = (-dphi0 * alpha * alpha / (2.0 * (phi_alpha - phi0 - dphi0 * alpha))).max(params.alpha_min);

    while num_evals < params.max_num_steps {
        phi_alpha = phi(alpha);
        num_evals += 1;
        if phi_alpha <= phi0 + ARMIJO_C1 * alpha * dphi0 {
            return Ok(LinesearchResult {
                alpha,
                phi_alpha,
                num_evals,
            });
        }
        if alpha <= params.alpha_min {
            break;
        }

        // cubic interpolation using the two most recent trial points
        let next_alpha = cubic_interpolate(
            phi0,
            dphi0,
            alpha_prev,
            phi_prev,
            alpha,
            phi_alpha,
            params.alpha_min,
        );
        alpha_prev = alpha;
        phi_prev = phi_alpha;
        alpha = next_alpha;
    }

    Ok(LinesearchResult {
        alpha: params.alpha_min,
        phi_alpha: phi(params.alpha_min),
        num_evals: num_evals + 1,
    })
}

/// Classical safeguarded cubic backtracking step (Nocedal & Wright,
/// Numerical Optimization, §3.5), clamped into `[alpha_min, 0.9*alpha_hi]`
/// to guarantee progress.
fn cubic_interpolate(
    phi0: Scalar,
    dphi0: Scalar,
    alpha0: Scalar,
    phi_a0: Scalar,
    alpha1: Scalar,
    phi_a1: Scalar,
    alpha_min: Scalar,
) -> Scalar {
    let denom = (alpha0 * alpha0 * alpha1 * alpha1 * (alpha1 - alpha0)).max(1e-300);
    let d1 = phi_a0 - phi0 - dphi0 * alpha0;
    let d2 = phi_a1 - phi0 - dphi0 * alpha1;
    let a = (alpha0 * alpha0 * d2 - alpha1 * alpha1 * d1) / denom;
    let b = (-alpha0.powi(3) * d2 + alpha1.powi(3) * d1) / denom;

    let candidate = if a.abs() < 1e-300 {
        -dphi0 / (2.0 * b)
    } else {
        let disc = (b * b - 3.0 * a * dphi0).max(0.0);
        (-b + disc.sqrt()) / (3.0 * a)
    };

    let hi = alpha1.min(alpha0).max(alpha0.max(alpha1) * 0.9);
    candidate.clamp(alpha_min, hi.max(alpha_min))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_step_accepted_when_it_already_satisfies_armijo() {
        let params = LsParams::default();
        let result = armijo_cubic_linesearch(&params, 1.0, -2.0, |a| 1.0 - 1.9 * a).unwrap();
        assert_eq!(result.alpha, 1.0);
        assert_eq!(result.num_evals, 1);
    }

    #[test]
    fn backtracks_when_full_step_fails_sufficient_decrease() {
        let params = LsParams::default();
        // phi increases sharply past alpha=0.1, forcing backtracking.
        let result = armijo_cubic_linesearch(&params, 1.0, -1.0, |a| {
            if a > 0.1 {
                10.0
            } else {
                1.0 - 0.5 * a
            }
        })
        .unwrap();
        assert!(result.alpha <= 0.1 + 1e-6);
    }
}

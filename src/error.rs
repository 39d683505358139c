use thiserror::Error;

use crate::scalar::Scalar;

/// Errors raised by the proximal Riccati LQ kernel (GAR).
#[derive(Error, Debug)]
pub enum GarError {
    #[error("knot {index}: expected {expected} rows/cols in block `{block}`, got {got}")]
    BlockShapeMismatch {
        index: usize,
        block: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("knot {index}: Cholesky factorization of the reduced KKT matrix failed (not positive definite)")]
    KktCholeskyFailed { index: usize },
    #[error("knot {index}: LU factorization of the generalized dynamics matrix E failed (singular)")]
    EFactorizationFailed { index: usize },
    #[error("Schur complement `I + mudyn * Ptilde` is not positive definite at knot {index}")]
    SchurCholeskyFailed { index: usize },
    #[error("initial-condition KKT factorization failed")]
    Kkt0Failed,
    #[error("proximal parameter must be positive, got mudyn={mudyn}, mueq={mueq}")]
    NonPositiveProxParam { mudyn: Scalar, mueq: Scalar },
    #[error("LQProblem has zero knots")]
    EmptyProblem,
}

/// Errors raised by the ProxDDP outer solver.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("domain error: {0}")]
    Domain(String),

    #[error("NaN detected in `{name}` at outer iteration {al_iter}, inner iteration {iter}")]
    NaNDetected {
        name: &'static str,
        al_iter: usize,
        iter: usize,
    },

    #[error("LQ factorization failed: {0}")]
    Factorization(#[from] GarError),

    #[error("inner loop failed to converge: step size alpha <= alpha_min ({alpha_min}) with regularization xreg ({xreg}) >= reg_max ({reg_max})")]
    InnerFailure {
        alpha_min: Scalar,
        xreg: Scalar,
        reg_max: Scalar,
    },

    #[error("setup() or run() called before the workspace/results were allocated")]
    Uninitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Check a named buffer for `NaN`s, mirroring the `ALIGATOR_RAISE_IF_NAN`
/// macro used throughout the reference implementation. Returns a
/// [`SolveError::NaNDetected`] on the first `NaN` found.
macro_rules! raise_if_nan {
    ($buf:expr, $name:literal, $al_iter:expr, $iter:expr) => {{
        if $buf.iter().any(|v: &Scalar| v.is_nan()) {
            return Err($crate::error::SolveError::NaNDetected {
                name: $name,
                al_iter: $al_iter,
                iter: $iter,
            });
        }
    }};
}

pub(crate) use raise_if_nan;

//! Scalar type used throughout the crate.
//!
//! Per the design notes this crate is monomorphic over `f64` rather than
//! generic over a scalar field: the proximal Riccati recursion's pivot
//! thresholds and tolerances below are specified against IEEE-754 doubles.

/// The floating point type used for all dense linear algebra in this crate.
pub type Scalar = f64;

/// Default absolute tolerance below which a pivot is considered singular
/// during Cholesky/LU factorization.
pub const PIVOT_TOL: Scalar = 1e-13;

/// Default floor under which a `mudyn`/`mueq` proximal parameter is clamped.
pub const MIN_PROX_PARAM: Scalar = 1e-12;

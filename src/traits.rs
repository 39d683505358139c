//! External interfaces (spec.md §6): the capability traits a user's model
//! implements and the solver calls against. Modeled as a sealed set of
//! narrow operation traits with no downcasting on the hot path, mirroring
//! the teacher's `Op`/`NonLinearOp`/`Jacobian` split in
//! `src/callable/ode.rs` and `src/op/sdirk.rs`: derivatives are
//! pre-evaluated into typed data slots rather than queried through an
//! open-world trait object.

use nalgebra::{DMatrix, DVector};

use crate::constraint::ConstraintSetProduct;
use crate::scalar::Scalar;

/// A (possibly curved) state space: Euclidean vector spaces and Lie
/// groups/manifolds both implement this.
pub trait Manifold {
    /// Ambient representation size.
    fn nx(&self) -> usize;
    /// Tangent space size (`nx` for vector spaces, may differ for
    /// manifolds with redundant coordinates, e.g. unit quaternions).
    fn ndx(&self) -> usize;

    fn integrate(&self, x: &DVector<Scalar>, dx: &DVector<Scalar>) -> DVector<Scalar>;
    fn difference(&self, x0: &DVector<Scalar>, x1: &DVector<Scalar>) -> DVector<Scalar>;

    /// Jacobian of [`Manifold::difference`] w.r.t. argument `arg` (0 or 1).
    fn jdifference(&self, x0: &DVector<Scalar>, x1: &DVector<Scalar>, arg: u8) -> DMatrix<Scalar>;

    fn rand(&self) -> DVector<Scalar>;
}

/// Explicit dynamics `x' = forward(x, u)`. The solver wraps this into a
/// generalized residual internally as `difference(y, forward(x,u))` and
/// composes the Jacobians through `Jdifference`'s columns.
pub trait ExplicitDynamics {
    fn nx(&self) -> usize;
    fn nu(&self) -> usize;

    fn forward(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> DVector<Scalar>;

    /// Returns `(Jx, Ju)` of [`ExplicitDynamics::forward`].
    fn d_forward(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> (DMatrix<Scalar>, DMatrix<Scalar>);

    /// Dynamics second derivatives contracted against the costate `lam`,
    /// i.e. `(Hxx, Hxu, Huu)` of `lam . forward(x, u)`. Only called when
    /// `hess_approx = Exact` (spec.md §4.4 bullet 3). The default is the
    /// Gauss-Newton approximation (all-zero blocks); override for models
    /// whose curvature is worth the extra evaluations.
    fn hessian_vjp(
        &self,
        x: &DVector<Scalar>,
        u: &DVector<Scalar>,
        lam: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>, DMatrix<Scalar>) {
        let _ = (x, u, lam);
        (
            DMatrix::zeros(self.nx(), self.nx()),
            DMatrix::zeros(self.nx(), self.nu()),
            DMatrix::zeros(self.nu(), self.nu()),
        )
    }
}

/// Implicit / generalized dynamics `value(x, u, y) = 0`, with `Jy = E`.
pub trait ImplicitDynamics {
    fn nx(&self) -> usize;
    fn nu(&self) -> usize;

    fn value(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>) -> DVector<Scalar>;
    fn jx(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>) -> DMatrix<Scalar>;
    fn ju(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>) -> DMatrix<Scalar>;
    fn jy(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>) -> DMatrix<Scalar>;
}

/// Stage (or terminal, with `nu = 0`) cost.
pub trait Cost {
    fn nx(&self) -> usize;
    fn nu(&self) -> usize;

    fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> Scalar;

    /// Returns `(Lx, Lu)`.
    fn compute_gradients(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> (DVector<Scalar>, DVector<Scalar>);

    /// Returns `(Lxx, Lxu, Luu)`.
    fn compute_hessians(
        &self,
        x: &DVector<Scalar>,
        u: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>, DMatrix<Scalar>);
}

/// One stage of the optimal control problem: its dynamics, cost, and
/// (optional) inequality constraint. `constraint_jacobian`, when present,
/// returns `(Jx, Ju, value)` for the stage's inequality row.
pub struct StageModel {
    pub cost: std::boxed::Box<dyn Cost>,
    pub dynamics: Option<std::boxed::Box<dyn ExplicitDynamics>>,
    pub nc: usize,
    pub constraint_set: Option<ConstraintSetProduct>,
    #[allow(clippy::type_complexity)]
    pub constraint_jacobian: Option<
        std::boxed::Box<dyn Fn(&DVector<Scalar>, &DVector<Scalar>) -> (DMatrix<Scalar>, DMatrix<Scalar>, DVector<Scalar>)>,
    >,
}

/// The full nonlinear OCP: an ordered sequence of stages plus terminal
/// cost/constraint and an initial-state specification.
pub trait Problem {
    fn horizon(&self) -> usize;
    fn stage(&self, i: usize) -> &StageModel;
    fn term_cost(&self) -> &dyn Cost;
    fn get_init_state(&self) -> DVector<Scalar>;

    /// Eagerly validates stage dimensions chain consistently
    /// (`stages[t].dynamics.nx_next == stages[t+1].nx`); called once from
    /// `setup`.
    fn check_integrity(&self) -> Result<(), crate::error::SolveError>;
}

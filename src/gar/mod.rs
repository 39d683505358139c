//! Generalized (proximal) Riccati solver for block-structured LQ subproblems.
//!
//! `knot`/`stage_factor` hold the per-stage data and scratch; `riccati` is
//! the serial backward/forward kernel; `parallel` is the cyclic-reduction
//! variant usable when every stage's rollout is linear.

pub mod knot;
pub mod parallel;
pub mod riccati;
pub mod stage_factor;

pub use knot::{Dynamics, InitialConstraint, LQProblem, Knot, ParamBlock};
pub use parallel::backward_parallel;
pub use riccati::{allocate_stage_factors, backward, compute_initial, forward};
pub use stage_factor::{StageFactor, ValueFunction};

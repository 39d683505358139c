//! Step acceptance (spec.md §4.5): linesearch/filter strategies driving
//! a shared `forwardPass`.

pub mod filter;
pub mod linesearch;
pub mod rollout;

pub use filter::{Filter, FilterEntry};
pub use linesearch::{armijo_cubic_linesearch, LinesearchResult};
pub use rollout::{linear_rollout, nonlinear_rollout, NonlinearStage, RolloutResult};

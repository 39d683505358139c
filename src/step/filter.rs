//! Bi-objective filter step acceptance (spec.md §4.5 "Filter"): accepts a
//! trial `(merit, primal_infeasibility)` pair if it is not dominated by
//! any entry already in the filter, with a minimum-progress margin.

use crate::scalar::Scalar;

#[derive(Clone, Copy, Debug)]
pub struct FilterEntry {
    pub merit: Scalar,
    pub prim_infeas: Scalar,
}

pub struct Filter {
    entries: Vec<FilterEntry>,
    margin: Scalar,
}

impl Filter {
    pub fn new(margin: Scalar) -> Self {
        Self {
            entries: Vec::new(),
            margin,
        }
    }

    /// A candidate is dominated if some entry beats it on *both*
    /// objectives (with the margin applied against the candidate).
    fn is_dominated(&self, candidate: FilterEntry) -> bool {
        self.entries.iter().any(|e| {
            e.merit <= candidate.merit - self.margin && e.prim_infeas <= candidate.prim_infeas - self.margin
        })
    }

    /// Returns `true` and records the entry if `candidate` is accepted.
    pub fn try_accept(&mut self, candidate: FilterEntry) -> bool {
        if self.is_dominated(candidate) {
            return false;
        }
        self.entries.retain(|e| {
            !(candidate.merit <= e.merit - self.margin && candidate.prim_infeas <= e.prim_infeas - self.margin)
        });
        self.entries.push(candidate);
        true
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_is_always_accepted() {
        let mut f = Filter::new(1e-8);
        assert!(f.try_accept(FilterEntry {
            merit: 1.0,
            prim_infeas: 0.5
        }));
    }

    #[test]
    fn dominated_candidate_is_rejected() {
        let mut f = Filter::new(1e-8);
        f.try_accept(FilterEntry {
            merit: 1.0,
            prim_infeas: 0.5,
        });
        assert!(!f.try_accept(FilterEntry {
            merit: 1.1,
            prim_infeas: 0.6
        }));
    }

    #[test]
    fn non_dominated_candidate_on_either_axis_is_accepted() {
        let mut f = Filter::new(1e-8);
        f.try_accept(FilterEntry {
            merit: 1.0,
            prim_infeas: 0.5,
        });
        assert!(f.try_accept(FilterEntry {
            merit: 0.9,
            prim_infeas: 0.6
        }));
    }
}

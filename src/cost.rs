//! A concrete quadratic tracking cost, grounded on the same
//! supplement-for-testability rationale as `manifold.rs`/`dynamics.rs`:
//! spec.md §6 declares the cost interface abstractly, but the end-to-end
//! scenarios of spec.md §8 all run a quadratic running/terminal cost
//! against a reference state and control.

use nalgebra::{DMatrix, DVector};

use crate::scalar::Scalar;
use crate::traits::Cost;

/// `0.5 (x - x_ref)^T Q (x - x_ref) + 0.5 (u - u_ref)^T R (u - u_ref)`.
/// Use `nu = 0` (empty `r`/`u_ref`) for a terminal cost.
#[derive(Clone, Debug)]
pub struct QuadraticCost {
    pub q: DMatrix<Scalar>,
    pub r: DMatrix<Scalar>,
    pub x_ref: DVector<Scalar>,
    pub u_ref: DVector<Scalar>,
}

impl QuadraticCost {
    pub fn running(q: DMatrix<Scalar>, r: DMatrix<Scalar>, x_ref: DVector<Scalar>, u_ref: DVector<Scalar>) -> Self {
        Self { q, r, x_ref, u_ref }
    }

    pub fn terminal(q: DMatrix<Scalar>, x_ref: DVector<Scalar>) -> Self {
        Self {
            q,
            r: DMatrix::zeros(0, 0),
            x_ref,
            u_ref: DVector::zeros(0),
        }
    }
}

impl Cost for QuadraticCost {
    fn nx(&self) -> usize {
        self.x_ref.len()
    }

    fn nu(&self) -> usize {
        self.u_ref.len()
    }

    fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> Scalar {
        let dx = x - &self.x_ref;
        let mut cost = 0.5 * dx.dot(&(&self.q * &dx));
        if self.nu() > 0 {
            let du = u - &self.u_ref;
            cost += 0.5 * du.dot(&(&self.r * &du));
        }
        cost
    }

    fn compute_gradients(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> (DVector<Scalar>, DVector<Scalar>) {
        let dx = x - &self.x_ref;
        let lx = &self.q * &dx;
        let lu = if self.nu() > 0 {
            let du = u - &self.u_ref;
            &self.r * &du
        } else {
            DVector::zeros(0)
        };
        (lx, lu)
    }

    fn compute_hessians(
        &self,
        _x: &DVector<Scalar>,
        _u: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>, DMatrix<Scalar>) {
        let lxu = DMatrix::zeros(self.nx(), self.nu());
        (self.q.clone(), lxu, self.r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn running_cost_gradient_matches_finite_difference() {
        let cost = QuadraticCost::running(
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1),
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![0.5]),
        );
        let x = DVector::from_vec(vec![2.0, 3.0]);
        let u = DVector::from_vec(vec![1.0]);
        let (lx, lu) = cost.compute_gradients(&x, &u);
        assert_relative_eq!(lx, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);
        assert_relative_eq!(lu, DVector::from_vec(vec![0.5]), epsilon = 1e-12);
    }

    #[test]
    fn terminal_cost_has_zero_control_dimension() {
        let cost = QuadraticCost::terminal(DMatrix::identity(2, 2), DVector::from_vec(vec![0.0, 0.0]));
        assert_eq!(cost.nu(), 0);
        let (_, lu) = cost.compute_gradients(&DVector::from_vec(vec![1.0, 1.0]), &DVector::zeros(0));
        assert_eq!(lu.len(), 0);
    }
}

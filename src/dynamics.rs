//! Concrete explicit dynamics models: a linear model used by scenarios
//! 1-3 (spec.md §8) and an RK2-integrated pendulum for scenario 4.
//!
//! Grounded on `original_source`'s explicit-dynamics wrapper pattern: the
//! residual a solver sees is `difference(y, forward(x,u))`, with
//! Jacobians composed through `Jdifference`'s columns (here trivial,
//! since both models live on `VectorSpace`).

use nalgebra::{DMatrix, DVector};

use crate::scalar::Scalar;
use crate::traits::ExplicitDynamics;

/// `x' = A x + B u`.
#[derive(Clone, Debug)]
pub struct LinearDynamics {
    pub a: DMatrix<Scalar>,
    pub b: DMatrix<Scalar>,
}

impl ExplicitDynamics for LinearDynamics {
    fn nx(&self) -> usize {
        self.a.ncols()
    }

    fn nu(&self) -> usize {
        self.b.ncols()
    }

    fn forward(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> DVector<Scalar> {
        &self.a * x + &self.b * u
    }

    fn d_forward(&self, _x: &DVector<Scalar>, _u: &DVector<Scalar>) -> (DMatrix<Scalar>, DMatrix<Scalar>) {
        (self.a.clone(), self.b.clone())
    }
}

/// Planar pendulum, state `(theta, theta_dot)`, control `torque`,
/// integrated one step of length `dt` via explicit RK2 (midpoint).
#[derive(Clone, Debug)]
pub struct PendulumDynamics {
    pub mass: Scalar,
    pub length: Scalar,
    pub gravity: Scalar,
    pub dt: Scalar,
}

impl PendulumDynamics {
    fn accel(&self, theta: Scalar, torque: Scalar) -> Scalar {
        let inertia = self.mass * self.length * self.length;
        (torque - self.mass * self.gravity * self.length * theta.sin()) / inertia
    }

    fn xdot(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> DVector<Scalar> {
        let theta = x[0];
        let theta_dot = x[1];
        let torque = u[0];
        DVector::from_vec(vec![theta_dot, self.accel(theta, torque)])
    }
}

impl ExplicitDynamics for PendulumDynamics {
    fn nx(&self) -> usize {
        2
    }

    fn nu(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> DVector<Scalar> {
        let k1 = self.xdot(x, u);
        let mid = x + &k1 * (self.dt / 2.0);
        let k2 = self.xdot(&mid, u);
        x + k2 * self.dt
    }

    fn d_forward(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> (DMatrix<Scalar>, DMatrix<Scalar>) {
        // Finite-difference Jacobians: no symbolic differentiation per
        // spec.md Non-goals, and the RK2 step is cheap enough that a
        // centered-difference estimate is adequate for this model.
        let eps = 1e-6;
        let f0 = self.forward(x, u);
        let mut jx = DMatrix::zeros(2, 2);
        for j in 0..2 {
            let mut xp = x.clone();
            xp[j] += eps;
            let fp = self.forward(&xp, u);
            jx.set_column(j, &((&fp - &f0) / eps));
        }
        let mut ju = DMatrix::zeros(2, 1);
        let mut up = u.clone();
        up[0] += eps;
        let fp = self.forward(x, &up);
        ju.set_column(0, &((&fp - &f0) / eps));
        (jx, ju)
    }

    fn hessian_vjp(
        &self,
        x: &DVector<Scalar>,
        u: &DVector<Scalar>,
        lam: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>, DMatrix<Scalar>) {
        // Finite-difference the costate-contracted Jacobian `lam^T
        // d_forward`, matching `d_forward`'s own finite-difference
        // convention: the pendulum's curvature comes entirely from the
        // `sin(theta)` term, cheap enough that a second finite-difference
        // pass is adequate here too.
        let eps = 1e-6;
        let (jx0, ju0) = self.d_forward(x, u);
        let g0x = jx0.transpose() * lam;

        let mut hxx = DMatrix::zeros(2, 2);
        let mut hxu = DMatrix::zeros(2, 1);
        for j in 0..2 {
            let mut xp = x.clone();
            xp[j] += eps;
            let (jxp, _) = self.d_forward(&xp, u);
            let gx = jxp.transpose() * lam;
            hxx.set_column(j, &((&gx - &g0x) / eps));
        }
        let mut up = u.clone();
        up[0] += eps;
        let (jxp, _) = self.d_forward(x, &up);
        let gx = jxp.transpose() * lam;
        hxu.set_column(0, &((&gx - &g0x) / eps));

        // torque enters `accel` linearly, so Huu is exactly zero.
        let huu = DMatrix::zeros(1, 1);
        (hxx, hxu, huu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_dynamics_matches_matrix_product() {
        let dyn_ = LinearDynamics {
            a: DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        };
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let u = DVector::from_vec(vec![3.0]);
        let xn = dyn_.forward(&x, &u);
        assert_relative_eq!(xn, DVector::from_vec(vec![3.0, 5.0]), epsilon = 1e-12);
    }

    #[test]
    fn pendulum_stays_at_rest_with_zero_torque_at_bottom() {
        let p = PendulumDynamics {
            mass: 1.0,
            length: 1.0,
            gravity: 9.81,
            dt: 0.01,
        };
        let x = DVector::from_vec(vec![0.0, 0.0]);
        let u = DVector::from_vec(vec![0.0]);
        let xn = p.forward(&x, &u);
        assert_relative_eq!(xn, DVector::from_vec(vec![0.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn linear_dynamics_hessian_vjp_is_zero() {
        let dyn_ = LinearDynamics {
            a: DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        };
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let u = DVector::from_vec(vec![3.0]);
        let lam = DVector::from_vec(vec![0.7, -0.3]);
        let (hxx, hxu, huu) = dyn_.hessian_vjp(&x, &u, &lam);
        assert_relative_eq!(hxx, DMatrix::zeros(2, 2), epsilon = 1e-12);
        assert_relative_eq!(hxu, DMatrix::zeros(2, 1), epsilon = 1e-12);
        assert_relative_eq!(huu, DMatrix::zeros(1, 1), epsilon = 1e-12);
    }

    #[test]
    fn pendulum_hessian_vjp_is_nonzero_away_from_bottom() {
        let p = PendulumDynamics {
            mass: 1.0,
            length: 1.0,
            gravity: 9.81,
            dt: 0.01,
        };
        let x = DVector::from_vec(vec![0.3, 0.0]);
        let u = DVector::from_vec(vec![0.0]);
        let lam = DVector::from_vec(vec![0.0, 1.0]);
        let (hxx, hxu, huu) = p.hessian_vjp(&x, &u, &lam);
        assert!(hxx[(0, 0)].abs() > 1e-6, "curvature from -sin(theta) should be nonzero");
        assert_relative_eq!(hxu, DMatrix::zeros(2, 1), epsilon = 1e-8);
        assert_relative_eq!(huu, DMatrix::zeros(1, 1), epsilon = 1e-12);
    }
}

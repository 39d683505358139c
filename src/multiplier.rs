//! Multiplier & projection engine (spec.md §4.3), grounded on
//! `SolverProxDDPTpl::computeMultipliers`/`computeProjectedJacobians`.

use nalgebra::{DMatrix, DVector};

use crate::constraint::ConstraintSetProduct;
use crate::linalg::ColBlockMatrix;
use crate::scalar::Scalar;
use crate::scaler::CstrProximalScaler;

/// Dynamics-multiplier update at one interior transition, spec.md §4.3
/// first bullet.
pub struct DynamicsMultiplierUpdate {
    pub lams_plus: DVector<Scalar>,
    pub lams_pdal: DVector<Scalar>,
    pub lds: DVector<Scalar>,
}

/// `dd_value` is the dynamics residual evaluated at the trial iterate.
pub fn update_dynamics_multipliers(
    lams_prev_next: &DVector<Scalar>,
    lams_next: &DVector<Scalar>,
    mu: Scalar,
    mu_inv: Scalar,
    dd_value: &DVector<Scalar>,
) -> DynamicsMultiplierUpdate {
    let lams_plus = lams_prev_next + dd_value * mu_inv;
    let lams_pdal = &lams_plus * 2.0 - lams_next;
    let lds = (&lams_plus - lams_next) * mu;
    DynamicsMultiplierUpdate {
        lams_plus,
        lams_pdal,
        lds,
    }
}

/// Inequality-multiplier update at one stage, spec.md §4.3 second bullet.
pub struct InequalityMultiplierUpdate {
    pub vs_plus: DVector<Scalar>,
    pub vs_pdal: DVector<Scalar>,
    pub lvs: DVector<Scalar>,
    pub active_set: Vec<bool>,
    /// `shifted = value + scaler * vs_prev`, kept for the Jacobian
    /// correction pass.
    pub shifted: DVector<Scalar>,
}

/// `value` is the raw (unshifted) constraint residual at the trial
/// iterate.
pub fn update_inequality_multipliers(
    constraint_set: &ConstraintSetProduct,
    scaler: &CstrProximalScaler,
    value: &DVector<Scalar>,
    vs_prev: &DVector<Scalar>,
    vs: &DVector<Scalar>,
) -> InequalityMultiplierUpdate {
    let shifted = value + scaler.apply(vs_prev);
    // projection lives in scaled space
    let vs_plus_scaled = constraint_set.normal_cone_projection(&shifted);
    let active_set = constraint_set.compute_active_set(&shifted);
    let lvs = &vs_plus_scaled - scaler.apply(vs);

    // Open question #2 (spec.md §9): the PDAL doubling for inequality
    // multipliers is applied in the scaled space where the projection
    // lives, then unscaled, by analogy with `lams_pdal = 2 lams_plus -
    // lams` for (unscaled) dynamics multipliers.
    let vs_pdal_scaled = &vs_plus_scaled * 2.0 - scaler.apply(vs);
    let vs_pdal = scaler.apply_inverse(&vs_pdal_scaled);

    let vs_plus = scaler.apply_inverse(&vs_plus_scaled);

    InequalityMultiplierUpdate {
        vs_plus,
        vs_pdal,
        lvs,
        active_set,
        shifted,
    }
}

/// Projected-Jacobian correction, spec.md §4.3 third bullet: builds the
/// normal-cone projection Jacobian at `shifted`, premultiplies
/// `jac = [Jx | Ju]` by it, and returns the correction
/// `P^T (scaler^{-1} Lv)` split into `(Lx_corr, Lu_corr)` to be added to
/// the LQ right-hand sides so the LQ problem sees only active-set
/// Jacobians.
pub fn projected_jacobian_correction(
    constraint_set: &ConstraintSetProduct,
    scaler: &CstrProximalScaler,
    jac: &ColBlockMatrix,
    shifted: &DVector<Scalar>,
    lvs: &DVector<Scalar>,
) -> (DVector<Scalar>, DVector<Scalar>) {
    let proj_jac = constraint_set.normal_cone_projection_jacobian(shifted);
    let scaled_lv = scaler.apply_inverse(lvs);
    let corrected = &proj_jac * &scaled_lv;

    let jx = jac.block_col(0);
    let ju = jac.block_col(1);
    let lx_corr: DVector<Scalar> = jx.transpose() * &corrected;
    let lu_corr: DVector<Scalar> = ju.transpose() * &corrected;
    (lx_corr, lu_corr)
}

/// Only the "active-set" rows of `jac` are kept, zeroing the rest, so
/// the LQ problem built downstream sees only active-set Jacobians
/// (spec.md §4.3 last sentence).
pub fn restrict_to_active_set(jac: &DMatrix<Scalar>, active_set: &[bool]) -> DMatrix<Scalar> {
    let mut out = jac.clone();
    for (i, &active) in active_set.iter().enumerate() {
        if !active {
            out.row_mut(i).fill(0.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintSetProduct, NegativeOrthant};

    #[test]
    fn dynamics_multiplier_pdal_identity() {
        let lams_prev = DVector::from_vec(vec![1.0, 2.0]);
        let lams = DVector::from_vec(vec![0.5, 0.5]);
        let dd = DVector::from_vec(vec![0.1, -0.1]);
        let upd = update_dynamics_multipliers(&lams_prev, &lams, 10.0, 0.1, &dd);
        assert_eq!(upd.lams_pdal, &upd.lams_plus * 2.0 - &lams);
    }

    #[test]
    fn inequality_multiplier_round_trips_through_scaler() {
        let cs = ConstraintSetProduct::new(vec![std::boxed::Box::new(NegativeOrthant { dim: 2 })]);
        let scaler = CstrProximalScaler::new(DVector::from_vec(vec![2.0, 3.0]));
        let value = DVector::from_vec(vec![-1.0, 1.0]);
        let vs_prev = DVector::from_vec(vec![0.0, 0.0]);
        let vs = DVector::from_vec(vec![0.0, 0.0]);
        let upd = update_inequality_multipliers(&cs, &scaler, &value, &vs_prev, &vs);
        assert_eq!(upd.active_set, vec![false, true]);
    }
}

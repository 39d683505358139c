//! LQ-subproblem builder (spec.md §4.4), grounded on
//! `SolverProxDDPTpl::updateLQSubproblem`: populates one `Knot` from the
//! nonlinear problem's derivative data, the multiplier engine's
//! Lagrangian gradients, and its projected-Jacobian corrections.

use nalgebra::{DMatrix, DVector};

use crate::config::HessianApprox;
use crate::gar::knot::{Dynamics, InitialConstraint, Knot, ParamBlock};
use crate::scalar::Scalar;

/// Second-derivative data for one stage's dynamics, only used when
/// `hess_approx = Exact` (spec.md §4.4 bullet 3).
pub struct DynamicsHessian {
    pub hxx: DMatrix<Scalar>,
    pub hxu: DMatrix<Scalar>,
    pub huu: DMatrix<Scalar>,
}

/// Everything the builder needs to populate one interior knot.
pub struct InteriorStageData<'a> {
    pub lxx: &'a DMatrix<Scalar>,
    pub lxu: &'a DMatrix<Scalar>,
    pub luu: &'a DMatrix<Scalar>,
    pub lx: &'a DVector<Scalar>,
    pub lu: &'a DVector<Scalar>,

    pub jx: &'a DMatrix<Scalar>,
    pub ju: &'a DMatrix<Scalar>,
    pub jy: &'a DMatrix<Scalar>,
    pub lds_next: &'a DVector<Scalar>,

    /// `(C, D, Lvs[t])`, `None` if this stage has no inequality row.
    pub constraint: Option<(&'a DMatrix<Scalar>, &'a DMatrix<Scalar>, &'a DVector<Scalar>)>,

    pub lx_corr: &'a DVector<Scalar>,
    pub lu_corr: &'a DVector<Scalar>,

    pub dynamics_hessian: Option<&'a DynamicsHessian>,
    pub params: Option<ParamBlock>,
}

/// Builds an interior knot (spec.md §4.4 bullets 1-2 and 5).
pub fn build_interior_knot(
    data: &InteriorStageData<'_>,
    xreg: Scalar,
    ureg: Scalar,
    hess_approx: HessianApprox,
) -> Knot {
    let nx = data.lxx.nrows();
    let nu = data.luu.nrows();
    let nc = data.constraint.map(|(c, _, _)| c.nrows()).unwrap_or(0);
    let nth = data.params.as_ref().map(|p| p.gamma.len()).unwrap_or(0);

    let mut q = data.lxx.clone();
    let mut r = data.luu.clone();
    let mut s = data.lxu.clone();
    if hess_approx == HessianApprox::Exact {
        if let Some(h) = data.dynamics_hessian {
            q += &h.hxx;
            s += &h.hxu;
            r += &h.huu;
        }
    }
    for i in 0..nx {
        q[(i, i)] += xreg;
    }
    for i in 0..nu {
        r[(i, i)] += ureg;
    }

    let qv = data.lx + data.lx_corr;
    let rv = data.lu + data.lu_corr;

    let (c, d, dv) = match data.constraint {
        Some((c, d, lvs)) => (c.clone(), d.clone(), lvs.clone()),
        None => (DMatrix::zeros(0, nx), DMatrix::zeros(0, nu), DVector::zeros(0)),
    };

    Knot {
        nx,
        nu,
        nc,
        nth,
        q,
        s,
        r,
        qv,
        rv,
        dynamics: Some(Dynamics {
            a: data.jx.clone(),
            b: data.ju.clone(),
            e: data.jy.clone(),
            f: data.lds_next.clone(),
        }),
        c,
        d,
        dv,
        params: data.params.clone(),
    }
}

/// Terminal-knot data: only the `C, d, Q, q` parts (spec.md §4.4
/// "Terminal").
pub struct TerminalStageData<'a> {
    pub lxx: &'a DMatrix<Scalar>,
    pub lx: &'a DVector<Scalar>,
    pub lx_corr: &'a DVector<Scalar>,
    pub constraint: Option<(&'a DMatrix<Scalar>, &'a DVector<Scalar>)>,
    pub params: Option<ParamBlock>,
}

pub fn build_terminal_knot(data: &TerminalStageData<'_>, xreg: Scalar) -> Knot {
    let nx = data.lxx.nrows();
    let nc = data.constraint.map(|(c, _)| c.nrows()).unwrap_or(0);
    let nth = data.params.as_ref().map(|p| p.gamma.len()).unwrap_or(0);

    let mut q = data.lxx.clone();
    for i in 0..nx {
        q[(i, i)] += xreg;
    }
    let qv = data.lx + data.lx_corr;

    let (c, dv) = match data.constraint {
        Some((c, d)) => (c.clone(), d.clone()),
        None => (DMatrix::zeros(0, nx), DVector::zeros(0)),
    };

    Knot {
        nx,
        nu: 0,
        nc,
        nth,
        q,
        s: DMatrix::zeros(nx, 0),
        r: DMatrix::zeros(0, 0),
        qv,
        rv: DVector::zeros(0),
        dynamics: None,
        c,
        d: DMatrix::zeros(nc, 0),
        dv,
        params: data.params.clone(),
    }
}

/// Builds the initial-condition block, spec.md §4.4 last bullet: `G0 =
/// Jx(init)`, `g0 = Lds[0]`. The `Hxx(init)` contribution is added
/// directly to the first knot's `Q` by the caller, since `InitialConstraint`
/// carries no cost block of its own.
pub fn build_initial_constraint(jx_init: &DMatrix<Scalar>, lds0: &DVector<Scalar>) -> InitialConstraint {
    InitialConstraint {
        g0: jx_init.clone(),
        g0v: lds0.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_knot_gets_regularization_added_to_diagonal() {
        let lxx = DMatrix::<Scalar>::identity(2, 2);
        let lxu = DMatrix::zeros(2, 1);
        let luu = DMatrix::<Scalar>::identity(1, 1);
        let lx = DVector::zeros(2);
        let lu = DVector::zeros(1);
        let jx = DMatrix::<Scalar>::identity(2, 2);
        let ju = DMatrix::zeros(2, 1);
        let jy = DMatrix::<Scalar>::identity(2, 2);
        let lds_next = DVector::zeros(2);
        let lx_corr = DVector::zeros(2);
        let lu_corr = DVector::zeros(1);
        let data = InteriorStageData {
            lxx: &lxx,
            lxu: &lxu,
            luu: &luu,
            lx: &lx,
            lu: &lu,
            jx: &jx,
            ju: &ju,
            jy: &jy,
            lds_next: &lds_next,
            constraint: None,
            lx_corr: &lx_corr,
            lu_corr: &lu_corr,
            dynamics_hessian: None,
            params: None,
        };
        let knot = build_interior_knot(&data, 0.1, 0.2, HessianApprox::GaussNewton);
        assert_eq!(knot.q[(0, 0)], 1.1);
        assert_eq!(knot.r[(0, 0)], 1.2);
        knot.check_integrity(0).unwrap();
    }
}

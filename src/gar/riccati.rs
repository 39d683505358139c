//! The proximal Riccati LQ kernel (spec.md §4.1, "C3").
//!
//! Backward factorization + forward substitution of the proximally
//! regularized LQ problem, grounded line-for-line on
//! `ProximalRiccatiKernel::backwardImpl`/`stageKernelSolve`/`forwardImpl`/
//! `computeInitial` in `examples/original_source/gar/include/aligator/gar/riccati-impl.hxx`.

use nalgebra::{DMatrix, DVector, Dyn, LU};

use crate::error::GarError;
use crate::gar::knot::{InitialConstraint, Knot, LQProblem};
use crate::gar::stage_factor::{StageFactor, ValueFunction, IDX_A, IDX_K, IDX_L, IDX_Z};
use crate::scalar::{Scalar, PIVOT_TOL};

type DynLU = LU<Scalar, Dyn, Dyn>;

fn lu_or_err(mat: DMatrix<Scalar>) -> Option<DynLU> {
    let lu = LU::new(mat);
    let diag_ok = lu
        .u()
        .diagonal()
        .iter()
        .all(|v| v.abs() > PIVOT_TOL);
    diag_ok.then_some(lu)
}

fn symmetrize(m: &mut DMatrix<Scalar>) {
    let t = m.transpose();
    *m = (&*m + &t) * 0.5;
}

/// Allocates a zero-filled [`StageFactor`] per knot of `problem`, matching
/// each knot's own dimensions and next-state dimension.
pub fn allocate_stage_factors(problem: &LQProblem) -> Vec<StageFactor> {
    let n = problem.horizon();
    let mut out = Vec::with_capacity(problem.stages.len());
    for (t, knot) in problem.stages.iter().enumerate() {
        if t == n {
            out.push(StageFactor::zeros_terminal(
                knot.nx, knot.nu, knot.nc, knot.nth,
            ));
        } else {
            let nx_next = knot.dynamics.as_ref().map(|d| d.nx_next()).unwrap_or(0);
            out.push(StageFactor::zeros_interior(
                knot.nx, knot.nu, knot.nc, nx_next, knot.nth,
            ));
        }
    }
    out
}

pub(crate) fn backward_terminal(model: &Knot, d: &mut StageFactor, mueq: Scalar) -> Result<(), GarError> {
    let ct = model.c.transpose();

    if model.nu == 0 {
        d.fb.block_row_mut(IDX_Z).copy_from(&(&model.c / mueq));
        d.ff.segment_mut(IDX_Z).copy_from(&(&model.dv / mueq));
        d.fth.block_row_mut(IDX_Z).fill(0.0);
    } else {
        let nu = model.nu;
        let nc = model.nc;
        d.kkt_mat.view_mut((0, 0), (nu, nu)).copy_from(&model.r);
        d.kkt_mat
            .view_mut((0, nu), (nu, nc))
            .copy_from(&model.d.transpose());
        d.kkt_mat.view_mut((nu, 0), (nc, nu)).copy_from(&model.d);
        d.kkt_mat
            .view_mut((nu, nu), (nc, nc))
            .fill_diagonal(-mueq);
        symmetrize(&mut d.kkt_mat);

        d.ff.segment_mut(IDX_K).copy_from(&(-&model.rv));
        d.ff.segment_mut(IDX_Z).copy_from(&(-&model.dv));
        d.fb.block_row_mut(IDX_K).copy_from(&(-model.s.transpose()));
        d.fb.block_row_mut(IDX_Z).copy_from(&(-&model.c));

        let lu = lu_or_err(d.kkt_mat.clone()).ok_or(GarError::KktCholeskyFailed { index: 0 })?;
        let mut ff_top = d.ff.top_segments_mut(2).clone_owned();
        if !lu.solve_mut(&mut ff_top) {
            return Err(GarError::KktCholeskyFailed { index: 0 });
        }
        d.ff.top_segments_mut(2).copy_from(&ff_top);

        let mut fb_top = d.fb.top_blk_rows_mut(2).clone_owned();
        if !lu.solve_mut(&mut fb_top) {
            return Err(GarError::KktCholeskyFailed { index: 0 });
        }
        d.fb.top_blk_rows_mut(2).copy_from(&fb_top);

        if model.nth > 0 {
            let p = model.params.as_ref().unwrap();
            d.fth.block_row_mut(IDX_K).copy_from(&(-&p.gu));
            d.fth.block_row_mut(IDX_Z).fill(0.0);
            let mut fth_top = d.fth.top_blk_rows_mut(2).clone_owned();
            if !lu.solve_mut(&mut fth_top) {
                return Err(GarError::KktCholeskyFailed { index: 0 });
            }
            d.fth.top_blk_rows_mut(2).copy_from(&fth_top);
        }
        d.kkt_lu = Some(lu);
    }

    let z = d.fb.block_row(IDX_Z).clone_owned();
    let zff = d.ff.segment(IDX_Z).clone_owned();
    d.vm.pmat = &model.q + &ct * &z;
    d.vm.pvec = &model.qv + &ct * &zff;

    if model.nu > 0 {
        let k = d.fb.block_row(IDX_K).clone_owned();
        let kff = d.ff.segment(IDX_K).clone_owned();
        d.vm.pmat += &model.s * &k;
        d.vm.pvec += &model.s * &kff;
    }

    if model.nth > 0 {
        let p = model.params.as_ref().unwrap();
        let k = d.fb.block_row(IDX_K).clone_owned();
        let kff = d.ff.segment(IDX_K).clone_owned();
        let kth = d.fth.block_row(IDX_K).clone_owned();
        d.vm.vxt = &p.gx + k.transpose() * &p.gu;
        d.vm.vtt = &p.gth + p.gu.transpose() * &kth;
        d.vm.vt = &p.gamma + p.gu.transpose() * &kff;
    }

    Ok(())
}

/// `stageKernelSolve`: factor knot `t < N` given the (to-be-overwritten)
/// value function `vn` of knot `t+1`.
pub(crate) fn stage_kernel_solve(
    index: usize,
    model: &Knot,
    d: &mut StageFactor,
    vn: &mut ValueFunction,
    mudyn: Scalar,
    mueq: Scalar,
) -> Result<(), GarError> {
    let dyn_ = model
        .dynamics
        .as_ref()
        .expect("interior knot must carry dynamics");

    let e_lu = lu_or_err(dyn_.e.clone()).ok_or(GarError::EFactorizationFailed { index })?;
    let einv = e_lu
        .try_inverse()
        .ok_or(GarError::EFactorizationFailed { index })?;

    // ptilde, aliasing vn.vx as in the reference implementation.
    vn.vx = -(einv.transpose() * &vn.pvec);
    d.einv_p = einv.transpose() * &vn.pmat;
    d.ptilde = &d.einv_p * &einv;
    symmetrize(&mut d.ptilde);

    d.schur_mat = DMatrix::identity(d.nx_next, d.nx_next) + mudyn * &d.ptilde;
    let schur_chol = nalgebra::Cholesky::new(d.schur_mat.clone())
        .ok_or(GarError::SchurCholeskyFailed { index })?;

    vn.vxx = d.ptilde.clone();
    vn.vx += &d.ptilde * &dyn_.f;
    vn.vx = schur_chol.solve(&vn.vx);
    vn.vxx = schur_chol.solve(&vn.vxx);

    d.at_v = dyn_.a.transpose() * &vn.vxx;
    d.bt_v = dyn_.b.transpose() * &vn.vxx;

    d.qhat = &model.q + &d.at_v * &dyn_.a;
    d.rhat = &model.r + &d.bt_v * &dyn_.b;
    d.shat = &model.s + &d.at_v * &dyn_.b;
    d.qhat_v = &model.qv + dyn_.a.transpose() * &vn.vx;
    d.rhat_v = &model.rv + dyn_.b.transpose() * &vn.vx;

    let nu = model.nu;
    let nc = model.nc;
    d.kkt_mat.view_mut((0, 0), (nu, nu)).copy_from(&d.rhat);
    d.kkt_mat
        .view_mut((0, nu), (nu, nc))
        .copy_from(&model.d.transpose());
    d.kkt_mat.view_mut((nu, 0), (nc, nu)).copy_from(&model.d);
    d.kkt_mat
        .view_mut((nu, nu), (nc, nc))
        .fill_diagonal(-mueq);
    symmetrize(&mut d.kkt_mat);

    d.ff.segment_mut(IDX_K).copy_from(&(-&d.rhat_v));
    d.ff.segment_mut(IDX_Z).copy_from(&(-&model.dv));
    d.fb.block_row_mut(IDX_K).copy_from(&(-d.shat.transpose()));
    d.fb.block_row_mut(IDX_Z).copy_from(&(-&model.c));

    let kkt_lu = lu_or_err(d.kkt_mat.clone()).ok_or(GarError::KktCholeskyFailed { index })?;
    let mut ff_top = d.ff.top_segments_mut(2).clone_owned();
    if !kkt_lu.solve_mut(&mut ff_top) {
        return Err(GarError::KktCholeskyFailed { index });
    }
    d.ff.top_segments_mut(2).copy_from(&ff_top);

    let mut fb_top = d.fb.top_blk_rows_mut(2).clone_owned();
    if !kkt_lu.solve_mut(&mut fb_top) {
        return Err(GarError::KktCholeskyFailed { index });
    }
    d.fb.top_blk_rows_mut(2).copy_from(&fb_top);

    let kff = d.ff.segment(IDX_K).clone_owned();
    let k = d.fb.block_row(IDX_K).clone_owned();

    let lff = &vn.vx + d.bt_v.transpose() * &kff;
    let mut yff = &dyn_.f + &dyn_.b * &kff;
    yff -= mudyn * &lff;
    let yff = -(&einv * yff);

    let mut l = &vn.vxx * &dyn_.a;
    l += d.bt_v.transpose() * &k;

    let mut a_gain = &dyn_.a + &dyn_.b * &k;
    a_gain -= mudyn * &l;
    let a_gain = -(&einv * a_gain);

    d.ff.segment_mut(IDX_L).copy_from(&lff);
    d.ff.segment_mut(IDX_A).copy_from(&yff);
    d.fb.block_row_mut(IDX_L).copy_from(&l);
    d.fb.block_row_mut(IDX_A).copy_from(&a_gain);

    let ct = model.c.transpose();
    let z = d.fb.block_row(IDX_Z).clone_owned();
    let zff = d.ff.segment(IDX_Z).clone_owned();
    d.vm.pmat = &d.qhat + &d.shat * &k + &ct * &z;
    d.vm.pvec = &d.qhat_v + &d.shat * &kff + &ct * &zff;

    if model.nth > 0 {
        let p = model.params.as_ref().unwrap();
        let mut lth = -(einv.transpose() * &vn.vxt);
        lth = schur_chol.solve(&lth);
        let pxttilde = lth.clone();

        let guhat = &p.gu + dyn_.b.transpose() * &pxttilde;

        d.fth.block_row_mut(IDX_K).copy_from(&(-&guhat));
        d.fth.block_row_mut(IDX_Z).fill(0.0);
        let mut fth_top = d.fth.top_blk_rows_mut(2).clone_owned();
        if !kkt_lu.solve_mut(&mut fth_top) {
            return Err(GarError::KktCholeskyFailed { index });
        }
        d.fth.top_blk_rows_mut(2).copy_from(&fth_top);

        let kth = d.fth.block_row(IDX_K).clone_owned();
        let lth = pxttilde + d.bt_v.transpose() * &kth;

        let mut yth = &dyn_.b * &kth;
        yth -= mudyn * &lth;
        let yth = -(&einv * yth);

        d.vm.vt = &vn.vt + &p.gamma;
        d.vm.vt += p.gu.transpose() * &kff;
        d.vm.vt += vn.vxt.transpose() * &yff;

        d.vm.vxt = p.gx.clone();
        d.vm.vxt += k.transpose() * &p.gu;
        d.vm.vxt += a_gain.transpose() * &vn.vxt;

        d.vm.vtt = &p.gth + &vn.vtt;
        d.vm.vtt += p.gu.transpose() * &kth;
        d.vm.vtt += vn.vxt.transpose() * &yth;

        d.fth.block_row_mut(IDX_L).copy_from(&lth);
        d.fth.block_row_mut(IDX_A).copy_from(&yth);
    }

    d.e_lu = Some(e_lu);
    d.kkt_lu = Some(kkt_lu);
    d.schur_chol = Some(schur_chol);

    Ok(())
}

/// Backward sweep, spec.md §4.1. Processes knots from `N` down to `0`.
pub fn backward(
    problem: &LQProblem,
    datas: &mut [StageFactor],
    mudyn: Scalar,
    mueq: Scalar,
) -> Result<(), GarError> {
    if mudyn <= 0.0 || mueq <= 0.0 {
        return Err(GarError::NonPositiveProxParam { mudyn, mueq });
    }
    let n = problem.horizon();
    if datas.is_empty() {
        return Err(GarError::EmptyProblem);
    }

    backward_terminal(&problem.stages[n], &mut datas[n], mueq)?;

    if n == 0 {
        return Ok(());
    }

    let mut t = n - 1;
    loop {
        let (left, right) = datas.split_at_mut(t + 1);
        let d = &mut left[t];
        let vn = &mut right[0].vm;
        stage_kernel_solve(t, &problem.stages[t], d, vn, mudyn, mueq)?;
        if t == 0 {
            break;
        }
        t -= 1;
    }
    Ok(())
}

/// Forward substitution, spec.md §4.1 "Forward sweep". Allocation-free in
/// the number of stages (writes only into the caller's buffers).
pub fn forward(
    problem: &LQProblem,
    datas: &[StageFactor],
    xs: &mut [DVector<Scalar>],
    us: &mut [DVector<Scalar>],
    vs: &mut [DVector<Scalar>],
    lams: &mut [DVector<Scalar>],
    theta: Option<&DVector<Scalar>>,
) -> Result<(), GarError> {
    let n = problem.horizon();
    for t in 0..=n {
        let d = &datas[t];
        let model = &problem.stages[t];
        if xs[t].len() != model.nx {
            return Err(GarError::BlockShapeMismatch {
                index: t,
                block: "xs[t]",
                expected: model.nx,
                got: xs[t].len(),
            });
        }
        let xt = xs[t].clone_owned();

        if model.nu > 0 {
            let k = d.fb.block_row(IDX_K);
            let kff = d.ff.segment(IDX_K);
            us[t] = kff.clone_owned();
            us[t].gemm(1.0, &k, &xt, 1.0);
            if model.nth > 0 {
                if let Some(theta) = theta {
                    let kth = d.fth.block_row(IDX_K);
                    us[t].gemm(1.0, &kth, theta, 1.0);
                }
            }
        }

        let z = d.fb.block_row(IDX_Z);
        let zff = d.ff.segment(IDX_Z);
        vs[t] = zff.clone_owned();
        vs[t].gemm(1.0, &z, &xt, 1.0);
        if model.nth > 0 {
            if let Some(theta) = theta {
                let zth = d.fth.block_row(IDX_Z);
                vs[t].gemm(1.0, &zth, theta, 1.0);
            }
        }

        if t == n {
            break;
        }

        let l = d.fb.block_row(IDX_L);
        let lff = d.ff.segment(IDX_L);
        lams[t + 1] = lff.clone_owned();
        lams[t + 1].gemm(1.0, &l, &xt, 1.0);

        let a_gain = d.fb.block_row(IDX_A);
        let yff = d.ff.segment(IDX_A);
        xs[t + 1] = yff.clone_owned();
        xs[t + 1].gemm(1.0, &a_gain, &xt, 1.0);

        if model.nth > 0 {
            if let Some(theta) = theta {
                let lth = d.fth.block_row(IDX_L);
                lams[t + 1].gemm(1.0, &lth, theta, 1.0);
                let ath = d.fth.block_row(IDX_A);
                xs[t + 1].gemm(1.0, &ath, theta, 1.0);
            }
        }
    }
    Ok(())
}

/// Solves the `[[P0, G0^T], [G0, 0]]` initial-condition KKT system built
/// from the terminal... rather, the *first* knot's value function and the
/// problem's initial-condition block, returning `(x0, lambda0)`.
///
/// Resolves spec.md §4.1 "Initial condition": the source only states the
/// shape of the system (`kkt0`); the exact sign convention used here is a
/// standard equality-constrained QP KKT system (see DESIGN.md).
pub fn compute_initial(
    init: &InitialConstraint,
    d0: &StageFactor,
    theta: Option<&DVector<Scalar>>,
    nth: usize,
) -> Result<(DVector<Scalar>, DVector<Scalar>), GarError> {
    let nx0 = init.g0.ncols();
    let dim = 2 * nx0;
    let mut mat = DMatrix::zeros(dim, dim);
    mat.view_mut((0, 0), (nx0, nx0)).copy_from(&d0.vm.pmat);
    mat.view_mut((0, nx0), (nx0, nx0))
        .copy_from(&init.g0.transpose());
    mat.view_mut((nx0, 0), (nx0, nx0)).copy_from(&init.g0);
    symmetrize(&mut mat);

    let lu = lu_or_err(mat).ok_or(GarError::Kkt0Failed)?;

    let mut rhs = DVector::zeros(dim);
    rhs.rows_mut(0, nx0).copy_from(&(-&d0.vm.pvec));
    rhs.rows_mut(nx0, nx0).copy_from(&init.g0v);
    if !lu.solve_mut(&mut rhs) {
        return Err(GarError::Kkt0Failed);
    }
    let mut x0 = rhs.rows(0, nx0).clone_owned();
    let mut lam0 = rhs.rows(nx0, nx0).clone_owned();

    if nth > 0 {
        if let Some(theta) = theta {
            let mut rhs_th = DMatrix::zeros(dim, nth);
            rhs_th
                .view_mut((0, 0), (nx0, nth))
                .copy_from(&(-&d0.vm.vxt));
            if lu.solve_mut(&mut rhs_th) {
                let kx0th = rhs_th.view((0, 0), (nx0, nth)).clone_owned();
                let kl0th = rhs_th.view((nx0, 0), (nx0, nth)).clone_owned();
                x0.gemm(1.0, &kx0th, theta, 1.0);
                lam0.gemm(1.0, &kl0th, theta, 1.0);
            }
        }
    }

    Ok((x0, lam0))
}

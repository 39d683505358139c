//! Per-knot factorization scratch (spec.md §3 "StageFactor") and the value
//! function record it produces.

use nalgebra::{DMatrix, DVector};

use crate::linalg::{BlockMatrix, BlockVector};
use crate::scalar::Scalar;

/// Value-function record `{Pmat, pvec, Vxx, vx, Vxt, Vtt, vt}` for one knot.
#[derive(Clone, Debug)]
pub struct ValueFunction {
    pub pmat: DMatrix<Scalar>,
    pub pvec: DVector<Scalar>,
    pub vxx: DMatrix<Scalar>,
    pub vx: DVector<Scalar>,
    pub vxt: DMatrix<Scalar>,
    pub vtt: DMatrix<Scalar>,
    pub vt: DVector<Scalar>,
}

impl ValueFunction {
    pub fn zeros(nx: usize, nth: usize) -> Self {
        Self {
            pmat: DMatrix::zeros(nx, nx),
            pvec: DVector::zeros(nx),
            vxx: DMatrix::zeros(nx, nx),
            vx: DVector::zeros(nx),
            vxt: DMatrix::zeros(nx, nth),
            vtt: DMatrix::zeros(nth, nth),
            vt: DVector::zeros(nth),
        }
    }
}

/// Indices into the four feedforward segments / feedback block-rows.
pub const IDX_K: usize = 0;
pub const IDX_Z: usize = 1;
pub const IDX_L: usize = 2;
pub const IDX_A: usize = 3;

/// Scratch allocated once per knot and overwritten by every backward sweep.
#[derive(Clone, Debug)]
pub struct StageFactor {
    pub nx: usize,
    pub nu: usize,
    pub nc: usize,
    pub nx_next: usize,
    pub nth: usize,

    /// reduced KKT matrix `[[Rhat, Dt], [D, -mueq I]]`, size `(nu+nc)^2`
    pub kkt_mat: DMatrix<Scalar>,
    /// cached LU factors of `kkt_mat` from the most recent backward solve
    pub kkt_lu: Option<nalgebra::LU<Scalar, nalgebra::Dyn, nalgebra::Dyn>>,

    /// LU factors of the generalized dynamics matrix `E`
    pub e_lu: Option<nalgebra::LU<Scalar, nalgebra::Dyn, nalgebra::Dyn>>,

    /// `Einv^T Pmat_{t+1} Einv`, size `nx_next^2`
    pub ptilde: DMatrix<Scalar>,
    /// `Einv^T Pmat_{t+1}`, size `nx_next^2`
    pub einv_p: DMatrix<Scalar>,
    /// `I + mudyn * Ptilde`, size `nx_next^2`
    pub schur_mat: DMatrix<Scalar>,
    pub schur_chol: Option<nalgebra::Cholesky<Scalar, nalgebra::Dyn>>,

    pub at_v: DMatrix<Scalar>,
    pub bt_v: DMatrix<Scalar>,
    pub qhat: DMatrix<Scalar>,
    pub rhat: DMatrix<Scalar>,
    pub shat: DMatrix<Scalar>,
    pub qhat_v: DVector<Scalar>,
    pub rhat_v: DVector<Scalar>,

    /// feedforward `[kff, zff, lff, yff]`
    pub ff: BlockVector,
    /// feedback `[K; Z; L; A]`
    pub fb: BlockMatrix,
    /// parameter feedback `[Kth; Zth; Lth; Yth]`
    pub fth: BlockMatrix,

    pub vm: ValueFunction,
}

impl StageFactor {
    /// Allocates scratch for an interior knot with next-state dimension
    /// `nx_next` and (own) state dimension `nx`.
    pub fn zeros_interior(nx: usize, nu: usize, nc: usize, nx_next: usize, nth: usize) -> Self {
        let kkt_dim = nu + nc;
        Self {
            nx,
            nu,
            nc,
            nx_next,
            nth,
            kkt_mat: DMatrix::zeros(kkt_dim, kkt_dim),
            kkt_lu: None,
            e_lu: None,
            ptilde: DMatrix::zeros(nx_next, nx_next),
            einv_p: DMatrix::zeros(nx_next, nx_next),
            schur_mat: DMatrix::zeros(nx_next, nx_next),
            schur_chol: None,
            at_v: DMatrix::zeros(nx, nx_next),
            bt_v: DMatrix::zeros(nu, nx_next),
            qhat: DMatrix::zeros(nx, nx),
            rhat: DMatrix::zeros(nu, nu),
            shat: DMatrix::zeros(nx, nu),
            qhat_v: DVector::zeros(nx),
            rhat_v: DVector::zeros(nu),
            ff: BlockVector::zeros(vec![nu, nc, nx_next, nx_next]),
            fb: BlockMatrix::zeros(vec![nu, nc, nx_next, nx_next], nx),
            fth: BlockMatrix::zeros(vec![nu, nc, nx_next, nx_next], nth),
            vm: ValueFunction::zeros(nx, nth),
        }
    }

    /// Allocates scratch for the terminal knot (no dynamics propagation).
    pub fn zeros_terminal(nx: usize, nu: usize, nc: usize, nth: usize) -> Self {
        let kkt_dim = nu + nc;
        Self {
            nx,
            nu,
            nc,
            nx_next: 0,
            nth,
            kkt_mat: DMatrix::zeros(kkt_dim, kkt_dim),
            kkt_lu: None,
            e_lu: None,
            ptilde: DMatrix::zeros(0, 0),
            einv_p: DMatrix::zeros(0, 0),
            schur_mat: DMatrix::zeros(0, 0),
            schur_chol: None,
            at_v: DMatrix::zeros(0, 0),
            bt_v: DMatrix::zeros(0, 0),
            qhat: DMatrix::zeros(0, 0),
            rhat: DMatrix::zeros(0, 0),
            shat: DMatrix::zeros(0, 0),
            qhat_v: DVector::zeros(0),
            rhat_v: DVector::zeros(0),
            ff: BlockVector::zeros(vec![nu, nc]),
            fb: BlockMatrix::zeros(vec![nu, nc], nx),
            fth: BlockMatrix::zeros(vec![nu, nc], nth),
            vm: ValueFunction::zeros(nx, nth),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.nx_next == 0 && self.ff.layout.num_blocks() == 2
    }
}

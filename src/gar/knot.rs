//! LQ stage data (spec.md §3 "Knot") and the ordered problem they form.

use nalgebra::{DMatrix, DVector};

use crate::error::GarError;
use crate::scalar::Scalar;

/// Optional parametric-sensitivity blocks, present only when `nth > 0`.
#[derive(Clone, Debug)]
pub struct ParamBlock {
    /// `nx x nth`
    pub gx: DMatrix<Scalar>,
    /// `nu x nth`
    pub gu: DMatrix<Scalar>,
    /// `nth x nth`
    pub gth: DMatrix<Scalar>,
    /// `nth`
    pub gamma: DVector<Scalar>,
}

impl ParamBlock {
    pub fn zeros(nx: usize, nu: usize, nth: usize) -> Self {
        Self {
            gx: DMatrix::zeros(nx, nth),
            gu: DMatrix::zeros(nu, nth),
            gth: DMatrix::zeros(nth, nth),
            gamma: DVector::zeros(nth),
        }
    }
}

/// Generalized dynamics blocks `A x + B u + E^{-1}`-style residual,
/// present on every knot except the last.
#[derive(Clone, Debug)]
pub struct Dynamics {
    /// `nx_next x nx`
    pub a: DMatrix<Scalar>,
    /// `nx_next x nu`
    pub b: DMatrix<Scalar>,
    /// `nx_next x nx_next`, invertible ("generalized" mass-like matrix)
    pub e: DMatrix<Scalar>,
    /// `nx_next`
    pub f: DVector<Scalar>,
}

impl Dynamics {
    pub fn nx_next(&self) -> usize {
        self.e.nrows()
    }
}

/// A single stage's worth of LQ data, spec.md §3.
#[derive(Clone, Debug)]
pub struct Knot {
    pub nx: usize,
    pub nu: usize,
    pub nc: usize,
    pub nth: usize,

    /// `nx x nx`, symmetric
    pub q: DMatrix<Scalar>,
    /// `nx x nu`
    pub s: DMatrix<Scalar>,
    /// `nu x nu`, symmetric
    pub r: DMatrix<Scalar>,
    /// `nx`
    pub qv: DVector<Scalar>,
    /// `nu`
    pub rv: DVector<Scalar>,

    pub dynamics: Option<Dynamics>,

    /// `nc x nx`
    pub c: DMatrix<Scalar>,
    /// `nc x nu`
    pub d: DMatrix<Scalar>,
    /// `nc`
    pub dv: DVector<Scalar>,

    pub params: Option<ParamBlock>,
}

impl Knot {
    /// Allocates a zero-filled interior knot (with dynamics to the next
    /// stage of state dimension `nx_next`).
    pub fn zeros_interior(nx: usize, nu: usize, nc: usize, nx_next: usize, nth: usize) -> Self {
        Self {
            nx,
            nu,
            nc,
            nth,
            q: DMatrix::zeros(nx, nx),
            s: DMatrix::zeros(nx, nu),
            r: DMatrix::zeros(nu, nu),
            qv: DVector::zeros(nx),
            rv: DVector::zeros(nu),
            dynamics: Some(Dynamics {
                a: DMatrix::zeros(nx_next, nx),
                b: DMatrix::zeros(nx_next, nu),
                e: DMatrix::identity(nx_next, nx_next),
                f: DVector::zeros(nx_next),
            }),
            c: DMatrix::zeros(nc, nx),
            d: DMatrix::zeros(nc, nu),
            dv: DVector::zeros(nc),
            params: if nth > 0 {
                Some(ParamBlock::zeros(nx, nu, nth))
            } else {
                None
            },
        }
    }

    /// Allocates a zero-filled terminal knot (no dynamics).
    pub fn zeros_terminal(nx: usize, nu: usize, nc: usize, nth: usize) -> Self {
        Self {
            nx,
            nu,
            nc,
            nth,
            q: DMatrix::zeros(nx, nx),
            s: DMatrix::zeros(nx, nu),
            r: DMatrix::zeros(nu, nu),
            qv: DVector::zeros(nx),
            rv: DVector::zeros(nu),
            dynamics: None,
            c: DMatrix::zeros(nc, nx),
            d: DMatrix::zeros(nc, nu),
            dv: DVector::zeros(nc),
            params: if nth > 0 {
                Some(ParamBlock::zeros(nx, nu, nth))
            } else {
                None
            },
        }
    }

    fn check_shape(
        &self,
        index: usize,
        block: &'static str,
        expected: usize,
        got: usize,
    ) -> Result<(), GarError> {
        if expected != got {
            Err(GarError::BlockShapeMismatch {
                index,
                block,
                expected,
                got,
            })
        } else {
            Ok(())
        }
    }

    /// Validates that every declared block has the shape implied by
    /// `nx`/`nu`/`nc`/`nth`, per spec.md §3 invariants.
    pub fn check_integrity(&self, index: usize) -> Result<(), GarError> {
        self.check_shape(index, "Q", self.nx, self.q.nrows())?;
        self.check_shape(index, "Q", self.nx, self.q.ncols())?;
        self.check_shape(index, "S.nrows", self.nx, self.s.nrows())?;
        self.check_shape(index, "S.ncols", self.nu, self.s.ncols())?;
        self.check_shape(index, "R", self.nu, self.r.nrows())?;
        self.check_shape(index, "R", self.nu, self.r.ncols())?;
        self.check_shape(index, "q", self.nx, self.qv.len())?;
        self.check_shape(index, "r", self.nu, self.rv.len())?;
        self.check_shape(index, "C.nrows", self.nc, self.c.nrows())?;
        self.check_shape(index, "C.ncols", self.nx, self.c.ncols())?;
        self.check_shape(index, "D.nrows", self.nc, self.d.nrows())?;
        self.check_shape(index, "D.ncols", self.nu, self.d.ncols())?;
        self.check_shape(index, "d", self.nc, self.dv.len())?;
        if let Some(dyn_) = &self.dynamics {
            let nxn = dyn_.nx_next();
            self.check_shape(index, "A.ncols", self.nx, dyn_.a.ncols())?;
            self.check_shape(index, "A.nrows", nxn, dyn_.a.nrows())?;
            self.check_shape(index, "B.ncols", self.nu, dyn_.b.ncols())?;
            self.check_shape(index, "B.nrows", nxn, dyn_.b.nrows())?;
            self.check_shape(index, "E", nxn, dyn_.e.nrows())?;
            self.check_shape(index, "E", nxn, dyn_.e.ncols())?;
            self.check_shape(index, "f", nxn, dyn_.f.len())?;
        }
        if self.nth > 0 {
            let p = self
                .params
                .as_ref()
                .ok_or(GarError::BlockShapeMismatch {
                    index,
                    block: "params",
                    expected: self.nth,
                    got: 0,
                })?;
            self.check_shape(index, "Gx.nrows", self.nx, p.gx.nrows())?;
            self.check_shape(index, "Gx.ncols", self.nth, p.gx.ncols())?;
            self.check_shape(index, "Gu.nrows", self.nu, p.gu.nrows())?;
            self.check_shape(index, "Gu.ncols", self.nth, p.gu.ncols())?;
            self.check_shape(index, "Gth", self.nth, p.gth.nrows())?;
            self.check_shape(index, "Gth", self.nth, p.gth.ncols())?;
            self.check_shape(index, "gamma", self.nth, p.gamma.len())?;
        }
        Ok(())
    }
}

/// Initial-condition block: a Jacobian/residual pair constraining `x0`.
#[derive(Clone, Debug)]
pub struct InitialConstraint {
    /// `nx0 x nx0`
    pub g0: DMatrix<Scalar>,
    /// `nx0`
    pub g0v: DVector<Scalar>,
}

/// An ordered sequence of knots of length `N+1` plus the initial-condition
/// block, spec.md §3 "LQProblem".
#[derive(Clone, Debug)]
pub struct LQProblem {
    pub stages: Vec<Knot>,
    pub init: InitialConstraint,
    pub nth: usize,
}

impl LQProblem {
    pub fn horizon(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    pub fn check_integrity(&self) -> Result<(), GarError> {
        if self.stages.is_empty() {
            return Err(GarError::EmptyProblem);
        }
        for (i, knot) in self.stages.iter().enumerate() {
            knot.check_integrity(i)?;
        }
        let n = self.horizon();
        for t in 0..n {
            let nx_next = self.stages[t]
                .dynamics
                .as_ref()
                .map(|d| d.nx_next())
                .unwrap_or(0);
            if nx_next != self.stages[t + 1].nx {
                return Err(GarError::BlockShapeMismatch {
                    index: t,
                    block: "A/E next-state dim vs stages[t+1].nx",
                    expected: self.stages[t + 1].nx,
                    got: nx_next,
                });
            }
        }
        if self.stages[n].dynamics.is_some() {
            return Err(GarError::BlockShapeMismatch {
                index: n,
                block: "terminal knot must not carry dynamics",
                expected: 0,
                got: 1,
            });
        }
        let nx0 = self.stages[0].nx;
        self.stages[0].check_shape(0, "G0", nx0, self.init.g0.ncols())?;
        self.stages[0].check_shape(0, "g0", nx0, self.init.g0v.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_knot_zeros_has_consistent_shapes() {
        let knot = Knot::zeros_interior(2, 1, 0, 2, 0);
        knot.check_integrity(0).unwrap();
    }

    #[test]
    fn lqproblem_rejects_mismatched_horizon_dims() {
        let mut k0 = Knot::zeros_interior(2, 1, 0, 3, 0);
        k0.dynamics.as_mut().unwrap().a = DMatrix::zeros(3, 2);
        let k1 = Knot::zeros_terminal(2, 0, 0, 0);
        let problem = LQProblem {
            stages: vec![k0, k1],
            init: InitialConstraint {
                g0: DMatrix::identity(2, 2),
                g0v: DVector::zeros(2),
            },
            nth: 0,
        };
        assert!(problem.check_integrity().is_err());
    }

    #[test]
    fn lqproblem_accepts_consistent_horizon() {
        let k0 = Knot::zeros_interior(2, 1, 0, 2, 0);
        let k1 = Knot::zeros_terminal(2, 0, 0, 0);
        let problem = LQProblem {
            stages: vec![k0, k1],
            init: InitialConstraint {
                g0: DMatrix::identity(2, 2),
                g0v: DVector::zeros(2),
            },
            nth: 0,
        };
        problem.check_integrity().unwrap();
    }
}

//! Constraint-set cone factors and their cartesian product.
//!
//! spec.md §6 declares the constraint-set interface abstractly
//! (`normalConeProjection`, `normalConeProjectionJacobian`,
//! `computeActiveSet`, `dims`); this module supplies the concrete cone
//! factors a complete crate needs to exercise that interface end-to-end,
//! grounded on the box/orthant projection style used by
//! `cvxrs-algos`' ADMM solver and `osotsia-prism`'s interior-point adapter
//! in `other_examples/`.

use nalgebra::{DMatrix, DVector};

use crate::scalar::Scalar;

/// A single cone factor of a constraint-set product.
pub trait ConstraintSet {
    /// Dimension of this factor.
    fn dim(&self) -> usize;

    /// Projects `z` onto the polar (normal) cone of this factor.
    fn normal_cone_projection(&self, z: &DVector<Scalar>) -> DVector<Scalar>;

    /// Jacobian of [`ConstraintSet::normal_cone_projection`] at `z`, a
    /// `dim x dim` diagonal selection matrix for the factors implemented
    /// here (box, orthant, zero cone are all separable).
    fn normal_cone_projection_jacobian(&self, z: &DVector<Scalar>) -> DMatrix<Scalar>;

    /// Mask of indices where the normal-cone projection is nontrivial,
    /// i.e. the active set.
    fn active_set(&self, z: &DVector<Scalar>) -> Vec<bool>;
}

/// `{ z <= 0 }`; polar cone is `{ z >= 0 }`, so projection clamps to the
/// nonnegative orthant.
#[derive(Clone, Debug)]
pub struct NegativeOrthant {
    pub dim: usize,
}

impl ConstraintSet for NegativeOrthant {
    fn dim(&self) -> usize {
        self.dim
    }

    fn normal_cone_projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z.map(|v| v.max(0.0))
    }

    fn normal_cone_projection_jacobian(&self, z: &DVector<Scalar>) -> DMatrix<Scalar> {
        DMatrix::from_diagonal(&z.map(|v| if v > 0.0 { 1.0 } else { 0.0 }))
    }

    fn active_set(&self, z: &DVector<Scalar>) -> Vec<bool> {
        z.iter().map(|&v| v > 0.0).collect()
    }
}

/// `{ lower <= z <= upper }`; polar cone projection clamps the dual
/// variable to `[lower, upper]` componentwise.
#[derive(Clone, Debug)]
pub struct Box {
    pub lower: DVector<Scalar>,
    pub upper: DVector<Scalar>,
}

impl ConstraintSet for Box {
    fn dim(&self) -> usize {
        self.lower.len()
    }

    fn normal_cone_projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        DVector::from_iterator(
            z.len(),
            z.iter()
                .zip(self.lower.iter())
                .zip(self.upper.iter())
                .map(|((&v, &lo), &hi)| v.clamp(lo, hi)),
        )
    }

    fn normal_cone_projection_jacobian(&self, z: &DVector<Scalar>) -> DMatrix<Scalar> {
        let diag = DVector::from_iterator(
            z.len(),
            z.iter()
                .zip(self.lower.iter())
                .zip(self.upper.iter())
                .map(|((&v, &lo), &hi)| if v > lo && v < hi { 1.0 } else { 0.0 }),
        );
        DMatrix::from_diagonal(&diag)
    }

    fn active_set(&self, z: &DVector<Scalar>) -> Vec<bool> {
        z.iter()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
            .map(|((&v, &lo), &hi)| v <= lo || v >= hi)
            .collect()
    }
}

/// `{ z == 0 }`; the polar cone is all of `R^dim`, so projection is the
/// identity and the whole factor is always active.
#[derive(Clone, Debug)]
pub struct EqualityCone {
    pub dim: usize,
}

impl ConstraintSet for EqualityCone {
    fn dim(&self) -> usize {
        self.dim
    }

    fn normal_cone_projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z.clone()
    }

    fn normal_cone_projection_jacobian(&self, _z: &DVector<Scalar>) -> DMatrix<Scalar> {
        DMatrix::identity(self.dim, self.dim)
    }

    fn active_set(&self, z: &DVector<Scalar>) -> Vec<bool> {
        vec![true; z.len()]
    }
}

/// Cartesian product of cone factors, dispatching `dims`/projection/
/// active-set calls blockwise over contiguous row ranges.
pub struct ConstraintSetProduct {
    factors: Vec<std::boxed::Box<dyn ConstraintSet>>,
}

impl ConstraintSetProduct {
    pub fn new(factors: Vec<std::boxed::Box<dyn ConstraintSet>>) -> Self {
        Self { factors }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.dim()).collect()
    }

    pub fn total_dim(&self) -> usize {
        self.dims().iter().sum()
    }

    fn for_each_block<R>(
        &self,
        z: &DVector<Scalar>,
        mut f: impl FnMut(&dyn ConstraintSet, nalgebra::DVectorView<'_, Scalar>) -> R,
    ) -> Vec<R> {
        let mut offset = 0;
        let mut out = Vec::with_capacity(self.factors.len());
        for factor in &self.factors {
            let d = factor.dim();
            out.push(f(factor.as_ref(), z.rows(offset, d)));
            offset += d;
        }
        out
    }

    pub fn normal_cone_projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        let blocks = self.for_each_block(z, |factor, zi| factor.normal_cone_projection(&zi.clone_owned()));
        let mut out = DVector::zeros(self.total_dim());
        let mut offset = 0;
        for block in blocks {
            out.rows_mut(offset, block.len()).copy_from(&block);
            offset += block.len();
        }
        out
    }

    pub fn normal_cone_projection_jacobian(&self, z: &DVector<Scalar>) -> DMatrix<Scalar> {
        let n = self.total_dim();
        let mut out = DMatrix::zeros(n, n);
        let mut offset = 0;
        for factor in &self.factors {
            let d = factor.dim();
            let zi = z.rows(offset, d).clone_owned();
            let jac = factor.normal_cone_projection_jacobian(&zi);
            out.view_mut((offset, offset), (d, d)).copy_from(&jac);
            offset += d;
        }
        out
    }

    pub fn compute_active_set(&self, z: &DVector<Scalar>) -> Vec<bool> {
        self.for_each_block(z, |factor, zi| factor.active_set(&zi.clone_owned()))
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_orthant_projection_is_idempotent() {
        let c = NegativeOrthant { dim: 3 };
        let z = DVector::from_vec(vec![-1.0, 0.5, 2.0]);
        let once = c.normal_cone_projection(&z);
        let twice = c.normal_cone_projection(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn box_projection_is_idempotent() {
        let c = Box {
            lower: DVector::from_vec(vec![-1.0, -1.0]),
            upper: DVector::from_vec(vec![1.0, 1.0]),
        };
        let z = DVector::from_vec(vec![-5.0, 5.0]);
        let once = c.normal_cone_projection(&z);
        assert_eq!(once, DVector::from_vec(vec![-1.0, 1.0]));
        let twice = c.normal_cone_projection(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn equality_cone_projection_is_identity_and_always_active() {
        let c = EqualityCone { dim: 2 };
        let z = DVector::from_vec(vec![3.0, -4.0]);
        assert_eq!(c.normal_cone_projection(&z), z);
        assert_eq!(c.active_set(&z), vec![true, true]);
    }

    #[test]
    fn product_dispatches_blockwise_and_is_idempotent() {
        let product = ConstraintSetProduct::new(vec![
            std::boxed::Box::new(NegativeOrthant { dim: 1 }),
            std::boxed::Box::new(Box {
                lower: DVector::from_vec(vec![-1.0]),
                upper: DVector::from_vec(vec![1.0]),
            }),
        ]);
        assert_eq!(product.dims(), vec![1, 1]);
        let z = DVector::from_vec(vec![-2.0, 3.0]);
        let once = product.normal_cone_projection(&z);
        let twice = product.normal_cone_projection(&once);
        assert_eq!(once, twice);
        assert_eq!(product.compute_active_set(&z), vec![true, true]);
    }
}

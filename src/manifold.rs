//! Concrete manifolds. `VectorSpace` is the trivial flat case needed to
//! exercise the unconstrained/box/equality end-to-end scenarios of
//! spec.md §8 (1-3), which all live on `R^n`.

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::scalar::Scalar;
use crate::traits::Manifold;

/// The Euclidean vector space `R^n`: `integrate = x + dx`,
/// `difference(x0, x1) = x1 - x0`, `Jdifference = ±I`.
#[derive(Clone, Debug)]
pub struct VectorSpace {
    pub n: usize,
}

impl VectorSpace {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Manifold for VectorSpace {
    fn nx(&self) -> usize {
        self.n
    }

    fn ndx(&self) -> usize {
        self.n
    }

    fn integrate(&self, x: &DVector<Scalar>, dx: &DVector<Scalar>) -> DVector<Scalar> {
        x + dx
    }

    fn difference(&self, x0: &DVector<Scalar>, x1: &DVector<Scalar>) -> DVector<Scalar> {
        x1 - x0
    }

    fn jdifference(&self, _x0: &DVector<Scalar>, _x1: &DVector<Scalar>, arg: u8) -> DMatrix<Scalar> {
        match arg {
            0 => -DMatrix::identity(self.n, self.n),
            1 => DMatrix::identity(self.n, self.n),
            _ => panic!("Jdifference arg must be 0 or 1, got {arg}"),
        }
    }

    fn rand(&self) -> DVector<Scalar> {
        let mut rng = rand::thread_rng();
        DVector::from_iterator(self.n, (0..self.n).map(|_| rng.gen_range(-1.0..1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn integrate_difference_round_trip() {
        let m = VectorSpace::new(3);
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let y = DVector::from_vec(vec![4.0, 0.0, -1.0]);
        let dx = m.difference(&x, &y);
        let y2 = m.integrate(&x, &dx);
        assert_relative_eq!(y, y2, epsilon = 1e-12);
    }

    #[test]
    fn jdifference_signs() {
        let m = VectorSpace::new(2);
        let x = DVector::zeros(2);
        let j0 = m.jdifference(&x, &x, 0);
        let j1 = m.jdifference(&x, &x, 1);
        assert_eq!(j0, -DMatrix::<Scalar>::identity(2, 2));
        assert_eq!(j1, DMatrix::<Scalar>::identity(2, 2));
    }
}

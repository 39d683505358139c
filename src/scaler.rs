//! Per-stage constraint scaling used to pull inequality proximal centers
//! into a well-conditioned space before cone projection (spec.md §4.3).

use nalgebra::DVector;

use crate::scalar::Scalar;

/// A positive-diagonal scaler with an exact inverse, one per inequality
/// row. `apply`/`apply_inverse` must compose to the identity (spec.md §3
/// invariant, §8 round-trip property).
#[derive(Clone, Debug)]
pub struct CstrProximalScaler {
    diag: DVector<Scalar>,
    inv_diag: DVector<Scalar>,
}

impl CstrProximalScaler {
    /// Builds a scaler from strictly positive diagonal weights.
    pub fn new(diag: DVector<Scalar>) -> Self {
        debug_assert!(diag.iter().all(|&d| d > 0.0), "scaler diagonal must be positive");
        let inv_diag = diag.map(|d| 1.0 / d);
        Self { diag, inv_diag }
    }

    pub fn identity(dim: usize) -> Self {
        Self::new(DVector::from_element(dim, 1.0))
    }

    pub fn apply(&self, v: &DVector<Scalar>) -> DVector<Scalar> {
        v.component_mul(&self.diag)
    }

    pub fn apply_inverse(&self, v: &DVector<Scalar>) -> DVector<Scalar> {
        v.component_mul(&self.inv_diag)
    }

    pub fn dim(&self) -> usize {
        self.diag.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_inverse_is_exact_inverse_of_apply() {
        let scaler = CstrProximalScaler::new(DVector::from_vec(vec![2.0, 0.5, 10.0]));
        let v = DVector::from_vec(vec![1.0, -3.0, 4.0]);
        let round_tripped = scaler.apply_inverse(&scaler.apply(&v));
        for (a, b) in round_tripped.iter().zip(v.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn identity_scaler_is_a_no_op() {
        let scaler = CstrProximalScaler::identity(3);
        let v = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(scaler.apply(&v), v);
        assert_eq!(scaler.apply_inverse(&v), v);
    }
}

//! Recursive linear least-squares with rank-1 LDL^T update.
//!
//! Grounded on the reference `recursiveLinearEstimator.h` implementation,
//! which keeps `R` (an `Eigen::LDLT` factor of `Φ^T Φ`) and `b = Φ^T y`
//! updated sample-by-sample instead of storing the regressor history. This
//! module keeps that same shape — `L`/`D`/`b` as the only persisted state —
//! using the classic Gill–Golub–Murray–Saunders rank-1 update of an
//! `L D L^T` factorisation instead of recomputing a factorisation from
//! scratch on every sample.

use nalgebra::DVector;

use crate::error::RlsError;

/// A small ridge term keeps the factor invertible before enough samples
/// have been seen (an all-zero `Φ^T Φ` has no LDL^T factorisation).
const REGULARIZATION: f64 = 1e-9;

pub struct RecursiveLls {
    n: usize,
    /// Unit lower-triangular factor (diagonal is implicitly 1 and not
    /// stored there; `l[(i,i)]` is unused).
    l: Vec<f64>,
    d: Vec<f64>,
    b: DVector<f64>,
    sample_count: usize,
}

impl RecursiveLls {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            l: vec![0.0; n * n],
            d: vec![REGULARIZATION; n],
            b: DVector::zeros(n),
            sample_count: 0,
        }
    }

    #[inline]
    fn l_at(&self, i: usize, j: usize) -> f64 {
        if i == j {
            1.0
        } else {
            self.l[i * self.n + j]
        }
    }

    #[inline]
    fn set_l(&mut self, i: usize, j: usize, v: f64) {
        self.l[i * self.n + j] = v;
    }

    pub fn domain_size(&self) -> usize {
        self.n
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Discards all accumulated data and resizes to `n`.
    pub fn set_domain_size(&mut self, n: usize) {
        *self = Self::new(n);
    }

    /// Feeds one `(phi, y)` pair: updates the LDL^T factor of `Φ^T Φ` with a
    /// rank-1 contribution from `phi` and accumulates `b += phi * y`. O(n²).
    pub fn feed_sample(&mut self, phi: &DVector<f64>, y: f64) -> Result<(), RlsError> {
        if phi.len() != self.n {
            return Err(RlsError::IllDimensioned {
                expected: self.n,
                got: phi.len(),
            });
        }

        let mut w: Vec<f64> = phi.iter().copied().collect();
        let mut alpha = 1.0_f64;

        for j in 0..self.n {
            let p = w[j];
            let d_old = self.d[j];
            let d_new = d_old + alpha * p * p;
            let beta = p * alpha / d_new;
            let alpha_next = d_old * alpha / d_new;
            self.d[j] = d_new;

            for i in (j + 1)..self.n {
                let l_ij = self.l_at(i, j);
                let w_i_new = w[i] - p * l_ij;
                self.set_l(i, j, l_ij + beta * w_i_new);
                w[i] = w_i_new;
            }
            alpha = alpha_next;
        }

        self.b += phi * y;
        self.sample_count += 1;
        Ok(())
    }

    /// Solves `L D L^T x = b` by forward/backward substitution. O(n²).
    pub fn solve(&self) -> DVector<f64> {
        let n = self.n;

        // Forward: L z = b.
        let mut z = DVector::<f64>::zeros(n);
        for i in 0..n {
            let mut acc = self.b[i];
            for k in 0..i {
                acc -= self.l_at(i, k) * z[k];
            }
            z[i] = acc; // L has unit diagonal.
        }

        // Scale: D u = z.
        let mut u = DVector::<f64>::zeros(n);
        for i in 0..n {
            u[i] = z[i] / self.d[i];
        }

        // Backward: L^T x = u.
        let mut x = DVector::<f64>::zeros(n);
        for i in (0..n).rev() {
            let mut acc = u[i];
            for k in (i + 1)..n {
                acc -= self.l_at(k, i) * x[k];
            }
            x[i] = acc;
        }
        x
    }

    /// Returns `phi^T * x_hat` using the current parameter estimate.
    pub fn predict(&self, phi: &DVector<f64>) -> f64 {
        phi.dot(&self.solve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn rejects_wrong_dimension() {
        let mut est = RecursiveLls::new(3);
        let phi = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            est.feed_sample(&phi, 1.0),
            Err(RlsError::IllDimensioned { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn reconstructs_linear_model_with_full_rank_data() {
        // y = 2*x0 - 3*x1 + 0.5*x2
        let true_x = DVector::from_vec(vec![2.0, -3.0, 0.5]);
        let mut est = RecursiveLls::new(3);

        let samples = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [2.0, 1.0, -1.0],
        ];
        for s in &samples {
            let phi = DVector::from_row_slice(s);
            let y = phi.dot(&true_x);
            est.feed_sample(&phi, y).unwrap();
        }

        for s in &samples {
            let phi = DVector::from_row_slice(s);
            let y = phi.dot(&true_x);
            assert!((est.predict(&phi) - y).abs() < 1e-6);
        }
    }

    #[test]
    fn resizing_discards_accumulated_data() {
        let mut est = RecursiveLls::new(2);
        est.feed_sample(&DVector::from_vec(vec![1.0, 0.0]), 5.0)
            .unwrap();
        est.set_domain_size(4);
        assert_eq!(est.domain_size(), 4);
        assert_eq!(est.sample_count(), 0);
    }
}

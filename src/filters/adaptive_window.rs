use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};

/// Order of the polynomial fitted over the window: linear for velocity,
/// quadratic for acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyOrder {
    Linear,
    Quadratic,
}

impl PolyOrder {
    fn degree(self) -> usize {
        match self {
            PolyOrder::Linear => 1,
            PolyOrder::Quadratic => 2,
        }
    }

    fn min_window(self) -> usize {
        self.degree() + 1
    }
}

/// Vector-valued adaptive-window polynomial differentiator.
///
/// Maintains a FIFO of `(timestamp, sample)` pairs up to `max_window`. Each
/// `feed` fits the configured-order polynomial over the most recent samples,
/// evaluates the per-element residual, and shrinks the window from the
/// oldest end until every element's residual is within `threshold`
/// (growing back up to `max_window` on later calls once the fit is good
/// again). Returns the derivative of the fitted polynomial at the latest
/// timestamp.
pub struct AdaptiveWindowFilter {
    order: PolyOrder,
    dim: usize,
    max_window: usize,
    threshold: f64,
    history: VecDeque<(f64, DVector<f64>)>,
    /// Window length used on the last successful fit; the starting point
    /// for the next attempt's "grow by one" step.
    current_window: usize,
}

impl AdaptiveWindowFilter {
    pub fn new(order: PolyOrder, dim: usize, max_window: usize, threshold: f64) -> Self {
        assert!(max_window >= order.min_window(), "window too small for order");
        Self {
            order,
            dim,
            max_window,
            threshold,
            history: VecDeque::with_capacity(max_window),
            current_window: order.min_window(),
        }
    }

    /// Discards history and resets to the given vector dimension.
    pub fn reset_dim(&mut self, dim: usize) {
        self.dim = dim;
        self.history.clear();
        self.current_window = self.order.min_window();
    }

    /// Sets the maximum window length. Preserves history; eligibility is
    /// re-evaluated on the next `feed`.
    pub fn set_max_window(&mut self, max_window: usize) {
        assert!(max_window >= self.order.min_window());
        self.max_window = max_window;
        while self.history.len() > max_window {
            self.history.pop_front();
        }
        self.current_window = self.current_window.min(max_window);
    }

    /// Sets the residual threshold. Preserves history.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Current admissible window length (always within `[1, max_window]`).
    pub fn window_len(&self) -> usize {
        self.current_window
    }

    /// Feeds one timestamped vector sample and returns the estimated
    /// derivative at `t`.
    pub fn feed(&mut self, t: f64, x: DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.dim, "sample dimension mismatch");

        self.history.push_back((t, x));
        if self.history.len() > self.max_window {
            self.history.pop_front();
        }

        let min_w = self.order.min_window();
        let max_feasible = self.history.len();
        if max_feasible < min_w {
            // Not enough samples yet: report zero derivative rather than
            // fabricate one from an under-determined fit.
            self.current_window = max_feasible.max(1);
            return DVector::zeros(self.dim);
        }

        let mut w = (self.current_window + 1).min(self.max_window).min(max_feasible);

        loop {
            let (coeffs, residual_ok) = self.fit_window(w);
            if residual_ok || w <= min_w {
                self.current_window = w;
                // derivative of sum_k coeffs[k] * dt^k at dt = 0 is coeffs[1]
                return coeffs.row(1).transpose().into_owned();
            }
            w -= 1;
        }
    }

    /// Fits the configured polynomial order over the last `w` samples.
    /// Returns the coefficient matrix ((degree+1) x dim, column j holds the
    /// coefficients for element j) and whether every element's max absolute
    /// residual is within threshold.
    fn fit_window(&self, w: usize) -> (DMatrix<f64>, bool) {
        let degree = self.order.degree();
        let ncoef = degree + 1;
        let t_latest = self.history.back().unwrap().0;

        let start = self.history.len() - w;
        let points: Vec<_> = self.history.iter().skip(start).collect();

        // Vandermonde design matrix shared across all vector elements.
        let mut a = DMatrix::<f64>::zeros(w, ncoef);
        for (row, (t, _)) in points.iter().enumerate() {
            let dt = t - t_latest;
            let mut p = 1.0;
            for c in 0..ncoef {
                a[(row, c)] = p;
                p *= dt;
            }
        }

        let ata = a.transpose() * &a;
        let ata_inv = match ata.clone().try_inverse() {
            Some(inv) => inv,
            None => {
                // Degenerate (e.g. duplicate timestamps): fall back to the
                // identity scaled pseudo-solution of all zero derivatives.
                return (DMatrix::zeros(ncoef, self.dim), w <= self.order.min_window());
            }
        };

        let mut coeffs = DMatrix::<f64>::zeros(ncoef, self.dim);
        let mut residual_ok = true;
        for elem in 0..self.dim {
            let b = DVector::from_iterator(w, points.iter().map(|(_, x)| x[elem]));
            let c = &ata_inv * a.transpose() * &b;
            let fitted = &a * &c;
            let max_resid = (fitted - b).abs().max();
            if max_resid > self.threshold {
                residual_ok = false;
            }
            coeffs.set_column(elem, &c);
        }
        (coeffs, residual_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_never_exceeds_max_or_drops_below_one() {
        let mut f = AdaptiveWindowFilter::new(PolyOrder::Linear, 1, 16, 1.0);
        for i in 0..200 {
            let t = i as f64 * 0.01;
            // A sharp discontinuity forces shrink behaviour partway through.
            let x = if i < 100 { t.sin() } else { (t * 20.0).sin() };
            f.feed(t, DVector::from_element(1, x));
            assert!(f.window_len() >= 1);
            assert!(f.window_len() <= 16);
        }
    }

    #[test]
    fn linear_filter_tracks_cosine_derivative_of_sine() {
        let mut f = AdaptiveWindowFilter::new(PolyOrder::Linear, 1, 16, 1.0);
        let dt = 0.01;
        let mut last = DVector::zeros(1);
        for i in 0..=50 {
            let t = i as f64 * dt;
            last = f.feed(t, DVector::from_element(1, t.sin()));
        }
        assert!((last[0] - 0.5_f64.cos()).abs() < 0.02);
    }

    #[test]
    fn resetting_dimension_discards_history() {
        let mut f = AdaptiveWindowFilter::new(PolyOrder::Linear, 2, 8, 1.0);
        f.feed(0.0, DVector::from_element(2, 1.0));
        f.feed(0.01, DVector::from_element(2, 2.0));
        f.reset_dim(3);
        assert_eq!(f.window_len(), PolyOrder::Linear.min_window());
        let d = f.feed(0.0, DVector::from_element(3, 0.0));
        assert_eq!(d.len(), 3);
    }
}

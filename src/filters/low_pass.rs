use nalgebra::DVector;

/// First-order (one-pole) low-pass filter: `y_k = alpha*y_{k-1} + (1-alpha)*x_k`.
///
/// `alpha` is derived from the cutoff frequency `f_c` and the sample period
/// `T` via the standard analogue-to-discrete one-pole mapping
/// `alpha = tau / (tau + T)` with `tau = 1 / (2*pi*f_c)`.
pub struct LowPassFilter {
    cutoff_hz: f64,
    period_s: f64,
    alpha: f64,
    y: DVector<f64>,
}

fn alpha_from(cutoff_hz: f64, period_s: f64) -> f64 {
    let tau = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
    tau / (tau + period_s)
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, period_s: f64, y0: DVector<f64>) -> Self {
        Self {
            cutoff_hz,
            period_s,
            alpha: alpha_from(cutoff_hz, period_s),
            y: y0,
        }
    }

    pub fn dim(&self) -> usize {
        self.y.len()
    }

    pub fn last_output(&self) -> &DVector<f64> {
        &self.y
    }

    /// Resizes the state dimension, filling the new state with `fill_value`
    /// replicated across every element ("resizing dimension
    /// resets the state to the last input replicated").
    pub fn resize_dim(&mut self, dim: usize, fill_value: f64) {
        self.y = DVector::from_element(dim, fill_value);
    }

    /// Changes the cutoff frequency. Preserves the last output and
    /// recomputes `alpha` for the new cutoff.
    pub fn set_cutoff_hz(&mut self, cutoff_hz: f64) {
        self.cutoff_hz = cutoff_hz;
        self.alpha = alpha_from(self.cutoff_hz, self.period_s);
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn feed(&mut self, x: &DVector<f64>) -> &DVector<f64> {
        assert_eq!(x.len(), self.y.len(), "sample dimension mismatch");
        self.y = &self.y * self.alpha + x * (1.0 - self.alpha);
        &self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_input_is_a_fixed_point() {
        let mut f = LowPassFilter::new(5.0, 0.01, DVector::from_element(3, 2.0));
        for _ in 0..10 {
            f.feed(&DVector::from_element(3, 2.0));
        }
        assert!((f.last_output()[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn step_response_converges_towards_input() {
        let mut f = LowPassFilter::new(5.0, 0.01, DVector::zeros(1));
        let mut last = 0.0;
        for _ in 0..2000 {
            last = f.feed(&DVector::from_element(1, 1.0))[0];
        }
        assert!((last - 1.0).abs() < 1e-3);
    }

    #[test]
    fn resize_replicates_fill_value() {
        let mut f = LowPassFilter::new(5.0, 0.01, DVector::from_element(2, 1.0));
        f.resize_dim(4, 1.0);
        assert_eq!(f.dim(), 4);
        assert!(f.last_output().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn changing_cutoff_preserves_last_output() {
        let mut f = LowPassFilter::new(5.0, 0.01, DVector::zeros(1));
        f.feed(&DVector::from_element(1, 3.0));
        let before = f.last_output().clone();
        f.set_cutoff_hz(10.0);
        assert_eq!(*f.last_output(), before);
    }
}

use num::complex::Complex32;

/// Accumulates squared error vectors against ideal points.
/// The SNR assumes the constellation has unit average energy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorVectorAccumulator {
    total_error: f32,
    total_samples: usize,
}

impl ErrorVectorAccumulator {
    pub fn add(&mut self, received: Complex32, reference: Complex32) {
        self.total_error += (received - reference).norm_sqr();
        self.total_samples += 1;
    }

    pub fn add_error(&mut self, squared_error: f32) {
        self.total_error += squared_error;
        self.total_samples += 1;
    }

    pub fn mean_squared_error(&self) -> f32 {
        if self.total_samples == 0 {
            return 0.0;
        }
        self.total_error / (self.total_samples as f32)
    }

    /// Infinite when no error has been observed.
    pub fn snr_db(&self) -> f32 {
        -10.0 * self.mean_squared_error().log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snr() {
        let mut acc = ErrorVectorAccumulator::default();
        acc.add(Complex32::new(1.1, 0.0), Complex32::new(1.0, 0.0));
        acc.add(Complex32::new(-1.0, 0.1), Complex32::new(-1.0, 0.0));
        assert!((acc.snr_db() - 20.0).abs() < 1e-3);
        assert!(ErrorVectorAccumulator::default().snr_db().is_infinite());
    }
}

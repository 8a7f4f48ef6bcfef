use crate::shared::constants::SMOOTHING_WEIGHT;

/// Exponential moving average of per-frame manipulation probability.
///
/// Formula: `ema[t] = weight * current + (1 - weight) * ema[t-1]`,
/// seeded by the first observation.
#[derive(Clone, Debug)]
pub struct ConfidenceSmoother {
    weight: f64,
    value: Option<f64>,
}

impl ConfidenceSmoother {
    pub fn new(weight: f64) -> Self {
        Self {
            weight: weight.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Non-finite input leaves the average untouched.
    pub fn update(&mut self, confidence: f64) -> f64 {
        if !confidence.is_finite() {
            log::warn!("Ignoring non-finite confidence {confidence}");
            return self.value.unwrap_or(0.0);
        }
        let next = match self.value {
            None => confidence,
            Some(prev) => self.weight * confidence + (1.0 - self.weight) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

impl Default for ConfidenceSmoother {
    fn default() -> Self {
        Self::new(SMOOTHING_WEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_weight() {
        assert_relative_eq!(SMOOTHING_WEIGHT, 0.1);
    }

    #[test]
    fn test_first_observation_seeds() {
        let mut s = ConfidenceSmoother::default();
        assert!(s.value().is_none());
        assert_relative_eq!(s.update(0.42), 0.42);
    }

    #[test]
    fn test_second_observation_applies_ema() {
        let mut s = ConfidenceSmoother::new(0.1);
        s.update(0.2);
        assert_relative_eq!(s.update(0.8), 0.1 * 0.8 + 0.9 * 0.2);
    }

    #[test]
    fn test_constant_stream_stays_constant() {
        let mut s = ConfidenceSmoother::default();
        let mut v = 0.0;
        for _ in 0..50 {
            v = s.update(0.63);
        }
        assert_relative_eq!(v, 0.63, epsilon = 1e-3);
    }

    #[test]
    fn test_converges_from_a_different_seed() {
        let mut s = ConfidenceSmoother::new(0.1);
        s.update(0.5);
        let mut v = 0.0;
        for _ in 0..70 {
            v = s.update(0.6);
        }
        // 0.1 * 0.9^70 < 1e-3
        assert_relative_eq!(v, 0.6, epsilon = 1e-3);
    }

    #[test]
    fn test_reset_reseeds() {
        let mut s = ConfidenceSmoother::default();
        s.update(0.9);
        s.reset();
        assert!(s.value().is_none());
        assert_relative_eq!(s.update(0.1), 0.1);
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut s = ConfidenceSmoother::default();
        assert_relative_eq!(s.update(f64::NAN), 0.0);
        assert!(s.value().is_none());
        s.update(0.9);
        assert_relative_eq!(s.update(f64::INFINITY), 0.9);
        assert_relative_eq!(s.value().unwrap(), 0.9);
    }

    #[test]
    fn test_weight_is_clamped() {
        let mut s = ConfidenceSmoother::new(3.0);
        s.update(0.0);
        assert_relative_eq!(s.update(1.0), 1.0);
    }
}

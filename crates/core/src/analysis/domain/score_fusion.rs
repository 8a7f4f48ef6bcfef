use crate::shared::detection_result::AuxiliarySignals;
use crate::shared::settings::ScoringMode;

pub const MODEL_WEIGHT: f64 = 0.6;
pub const PPG_WEIGHT: f64 = 0.2;
pub const TEMPORAL_WEIGHT: f64 = 0.2;

/// Weighted combination of the classifier and auxiliary signals.
pub fn fuse(signals: &AuxiliarySignals) -> f64 {
    (MODEL_WEIGHT * signals.model_confidence
        + PPG_WEIGHT * signals.pulse_anomaly
        + TEMPORAL_WEIGHT * signals.temporal_inconsistency)
        .clamp(0.0, 1.0)
}

/// The value the threat level is derived from under `mode`.
pub fn decisive_confidence(mode: ScoringMode, signals: &AuxiliarySignals) -> f64 {
    match mode {
        ScoringMode::ModelOnly => signals.model_confidence,
        ScoringMode::Fused => fuse(signals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn signals(model: f64, ppg: f64, temporal: f64) -> AuxiliarySignals {
        AuxiliarySignals {
            model_confidence: model,
            pulse_anomaly: ppg,
            temporal_inconsistency: temporal,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert_relative_eq!(MODEL_WEIGHT + PPG_WEIGHT + TEMPORAL_WEIGHT, 1.0);
    }

    #[test]
    fn test_fuse() {
        assert_relative_eq!(fuse(&signals(0.5, 1.0, 0.0)), 0.5);
        assert_relative_eq!(fuse(&signals(1.0, 1.0, 1.0)), 1.0);
    }

    #[test]
    fn test_model_only_ignores_auxiliary_signals() {
        let s = signals(0.25, 1.0, 1.0);
        assert_relative_eq!(decisive_confidence(ScoringMode::ModelOnly, &s), 0.25);
        assert_relative_eq!(decisive_confidence(ScoringMode::Fused, &s), 0.55);
    }
}

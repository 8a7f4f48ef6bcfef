use serde::{Deserialize, Serialize};

use crate::shared::constants::{FAKE_THRESHOLD, SUSPICIOUS_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Real,
    Suspicious,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Warning,
    Danger,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatLevel::Safe => write!(f, "safe"),
            ThreatLevel::Warning => write!(f, "warning"),
            ThreatLevel::Danger => write!(f, "danger"),
        }
    }
}

/// Maps a manipulation probability to its fixed classification bands.
///
/// `< 0.3` real/safe, `[0.3, 0.7)` suspicious/warning, `>= 0.7` fake/danger.
/// Lower bounds are inclusive. NaN is treated as real/safe.
pub fn classify(confidence: f64) -> (Classification, ThreatLevel) {
    if confidence >= FAKE_THRESHOLD {
        (Classification::Fake, ThreatLevel::Danger)
    } else if confidence >= SUSPICIOUS_THRESHOLD {
        (Classification::Suspicious, ThreatLevel::Warning)
    } else {
        (Classification::Real, ThreatLevel::Safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, Classification::Real, ThreatLevel::Safe)]
    #[case(0.29, Classification::Real, ThreatLevel::Safe)]
    #[case(0.30, Classification::Suspicious, ThreatLevel::Warning)]
    #[case(0.69, Classification::Suspicious, ThreatLevel::Warning)]
    #[case(0.70, Classification::Fake, ThreatLevel::Danger)]
    #[case(1.0, Classification::Fake, ThreatLevel::Danger)]
    fn test_classification_boundaries(
        #[case] confidence: f64,
        #[case] class: Classification,
        #[case] level: ThreatLevel,
    ) {
        assert_eq!(classify(confidence), (class, level));
    }

    #[test]
    fn test_nan_is_safe() {
        assert_eq!(classify(f64::NAN).1, ThreatLevel::Safe);
    }

    #[test]
    fn test_threat_levels_are_ordered() {
        assert!(ThreatLevel::Safe < ThreatLevel::Warning);
        assert!(ThreatLevel::Warning < ThreatLevel::Danger);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ThreatLevel::Danger).unwrap(), "\"danger\"");
        assert_eq!(
            serde_json::to_string(&Classification::Suspicious).unwrap(),
            "\"suspicious\""
        );
    }
}

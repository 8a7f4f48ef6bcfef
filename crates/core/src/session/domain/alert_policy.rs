use serde::Serialize;

use crate::inference::domain::classification::ThreatLevel;
use crate::shared::detection_result::DetectionResult;
use crate::shared::settings::Settings;

/// A user-visible alert for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub level: ThreatLevel,
    pub frame_number: u64,
    pub confidence: f64,
    pub smoothed_confidence: f64,
}

/// Decides which frames raise an alert. Rate limiting is left to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertPolicy {
    pub danger_enabled: bool,
    pub warning_enabled: bool,
}

impl AlertPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            danger_enabled: settings.danger_notifications_enabled,
            warning_enabled: settings.warning_notifications_enabled,
        }
    }

    pub fn evaluate(&self, result: &DetectionResult, smoothed_confidence: f64) -> Option<Alert> {
        let enabled = match result.threat_level {
            ThreatLevel::Danger => self.danger_enabled,
            ThreatLevel::Warning => self.warning_enabled,
            ThreatLevel::Safe => false,
        };
        enabled.then(|| Alert {
            level: result.threat_level,
            frame_number: result.frame_number,
            confidence: result.raw_confidence,
            smoothed_confidence,
        })
    }
}

/// Presentation-layer collaborator that shows alerts.
pub trait AlertSink: Send {
    fn alert(&mut self, alert: &Alert);
}

/// Writes alerts to the log.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&mut self, alert: &Alert) {
        log::warn!(
            "{} alert at frame {}: confidence {:.1}% (smoothed {:.1}%)",
            alert.level,
            alert.frame_number,
            alert.confidence * 100.0,
            alert.smoothed_confidence * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.9, true, false, Some(ThreatLevel::Danger))]
    #[case(0.9, false, true, None)]
    #[case(0.5, true, false, None)]
    #[case(0.5, false, true, Some(ThreatLevel::Warning))]
    #[case(0.1, true, true, None)]
    fn test_alert_requires_enabled_level(
        #[case] confidence: f64,
        #[case] danger: bool,
        #[case] warning: bool,
        #[case] expected: Option<ThreatLevel>,
    ) {
        let policy = AlertPolicy {
            danger_enabled: danger,
            warning_enabled: warning,
        };
        let result = DetectionResult::scored(7, confidence, 1, 1.0, None);
        let alert = policy.evaluate(&result, 0.4);
        assert_eq!(alert.as_ref().map(|a| a.level), expected);
        if let Some(a) = alert {
            assert_eq!(a.frame_number, 7);
        }
    }

    #[test]
    fn test_no_face_never_alerts() {
        let policy = AlertPolicy {
            danger_enabled: true,
            warning_enabled: true,
        };
        assert!(policy
            .evaluate(&DetectionResult::no_face(1, 0, 1.0), 0.9)
            .is_none());
    }

    #[test]
    fn test_defaults_alert_on_danger_only() {
        let policy = AlertPolicy::from_settings(&Settings::default());
        assert!(policy.danger_enabled);
        assert!(!policy.warning_enabled);
    }
}

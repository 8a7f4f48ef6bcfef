use crate::inference::domain::classification::ThreatLevel;
use crate::messaging::domain::messages::{OverlayMessage, OverlayStatus};
use crate::shared::detection_result::DetectionResult;

/// What the overlay currently shows. Derived entirely from coordinator messages.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayView {
    pub status: OverlayStatus,
    pub latest: Option<DetectionResult>,
}

impl Default for OverlayView {
    fn default() -> Self {
        Self {
            status: OverlayStatus::Stopped,
            latest: None,
        }
    }
}

impl OverlayView {
    /// Applies one message. Returns `true` if a redraw is needed.
    pub fn apply(&mut self, message: &OverlayMessage) -> bool {
        let before = self.clone();
        match message {
            OverlayMessage::StatusChanged(status) => {
                self.status = *status;
                if *status == OverlayStatus::Stopped {
                    self.latest = None;
                }
            }
            OverlayMessage::Result(result) => {
                // Late results after a stop are not drawn.
                if self.status == OverlayStatus::Active {
                    self.latest = Some(result.clone());
                }
            }
            OverlayMessage::Clear => {
                self.status = OverlayStatus::Stopped;
                self.latest = None;
            }
            OverlayMessage::Shutdown => {}
        }
        *self != before
    }

    /// Short badge text, e.g. `LIVE · 12% · safe`.
    pub fn badge(&self) -> String {
        match (self.status, &self.latest) {
            (OverlayStatus::Stopped, _) => String::new(),
            (OverlayStatus::Active, None) => "LIVE · waiting".to_string(),
            (OverlayStatus::Active, Some(r)) if !r.face_detected => "LIVE · no face".to_string(),
            (OverlayStatus::Active, Some(r)) => {
                format!("LIVE · {:.0}% · {}", r.raw_confidence * 100.0, r.threat_level)
            }
        }
    }

    pub fn threat_level(&self) -> ThreatLevel {
        self.latest
            .as_ref()
            .map_or(ThreatLevel::Safe, |r| r.threat_level)
    }
}

/// Draws the view somewhere (page chrome, terminal, test recorder).
pub trait OverlayRenderer: Send {
    fn render(&mut self, view: &OverlayView);
}

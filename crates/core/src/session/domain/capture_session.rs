use serde::Serialize;

use crate::messaging::domain::messages::Generation;
use crate::session::domain::confidence_smoother::ConfidenceSmoother;
use crate::session::domain::session_error::SessionError;
use crate::session::domain::target::{TargetDescriptor, TargetId};
use crate::shared::detection_result::DetectionResult;
use crate::shared::region::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Read-only copy of the session handed to control surfaces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub target: Option<TargetId>,
    pub started_at_ms: Option<u64>,
    pub frames_processed: u64,
    pub smoothed_confidence: Option<f64>,
    pub last_known_region: Option<Region>,
    pub latest_result: Option<DetectionResult>,
}

/// The authoritative session record. Only the coordinator holds one.
///
/// Every transition is a method that checks the current state and returns
/// `InvalidState` instead of silently mutating from the wrong state.
#[derive(Debug)]
pub struct CaptureSession {
    state: SessionState,
    target: Option<TargetDescriptor>,
    generation: Generation,
    started_at_ms: Option<u64>,
    frames_processed: u64,
    smoother: ConfidenceSmoother,
    last_known_region: Option<Region>,
    /// Region the pipeline was last told about; the tolerance check runs against it.
    forwarded_region: Option<Region>,
    latest_result: Option<DetectionResult>,
}

impl CaptureSession {
    pub fn new(smoother: ConfidenceSmoother) -> Self {
        Self {
            state: SessionState::Idle,
            target: None,
            generation: 0,
            started_at_ms: None,
            frames_processed: 0,
            smoother,
            last_known_region: None,
            forwarded_region: None,
            latest_result: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.target.as_ref()
    }

    /// Identifies the current Starting→Idle span.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn smoothed_confidence(&self) -> Option<f64> {
        self.smoother.value()
    }

    pub fn last_known_region(&self) -> Option<Region> {
        self.last_known_region
    }

    /// `Idle → Starting`. Resets counters and opens a new generation.
    pub fn begin_start(
        &mut self,
        target: TargetDescriptor,
        region: Option<Region>,
    ) -> Result<Generation, SessionError> {
        self.expect_state("start", &[SessionState::Idle])?;
        self.generation += 1;
        self.state = SessionState::Starting;
        self.target = Some(target);
        self.started_at_ms = None;
        self.frames_processed = 0;
        self.smoother.reset();
        self.last_known_region = region;
        self.forwarded_region = region;
        self.latest_result = None;
        Ok(self.generation)
    }

    /// `Starting → Active`.
    pub fn activate(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.expect_state("pipelineReady", &[SessionState::Starting])?;
        self.state = SessionState::Active;
        self.started_at_ms = Some(now_ms);
        self.frames_processed = 0;
        Ok(())
    }

    /// `Active → Active` on a result. Returns the smoothed confidence.
    ///
    /// No-face frames count as processed but do not feed the moving average.
    pub fn record_result(&mut self, result: DetectionResult) -> Result<f64, SessionError> {
        self.expect_state("result", &[SessionState::Active])?;
        self.frames_processed += 1;
        let smoothed = if result.face_detected {
            self.smoother.update(result.raw_confidence)
        } else {
            self.smoother.value().unwrap_or(0.0)
        };
        self.latest_result = Some(result);
        Ok(smoothed)
    }

    /// Stores `region` and reports whether it differs enough from the last
    /// forwarded one to be forwarded again.
    pub fn update_region(&mut self, region: Option<Region>) -> bool {
        self.last_known_region = region;
        let changed = match (region.as_ref(), self.forwarded_region.as_ref()) {
            (Some(new), previous) => new.is_change_from(previous),
            (None, previous) => previous.is_some(),
        };
        if changed {
            self.forwarded_region = region;
        }
        changed
    }

    /// `Starting | Active → Stopping`.
    pub fn begin_stop(&mut self) -> Result<(), SessionError> {
        self.expect_state("stop", &[SessionState::Starting, SessionState::Active])?;
        self.state = SessionState::Stopping;
        Ok(())
    }

    /// `* → Idle`. Clears everything tied to the finished generation.
    pub fn finish_stop(&mut self) {
        self.state = SessionState::Idle;
        self.target = None;
        self.started_at_ms = None;
        self.frames_processed = 0;
        self.smoother.reset();
        self.last_known_region = None;
        self.forwarded_region = None;
        self.latest_result = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            target: self.target.as_ref().map(|t| t.id.clone()),
            started_at_ms: self.started_at_ms,
            frames_processed: self.frames_processed,
            smoothed_confidence: self.smoother.value(),
            last_known_region: self.last_known_region,
            latest_result: self.latest_result.clone(),
        }
    }

    fn expect_state(
        &self,
        request: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                request,
                state: self.state,
            })
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(ConfidenceSmoother::default())
    }
}

//! Closed message vocabularies, one per channel.
//!
//! Every context matches its inbox exhaustively. Messages arriving from
//! outside the process boundary that cannot be mapped to a known variant
//! become [`CoordinatorEvent::Unknown`] (see
//! [`decode_host_message`](crate::messaging::domain::host_message::decode_host_message))
//! and take the explicit fallback path.

use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::capture::domain::media_stream::CaptureError;
use crate::messaging::domain::channel::Ack;
use crate::session::domain::alert_policy::Alert;
use crate::session::domain::capture_session::{SessionSnapshot, SessionState};
use crate::session::domain::session_error::SessionError;
use crate::session::domain::target::{TargetDescriptor, TargetId};
use crate::shared::detection_result::DetectionResult;
use crate::shared::region::Region;
use crate::shared::settings::{QualityTier, ScoringMode, Settings};

/// Counter identifying one Starting→Idle span. Pipeline messages carry the
/// generation they were produced under so stale ones can be discarded.
pub type Generation = u64;

/// Opaque reference to a media stream. Only the pipeline can resolve it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sampling parameters handed to the pipeline with each stream.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingConfig {
    pub interval: Duration,
    pub sampling_rate_hz: f64,
    pub quality_tier: QualityTier,
    pub scoring_mode: ScoringMode,
}

impl SamplingConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.sampling_interval(),
            sampling_rate_hz: settings.effective_sampling_rate(),
            quality_tier: settings.quality_tier,
            scoring_mode: settings.scoring_mode,
        }
    }
}

/// Control surface → Coordinator.
pub enum ControlRequest {
    Start {
        target: TargetDescriptor,
        reply: Ack<Result<SessionSnapshot, SessionError>>,
    },
    /// Always succeeds; replies with the post-stop snapshot.
    Stop { reply: Ack<SessionSnapshot> },
    GetStatus { reply: Ack<SessionSnapshot> },
    Subscribe { listener: Sender<ControlNotice> },
}

/// Coordinator → control surfaces (best-effort fan-out).
#[derive(Clone, Debug, PartialEq)]
pub enum ControlNotice {
    StatusChanged(SessionState),
    Result {
        result: DetectionResult,
        smoothed_confidence: f64,
    },
    Alert(Alert),
    ModelReady { backend: String },
    Error(SessionError),
}

/// Frame Pipeline → Coordinator, wrapped in [`CoordinatorEvent::Pipeline`].
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// Stream acquired and sampling started.
    Ready,
    Result(DetectionResult),
    ModelReady { backend: String },
    ModelError { message: String },
    CaptureError(CaptureError),
    /// The isolated context terminated unexpectedly.
    ContextLost,
}

/// Everything the Coordinator's inbox can carry.
pub enum CoordinatorEvent {
    Control(ControlRequest),
    RegionFound(Region),
    RegionLost,
    Pipeline {
        generation: Generation,
        event: PipelineEvent,
    },
    /// The target surface went away (navigation, tab closed).
    TargetClosed(TargetId),
    Unknown { kind: String },
    Shutdown,
}

impl CoordinatorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorEvent::Control(ControlRequest::Start { .. }) => "start",
            CoordinatorEvent::Control(ControlRequest::Stop { .. }) => "stop",
            CoordinatorEvent::Control(ControlRequest::GetStatus { .. }) => "getStatus",
            CoordinatorEvent::Control(ControlRequest::Subscribe { .. }) => "subscribe",
            CoordinatorEvent::RegionFound(_) => "regionFound",
            CoordinatorEvent::RegionLost => "regionLost",
            CoordinatorEvent::Pipeline { event, .. } => match event {
                PipelineEvent::Ready => "pipelineReady",
                PipelineEvent::Result(_) => "result",
                PipelineEvent::ModelReady { .. } => "modelReady",
                PipelineEvent::ModelError { .. } => "modelError",
                PipelineEvent::CaptureError(_) => "captureError",
                PipelineEvent::ContextLost => "contextLost",
            },
            CoordinatorEvent::TargetClosed(_) => "targetClosed",
            CoordinatorEvent::Unknown { .. } => "unknown",
            CoordinatorEvent::Shutdown => "shutdown",
        }
    }
}

/// Coordinator → Frame Pipeline.
pub enum PipelineCommand {
    BeginStream {
        generation: Generation,
        stream_id: StreamId,
        config: SamplingConfig,
        region: Option<Region>,
    },
    EndStream { reply: Ack<()> },
    /// `None` falls back to whole-frame sampling.
    UpdateRegion(Option<Region>),
    Shutdown,
}

/// Control surface / Coordinator / host document → Region Tracker.
pub enum TrackerCommand {
    /// Fresh scan; replies with the current region, if any.
    CheckRegion { reply: Ack<Option<Region>> },
    /// The host document mutated.
    Mutation,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStatus {
    Active,
    Stopped,
}

/// Coordinator → Overlay.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayMessage {
    StatusChanged(OverlayStatus),
    Result(DetectionResult),
    Clear,
    Shutdown,
}

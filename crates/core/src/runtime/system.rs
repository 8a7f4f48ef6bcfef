//! Launches the coordinator and region tracker contexts and connects them.
//!
//! The processing context and the overlay are not started here; the
//! coordinator provisions and injects them on demand.

use crate::capture::domain::media_stream::StreamProvider;
use crate::capture::domain::pipeline_logger::{NullPipelineLogger, PipelineLogger, StdoutPipelineLogger};
use crate::capture::infrastructure::ffmpeg_stream::FfmpegStreamProvider;
use crate::inference::domain::models::ModelLoader;
use crate::inference::infrastructure::onnx_model_loader::OnnxModelLoader;
use crate::messaging::domain::channel::Outbox;
use crate::overlay::domain::overlay_view::OverlayRenderer;
use crate::overlay::infrastructure::overlay_worker::{LogOverlayRenderer, ThreadOverlayInjector};
use crate::session::domain::alert_policy::LogAlertSink;
use crate::session::domain::target::MeetingHostValidator;
use crate::session::infrastructure::coordinator::{Coordinator, CoordinatorConfig, CoordinatorPorts};
use crate::session::infrastructure::coordinator_handle::{self, CoordinatorHandle};
use crate::session::infrastructure::thread_provisioner::ThreadProvisioner;
use crate::shared::model_resolver::ModelLocations;
use crate::tracking::domain::surface_source::SurfaceSource;
use crate::tracking::infrastructure::tracker_worker::{self, TrackerConfig, TrackerHandle};

pub struct System {
    coordinator: CoordinatorHandle,
    tracker: TrackerHandle,
}

impl System {
    pub fn launch(
        config: CoordinatorConfig,
        ports: CoordinatorPorts,
        surfaces: Box<dyn SurfaceSource>,
        tracker: TrackerConfig,
    ) -> std::io::Result<Self> {
        let (events, inbox) = Outbox::channel("coordinator");
        let tracker = tracker_worker::spawn(surfaces, events.clone(), tracker)?;
        let coordinator = Coordinator::new(config, ports, events.clone());
        let coordinator = coordinator_handle::spawn(coordinator, events, inbox)?;
        log::info!("Contexts launched");
        Ok(Self {
            coordinator,
            tracker,
        })
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    /// Stops the tracker first so no region report races the coordinator's exit.
    pub fn shutdown(self) {
        self.tracker.shutdown();
        self.coordinator.shutdown();
    }
}

/// Ports for a session over local media: ffmpeg streams, ONNX models, a
/// logging overlay and logged alerts.
pub fn local_ports(locations: ModelLocations, realtime: bool, diagnostics: bool) -> CoordinatorPorts {
    let provisioner = ThreadProvisioner::new(
        Box::new(move || Box::new(FfmpegStreamProvider::new(realtime)) as Box<dyn StreamProvider>),
        Box::new(move || Box::new(OnnxModelLoader::new(locations.clone())) as Box<dyn ModelLoader>),
        Box::new(move || {
            if diagnostics {
                Box::new(StdoutPipelineLogger::default()) as Box<dyn PipelineLogger>
            } else {
                Box::new(NullPipelineLogger)
            }
        }),
    );
    CoordinatorPorts {
        validator: Box::new(MeetingHostValidator::default().allowing_local_media()),
        provisioner: Box::new(provisioner),
        overlay: Box::new(ThreadOverlayInjector::new(Box::new(|| {
            Box::new(LogOverlayRenderer::default()) as Box<dyn OverlayRenderer>
        }))),
        alerts: Box::new(LogAlertSink),
    }
}

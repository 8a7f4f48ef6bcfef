//! The session coordinator context: sole owner of the [`CaptureSession`].

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::capture::domain::media_stream::CaptureError;
use crate::messaging::domain::channel::{Ack, ChannelError, Outbox};
use crate::messaging::domain::messages::{
    ControlNotice, ControlRequest, CoordinatorEvent, Generation, OverlayMessage, OverlayStatus,
    PipelineCommand, PipelineEvent, SamplingConfig,
};
use crate::messaging::domain::retry_policy::RetryPolicy;
use crate::overlay::infrastructure::overlay_worker::OverlayInjector;
use crate::session::domain::alert_policy::{AlertPolicy, AlertSink};
use crate::session::domain::capture_session::{CaptureSession, SessionSnapshot, SessionState};
use crate::session::domain::context_provisioner::ContextProvisioner;
use crate::session::domain::session_error::SessionError;
use crate::session::domain::target::{TargetDescriptor, TargetId, TargetValidator};
use crate::shared::constants::{ACK_TIMEOUT, BROADCAST_RETRY_DELAY, PROVISION_RETRY_MS, START_TIMEOUT};
use crate::shared::detection_result::{now_ms, DetectionResult};
use crate::shared::region::Region;
use crate::shared::settings::Settings;
use crate::shared::timer::TimerQueue;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub settings: Settings,
    pub start_timeout: Duration,
    pub ack_timeout: Duration,
    pub broadcast_retry: Duration,
    pub provision_retry: RetryPolicy,
}

impl CoordinatorConfig {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            start_timeout: START_TIMEOUT,
            ack_timeout: ACK_TIMEOUT,
            broadcast_retry: BROADCAST_RETRY_DELAY,
            provision_retry: RetryPolicy::from_millis(PROVISION_RETRY_MS),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_settings(Settings::default())
    }
}

/// Collaborators the coordinator drives. All of them are ports so tests can
/// substitute stubs.
pub struct CoordinatorPorts {
    pub validator: Box<dyn TargetValidator>,
    pub provisioner: Box<dyn ContextProvisioner>,
    pub overlay: Box<dyn OverlayInjector>,
    pub alerts: Box<dyn AlertSink>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoordinatorTimer {
    StartTimeout(Generation),
    BroadcastRetry(Generation),
}

pub struct Coordinator {
    session: CaptureSession,
    config: CoordinatorConfig,
    sampling: SamplingConfig,
    alert_policy: AlertPolicy,
    ports: CoordinatorPorts,
    /// Handed to every provisioned context so it can report back.
    events: Outbox<CoordinatorEvent>,
    pipeline: Option<Outbox<PipelineCommand>>,
    overlay: Option<Outbox<OverlayMessage>>,
    listeners: Vec<Sender<ControlNotice>>,
    /// Latest tracker report, kept across sessions so a start can seed the
    /// pipeline with it.
    page_region: Option<Region>,
    pending_start: Option<Ack<Result<SessionSnapshot, SessionError>>>,
    model_error: Option<String>,
    timers: TimerQueue<CoordinatorTimer>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        ports: CoordinatorPorts,
        events: Outbox<CoordinatorEvent>,
    ) -> Self {
        Self {
            session: CaptureSession::default(),
            sampling: SamplingConfig::from_settings(&config.settings),
            alert_policy: AlertPolicy::from_settings(&config.settings),
            config,
            ports,
            events,
            pipeline: None,
            overlay: None,
            listeners: Vec::new(),
            page_region: None,
            pending_start: None,
            model_error: None,
            timers: TimerQueue::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Returns `false` once the coordinator should exit.
    pub fn handle(&mut self, event: CoordinatorEvent, now: Instant) -> bool {
        log::trace!("Coordinator <- {}", event.kind());
        match event {
            CoordinatorEvent::Control(request) => self.handle_control(request, now),
            CoordinatorEvent::RegionFound(region) => self.handle_region(Some(region)),
            CoordinatorEvent::RegionLost => self.handle_region(None),
            CoordinatorEvent::Pipeline { generation, event } => {
                self.handle_pipeline(generation, event, now)
            }
            CoordinatorEvent::TargetClosed(id) => self.handle_target_closed(&id),
            CoordinatorEvent::Unknown { kind } => {
                log::warn!("Ignoring unknown message {kind:?}");
            }
            CoordinatorEvent::Shutdown => {
                self.stop();
                if let Some(pipeline) = self.pipeline.take() {
                    pipeline.notify(PipelineCommand::Shutdown);
                }
                if let Some(overlay) = self.overlay.take() {
                    overlay.notify(OverlayMessage::Shutdown);
                }
                return false;
            }
        }
        true
    }

    pub fn fire_due(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                CoordinatorTimer::StartTimeout(generation) => {
                    if self.is_current(generation, SessionState::Starting) {
                        let error = SessionError::ContextUnavailable(format!(
                            "processing context not ready after {:?}",
                            self.config.start_timeout
                        ));
                        self.fail_session(error);
                    }
                }
                CoordinatorTimer::BroadcastRetry(generation) => {
                    if self.is_current(generation, SessionState::Active) {
                        self.retry_broadcast();
                    }
                }
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest, now: Instant) {
        match request {
            ControlRequest::Start { target, reply } => self.start(target, reply, now),
            ControlRequest::Stop { reply } => reply.reply(self.stop()),
            ControlRequest::GetStatus { reply } => reply.reply(self.session.snapshot()),
            ControlRequest::Subscribe { listener } => {
                if listener
                    .send(ControlNotice::StatusChanged(self.session.state()))
                    .is_ok()
                {
                    self.listeners.push(listener);
                }
            }
        }
    }

    fn start(
        &mut self,
        target: TargetDescriptor,
        reply: Ack<Result<SessionSnapshot, SessionError>>,
        now: Instant,
    ) {
        let same_target = self.session.target().map(|t| &t.id) == Some(&target.id);
        match self.session.state() {
            SessionState::Idle => {}
            SessionState::Starting | SessionState::Active if same_target => {
                log::debug!("Start on {} is already in progress", target.id);
                reply.reply(Ok(self.session.snapshot()));
                return;
            }
            state if !same_target => {
                let running = self
                    .session
                    .target()
                    .map(|t| t.id.to_string())
                    .unwrap_or_default();
                log::info!("Rejecting start on {} while {state:?} on {running}", target.id);
                reply.reply(Err(SessionError::Busy(running)));
                return;
            }
            state => {
                reply.reply(Err(SessionError::InvalidState {
                    request: "start",
                    state,
                }));
                return;
            }
        }

        if let Err(e) = self.ports.validator.validate(&target) {
            log::info!("Start rejected: {e}");
            reply.reply(Err(e));
            return;
        }

        let stream_id = target.stream_id.clone();
        let target_id = target.id.clone();
        let generation = match self.session.begin_start(target, self.page_region) {
            Ok(generation) => generation,
            Err(e) => {
                reply.reply(Err(e));
                return;
            }
        };
        log::info!("Starting session on {target_id} (generation {generation})");
        self.notify_listeners(ControlNotice::StatusChanged(SessionState::Starting));

        let policy = self.config.provision_retry.clone();
        let begun = policy.run("Processing context provisioning", |_| {
            let pipeline = self.ensure_pipeline()?;
            let sent = pipeline.send(PipelineCommand::BeginStream {
                generation,
                stream_id: stream_id.clone(),
                config: self.sampling.clone(),
                region: self.page_region,
            });
            if sent.is_err() {
                self.pipeline = None;
            }
            sent.map_err(|e| e.to_string())
        });
        if let Err(e) = begun {
            let error = SessionError::ContextUnavailable(e);
            self.notify_listeners(ControlNotice::Error(error.clone()));
            self.teardown();
            reply.reply(Err(error));
            return;
        }

        self.ensure_overlay();
        self.pending_start = Some(reply);
        self.timers.schedule(
            now,
            self.config.start_timeout,
            CoordinatorTimer::StartTimeout(generation),
        );
    }

    /// Always succeeds. Returns the post-stop snapshot.
    fn stop(&mut self) -> SessionSnapshot {
        match self.session.state() {
            SessionState::Idle | SessionState::Stopping => return self.session.snapshot(),
            SessionState::Starting | SessionState::Active => {}
        }
        if let Err(e) = self.session.begin_stop() {
            log::warn!("{e}");
        }
        log::info!(
            "Stopping session after {} frames",
            self.session.frames_processed()
        );
        if let Some(pending) = self.pending_start.take() {
            pending.reply(Err(SessionError::InvalidState {
                request: "start",
                state: SessionState::Stopping,
            }));
        }
        self.teardown();
        self.session.snapshot()
    }

    /// Idempotent cleanup back to Idle. Every step tolerates failure.
    fn teardown(&mut self) {
        self.timers.cancel_all();
        if let Some(pipeline) = self.pipeline.as_ref() {
            match pipeline.request(|reply| PipelineCommand::EndStream { reply }, self.config.ack_timeout) {
                Ok(()) => {}
                Err(ChannelError::Unreachable { .. }) => {
                    log::warn!("Processing context gone during stop");
                    self.pipeline = None;
                }
                Err(e) => log::warn!("End of stream not acknowledged: {e}"),
            }
        }
        if let Some(overlay) = self.overlay.as_ref() {
            overlay.notify(OverlayMessage::StatusChanged(OverlayStatus::Stopped));
            overlay.notify(OverlayMessage::Clear);
        }
        self.session.finish_stop();
        self.notify_listeners(ControlNotice::StatusChanged(SessionState::Idle));
    }

    /// Fatal transition: surfaces `error` and forces the session back to Idle.
    fn fail_session(&mut self, error: SessionError) {
        log::warn!("Session failed: {error}");
        if let Some(pending) = self.pending_start.take() {
            pending.reply(Err(error.clone()));
        }
        self.notify_listeners(ControlNotice::Error(error));
        if matches!(
            self.session.state(),
            SessionState::Starting | SessionState::Active
        ) {
            let _ = self.session.begin_stop();
            self.teardown();
        }
    }

    fn handle_pipeline(&mut self, generation: Generation, event: PipelineEvent, now: Instant) {
        match event {
            PipelineEvent::ModelReady { backend } => {
                log::info!("Classifier ready ({backend})");
                self.model_error = None;
                self.notify_listeners(ControlNotice::ModelReady { backend });
                return;
            }
            PipelineEvent::ModelError { message } => {
                if self.model_error.is_none() {
                    log::warn!("Classifier unavailable, frames will report no face: {message}");
                    self.notify_listeners(ControlNotice::Error(SessionError::ModelInitFailed(
                        message.clone(),
                    )));
                }
                self.model_error = Some(message);
                return;
            }
            PipelineEvent::ContextLost => {
                self.pipeline = None;
                if self.session.state() != SessionState::Idle {
                    self.fail_session(SessionError::ContextUnavailable(
                        "processing context terminated".into(),
                    ));
                }
                return;
            }
            _ => {}
        }

        if generation != self.session.generation() || self.session.state() == SessionState::Idle {
            log::debug!("Discarding stale pipeline message from generation {generation}");
            return;
        }
        match event {
            PipelineEvent::Ready => self.activate(now),
            PipelineEvent::Result(result) => self.record(result),
            PipelineEvent::CaptureError(e) => self.capture_failed(e),
            PipelineEvent::ModelReady { .. }
            | PipelineEvent::ModelError { .. }
            | PipelineEvent::ContextLost => {}
        }
    }

    fn activate(&mut self, now: Instant) {
        if let Err(e) = self.session.activate(now_ms()) {
            log::debug!("Ignoring pipeline ready: {e}");
            return;
        }
        let generation = self.session.generation();
        self.timers
            .cancel_where(|t| *t == CoordinatorTimer::StartTimeout(generation));
        log::info!("Session active");
        if let Some(pending) = self.pending_start.take() {
            pending.reply(Ok(self.session.snapshot()));
        }
        self.notify_listeners(ControlNotice::StatusChanged(SessionState::Active));
        if !self.broadcast_active() {
            self.timers.schedule(
                now,
                self.config.broadcast_retry,
                CoordinatorTimer::BroadcastRetry(generation),
            );
        }
    }

    fn broadcast_active(&mut self) -> bool {
        let Some(overlay) = self.overlay.as_ref() else {
            return false;
        };
        match overlay.send(OverlayMessage::StatusChanged(OverlayStatus::Active)) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Session-active broadcast failed: {e}");
                self.overlay = None;
                false
            }
        }
    }

    fn retry_broadcast(&mut self) {
        if self.broadcast_active() {
            return;
        }
        log::info!("Overlay unreachable; re-injecting");
        self.inject_overlay();
        if !self.broadcast_active() {
            log::warn!("Overlay did not accept the session-active broadcast");
        }
    }

    fn record(&mut self, result: DetectionResult) {
        let smoothed = match self.session.record_result(result.clone()) {
            Ok(smoothed) => smoothed,
            Err(e) => {
                log::debug!("Dropping result: {e}");
                return;
            }
        };
        log::debug!(
            "Frame {}: {} ({:.1}%, smoothed {:.1}%)",
            result.frame_number,
            result.threat_level,
            result.raw_confidence * 100.0,
            smoothed * 100.0
        );
        if let Some(alert) = self.alert_policy.evaluate(&result, smoothed) {
            self.ports.alerts.alert(&alert);
            self.notify_listeners(ControlNotice::Alert(alert));
        }
        if let Some(overlay) = self.overlay.as_ref() {
            overlay.notify(OverlayMessage::Result(result.clone()));
        }
        self.notify_listeners(ControlNotice::Result {
            result,
            smoothed_confidence: smoothed,
        });
    }

    fn capture_failed(&mut self, error: CaptureError) {
        self.fail_session(SessionError::StreamAcquisitionFailed(error.to_string()));
    }

    fn handle_region(&mut self, region: Option<Region>) {
        self.page_region = region;
        if !matches!(
            self.session.state(),
            SessionState::Starting | SessionState::Active
        ) {
            return;
        }
        if !self.session.update_region(region) {
            return;
        }
        if let Some(pipeline) = self.pipeline.as_ref() {
            if let Err(e) = pipeline.send(PipelineCommand::UpdateRegion(region)) {
                log::warn!("Region update not delivered: {e}");
            }
        }
    }

    fn handle_target_closed(&mut self, id: &TargetId) {
        let ours = self.session.target().map(|t| &t.id) == Some(id);
        if ours && self.session.state() != SessionState::Idle {
            log::info!("Target {id} closed; stopping session");
            self.stop();
        }
    }

    fn ensure_pipeline(&mut self) -> Result<Outbox<PipelineCommand>, String> {
        if let Some(pipeline) = self.pipeline.as_ref() {
            return Ok(pipeline.clone());
        }
        let pipeline = self
            .ports
            .provisioner
            .provision(self.events.clone())
            .map_err(|e| e.to_string())?;
        log::debug!("Processing context provisioned");
        self.pipeline = Some(pipeline.clone());
        Ok(pipeline)
    }

    fn ensure_overlay(&mut self) {
        if self.overlay.is_none() {
            self.inject_overlay();
        }
    }

    fn inject_overlay(&mut self) {
        match self.ports.overlay.inject() {
            Ok(overlay) => self.overlay = Some(overlay),
            Err(e) => log::warn!("Overlay injection failed: {e}"),
        }
    }

    fn is_current(&self, generation: Generation, state: SessionState) -> bool {
        self.session.generation() == generation && self.session.state() == state
    }

    /// Best-effort fan-out; listeners that hung up are pruned.
    fn notify_listeners(&mut self, notice: ControlNotice) {
        self.listeners
            .retain(|listener| listener.send(notice.clone()).is_ok());
    }

    pub fn run(mut self, inbox: Receiver<CoordinatorEvent>) {
        loop {
            self.fire_due(Instant::now());
            let received = match self.timers.timeout_from(Instant::now()) {
                Some(wait) => inbox.recv_timeout(wait),
                None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    if !self.handle(event, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("Coordinator stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::inference::domain::classification::ThreatLevel;
    use crate::session::domain::alert_policy::Alert;
    use crate::session::domain::target::MeetingHostValidator;

    pub(crate) type Inboxes<T> = Arc<Mutex<Vec<Receiver<T>>>>;

    /// Hands out fresh pipeline inboxes, failing the first `failures` calls.
    #[derive(Default)]
    pub(crate) struct StubProvisioner {
        pub inboxes: Inboxes<PipelineCommand>,
        pub failures: usize,
        pub attempts: Arc<Mutex<usize>>,
    }

    impl ContextProvisioner for StubProvisioner {
        fn provision(
            &mut self,
            _events: Outbox<CoordinatorEvent>,
        ) -> Result<Outbox<PipelineCommand>, Box<dyn std::error::Error>> {
            *self.attempts.lock().unwrap() += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err("sandbox refused".into());
            }
            let (outbox, inbox) = Outbox::channel("processing context");
            self.inboxes.lock().unwrap().push(inbox);
            Ok(outbox)
        }
    }

    /// Keeps injected overlays' inboxes; `drop_first` simulates overlays
    /// that are gone by the time the broadcast happens.
    #[derive(Default)]
    pub(crate) struct StubInjector {
        pub inboxes: Inboxes<OverlayMessage>,
        pub drop_first: usize,
    }

    impl OverlayInjector for StubInjector {
        fn inject(&mut self) -> Result<Outbox<OverlayMessage>, Box<dyn std::error::Error>> {
            let (outbox, inbox) = Outbox::channel("overlay");
            if self.drop_first > 0 {
                self.drop_first -= 1;
            } else {
                self.inboxes.lock().unwrap().push(inbox);
            }
            Ok(outbox)
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingAlerts(pub Arc<Mutex<Vec<Alert>>>);

    impl AlertSink for RecordingAlerts {
        fn alert(&mut self, alert: &Alert) {
            self.0.lock().unwrap().push(alert.clone());
        }
    }

    struct Harness {
        coordinator: Coordinator,
        pipelines: Inboxes<PipelineCommand>,
        overlays: Inboxes<OverlayMessage>,
        alerts: RecordingAlerts,
        attempts: Arc<Mutex<usize>>,
        _events: Receiver<CoordinatorEvent>,
    }

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            ack_timeout: Duration::from_millis(20),
            provision_retry: RetryPolicy::from_millis(&[0, 0]),
            ..CoordinatorConfig::default()
        }
    }

    fn harness_with(provisioner: StubProvisioner, injector: StubInjector) -> Harness {
        let (events, rx) = Outbox::channel("coordinator");
        let alerts = RecordingAlerts::default();
        let pipelines = provisioner.inboxes.clone();
        let attempts = provisioner.attempts.clone();
        let overlays = injector.inboxes.clone();
        let ports = CoordinatorPorts {
            validator: Box::new(MeetingHostValidator::default()),
            provisioner: Box::new(provisioner),
            overlay: Box::new(injector),
            alerts: Box::new(alerts.clone()),
        };
        Harness {
            coordinator: Coordinator::new(test_config(), ports, events),
            pipelines,
            overlays,
            alerts,
            attempts,
            _events: rx,
        }
    }

    fn harness() -> Harness {
        harness_with(StubProvisioner::default(), StubInjector::default())
    }

    fn meeting(id: &str) -> TargetDescriptor {
        TargetDescriptor::new(id, "https://meet.google.com/abc-defg-hij", format!("stream-{id}"))
    }

    type StartReply = crate::messaging::domain::channel::PendingAck<Result<SessionSnapshot, SessionError>>;

    impl Harness {
        fn start(&mut self, target: TargetDescriptor, now: Instant) -> StartReply {
            let (reply, pending) = Ack::pair("coordinator");
            self.coordinator.handle(
                CoordinatorEvent::Control(ControlRequest::Start { target, reply }),
                now,
            );
            pending
        }

        fn stop(&mut self, now: Instant) -> SessionSnapshot {
            let (reply, pending) = Ack::pair("coordinator");
            self.coordinator
                .handle(CoordinatorEvent::Control(ControlRequest::Stop { reply }), now);
            pending.wait(Duration::from_millis(10)).unwrap()
        }

        fn subscribe(&mut self, now: Instant) -> Receiver<ControlNotice> {
            let (tx, rx) = crossbeam_channel::unbounded();
            self.coordinator.handle(
                CoordinatorEvent::Control(ControlRequest::Subscribe { listener: tx }),
                now,
            );
            rx
        }

        fn pipeline(&mut self, event: PipelineEvent, now: Instant) {
            let generation = self.coordinator.session.generation();
            self.pipeline_at(generation, event, now);
        }

        fn pipeline_at(&mut self, generation: Generation, event: PipelineEvent, now: Instant) {
            self.coordinator
                .handle(CoordinatorEvent::Pipeline { generation, event }, now);
        }

        fn pipeline_commands(&self) -> Vec<String> {
            let inboxes = self.pipelines.lock().unwrap();
            inboxes
                .iter()
                .flat_map(|rx| rx.try_iter().collect::<Vec<_>>())
                .map(|command| match command {
                    PipelineCommand::BeginStream { generation, .. } => format!("begin:{generation}"),
                    PipelineCommand::EndStream { .. } => "end".to_string(),
                    PipelineCommand::UpdateRegion(Some(_)) => "region".to_string(),
                    PipelineCommand::UpdateRegion(None) => "region:none".to_string(),
                    PipelineCommand::Shutdown => "shutdown".to_string(),
                })
                .collect()
        }

        fn overlay_messages(&self) -> Vec<OverlayMessage> {
            let inboxes = self.overlays.lock().unwrap();
            inboxes.iter().flat_map(|rx| rx.try_iter().collect::<Vec<_>>()).collect()
        }

        fn activate(&mut self, now: Instant) -> SessionSnapshot {
            let pending = self.start(meeting("tab-1"), now);
            self.pipeline(PipelineEvent::Ready, now);
            pending.wait(Duration::from_millis(10)).unwrap().unwrap()
        }
    }

    fn scored(n: u64, confidence: f64) -> PipelineEvent {
        PipelineEvent::Result(DetectionResult::scored(n, confidence, 1, 5.0, None))
    }

    #[test]
    fn test_start_then_ready_activates_and_replies() {
        let mut h = harness();
        let t0 = Instant::now();
        let pending = h.start(meeting("tab-1"), t0);
        assert_eq!(h.coordinator.state(), SessionState::Starting);
        assert_eq!(h.pipeline_commands(), vec!["begin:1"]);

        h.pipeline(PipelineEvent::Ready, t0);
        let snapshot = pending.wait(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        assert!(snapshot.started_at_ms.is_some());
        assert_eq!(snapshot.frames_processed, 0);
        assert_eq!(
            h.overlay_messages(),
            vec![OverlayMessage::StatusChanged(OverlayStatus::Active)]
        );
        assert_eq!(h.coordinator.pending_timers(), 0);
    }

    #[test]
    fn test_unsupported_target_is_rejected_and_stays_idle() {
        let mut h = harness();
        let target = TargetDescriptor::new("tab-9", "https://example.com/watch", "s");
        let reply = h.start(target, Instant::now()).wait(Duration::from_millis(10)).unwrap();
        assert!(matches!(reply, Err(SessionError::TargetUnsupported { .. })));
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert_eq!(*h.attempts.lock().unwrap(), 0);
    }

    #[test]
    fn test_provisioning_retries_then_succeeds() {
        let provisioner = StubProvisioner {
            failures: 2,
            ..StubProvisioner::default()
        };
        let mut h = harness_with(provisioner, StubInjector::default());
        h.start(meeting("tab-1"), Instant::now());
        assert_eq!(*h.attempts.lock().unwrap(), 3);
        assert_eq!(h.coordinator.state(), SessionState::Starting);
    }

    #[test]
    fn test_provisioning_exhaustion_reports_context_unavailable() {
        let provisioner = StubProvisioner {
            failures: 3,
            ..StubProvisioner::default()
        };
        let mut h = harness_with(provisioner, StubInjector::default());
        let notices = h.subscribe(Instant::now());
        let reply = h
            .start(meeting("tab-1"), Instant::now())
            .wait(Duration::from_millis(10))
            .unwrap();
        match reply {
            Err(e @ SessionError::ContextUnavailable(_)) => assert!(e.is_retryable()),
            other => panic!("expected ContextUnavailable, got {other:?}"),
        }
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert_eq!(*h.attempts.lock().unwrap(), 3);
        let last = notices.try_iter().last();
        assert_eq!(last, Some(ControlNotice::StatusChanged(SessionState::Idle)));
    }

    #[test]
    fn test_start_is_idempotent_on_same_target_and_busy_on_another() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);

        let again = h.start(meeting("tab-1"), t0).wait(Duration::from_millis(10)).unwrap();
        assert_eq!(again.unwrap().state, SessionState::Active);

        let other = h.start(meeting("tab-2"), t0).wait(Duration::from_millis(10)).unwrap();
        assert_eq!(other, Err(SessionError::Busy("tab-1".into())));
        assert_eq!(h.pipeline_commands(), vec!["begin:1"]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut h = harness();
        let t0 = Instant::now();
        assert_eq!(h.stop(t0).state, SessionState::Idle);
        h.activate(t0);
        assert_eq!(h.stop(t0).state, SessionState::Idle);
        assert_eq!(h.stop(t0).state, SessionState::Idle);
        assert_eq!(h.pipeline_commands(), vec!["begin:1", "end"]);
        let overlay = h.overlay_messages();
        assert!(overlay.contains(&OverlayMessage::Clear));
        assert!(overlay.contains(&OverlayMessage::StatusChanged(OverlayStatus::Stopped)));
    }

    #[test]
    fn test_stop_while_starting_cancels_timeout_and_start() {
        let mut h = harness();
        let t0 = Instant::now();
        let pending = h.start(meeting("tab-1"), t0);
        assert_eq!(h.coordinator.pending_timers(), 1);
        h.stop(t0);
        assert_eq!(h.coordinator.pending_timers(), 0);
        assert!(pending.wait(Duration::from_millis(10)).unwrap().is_err());

        h.pipeline_at(1, PipelineEvent::Ready, t0);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
    }

    #[test]
    fn test_start_timeout_forces_idle() {
        let mut h = harness();
        let t0 = Instant::now();
        let pending = h.start(meeting("tab-1"), t0);
        h.coordinator.fire_due(t0 + START_TIMEOUT);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        let reply = pending.wait(Duration::from_millis(10)).unwrap();
        assert!(matches!(reply, Err(SessionError::ContextUnavailable(_))));
    }

    #[test]
    fn test_results_update_counters_and_fan_out() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        let notices = h.subscribe(t0);
        h.pipeline(scored(0, 0.2), t0);
        h.pipeline(scored(1, 0.9), t0);

        let snapshot = h.coordinator.snapshot();
        assert_eq!(snapshot.frames_processed, 2);
        let smoothed = snapshot.smoothed_confidence.unwrap();
        assert!((smoothed - 0.27).abs() < 1e-9);

        let alerts = h.alerts.0.lock().unwrap().clone();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, ThreatLevel::Danger);

        let results = notices
            .try_iter()
            .filter(|n| matches!(n, ControlNotice::Result { .. }))
            .count();
        assert_eq!(results, 2);
        let overlay_results = h
            .overlay_messages()
            .into_iter()
            .filter(|m| matches!(m, OverlayMessage::Result(_)))
            .count();
        assert_eq!(overlay_results, 2);
    }

    #[test]
    fn test_stale_generation_results_are_discarded() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        h.stop(t0);
        h.activate(t0);
        h.pipeline_at(1, scored(7, 0.9), t0);
        assert_eq!(h.coordinator.snapshot().frames_processed, 0);
        h.pipeline_at(2, scored(0, 0.9), t0);
        assert_eq!(h.coordinator.snapshot().frames_processed, 1);
    }

    #[test]
    fn test_capture_error_forces_stop_and_surfaces() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        let notices = h.subscribe(t0);
        h.pipeline(
            PipelineEvent::CaptureError(CaptureError::SourceGone("tab closed".into())),
            t0,
        );
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        let surfaced: Vec<ControlNotice> = notices.try_iter().collect();
        assert!(surfaced
            .iter()
            .any(|n| matches!(n, ControlNotice::Error(SessionError::StreamAcquisitionFailed(_)))));
        assert_eq!(h.pipeline_commands(), vec!["begin:1", "end"]);
    }

    #[test]
    fn test_capture_error_while_starting_fails_the_start() {
        let mut h = harness();
        let t0 = Instant::now();
        let pending = h.start(meeting("tab-1"), t0);
        h.pipeline(
            PipelineEvent::CaptureError(CaptureError::PermissionDenied("denied".into())),
            t0,
        );
        let reply = pending.wait(Duration::from_millis(10)).unwrap();
        assert!(matches!(reply, Err(SessionError::StreamAcquisitionFailed(_))));
        assert_eq!(h.coordinator.pending_timers(), 0);
    }

    #[test]
    fn test_region_updates_forward_only_beyond_tolerance() {
        let mut h = harness();
        let t0 = Instant::now();
        h.coordinator
            .handle(CoordinatorEvent::RegionFound(Region::new(10, 10, 640, 480, true)), t0);
        h.activate(t0);
        assert_eq!(
            h.coordinator.snapshot().last_known_region,
            Some(Region::new(10, 10, 640, 480, true))
        );
        h.coordinator
            .handle(CoordinatorEvent::RegionFound(Region::new(14, 12, 640, 480, true)), t0);
        assert_eq!(
            h.coordinator.snapshot().last_known_region,
            Some(Region::new(14, 12, 640, 480, true))
        );
        h.coordinator
            .handle(CoordinatorEvent::RegionFound(Region::new(60, 10, 640, 480, true)), t0);
        h.coordinator.handle(CoordinatorEvent::RegionLost, t0);
        assert_eq!(
            h.pipeline_commands(),
            vec!["begin:1", "region", "region:none"]
        );
    }

    #[test]
    fn test_broadcast_retries_then_reinjects_overlay() {
        let injector = StubInjector {
            drop_first: 1,
            ..StubInjector::default()
        };
        let mut h = harness_with(StubProvisioner::default(), injector);
        let t0 = Instant::now();
        h.activate(t0);
        assert!(h.overlay_messages().is_empty());
        assert_eq!(h.coordinator.pending_timers(), 1);

        h.coordinator.fire_due(t0 + BROADCAST_RETRY_DELAY);
        assert_eq!(
            h.overlay_messages(),
            vec![OverlayMessage::StatusChanged(OverlayStatus::Active)]
        );
        assert_eq!(h.coordinator.pending_timers(), 0);
    }

    #[test]
    fn test_stop_cancels_pending_broadcast_retry() {
        let injector = StubInjector {
            drop_first: 5,
            ..StubInjector::default()
        };
        let mut h = harness_with(StubProvisioner::default(), injector);
        let t0 = Instant::now();
        h.activate(t0);
        assert_eq!(h.coordinator.pending_timers(), 1);
        h.stop(t0);
        assert_eq!(h.coordinator.pending_timers(), 0);
    }

    #[test]
    fn test_model_error_is_surfaced_once_and_session_still_starts() {
        let mut h = harness();
        let t0 = Instant::now();
        let notices = h.subscribe(t0);
        let message = PipelineEvent::ModelError {
            message: "corrupt model".into(),
        };
        h.pipeline_at(0, message.clone(), t0);
        h.pipeline_at(0, message, t0);
        let snapshot = h.activate(t0);
        assert_eq!(snapshot.state, SessionState::Active);
        h.pipeline(PipelineEvent::Result(DetectionResult::no_face(0, 0, 1.0)), t0);
        assert_eq!(h.coordinator.snapshot().frames_processed, 1);

        let errors = notices
            .try_iter()
            .filter(|n| matches!(n, ControlNotice::Error(SessionError::ModelInitFailed(_))))
            .count();
        assert_eq!(errors, 1);
        assert!(h.alerts.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_context_loss_forces_idle_and_reprovisions_next_start() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        h.pipeline_at(0, PipelineEvent::ContextLost, t0);
        assert_eq!(h.coordinator.state(), SessionState::Idle);

        h.activate(t0);
        assert_eq!(*h.attempts.lock().unwrap(), 2);
    }

    #[test]
    fn test_target_closed_stops_only_its_own_session() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        h.coordinator
            .handle(CoordinatorEvent::TargetClosed(TargetId("tab-2".into())), t0);
        assert_eq!(h.coordinator.state(), SessionState::Active);
        h.coordinator
            .handle(CoordinatorEvent::TargetClosed(TargetId("tab-1".into())), t0);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
    }

    #[test]
    fn test_unknown_message_is_ignored() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        assert!(h.coordinator.handle(
            CoordinatorEvent::Unknown {
                kind: "legacyPing".into()
            },
            t0
        ));
        assert_eq!(h.coordinator.state(), SessionState::Active);
    }

    #[test]
    fn test_shutdown_stops_session_and_exits() {
        let mut h = harness();
        let t0 = Instant::now();
        h.activate(t0);
        assert!(!h.coordinator.handle(CoordinatorEvent::Shutdown, t0));
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert_eq!(h.pipeline_commands(), vec!["begin:1", "end", "shutdown"]);
    }
}

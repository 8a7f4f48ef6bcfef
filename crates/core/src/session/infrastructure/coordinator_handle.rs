use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::{ControlNotice, ControlRequest, CoordinatorEvent};
use crate::session::domain::capture_session::SessionSnapshot;
use crate::session::domain::session_error::SessionError;
use crate::session::domain::target::{TargetDescriptor, TargetId};
use crate::session::infrastructure::coordinator::{Coordinator, CoordinatorConfig};

/// How long each control request waits for the coordinator's reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyTimeouts {
    pub start: Duration,
    pub stop: Duration,
    pub status: Duration,
}

impl ReplyTimeouts {
    /// A start replies only after provisioning retries and the start timeout,
    /// so its wait covers both plus a grace period.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            start: config.provision_retry.total_delay()
                + config.start_timeout
                + config.ack_timeout
                + Duration::from_secs(1),
            stop: config.ack_timeout * 2,
            status: config.ack_timeout,
        }
    }
}

/// Control-surface side of the coordinator context.
pub struct CoordinatorHandle {
    outbox: Outbox<CoordinatorEvent>,
    timeouts: ReplyTimeouts,
    thread: Option<JoinHandle<()>>,
}

/// Runs `coordinator` on its own thread, reading from `inbox`.
pub fn spawn(
    coordinator: Coordinator,
    outbox: Outbox<CoordinatorEvent>,
    inbox: Receiver<CoordinatorEvent>,
) -> std::io::Result<CoordinatorHandle> {
    let timeouts = ReplyTimeouts::from_config(coordinator.config());
    let thread = thread::Builder::new()
        .name("coordinator".into())
        .spawn(move || coordinator.run(inbox))?;
    Ok(CoordinatorHandle {
        outbox,
        timeouts,
        thread: Some(thread),
    })
}

impl CoordinatorHandle {
    pub fn outbox(&self) -> Outbox<CoordinatorEvent> {
        self.outbox.clone()
    }

    pub fn timeouts(&self) -> ReplyTimeouts {
        self.timeouts
    }

    /// Resolves once the pipeline is ready or the start has failed.
    pub fn start(&self, target: TargetDescriptor) -> Result<SessionSnapshot, SessionError> {
        self.outbox.request(
            |reply| CoordinatorEvent::Control(ControlRequest::Start { target, reply }),
            self.timeouts.start,
        )?
    }

    pub fn stop(&self) -> Result<SessionSnapshot, SessionError> {
        Ok(self.outbox.request(
            |reply| CoordinatorEvent::Control(ControlRequest::Stop { reply }),
            self.timeouts.stop,
        )?)
    }

    pub fn status(&self) -> Result<SessionSnapshot, SessionError> {
        Ok(self.outbox.request(
            |reply| CoordinatorEvent::Control(ControlRequest::GetStatus { reply }),
            self.timeouts.status,
        )?)
    }

    /// Notices are best-effort and buffered without bound.
    pub fn subscribe(&self) -> Result<Receiver<ControlNotice>, SessionError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.outbox
            .send(CoordinatorEvent::Control(ControlRequest::Subscribe { listener: tx }))?;
        Ok(rx)
    }

    pub fn target_closed(&self, id: TargetId) {
        self.outbox.notify(CoordinatorEvent::TargetClosed(id));
    }

    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.outbox.notify(CoordinatorEvent::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Coordinator thread panicked");
            }
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

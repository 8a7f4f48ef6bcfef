use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::messaging::domain::channel::{ChannelError, Outbox};
use crate::messaging::domain::messages::{CoordinatorEvent, TrackerCommand};
use crate::shared::constants::{DISCOVERY_SCHEDULE_MS, MUTATION_DEBOUNCE, PERIODIC_RESCAN};
use crate::shared::region::Region;
use crate::shared::timer::{TimerHandle, TimerQueue};
use crate::tracking::domain::region_tracker::{RegionTracker, TrackerReport};
use crate::tracking::domain::surface_source::{scan, SurfaceSource};

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Offsets from start at which discovery scans run.
    pub discovery: Vec<Duration>,
    pub debounce: Duration,
    pub periodic: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            discovery: DISCOVERY_SCHEDULE_MS
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
            debounce: MUTATION_DEBOUNCE,
            periodic: PERIODIC_RESCAN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackerTimer {
    Discovery,
    Debounce,
    Periodic,
}

/// The region tracker context: scans its document on a discovery ladder, on
/// debounced mutations and on a periodic safety net, and reports region
/// changes to the coordinator.
pub struct TrackerWorker {
    source: Box<dyn SurfaceSource>,
    tracker: RegionTracker,
    timers: TimerQueue<TrackerTimer>,
    debounce: Option<TimerHandle>,
    reports: Outbox<CoordinatorEvent>,
    config: TrackerConfig,
}

impl TrackerWorker {
    pub fn new(
        source: Box<dyn SurfaceSource>,
        reports: Outbox<CoordinatorEvent>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            source,
            tracker: RegionTracker::default(),
            timers: TimerQueue::new(),
            debounce: None,
            reports,
            config,
        }
    }

    pub fn start(&mut self, now: Instant) {
        for &offset in &self.config.discovery {
            self.timers.schedule(now, offset, TrackerTimer::Discovery);
        }
        self.timers
            .schedule(now, self.config.periodic, TrackerTimer::Periodic);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn current_region(&self) -> Option<Region> {
        self.tracker.current()
    }

    /// Returns `false` once the worker should exit.
    pub fn handle(&mut self, command: TrackerCommand, now: Instant) -> bool {
        match command {
            TrackerCommand::CheckRegion { reply } => {
                let found = scan(self.source.as_ref());
                let report = self.tracker.fresh_scan(found);
                self.publish(report);
                reply.reply(found);
            }
            TrackerCommand::Mutation => {
                if let Some(pending) = self.debounce.take() {
                    self.timers.cancel(pending);
                }
                self.debounce = Some(self.timers.schedule(
                    now,
                    self.config.debounce,
                    TrackerTimer::Debounce,
                ));
            }
            TrackerCommand::Shutdown => {
                self.timers.cancel_all();
                self.debounce = None;
                return false;
            }
        }
        true
    }

    pub fn fire_due(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                TrackerTimer::Discovery => {}
                TrackerTimer::Debounce => self.debounce = None,
                TrackerTimer::Periodic => {
                    self.timers
                        .schedule(now, self.config.periodic, TrackerTimer::Periodic);
                }
            }
            log::trace!("Tracker scan ({timer:?})");
            let report = self.tracker.observe(scan(self.source.as_ref()));
            self.publish(report);
        }
    }

    fn publish(&mut self, report: Option<TrackerReport>) {
        if self.tracker.current().is_some() {
            let cancelled = self
                .timers
                .cancel_where(|t| *t == TrackerTimer::Discovery);
            if cancelled > 0 {
                log::debug!("Region found; cancelled {cancelled} discovery scans");
            }
        }
        let Some(report) = report else {
            return;
        };
        let event = match report {
            TrackerReport::Found(region) => {
                log::info!(
                    "Video region found: {}x{} at ({}, {})",
                    region.width,
                    region.height,
                    region.x,
                    region.y
                );
                CoordinatorEvent::RegionFound(region)
            }
            TrackerReport::Lost => {
                log::info!("Video region lost");
                CoordinatorEvent::RegionLost
            }
        };
        if let Err(e) = self.reports.send(event) {
            log::warn!("Region report dropped: {e}");
        }
    }

    fn run(mut self, inbox: Receiver<TrackerCommand>) {
        self.start(Instant::now());
        loop {
            self.fire_due(Instant::now());
            let received = match self.timers.timeout_from(Instant::now()) {
                Some(wait) => inbox.recv_timeout(wait),
                None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(command) => {
                    if !self.handle(command, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.timers.cancel_all();
        log::debug!("Region tracker stopped");
    }
}

/// Owner's side of a running tracker thread.
pub struct TrackerHandle {
    outbox: Outbox<TrackerCommand>,
    thread: Option<JoinHandle<()>>,
}

/// Spawns the tracker context.
pub fn spawn(
    source: Box<dyn SurfaceSource>,
    reports: Outbox<CoordinatorEvent>,
    config: TrackerConfig,
) -> std::io::Result<TrackerHandle> {
    let (outbox, inbox) = Outbox::channel("region tracker");
    let worker = TrackerWorker::new(source, reports, config);
    let thread = thread::Builder::new()
        .name("region-tracker".into())
        .spawn(move || worker.run(inbox))?;
    Ok(TrackerHandle {
        outbox,
        thread: Some(thread),
    })
}

impl TrackerHandle {
    pub fn outbox(&self) -> Outbox<TrackerCommand> {
        self.outbox.clone()
    }

    /// Fresh scan; the answer reflects the document right now.
    pub fn check_region(&self, timeout: Duration) -> Result<Option<Region>, ChannelError> {
        self.outbox
            .request(|reply| TrackerCommand::CheckRegion { reply }, timeout)
    }

    pub fn notify_mutation(&self) {
        self.outbox.notify(TrackerCommand::Mutation);
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.outbox.notify(TrackerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Region tracker thread panicked");
            }
        }
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::domain::surface_source::SharedDocument;
    use crate::tracking::domain::video_surface::{VideoSurface, Viewport};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn document() -> SharedDocument {
        SharedDocument::new(Viewport::new(0, 1000))
    }

    fn worker(doc: &SharedDocument) -> (TrackerWorker, Receiver<CoordinatorEvent>) {
        let (reports, rx) = Outbox::channel("coordinator");
        let w = TrackerWorker::new(Box::new(doc.clone()), reports, TrackerConfig::default());
        (w, rx)
    }

    fn drain(rx: &Receiver<CoordinatorEvent>) -> Vec<&'static str> {
        rx.try_iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_start_schedules_discovery_ladder_and_safety_net() {
        let doc = document();
        let (mut w, _rx) = worker(&doc);
        let t0 = Instant::now();
        w.start(t0);
        assert_eq!(w.pending_timers(), DISCOVERY_SCHEDULE_MS.len() + 1);
        assert_eq!(w.next_deadline(), Some(t0 + ms(300)));
    }

    #[test]
    fn test_discovery_finds_late_surface_and_cancels_remaining_scans() {
        let doc = document();
        let (mut w, rx) = worker(&doc);
        let t0 = Instant::now();
        w.start(t0);

        w.fire_due(t0 + ms(300));
        w.fire_due(t0 + ms(800));
        assert!(drain(&rx).is_empty());

        doc.set_surfaces(vec![VideoSurface::live(10, 10, 640, 480)]);
        w.fire_due(t0 + ms(1500));
        assert_eq!(drain(&rx), vec!["regionFound"]);
        // Only the periodic safety net remains.
        assert_eq!(w.pending_timers(), 1);
    }

    #[test]
    fn test_mutations_are_debounced() {
        let doc = document();
        let (mut w, rx) = worker(&doc);
        let t0 = Instant::now();
        doc.set_surfaces(vec![VideoSurface::live(0, 0, 320, 240)]);

        assert!(w.handle(TrackerCommand::Mutation, t0));
        assert!(w.handle(TrackerCommand::Mutation, t0 + ms(200)));
        assert!(w.handle(TrackerCommand::Mutation, t0 + ms(400)));
        assert_eq!(w.pending_timers(), 1);

        w.fire_due(t0 + ms(600));
        assert!(drain(&rx).is_empty());
        w.fire_due(t0 + ms(900));
        assert_eq!(drain(&rx), vec!["regionFound"]);
    }

    #[test]
    fn test_loss_needs_three_background_misses() {
        let doc = document();
        let (mut w, rx) = worker(&doc);
        let t0 = Instant::now();
        doc.set_surfaces(vec![VideoSurface::live(0, 0, 320, 240)]);
        w.handle(TrackerCommand::Mutation, t0);
        w.fire_due(t0 + ms(500));
        assert_eq!(drain(&rx), vec!["regionFound"]);

        doc.clear();
        let mut t = t0 + ms(500);
        for _ in 0..2 {
            w.handle(TrackerCommand::Mutation, t);
            t += ms(500);
            w.fire_due(t);
        }
        assert!(drain(&rx).is_empty());
        w.handle(TrackerCommand::Mutation, t);
        w.fire_due(t + ms(500));
        assert_eq!(drain(&rx), vec!["regionLost"]);
    }

    #[test]
    fn test_check_region_replies_with_live_scan_and_never_reports_loss() {
        let doc = document();
        let (mut w, rx) = worker(&doc);
        let t0 = Instant::now();

        doc.set_surfaces(vec![VideoSurface::live(10, 10, 640, 480)]);
        let (ack, pending) = crate::messaging::domain::channel::Ack::pair("tracker");
        w.handle(TrackerCommand::CheckRegion { reply: ack }, t0);
        assert_eq!(
            pending.wait(ms(10)).unwrap(),
            Some(Region::new(10, 10, 640, 480, true))
        );
        assert_eq!(drain(&rx), vec!["regionFound"]);

        doc.clear();
        for _ in 0..5 {
            let (ack, pending) = crate::messaging::domain::channel::Ack::pair("tracker");
            w.handle(TrackerCommand::CheckRegion { reply: ack }, t0);
            assert_eq!(pending.wait(ms(10)).unwrap(), None);
        }
        assert!(drain(&rx).is_empty());
        assert!(w.current_region().is_some());
    }

    #[test]
    fn test_shutdown_cancels_every_pending_timer() {
        let doc = document();
        let (mut w, rx) = worker(&doc);
        let t0 = Instant::now();
        w.start(t0);
        w.handle(TrackerCommand::Mutation, t0);
        assert!(!w.handle(TrackerCommand::Shutdown, t0));
        assert_eq!(w.pending_timers(), 0);

        doc.set_surfaces(vec![VideoSurface::live(0, 0, 320, 240)]);
        w.fire_due(t0 + ms(20_000));
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_spawned_tracker_reports_and_answers() {
        let doc = document();
        doc.set_surfaces(vec![VideoSurface::live(10, 10, 640, 480)]);
        let (reports, rx) = Outbox::channel("coordinator");
        let config = TrackerConfig {
            discovery: vec![ms(5)],
            debounce: ms(5),
            periodic: ms(50),
        };
        let handle = spawn(Box::new(doc.clone()), reports, config).unwrap();
        doc.observe(handle.outbox());

        let event = rx.recv_timeout(ms(1000)).unwrap();
        assert!(matches!(event, CoordinatorEvent::RegionFound(r) if r.width == 640));
        assert_eq!(
            handle.check_region(ms(1000)).unwrap(),
            Some(Region::new(10, 10, 640, 480, true))
        );
        handle.shutdown();
    }
}

//! The isolated processing context: owns the media stream and runs the
//! fixed-rate extraction and inference loop.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::capture::domain::frame_analyzer::FrameAnalyzer;
use crate::capture::domain::media_stream::{MediaStream, StreamProvider};
use crate::capture::domain::pipeline_logger::PipelineLogger;
use crate::inference::domain::models::ModelLoader;
use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::{
    CoordinatorEvent, Generation, PipelineCommand, PipelineEvent, SamplingConfig, StreamId,
};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::timer::TimerQueue;

struct ActiveStream {
    generation: Generation,
    stream: Box<dyn MediaStream>,
    region: Option<Region>,
    interval: Duration,
    last_frame: Option<Frame>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineTimer {
    Tick,
}

pub struct PipelineWorker {
    provider: Box<dyn StreamProvider>,
    loader: Option<Box<dyn ModelLoader>>,
    analyzer: FrameAnalyzer,
    events: Outbox<CoordinatorEvent>,
    active: Option<ActiveStream>,
    generation: Generation,
    timers: TimerQueue<PipelineTimer>,
}

impl PipelineWorker {
    pub fn new(
        provider: Box<dyn StreamProvider>,
        loader: Box<dyn ModelLoader>,
        logger: Box<dyn PipelineLogger>,
        events: Outbox<CoordinatorEvent>,
    ) -> Self {
        Self {
            provider,
            loader: Some(loader),
            analyzer: FrameAnalyzer::new(None, logger),
            events,
            active: None,
            generation: 0,
            timers: TimerQueue::new(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Loads the models once per context lifetime and reports the outcome.
    /// On failure the context keeps running and emits no-face results.
    pub fn load_models(&mut self) {
        let Some(mut loader) = self.loader.take() else {
            return;
        };
        let event = match loader.load() {
            Ok(models) => {
                let backend = models.backend().to_string();
                log::info!("Classifier ready on {backend}");
                self.analyzer.install_models(models);
                PipelineEvent::ModelReady { backend }
            }
            Err(e) => {
                log::warn!("Classifier failed to initialize: {e}");
                PipelineEvent::ModelError {
                    message: e.to_string(),
                }
            }
        };
        self.emit(self.generation, event);
    }

    /// Returns `false` once the worker should exit.
    pub fn handle(&mut self, command: PipelineCommand, now: Instant) -> bool {
        match command {
            PipelineCommand::BeginStream {
                generation,
                stream_id,
                config,
                region,
            } => self.begin_stream(generation, &stream_id, &config, region, now),
            PipelineCommand::EndStream { reply } => {
                self.end_stream();
                reply.reply(());
            }
            PipelineCommand::UpdateRegion(region) => {
                if let Some(active) = self.active.as_mut() {
                    active.region = region;
                }
            }
            PipelineCommand::Shutdown => {
                self.end_stream();
                return false;
            }
        }
        true
    }

    pub fn fire_due(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                PipelineTimer::Tick => self.tick(now),
            }
        }
    }

    fn begin_stream(
        &mut self,
        generation: Generation,
        stream_id: &StreamId,
        config: &SamplingConfig,
        region: Option<Region>,
        now: Instant,
    ) {
        self.end_stream();
        self.generation = generation;
        self.analyzer.reset(config);
        match self.provider.acquire(stream_id) {
            Ok(stream) => {
                log::info!(
                    "Sampling {stream_id} every {:?} (generation {generation})",
                    config.interval
                );
                self.active = Some(ActiveStream {
                    generation,
                    stream,
                    region,
                    interval: config.interval,
                    last_frame: None,
                });
                self.timers.schedule(now, config.interval, PipelineTimer::Tick);
                self.emit(generation, PipelineEvent::Ready);
            }
            Err(e) => {
                log::warn!("Stream acquisition failed for {stream_id}: {e}");
                self.emit(generation, PipelineEvent::CaptureError(e));
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        self.timers.schedule(now, active.interval, PipelineTimer::Tick);

        if active.stream.dimensions().is_none() {
            log::trace!("Stream has no decoded dimensions yet; skipping tick");
            return;
        }
        match active.stream.current_frame() {
            Ok(Some(frame)) => active.last_frame = Some(frame),
            Ok(None) => {}
            Err(e) => {
                let generation = active.generation;
                log::warn!("Capture failed: {e}");
                self.end_stream();
                self.emit(generation, PipelineEvent::CaptureError(e));
                return;
            }
        }
        let Some(frame) = active.last_frame.as_ref() else {
            return;
        };
        let generation = active.generation;
        let index = frame.index();
        match self.analyzer.analyze(frame, active.region.as_ref()) {
            Ok(result) => self.emit(generation, PipelineEvent::Result(result)),
            Err(e) => log::warn!("Skipping frame {index}: {e}"),
        }
    }

    /// Safe to call when nothing is streaming.
    fn end_stream(&mut self) {
        self.timers.cancel_all();
        if let Some(mut active) = self.active.take() {
            active.stream.stop();
            self.analyzer.finish();
            log::info!("Stream ended (generation {})", active.generation);
        }
    }

    fn emit(&self, generation: Generation, event: PipelineEvent) {
        if let Err(e) = self
            .events
            .send(CoordinatorEvent::Pipeline { generation, event })
        {
            log::debug!("Pipeline event dropped: {e}");
        }
    }

    pub fn run(mut self, inbox: Receiver<PipelineCommand>) {
        self.load_models();
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
        log::debug!("Processing context stopped");
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.end_stream();
        if thread::panicking() {
            log::error!("Processing context crashed");
            self.events.notify(CoordinatorEvent::Pipeline {
                generation: self.generation,
                event: PipelineEvent::ContextLost,
            });
        }
    }
}

/// Spawns a processing context thread.
pub fn spawn(
    worker: PipelineWorker,
) -> std::io::Result<(Outbox<PipelineCommand>, JoinHandle<()>)> {
    let (outbox, inbox) = Outbox::channel("processing context");
    let thread = thread::Builder::new()
        .name("frame-pipeline".into())
        .spawn(move || worker.run(inbox))?;
    Ok((outbox, thread))
}

use std::thread::JoinHandle;

use crate::capture::domain::media_stream::StreamProvider;
use crate::capture::domain::pipeline_logger::PipelineLogger;
use crate::capture::infrastructure::pipeline_worker::{self, PipelineWorker};
use crate::inference::domain::models::ModelLoader;
use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::{CoordinatorEvent, PipelineCommand};
use crate::session::domain::context_provisioner::ContextProvisioner;

pub type StreamProviderFactory = Box<dyn FnMut() -> Box<dyn StreamProvider> + Send>;
pub type ModelLoaderFactory = Box<dyn FnMut() -> Box<dyn ModelLoader> + Send>;
pub type PipelineLoggerFactory = Box<dyn FnMut() -> Box<dyn PipelineLogger> + Send>;

/// Provisions each processing context as a fresh pipeline thread.
pub struct ThreadProvisioner {
    streams: StreamProviderFactory,
    models: ModelLoaderFactory,
    loggers: PipelineLoggerFactory,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadProvisioner {
    pub fn new(
        streams: StreamProviderFactory,
        models: ModelLoaderFactory,
        loggers: PipelineLoggerFactory,
    ) -> Self {
        Self {
            streams,
            models,
            loggers,
            threads: Vec::new(),
        }
    }

    /// Contexts whose threads are still running.
    pub fn live_contexts(&mut self) -> usize {
        self.threads.retain(|t| !t.is_finished());
        self.threads.len()
    }
}

impl ContextProvisioner for ThreadProvisioner {
    fn provision(
        &mut self,
        events: Outbox<CoordinatorEvent>,
    ) -> Result<Outbox<PipelineCommand>, Box<dyn std::error::Error>> {
        let worker = PipelineWorker::new(
            (self.streams)(),
            (self.models)(),
            (self.loggers)(),
            events,
        );
        let (outbox, thread) = pipeline_worker::spawn(worker)?;
        self.threads.retain(|t| !t.is_finished());
        self.threads.push(thread);
        log::info!("Processing context started");
        Ok(outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::capture::domain::pipeline_logger::NullPipelineLogger;
    use crate::capture::infrastructure::pipeline_worker::tests::{ScriptedProvider, StubLoader};
    use crate::messaging::domain::messages::PipelineEvent;

    fn provisioner() -> ThreadProvisioner {
        ThreadProvisioner::new(
            Box::new(|| Box::new(ScriptedProvider::frames(0)) as Box<dyn StreamProvider>),
            Box::new(|| Box::new(StubLoader(None)) as Box<dyn ModelLoader>),
            Box::new(|| Box::new(NullPipelineLogger) as Box<dyn PipelineLogger>),
        )
    }

    #[test]
    fn test_provisioned_context_reports_model_status() {
        let mut p = provisioner();
        let (events, rx) = Outbox::channel("coordinator");
        let pipeline = p.provision(events).unwrap();
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CoordinatorEvent::Pipeline { event, .. } => {
                assert!(matches!(event, PipelineEvent::ModelError { .. }))
            }
            other => panic!("unexpected event {}", other.kind()),
        }
        pipeline.send(PipelineCommand::Shutdown).unwrap();
        for _ in 0..200 {
            if p.live_contexts() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("processing context did not exit");
    }
}

use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::{CoordinatorEvent, PipelineCommand};

/// Creates the isolated processing context on demand.
///
/// The coordinator calls this whenever it has no live pipeline outbox, e.g.
/// on the first start or after the previous context was lost.
pub trait ContextProvisioner: Send {
    fn provision(
        &mut self,
        events: Outbox<CoordinatorEvent>,
    ) -> Result<Outbox<PipelineCommand>, Box<dyn std::error::Error>>;
}

use crate::event::InboundEvent;
use crate::pipeline::{FilterChain, RecordHandler, Sender};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Filter chain, record handler and sender composed into one operation.
///
/// Holds no mutable state, so one `Pipe` behind an `Arc` serves every
/// concurrently processed event.
pub struct Pipe {
    filters: FilterChain,
    handler: RecordHandler,
    sender: Arc<dyn Sender>,
}

impl Pipe {
    pub fn new(filters: FilterChain, handler: RecordHandler, sender: Arc<dyn Sender>) -> Self {
        Self {
            filters,
            handler,
            sender,
        }
    }

    /// Runs the three stages in order and returns the first error unchanged.
    #[instrument(skip_all, fields(update_id = event.update_id, kind = %self.handler.kind()))]
    pub async fn process(&self, event: &InboundEvent) -> Result<()> {
        debug!("processing message");

        self.filters.run(event).await?;
        debug!("message passed all filters");

        let (payload, key) = self.handler.handle(event)?;
        debug!(bytes = payload.len(), "message handled");

        self.sender.send(payload, key).await?;
        debug!("message sent");

        Ok(())
    }
}

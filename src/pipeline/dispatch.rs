use crate::event::InboundEvent;
use crate::pipeline::Pipe;
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Admits inbound events into the pipeline, one tracked task per event.
///
/// Once the shutdown token is cancelled no new event is admitted; events
/// already admitted run to completion and [`Dispatcher::drain`] waits for
/// them.
#[derive(Clone)]
pub struct Dispatcher {
    pipe: Arc<Pipe>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(pipe: Arc<Pipe>, shutdown: CancellationToken) -> Self {
        Self {
            pipe,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Spawns processing for `event`. Returns `false` when the event was
    /// refused because shutdown has started.
    pub fn dispatch(&self, event: InboundEvent) -> bool {
        if self.shutdown.is_cancelled() || self.tracker.is_closed() {
            debug!(update_id = event.update_id, "shutting down, event not admitted");
            return false;
        }

        let pipe = Arc::clone(&self.pipe);
        self.tracker.spawn(async move {
            let result = pipe.process(&event).await;
            report_outcome(event.update_id, result);
        });
        true
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops admitting events and waits for every admitted one to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        let in_flight = self.in_flight();
        if in_flight > 0 {
            info!(in_flight, "waiting for in-flight messages");
        }
        self.tracker.wait().await;
    }
}

/// Logs and swallows the result of one pipeline pass.
///
/// The event source must not see an error, or the platform would redeliver
/// a message that can never succeed.
pub fn report_outcome(update_id: u32, result: Result<()>) {
    match result {
        Ok(()) => {}
        Err(e @ Error::EmptyDestination) => {
            error!(update_id, error = %e, "EmptyDestination error while processing message");
        }
        Err(e) if e.is_message_local() => {
            info!(update_id, error = %e, "error while processing message");
        }
        Err(e) => {
            warn!(update_id, error = %e, "message not delivered to the broker");
        }
    }
}

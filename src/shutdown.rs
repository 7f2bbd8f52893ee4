//! Cooperative shutdown of the event source and the producer.
//!
//! The coordinator moves through `Running → Cancelling → Draining → Closed`
//! exactly once. Leaving `Running` is triggered either by SIGINT/SIGTERM or
//! by the event source exiting on its own. In-flight messages are never
//! aborted: the event source stops admitting, finishes what it started, and
//! only then is the producer flushed and closed.

use crate::kafka::ErrorDrain;
use crate::pipeline::Sender;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A long-running source of inbound events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Receives and dispatches events until `shutdown` is cancelled, then
    /// returns once every admitted event has been processed.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Cancelling,
    Draining,
    Closed,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownState::Running => "running",
            ShutdownState::Cancelling => "cancelling",
            ShutdownState::Draining => "draining",
            ShutdownState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    state: watch::Sender<ShutdownState>,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { token, state }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Cancels the shared token on the first SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                received = wait_for_signal() => match received {
                    Ok(()) => {
                        info!("interrupt signal received");
                        token.cancel();
                    }
                    Err(e) => error!(error = %e, "failed to listen for shutdown signals"),
                },
                _ = token.cancelled() => {}
            }
        })
    }

    /// Supervises `source` until shutdown, then drains and closes.
    ///
    /// Returns the event source's error if it failed, otherwise the result
    /// of closing the sender.
    pub async fn run<S>(
        self,
        source: Arc<S>,
        sender: Arc<dyn Sender>,
        drain: Option<ErrorDrain>,
    ) -> Result<()>
    where
        S: EventSource + 'static,
    {
        let token = self.token.clone();
        let mut source_task = tokio::spawn({
            let token = token.clone();
            async move { source.run(token).await }
        });

        let finished_early = tokio::select! {
            _ = token.cancelled() => None,
            joined = &mut source_task => Some(joined),
        };

        self.transition(ShutdownState::Cancelling);
        token.cancel();

        self.transition(ShutdownState::Draining);
        let joined = match finished_early {
            Some(joined) => joined,
            None => source_task.await,
        };
        let source_result =
            joined.unwrap_or_else(|e| Err(Error::external("event source task", e)));
        match &source_result {
            Ok(()) => info!("event source stopped"),
            Err(e) => error!(error = %e, "event source failed"),
        }

        if let Some(drain) = drain {
            if let Some(drained) = drain.stop().await {
                info!(delivery_errors = drained, "delivery error drain stopped");
            }
        }

        let close_result = sender.close().await;
        if let Err(e) = &close_result {
            error!(error = %e, "failed to close sender");
        }
        self.transition(ShutdownState::Closed);

        source_result.and(close_result)
    }

    fn transition(&self, next: ShutdownState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "shutdown state changed");
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        received = tokio::signal::ctrl_c() => received,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

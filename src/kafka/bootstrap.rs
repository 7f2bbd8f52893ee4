//! Resilient producer startup and delivery-error draining.
//!
//! Connecting to the broker is the most likely startup failure (network
//! partition, broker still booting), so the connection is retried a bounded
//! number of times with a fixed pause. Running out of attempts is fatal:
//! the service cannot do anything useful without a producer.

use crate::config::KafkaConfig;
use crate::kafka::producer::{DeliveryError, KafkaProducer};
use crate::{Error, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl From<&KafkaConfig> for RetryPolicy {
    fn from(config: &KafkaConfig) -> Self {
        Self::new(
            config.connect_retries,
            Duration::from_secs(config.connect_retry_delay_secs),
        )
    }
}

/// Runs `connect` until it succeeds or the policy is exhausted.
///
/// Sleeps `policy.delay` after each failed attempt except the last one.
/// Exhaustion yields [`Error::Bootstrap`] carrying the last failure; a
/// cancelled `shutdown` token during a pause yields [`Error::Shutdown`].
/// A policy of zero attempts still makes one attempt.
pub async fn connect_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    mut connect: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect(attempt).await {
            Ok(client) => {
                if attempt > 1 {
                    info!(attempt, "kafka producer created after retrying");
                }
                return Ok(client);
            }
            Err(e) => {
                let attempts_left = max_attempts - attempt;
                if attempts_left == 0 {
                    error!(error = %e, attempts = attempt, "error while creating kafka producer");
                    return Err(Error::Bootstrap {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                warn!(
                    error = %e,
                    attempts_left,
                    retry_in_secs = policy.delay.as_secs_f64(),
                    "error while creating kafka producer"
                );

                tokio::select! {
                    _ = shutdown.cancelled() => return Err(Error::Shutdown),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }
}

/// Handle to the background task logging asynchronous delivery errors.
pub struct ErrorDrain {
    stop: CancellationToken,
    handle: JoinHandle<u64>,
}

/// Spawns a task that logs every error received until stopped or until all
/// senders are gone.
pub fn spawn_error_drain<E>(mut errors: UnboundedReceiver<E>) -> ErrorDrain
where
    E: Display + Send + 'static,
{
    let stop = CancellationToken::new();
    let token = stop.clone();

    let handle = tokio::spawn(async move {
        let mut drained = 0u64;
        loop {
            tokio::select! {
                biased;
                received = errors.recv() => match received {
                    Some(e) => {
                        drained += 1;
                        warn!(error = %e, "error while sending message to kafka");
                    }
                    None => break,
                },
                _ = token.cancelled() => {
                    // Pick up whatever is already queued, then stop.
                    while let Ok(e) = errors.try_recv() {
                        drained += 1;
                        warn!(error = %e, "error while sending message to kafka");
                    }
                    break;
                }
            }
        }
        debug!(drained, "delivery error drain stopped");
        drained
    });

    ErrorDrain { stop, handle }
}

impl ErrorDrain {
    /// Stops the drain and waits for it.
    ///
    /// Returns the number of errors drained, or `None` when the task itself
    /// failed. A failed drain is reported, never escalated.
    pub async fn stop(self) -> Option<u64> {
        self.stop.cancel();
        match self.handle.await {
            Ok(drained) => Some(drained),
            Err(e) => {
                error!(error = %e, "delivery error drain task failed");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Connects to Kafka with the configured retry policy and starts draining
/// the producer's delivery errors.
pub async fn bootstrap_producer(
    config: &KafkaConfig,
    shutdown: &CancellationToken,
) -> Result<(KafkaProducer, ErrorDrain)> {
    let (errors_tx, errors_rx) = mpsc::unbounded_channel::<DeliveryError>();
    let policy = RetryPolicy::from(config);

    info!(
        brokers = ?config.brokers,
        max_attempts = policy.max_attempts,
        "creating kafka producer"
    );

    let producer = connect_with_retry(&policy, shutdown, |attempt| {
        let config = config.clone();
        let errors_tx = errors_tx.clone();
        async move {
            debug!(attempt, "connecting to kafka");
            tokio::task::spawn_blocking(move || KafkaProducer::connect(&config, errors_tx))
                .await
                .map_err(|e| Error::external("kafka connect task", e))?
        }
    })
    .await?;

    drop(errors_tx);
    Ok((producer, spawn_error_drain(errors_rx)))
}

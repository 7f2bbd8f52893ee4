use crate::kafka::destination::Destination;
use crate::kafka::producer::{BrokerClient, DeliveryTask, PartitionKey};
use crate::pipeline::Sender;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Pause before re-offering a record to a full producer queue.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Sends records to the topic chosen by a [`Destination`].
///
/// Delivery is fire-and-forget: `send` returns once the record is in the
/// client's queue, and broker-side failures surface later through the
/// delivery error drain.
pub struct KafkaSender<C: BrokerClient> {
    destination: Arc<dyn Destination>,
    client: Arc<C>,
    closed: AtomicBool,
}

impl<C: BrokerClient> KafkaSender<C> {
    pub fn new(destination: Arc<dyn Destination>, client: Arc<C>) -> Self {
        Self {
            destination,
            client,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<C: BrokerClient> Sender for KafkaSender<C> {
    async fn send(&self, payload: Bytes, key: Option<PartitionKey>) -> Result<()> {
        let topic = self.destination.resolve();
        if topic.is_empty() {
            return Err(Error::EmptyDestination);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SenderClosed);
        }

        let task = DeliveryTask::new(topic, payload, key);
        loop {
            match self.client.enqueue(&task) {
                Err(Error::QueueFull) => {
                    debug!(topic = %task.topic, "producer queue full, waiting");
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                result => return result,
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("kafka sender already closed");
            return Ok(());
        }

        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || client.close())
            .await
            .map_err(|e| Error::external("producer close task", e))??;

        info!("producer closed");
        Ok(())
    }
}

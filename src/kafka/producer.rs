use crate::{config::KafkaConfig, Error, Result};
use bytes::Bytes;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Value steering which partition of the topic receives a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single record handed to the broker client's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTask {
    pub topic: String,
    pub payload: Bytes,
    pub key: Option<PartitionKey>,
}

impl DeliveryTask {
    pub fn new(topic: impl Into<String>, payload: Bytes, key: Option<PartitionKey>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            key,
        }
    }
}

/// Asynchronous broker client: a non-blocking enqueue plus a flushing close.
///
/// `enqueue` returns [`Error::QueueFull`] when the local queue has no room;
/// callers may retry. `close` blocks until buffered records are delivered or
/// the close timeout expires.
pub trait BrokerClient: Send + Sync + 'static {
    fn enqueue(&self, task: &DeliveryTask) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// A record the broker did not accept, reported from the delivery callback.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaError,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivery to {}[{}] failed: {}",
            self.topic, self.partition, self.error
        )
    }
}

/// Producer context forwarding failed deliveries to the error drain.
///
/// Runs on librdkafka's polling thread, so it must never block: the channel
/// is unbounded and a closed drain falls back to logging in place.
pub struct DeliveryContext {
    errors: UnboundedSender<DeliveryError>,
}

impl DeliveryContext {
    pub fn new(errors: UnboundedSender<DeliveryError>) -> Self {
        Self { errors }
    }
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _delivery_opaque: Self::DeliveryOpaque) {
        if let Err((error, message)) = delivery_result {
            let report = DeliveryError {
                topic: message.topic().to_string(),
                partition: message.partition(),
                error: error.clone(),
            };
            if let Err(unsent) = self.errors.send(report) {
                warn!(error = %unsent.0, "error while sending message to kafka (drain stopped)");
            }
        }
    }
}

/// The live Kafka connection.
pub struct KafkaProducer {
    producer: ThreadedProducer<DeliveryContext>,
    close_timeout: Duration,
}

impl KafkaProducer {
    /// Creates the producer and verifies that a broker answers a metadata
    /// request. Blocking; run it off the async executor.
    pub fn connect(config: &KafkaConfig, errors: UnboundedSender<DeliveryError>) -> Result<Self> {
        let producer: ThreadedProducer<DeliveryContext> = config
            .client_config()
            .create_with_context(DeliveryContext::new(errors))
            .map_err(Error::Kafka)?;

        let metadata = producer
            .client()
            .fetch_metadata(None, config.metadata_timeout())
            .map_err(Error::Kafka)?;

        info!(
            brokers = metadata.brokers().len(),
            topics = metadata.topics().len(),
            "connected to kafka"
        );

        Ok(Self {
            producer,
            close_timeout: config.close_timeout(),
        })
    }
}

impl BrokerClient for KafkaProducer {
    fn enqueue(&self, task: &DeliveryTask) -> Result<()> {
        let mut record = BaseRecord::<str, [u8]>::to(&task.topic).payload(task.payload.as_ref());
        if let Some(key) = &task.key {
            record = record.key(key.as_str());
        }

        match self.producer.send(record) {
            Ok(()) => Ok(()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                Err(Error::QueueFull)
            }
            Err((e, _)) => Err(Error::Kafka(e)),
        }
    }

    fn close(&self) -> Result<()> {
        debug!(
            in_flight = self.producer.in_flight_count(),
            "flushing kafka producer"
        );
        self.producer.flush(self.close_timeout).map_err(Error::Kafka)
    }
}

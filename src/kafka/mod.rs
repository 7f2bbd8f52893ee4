pub mod bootstrap;
pub mod destination;
pub mod producer;
pub mod sender;
pub mod serializer;


pub use bootstrap::{bootstrap_producer, connect_with_retry, spawn_error_drain, ErrorDrain, RetryPolicy};
pub use destination::{Destination, TopicDestination};
pub use producer::{BrokerClient, DeliveryError, DeliveryTask, KafkaProducer, PartitionKey};
pub use sender::KafkaSender;
pub use serializer::RecordFormat;

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tg_inbox_proxy::config::{Config, KafkaConfig, Overrides};
use tg_inbox_proxy::event::{EventSender, InboundEvent, InboundMessage};
use tg_inbox_proxy::kafka::{BrokerClient, DeliveryTask, PartitionKey};
use tg_inbox_proxy::pipeline::Sender;
use tg_inbox_proxy::Result;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        default_topic: format!("test_inbox_{}", std::process::id()),
        compression: "none".to_string(), // No compression for tests
        linger_ms: 0,                    // Immediate sending for tests
        connect_retries: 3,
        connect_retry_delay_secs: 1,
        ..Default::default()
    };

    Config {
        kafka,
        ..Default::default()
    }
    .apply(Overrides {
        token: Some("123456:test-token".to_string()),
        ..Default::default()
    })
}

pub fn text_event(update_id: u32, sender_id: u64, text: &str) -> InboundEvent {
    InboundEvent::new(
        update_id,
        Some(InboundMessage {
            id: 1000 + update_id as i32,
            sender: Some(EventSender {
                id: sender_id,
                username: None,
            }),
            text: Some(text.to_string()),
            date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }),
    )
}

/// Shared, ordered record of what the stubs observed.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Broker client stub that records enqueued tasks and close calls.
#[derive(Default)]
pub struct RecordingBroker {
    pub tasks: Mutex<Vec<DeliveryTask>>,
    pub closes: AtomicUsize,
    pub log: EventLog,
}

impl RecordingBroker {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn enqueued(&self) -> Vec<DeliveryTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl BrokerClient for RecordingBroker {
    fn enqueue(&self, task: &DeliveryTask) -> Result<()> {
        self.tasks.lock().unwrap().push(task.clone());
        self.log.push(format!("enqueue:{}", task.payload.len()));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.log.push("close");
        Ok(())
    }
}

/// Sender spy counting invocations without delivering anything.
#[derive(Default)]
pub struct SpySender {
    pub sends: Mutex<Vec<(Bytes, Option<PartitionKey>)>>,
    pub closes: AtomicUsize,
}

impl SpySender {
    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl Sender for SpySender {
    async fn send(&self, payload: Bytes, key: Option<PartitionKey>) -> Result<()> {
        self.sends.lock().unwrap().push((payload, key));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

use crate::kafka::RecordFormat;
use crate::{Error, Result};
use rdkafka::ClientConfig;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub kafka: KafkaConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u32,
    /// Pause after a failed `getUpdates` call.
    pub error_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub default_topic: String,
    pub compression: String,
    pub acks: String,
    pub linger_ms: u32,
    pub message_timeout_ms: u32,
    pub metadata_timeout_secs: u64,
    pub close_timeout_secs: u64,
    pub connect_retries: u32,
    pub connect_retry_delay_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub format: RecordFormat,
    /// Telegram user ids allowed through; empty means everyone.
    pub allowed_users: Vec<u64>,
    /// Write records to this file instead of Kafka.
    pub output_file: Option<PathBuf>,
}

/// Values given on the command line or through the legacy environment
/// variables. Each one that is set wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub brokers: Option<String>,
    pub default_topic: Option<String>,
    pub connect_retries: Option<u32>,
    pub connect_retry_delay_secs: Option<u64>,
    pub format: Option<RecordFormat>,
    pub output_file: Option<PathBuf>,
}

impl Config {
    /// Loads the optional config file, then `TG_INBOX_PROXY_*` environment
    /// variables (`TG_INBOX_PROXY_KAFKA__LINGER_MS=100`).
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("TG_INBOX_PROXY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(token) = overrides.token {
            self.telegram.token = Secret::new(token);
        }
        if let Some(brokers) = overrides.brokers {
            self.kafka.brokers = parse_brokers(&brokers);
        }
        if let Some(topic) = overrides.default_topic {
            self.kafka.default_topic = topic;
        }
        if let Some(retries) = overrides.connect_retries {
            self.kafka.connect_retries = retries;
        }
        if let Some(delay) = overrides.connect_retry_delay_secs {
            self.kafka.connect_retry_delay_secs = delay;
        }
        if let Some(format) = overrides.format {
            self.pipeline.format = format;
        }
        if overrides.output_file.is_some() {
            self.pipeline.output_file = overrides.output_file;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.expose_secret().trim().is_empty() {
            return Err(Error::Config("telegram bot token is required".to_string()));
        }
        if self.pipeline.output_file.is_none() {
            if self.kafka.brokers.is_empty() {
                return Err(Error::Config(
                    "at least one kafka broker is required".to_string(),
                ));
            }
            if self.kafka.connect_retries == 0 {
                return Err(Error::Config(
                    "broker connection retries must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl KafkaConfig {
    /// Producer settings: leader-only acks, snappy compression and a 500ms
    /// flush cadence unless configured otherwise.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("compression.type", &self.compression)
            .set("acks", &self.acks)
            .set("linger.ms", self.linger_ms.to_string())
            .set("message.timeout.ms", self.message_timeout_ms.to_string());
        client_config
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            default_topic: "messages".to_string(),
            compression: "snappy".to_string(),
            acks: "1".to_string(),
            linger_ms: 500,
            message_timeout_ms: 300_000, // librdkafka default, 5 minutes
            metadata_timeout_secs: 10,
            close_timeout_secs: 30,
            connect_retries: 5,
            connect_retry_delay_secs: 30,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 10,
            error_backoff_secs: 5,
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("error_backoff_secs", &self.error_backoff_secs)
            .finish()
    }
}

/// Splits a comma-separated broker list, trimming blanks.
pub fn parse_brokers(brokers: &str) -> Vec<String> {
    brokers
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

//! Error types and result handling for tg-inbox-proxy.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! The variants fall into two groups. Stage-local errors ([`Error::Validation`],
//! [`Error::Serialization`], [`Error::EmptyDestination`]) are returned
//! synchronously from the pipeline and only cost the one message. Process-level
//! errors ([`Error::Bootstrap`], [`Error::Config`]) stop the service.
//!
//! # Example
//!
//! ```rust
//! use tg_inbox_proxy::{Error, Result};
//!
//! fn resolve(topic: &str) -> Result<&str> {
//!     if topic.is_empty() {
//!         return Err(Error::EmptyDestination);
//!     }
//!     Ok(topic)
//! }
//!
//! match resolve("") {
//!     Err(Error::EmptyDestination) => eprintln!("topic mapping is misconfigured"),
//!     Err(e) => eprintln!("other error: {}", e),
//!     Ok(topic) => println!("sending to {}", topic),
//! }
//! ```

use thiserror::Error;

/// The main error type for tg-inbox-proxy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the CLI, config file or environment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inbound event is structurally incomplete and was dropped.
    #[error("message validation error: {reason}")]
    Validation {
        /// Which part of the event was missing or empty
        reason: String,
    },

    /// The validated record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The destination resolver produced an empty topic name.
    #[error("empty destination")]
    EmptyDestination,

    /// The producer's local queue is full; the enqueue can be retried.
    #[error("producer queue is full")]
    QueueFull,

    /// The sender was already closed and refuses new deliveries.
    #[error("sender is closed")]
    SenderClosed,

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The broker stayed unreachable for every bootstrap attempt.
    #[error("failed to create kafka producer after {attempts} attempts: {source}")]
    Bootstrap {
        /// Number of connection attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: Box<Error>,
    },

    /// Telegram Bot API request error.
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// I/O error, typically from the file sink.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from a collaborator not covered by a specific variant.
    #[error("{context}: {source}")]
    External {
        /// What was being attempted
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Graceful shutdown was requested (e.g., via Ctrl+C).
    ///
    /// This is not really an error but uses the error mechanism
    /// to leave the bootstrap retry loop early.
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors that only affect the message being processed.
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::Serialization(_) | Error::EmptyDestination
        )
    }
}

impl From<prost::EncodeError> for Error {
    fn from(e: prost::EncodeError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// A convenient Result type alias for tg-inbox-proxy operations.
///
/// This is equivalent to `std::result::Result<T, tg_inbox_proxy::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! The record published to Kafka for every accepted message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of message kinds the pipeline knows how to publish.
///
/// The tag returned by [`MessageKind::as_str`] is written into the `type`
/// field of every [`ValidatedMessage`]; consumers switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(MessageKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized projection of an inbound chat message.
///
/// Field tags match the `message.Message` protobuf schema that downstream
/// consumers decode, so the struct can be written as protobuf or as JSON.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct ValidatedMessage {
    #[prost(int32, tag = "1")]
    pub message_id: i32,
    #[prost(int64, tag = "2")]
    pub user_id: i64,
    #[prost(string, tag = "3")]
    #[serde(rename = "type")]
    pub kind: String,
    #[prost(bytes = "vec", tag = "4")]
    #[serde(with = "base64_content")]
    pub content: Vec<u8>,
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
}

impl ValidatedMessage {
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.kind)
    }

    /// Content as UTF-8 text, for text messages.
    pub fn text(&self) -> Option<&str> {
        match self.message_kind() {
            Some(MessageKind::Text) => std::str::from_utf8(&self.content).ok(),
            None => None,
        }
    }
}

mod base64_content {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

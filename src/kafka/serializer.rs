use crate::{message::ValidatedMessage, Result};
use prost::Message;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Wire encoding of the published record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Protobuf,
    Json,
}

impl RecordFormat {
    pub fn encode(&self, message: &ValidatedMessage) -> Result<Vec<u8>> {
        match self {
            RecordFormat::Protobuf => Ok(message.encode_to_vec()),
            RecordFormat::Json => serde_json::to_vec(message).map_err(Into::into),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ValidatedMessage> {
        match self {
            RecordFormat::Protobuf => ValidatedMessage::decode(bytes).map_err(Into::into),
            RecordFormat::Json => serde_json::from_slice(bytes).map_err(Into::into),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "protobuf" | "proto" => Ok(RecordFormat::Protobuf),
            "json" => Ok(RecordFormat::Json),
            other => Err(format!("unknown record format '{}'", other)),
        }
    }
}

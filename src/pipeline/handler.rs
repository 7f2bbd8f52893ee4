use crate::event::InboundEvent;
use crate::kafka::{PartitionKey, RecordFormat};
use crate::message::{MessageKind, ValidatedMessage};
use crate::pipeline::validate::validate;
use crate::{Error, Result};
use bytes::Bytes;

/// Serialized record plus the optional key steering its partition.
pub type HandledRecord = (Bytes, Option<PartitionKey>);

/// Turns an inbound event into a wire record, one variant per message kind.
///
/// New kinds are added here and in [`MessageKind`]; there is no runtime
/// registration.
#[derive(Debug, Clone)]
pub enum RecordHandler {
    Text(TextMessageHandler),
}

impl RecordHandler {
    pub fn text(format: RecordFormat) -> Self {
        RecordHandler::Text(TextMessageHandler::new(format))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            RecordHandler::Text(_) => MessageKind::Text,
        }
    }

    pub fn handle(&self, event: &InboundEvent) -> Result<HandledRecord> {
        match self {
            RecordHandler::Text(handler) => handler.handle(event),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextMessageHandler {
    format: RecordFormat,
}

impl TextMessageHandler {
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    /// Validates and encodes a text message. Text records carry no key, so
    /// the broker's default partitioner applies.
    pub fn handle(&self, event: &InboundEvent) -> Result<HandledRecord> {
        validate(event)?;

        let message = event
            .message
            .as_ref()
            .ok_or_else(|| Error::validation("nil update.message"))?;
        let sender = message
            .sender
            .as_ref()
            .ok_or_else(|| Error::validation("nil update.message.sender"))?;
        let user_id = i64::try_from(sender.id)
            .map_err(|_| Error::Serialization(format!("user id {} out of range", sender.id)))?;

        let record = ValidatedMessage {
            message_id: message.id,
            user_id,
            kind: MessageKind::Text.to_string(),
            content: event.text().as_bytes().to_vec(),
            timestamp: message.timestamp(),
        };

        let bytes = self.format.encode(&record)?;
        Ok((Bytes::from(bytes), None))
    }
}

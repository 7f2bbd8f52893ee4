use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{Message, Update, UpdateKind};

/// One unit of received chat activity, as seen by the pipeline.
///
/// Built from a Telegram [`Update`] and discarded after a single pipeline
/// pass. The optional fields mirror what the Bot API may leave out; the
/// validator decides whether an event is complete enough to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub update_id: u32,
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: i32,
    pub sender: Option<EventSender>,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSender {
    pub id: u64,
    pub username: Option<String>,
}

impl InboundEvent {
    pub fn new(update_id: u32, message: Option<InboundMessage>) -> Self {
        Self { update_id, message }
    }

    /// Text of the underlying message, or `""` when there is none.
    pub fn text(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .unwrap_or("")
    }

    pub fn sender_id(&self) -> Option<u64> {
        self.message
            .as_ref()
            .and_then(|m| m.sender.as_ref())
            .map(|s| s.id)
    }

    /// Converts a Telegram update into an event.
    ///
    /// Returns `None` for update kinds that carry no chat message
    /// (callback queries, polls, membership changes, ...).
    pub fn from_update(update: &Update) -> Option<Self> {
        match &update.kind {
            UpdateKind::Message(msg) => Some(Self::new(update.id.0, Some(msg.into()))),
            _ => None,
        }
    }
}

impl InboundMessage {
    pub fn timestamp(&self) -> i64 {
        self.date.timestamp()
    }
}

impl From<&Message> for InboundMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.0,
            sender: msg.from.as_ref().map(|user| EventSender {
                id: user.id.0,
                username: user.username.clone(),
            }),
            text: msg.text().map(str::to_owned),
            date: msg.date,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn message_json(message_id: i32, sender_id: Option<u64>, extra: Value) -> Value {
        let mut message = json!({
            "message_id": message_id,
            "date": 1_700_000_000,
            "chat": { "id": 777, "type": "private", "first_name": "Ann" },
        });
        if let Some(id) = sender_id {
            message["from"] = json!({
                "id": id,
                "is_bot": false,
                "first_name": "Ann",
                "username": format!("user{}", id),
            });
        }
        if let Value::Object(extra) = extra {
            for (key, value) in extra {
                message[key.as_str()] = value;
            }
        }
        message
    }

    fn update(update_id: u32, field: &str, message: Value) -> Update {
        let mut update = json!({ "update_id": update_id });
        update[field] = message;
        serde_json::from_str(&update.to_string()).unwrap()
    }

    /// A Telegram text message update; the message id is `update_id + 100`.
    pub fn text_update(update_id: u32, sender_id: u64, text: &str) -> Update {
        update(
            update_id,
            "message",
            message_json(update_id as i32 + 100, Some(sender_id), json!({ "text": text })),
        )
    }

    pub fn anonymous_text_update(update_id: u32, text: &str) -> Update {
        update(
            update_id,
            "message",
            message_json(update_id as i32 + 100, None, json!({ "text": text })),
        )
    }

    pub fn photo_update(update_id: u32, sender_id: u64) -> Update {
        let photo = json!({
            "photo": [{
                "file_id": "photo-file",
                "file_unique_id": "photo-unique",
                "width": 90,
                "height": 60,
                "file_size": 1024,
            }],
        });
        update(
            update_id,
            "message",
            message_json(update_id as i32 + 100, Some(sender_id), photo),
        )
    }

    pub fn edited_update(update_id: u32, sender_id: u64, text: &str) -> Update {
        let mut message =
            message_json(update_id as i32 + 100, Some(sender_id), json!({ "text": text }));
        message["edit_date"] = json!(1_700_000_100);
        update(update_id, "edited_message", message)
    }

    pub fn text_event(update_id: u32, sender_id: u64, text: &str) -> InboundEvent {
        InboundEvent::new(
            update_id,
            Some(InboundMessage {
                id: update_id as i32 + 100,
                sender: Some(EventSender {
                    id: sender_id,
                    username: Some(format!("user{}", sender_id)),
                }),
                text: Some(text.to_string()),
                date: Utc.timestamp_opt(1_700_000_000 + update_id as i64, 0).unwrap(),
            }),
        )
    }
}

use crate::event::InboundEvent;
use crate::{Error, Result};

/// Rejects events that cannot produce a publishable record.
///
/// Cheap and side-effect free; runs before any serialization work.
pub fn validate(event: &InboundEvent) -> Result<()> {
    let message = event
        .message
        .as_ref()
        .ok_or_else(|| Error::validation("nil update.message"))?;

    if message.sender.is_none() {
        return Err(Error::validation("nil update.message.sender"));
    }

    if message.text.as_deref().unwrap_or("").trim().is_empty() {
        return Err(Error::validation("empty message"));
    }

    Ok(())
}

use crate::event::InboundEvent;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// A gate evaluated before the handler runs.
///
/// Filters only read the event. They may call out to external services
/// (rate limiters, allowlists) but must not mutate pipeline state.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(&self, event: &InboundEvent) -> Result<()>;
}

/// Ordered filters; the first failure wins and is returned as-is.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub async fn run(&self, event: &InboundEvent) -> Result<()> {
        for filter in &self.filters {
            filter.filter(event).await?;
        }
        Ok(())
    }
}

/// Only lets through messages from the listed Telegram user ids.
#[derive(Debug, Clone)]
pub struct AllowlistFilter {
    allowed: HashSet<u64>,
}

impl AllowlistFilter {
    pub fn new(allowed: impl IntoIterator<Item = u64>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Filter for AllowlistFilter {
    async fn filter(&self, event: &InboundEvent) -> Result<()> {
        match event.sender_id() {
            Some(id) if self.allowed.contains(&id) => Ok(()),
            Some(id) => Err(Error::validation(format!("sender {} is not allowed", id))),
            None => Err(Error::validation("nil update.message.sender")),
        }
    }
}

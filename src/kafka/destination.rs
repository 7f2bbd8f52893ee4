/// Maps a logical message class to a physical topic name.
///
/// An empty string means the mapping is unresolved; senders treat it as a
/// configuration fault and refuse to publish.
pub trait Destination: Send + Sync {
    fn resolve(&self) -> &str;
}

/// A fixed topic, typically the configured default topic.
#[derive(Debug, Clone)]
pub struct TopicDestination {
    topic: String,
}

impl TopicDestination {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl Destination for TopicDestination {
    fn resolve(&self) -> &str {
        &self.topic
    }
}

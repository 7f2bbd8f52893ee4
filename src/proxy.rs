use crate::config::Config;
use crate::kafka::{bootstrap_producer, ErrorDrain, KafkaSender, TopicDestination};
use crate::pipeline::{AllowlistFilter, Dispatcher, FileSender, FilterChain, Pipe, RecordHandler, Sender};
use crate::shutdown::ShutdownCoordinator;
use crate::telegram::{connect_bot, TelegramPoller};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Wires the Telegram source, the text pipeline and the sender together
/// and runs them until shutdown.
pub struct InboxProxy {
    config: Config,
}

impl InboxProxy {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self, coordinator: ShutdownCoordinator) -> Result<()> {
        info!("inbox proxy starting");
        let token = coordinator.token();

        let bot = connect_bot(&self.config.telegram).await?;

        let (sender, drain) = match self.build_sender(&coordinator).await {
            Err(Error::Shutdown) => {
                info!("shutdown requested during startup");
                return Ok(());
            }
            other => other?,
        };

        let filters = self.build_filters();
        info!(
            filters = filters.len(),
            format = ?self.config.pipeline.format,
            "message pipeline ready"
        );
        let pipe = Pipe::new(
            filters,
            RecordHandler::text(self.config.pipeline.format),
            Arc::clone(&sender),
        );
        let dispatcher = Dispatcher::new(Arc::new(pipe), token);
        let poller = TelegramPoller::new(bot, &self.config.telegram, dispatcher);

        coordinator.run(Arc::new(poller), sender, drain).await
    }

    async fn build_sender(
        &self,
        coordinator: &ShutdownCoordinator,
    ) -> Result<(Arc<dyn Sender>, Option<ErrorDrain>)> {
        if let Some(path) = &self.config.pipeline.output_file {
            let sender = FileSender::create(path, self.config.pipeline.format).await?;
            return Ok((Arc::new(sender), None));
        }

        let kafka = &self.config.kafka;
        let (producer, drain) = bootstrap_producer(kafka, &coordinator.token()).await?;
        let destination = Arc::new(TopicDestination::new(&kafka.default_topic));
        let sender = KafkaSender::new(destination, Arc::new(producer));
        Ok((Arc::new(sender), Some(drain)))
    }

    fn build_filters(&self) -> FilterChain {
        let mut filters = FilterChain::default();
        let allowed = &self.config.pipeline.allowed_users;
        if !allowed.is_empty() {
            info!(users = allowed.len(), "sender allowlist enabled");
            filters.push(Arc::new(AllowlistFilter::new(allowed.iter().copied())));
        }
        filters
    }
}

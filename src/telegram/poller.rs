use crate::config::TelegramConfig;
use crate::event::InboundEvent;
use crate::pipeline::Dispatcher;
use crate::shutdown::EventSource;
use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::time::Duration;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, Update, UpdateKind},
    ApiError, RequestError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time the HTTP client waits beyond the long-poll timeout, so the
/// request is not aborted before Telegram answers.
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);

/// The `getUpdates` call the poller depends on.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    /// Fetches updates with id `>= offset`, confirming every earlier one.
    async fn fetch_updates(
        &self,
        offset: i32,
        timeout_secs: u32,
        limit: Option<u8>,
    ) -> std::result::Result<Vec<Update>, RequestError>;
}

#[async_trait]
impl UpdateFeed for Bot {
    async fn fetch_updates(
        &self,
        offset: i32,
        timeout_secs: u32,
        limit: Option<u8>,
    ) -> std::result::Result<Vec<Update>, RequestError> {
        let mut request = Requester::get_updates(self)
            .offset(offset)
            .timeout(timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message]);
        if let Some(limit) = limit {
            request = request.limit(limit);
        }
        request.send().await
    }
}

/// What happened to one update handed to [`TelegramPoller::route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Admitted,
    Ignored,
    /// Shutdown has started; the update stays unconfirmed.
    Refused,
}

/// Poll offsets: the next update id wanted, and the one Telegram last saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Offsets {
    next: i32,
    confirmed: i32,
}

/// Long-polls `getUpdates` and hands every text message to the dispatcher.
pub struct TelegramPoller<F: UpdateFeed = Bot> {
    feed: F,
    dispatcher: Dispatcher,
    poll_timeout_secs: u32,
    error_backoff: Duration,
}

/// Builds the bot client, verifies the token and clears any webhook so
/// long polling works.
pub async fn connect_bot(config: &TelegramConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(config.poll_timeout_secs.into()) + CLIENT_TIMEOUT_MARGIN)
        .build()
        .map_err(|e| Error::external("failed to build telegram http client", e))?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;
    info!(username = ?me.username, "telegram bot connected (webhook cleared)");

    Ok(bot)
}

impl<F: UpdateFeed> TelegramPoller<F> {
    pub fn new(feed: F, config: &TelegramConfig, dispatcher: Dispatcher) -> Self {
        Self {
            feed,
            dispatcher,
            poll_timeout_secs: config.poll_timeout_secs,
            error_backoff: Duration::from_secs(config.error_backoff_secs),
        }
    }

    async fn poll(&self, shutdown: &CancellationToken, offsets: &mut Offsets) -> Result<()> {
        info!("starting telegram polling loop");

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let requested = offsets.next;
            let fetch = self
                .feed
                .fetch_updates(requested, self.poll_timeout_secs, None);

            // Nothing from an unanswered poll has been admitted yet, and
            // unconfirmed updates are redelivered on the next start.
            let result = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                result = fetch => result,
            };

            match result {
                Ok(updates) => {
                    offsets.confirmed = requested;
                    debug!(count = updates.len(), "got telegram updates");
                    offsets.next = self.admit_batch(updates, offsets.next);
                }
                Err(e @ RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    warn!("another bot instance is already polling with this token");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }
    }

    /// Routes `updates` in order and returns the offset to poll from next.
    ///
    /// The offset only moves past updates that were admitted or ignored; a
    /// refused update and everything after it are left for redelivery.
    fn admit_batch(&self, updates: Vec<Update>, mut offset: i32) -> i32 {
        for update in updates {
            let next = update.id.as_offset();
            if self.route(&update) == Routing::Refused {
                break;
            }
            offset = next;
        }
        offset
    }

    fn route(&self, update: &Update) -> Routing {
        match &update.kind {
            UpdateKind::Message(msg) if msg.text().is_some() => {
                match InboundEvent::from_update(update) {
                    Some(event) => {
                        if self.dispatcher.dispatch(event) {
                            Routing::Admitted
                        } else {
                            Routing::Refused
                        }
                    }
                    None => Routing::Ignored,
                }
            }
            _ => {
                debug!(update_id = update.id.0, "ignoring non-text update");
                Routing::Ignored
            }
        }
    }

    /// Tells Telegram that everything before `offsets.next` was handled, so
    /// a restart does not receive it again.
    async fn confirm(&self, offsets: Offsets) {
        if offsets.next == offsets.confirmed {
            return;
        }
        match self.feed.fetch_updates(offsets.next, 0, Some(1)).await {
            Ok(_) => debug!(offset = offsets.next, "confirmed telegram offset"),
            Err(e) => warn!(error = %e, offset = offsets.next, "failed to confirm telegram offset"),
        }
    }
}

#[async_trait]
impl<F: UpdateFeed> EventSource for TelegramPoller<F> {
    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut offsets = Offsets::default();
        let result = self.poll(&shutdown, &mut offsets).await;
        self.dispatcher.drain().await;
        self.confirm(offsets).await;
        info!("telegram polling stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_utils::{edited_update, photo_update, text_update};
    use crate::kafka::{PartitionKey, RecordFormat};
    use crate::pipeline::{FilterChain, Pipe, RecordHandler, Sender};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingSender {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Sender for CountingSender {
        async fn send(&self, _payload: Bytes, _key: Option<PartitionKey>) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Serves queued batches, then cancels `shutdown` and hangs like an
    /// idle long poll.
    struct ScriptedFeed {
        batches: Mutex<VecDeque<Vec<Update>>>,
        calls: Mutex<Vec<(i32, u32, Option<u8>)>>,
        shutdown: CancellationToken,
    }

    impl ScriptedFeed {
        fn new(batches: Vec<Vec<Update>>, shutdown: CancellationToken) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                calls: Mutex::new(Vec::new()),
                shutdown,
            }
        }

        fn calls(&self) -> Vec<(i32, u32, Option<u8>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateFeed for Arc<ScriptedFeed> {
        async fn fetch_updates(
            &self,
            offset: i32,
            timeout_secs: u32,
            limit: Option<u8>,
        ) -> std::result::Result<Vec<Update>, RequestError> {
            self.calls.lock().unwrap().push((offset, timeout_secs, limit));
            if limit.is_some() {
                return Ok(Vec::new());
            }
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => Ok(batch),
                None => {
                    self.shutdown.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    fn poller(
        feed: Arc<ScriptedFeed>,
        shutdown: &CancellationToken,
    ) -> (TelegramPoller<Arc<ScriptedFeed>>, Arc<CountingSender>) {
        let sender = Arc::new(CountingSender::default());
        let pipe = Pipe::new(
            FilterChain::default(),
            RecordHandler::text(RecordFormat::Protobuf),
            sender.clone(),
        );
        let dispatcher = Dispatcher::new(Arc::new(pipe), shutdown.clone());
        let config = TelegramConfig::default();
        (TelegramPoller::new(feed, &config, dispatcher), sender)
    }

    #[tokio::test]
    async fn test_last_offset_is_confirmed_on_stop() {
        let shutdown = CancellationToken::new();
        let feed = Arc::new(ScriptedFeed::new(
            vec![vec![text_update(5, 42, "first"), text_update(6, 42, "second")]],
            shutdown.clone(),
        ));
        let (poller, sender) = poller(feed.clone(), &shutdown);

        poller.run(shutdown.clone()).await.unwrap();

        assert_eq!(sender.sends.load(Ordering::SeqCst), 2);
        assert_eq!(
            feed.calls(),
            vec![(0, 10, None), (7, 10, None), (7, 0, Some(1))]
        );
    }

    #[tokio::test]
    async fn test_no_confirmation_without_new_updates() {
        let shutdown = CancellationToken::new();
        let feed = Arc::new(ScriptedFeed::new(Vec::new(), shutdown.clone()));
        let (poller, _) = poller(feed.clone(), &shutdown);

        poller.run(shutdown.clone()).await.unwrap();

        assert_eq!(feed.calls(), vec![(0, 10, None)]);
    }

    #[tokio::test]
    async fn test_only_text_messages_are_routed() {
        let shutdown = CancellationToken::new();
        let feed = Arc::new(ScriptedFeed::new(Vec::new(), shutdown.clone()));
        let (poller, sender) = poller(feed, &shutdown);

        assert_eq!(poller.route(&text_update(1, 42, "hello")), Routing::Admitted);
        assert_eq!(poller.route(&photo_update(2, 42)), Routing::Ignored);
        assert_eq!(poller.route(&edited_update(3, 42, "edited")), Routing::Ignored);

        poller.dispatcher.drain().await;
        assert_eq!(sender.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ignored_updates_advance_offset() {
        let shutdown = CancellationToken::new();
        let feed = Arc::new(ScriptedFeed::new(Vec::new(), shutdown.clone()));
        let (poller, _) = poller(feed, &shutdown);

        let next = poller.admit_batch(vec![photo_update(8, 1), text_update(9, 1, "hi")], 0);

        assert_eq!(next, 10);
        poller.dispatcher.drain().await;
    }

    #[tokio::test]
    async fn test_refused_updates_stay_unconfirmed() {
        let shutdown = CancellationToken::new();
        let feed = Arc::new(ScriptedFeed::new(Vec::new(), shutdown.clone()));
        let (poller, sender) = poller(feed, &shutdown);
        shutdown.cancel();

        let next = poller.admit_batch(
            vec![photo_update(3, 1), text_update(4, 1, "late"), photo_update(5, 1)],
            3,
        );

        assert_eq!(next, 4);
        assert_eq!(poller.route(&text_update(6, 1, "late")), Routing::Refused);
        poller.dispatcher.drain().await;
        assert_eq!(sender.sends.load(Ordering::SeqCst), 0);
    }
}

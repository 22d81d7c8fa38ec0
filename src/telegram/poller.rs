//! Long-polling update source, used when no public webhook URL exists.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::resilience::RetryPolicy;
use crate::telegram::bot::BotDispatcher;
use crate::telegram::client::TelegramClient;

pub struct UpdatePoller {
    client: Arc<TelegramClient>,
    dispatcher: Arc<BotDispatcher>,
    poll_timeout: Duration,
    backoff: RetryPolicy,
}

impl UpdatePoller {
    pub fn new(
        client: Arc<TelegramClient>,
        dispatcher: Arc<BotDispatcher>,
        poll_timeout: Duration,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            client,
            dispatcher,
            poll_timeout,
            backoff,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Err(e) = self.client.delete_webhook().await {
            tracing::warn!(error = %e, "Failed to delete webhook before polling");
        }
        tracing::info!(timeout = ?self.poll_timeout, "Update poller starting");

        let mut offset = 0;
        let mut failures = 0;

        loop {
            let updates = tokio::select! {
                result = self.client.get_updates(offset, self.poll_timeout) => result,
                _ = shutdown.recv() => {
                    tracing::info!("Update poller received shutdown signal, exiting loop");
                    break;
                }
            };

            match updates {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatcher.dispatch(update).await;
                    }
                }
                Err(e) => {
                    failures += 1;
                    let delay = self.backoff.delay_before(failures + 1);
                    tracing::warn!(error = %e, attempt = failures, delay = ?delay, "getUpdates failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => break,
                    }
                }
            }
        }
    }
}

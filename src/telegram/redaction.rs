//! Delayed deletion of messages that carry secrets.
//!
//! Each redaction is a timer task: it sleeps for the delay, then asks the
//! channel to delete the message once. Failures are logged, never retried
//! and never shown to the user. Shutting down cuts the remaining delays
//! short instead of dropping the deletions.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::channel::{ChannelError, MessageChannel};

/// A scheduled deletion could not be carried out.
#[derive(Debug, Error)]
#[error("Failed to delete message {message_id} in chat {chat_id}: {source}")]
pub struct RedactionFailure {
    pub chat_id: i64,
    pub message_id: i32,
    #[source]
    pub source: ChannelError,
}

/// Schedules best-effort message deletions.
pub struct RedactionScheduler {
    channel: Arc<dyn MessageChannel>,
    shutdown: CancellationToken,
    pending: TaskTracker,
}

impl RedactionScheduler {
    #[must_use]
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            channel,
            shutdown: CancellationToken::new(),
            pending: TaskTracker::new(),
        }
    }

    /// Deletes `message_id` from `chat_id` once `delay` has elapsed.
    ///
    /// Returns immediately; the handle may be dropped.
    pub fn schedule_redaction(
        &self,
        chat_id: i64,
        message_id: i32,
        delay: Duration,
    ) -> JoinHandle<()> {
        let channel = Arc::clone(&self.channel);
        let flush = self.shutdown.child_token();
        debug!(
            "Scheduled deletion of message {} in {}s",
            message_id,
            delay.as_secs()
        );

        self.pending.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = flush.cancelled() => {
                    debug!("Shutting down, deleting message {} now", message_id);
                }
            }

            match redact(channel.as_ref(), chat_id, message_id).await {
                Ok(()) => info!("Deleted message {} in chat {}", message_id, chat_id),
                Err(e) => warn!("{}", e),
            }
        })
    }

    /// Runs every pending deletion now and waits up to `grace` for them.
    ///
    /// Returns `false` if some deletions were still running when `grace`
    /// ran out. Deletions scheduled afterwards run without delay.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.pending.close();
        if !self.pending.is_empty() {
            info!("Deleting {} pending message(s) before exit", self.pending.len());
        }
        timeout(grace, self.pending.wait()).await.is_ok()
    }
}

impl std::fmt::Debug for RedactionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactionScheduler")
            .field("shut_down", &self.shutdown.is_cancelled())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

async fn redact(
    channel: &dyn MessageChannel,
    chat_id: i64,
    message_id: i32,
) -> Result<(), RedactionFailure> {
    channel
        .delete_message(chat_id, message_id)
        .await
        .map_err(|source| RedactionFailure {
            chat_id,
            message_id,
            source,
        })
}

//! Recording message channel used by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::channel::{ChannelError, MessageChannel};

#[derive(Debug, Default)]
pub(crate) struct RecordingChannel {
    sent: Mutex<Vec<(i64, String)>>,
    deleted: Mutex<Vec<(i64, i32)>>,
    fail_deletes: AtomicBool,
}

impl RecordingChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every delete fails as if the message were already gone.
    pub(crate) fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<(i64, i32)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((chat_id, text.to_owned()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChannelError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ChannelError::Api(
                "Bad Request: message to delete not found".to_owned(),
            ));
        }
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }
}

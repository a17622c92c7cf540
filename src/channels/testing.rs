//! In-memory channel client for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::channels::{ChannelClient, EventStream};
use crate::error::ChannelError;
use crate::identity::CorrespondentAddress;

/// Records every send and read receipt. Sends can be made to fail.
#[derive(Default)]
pub struct RecordingClient {
    pub sent: Mutex<Vec<(CorrespondentAddress, String)>>,
    pub read: Mutex<Vec<(Vec<String>, CorrespondentAddress)>>,
    fail_sends: Mutex<bool>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, to: &CorrespondentAddress, text: &str) -> Result<(), ChannelError> {
        if *self.fail_sends.lock().unwrap() {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "send disabled".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.clone(), text.to_string()));
        Ok(())
    }

    async fn mark_read(
        &self,
        message_ids: &[String],
        sender: &CorrespondentAddress,
    ) -> Result<(), ChannelError> {
        self.read
            .lock()
            .unwrap()
            .push((message_ids.to_vec(), sender.clone()));
        Ok(())
    }

    async fn disconnect(&self) {}
}

//! Relay producer: appends conversation entries to the outbound stream.

use std::sync::Arc;

use tracing::debug;

use crate::error::DatabaseError;
use crate::identity::AnonymizedId;
use crate::relay::wire::{MessageSource, RelayMessage};
use crate::store::Database;

/// Publishes correspondent text and echoed auto-replies.
#[derive(Clone)]
pub struct RelayProducer {
    db: Arc<dyn Database>,
    stream: String,
}

impl RelayProducer {
    pub fn new(db: Arc<dyn Database>, stream: impl Into<String>) -> Self {
        Self {
            db,
            stream: stream.into(),
        }
    }

    /// Publish text a correspondent sent.
    pub async fn publish(&self, id: &AnonymizedId, text: &str) -> Result<i64, DatabaseError> {
        self.append(id, text, MessageSource::Channel).await
    }

    /// Publish a copy of an auto-reply that was sent.
    pub async fn publish_auto_response(
        &self,
        id: &AnonymizedId,
        text: &str,
    ) -> Result<i64, DatabaseError> {
        self.append(id, text, MessageSource::AutoResponse).await
    }

    async fn append(
        &self,
        id: &AnonymizedId,
        text: &str,
        source: MessageSource,
    ) -> Result<i64, DatabaseError> {
        let message = RelayMessage::now(id.clone(), text);
        let entry_id = self
            .db
            .stream_append(&self.stream, &message.to_fields(source))
            .await?;
        debug!(stream = %self.stream, entry_id, anon_id = %id, %source, "Published relay entry");
        Ok(entry_id)
    }
}

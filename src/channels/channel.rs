//! Channel client abstraction: the transport the relay talks through.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::identity::CorrespondentAddress;

/// Stream of events produced by a started channel client.
pub type EventStream = Pin<Box<dyn Stream<Item = ChannelEvent> + Send>>;

/// Everything a channel client can report.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A message arrived.
    Message(InboundMessage),
    /// The session is established.
    Connected,
    /// The session dropped; the client may reconnect on its own.
    Disconnected { reason: String },
    /// The pairing was revoked and the client needs a fresh login.
    LoggedOut,
}

/// Message payload as delivered by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain conversation text.
    Text { text: String },
    /// Text carrying extras such as a quoted message or link preview.
    ExtendedText {
        text: String,
        quoted: Option<String>,
    },
    /// Anything without text of its own (media, stickers, reactions, ...).
    Other,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        MessageBody::Text { text: text.into() }
    }

    /// The text a human wrote, or `""` when there is none.
    pub fn extract_text(&self) -> &str {
        match self {
            MessageBody::Text { text } => text,
            MessageBody::ExtendedText { text, .. } => text,
            MessageBody::Other => "",
        }
    }
}

/// An inbound message from a correspondent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel-native message ID.
    pub id: String,
    pub sender: CorrespondentAddress,
    /// When the sender's device says the message was sent.
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
    /// Sent by the account this client is logged in as.
    #[serde(default)]
    pub from_me: bool,
}

impl InboundMessage {
    pub fn new(
        id: impl Into<String>,
        sender: CorrespondentAddress,
        timestamp: DateTime<Utc>,
        body: MessageBody,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            timestamp,
            body,
            from_me: false,
        }
    }
}

/// Transport used by the relay: an event source plus send/read-receipt calls.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Channel name (e.g. "telegram", "console").
    fn name(&self) -> &str;

    /// Connect and start producing events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send plain text to a correspondent.
    async fn send(&self, to: &CorrespondentAddress, text: &str) -> Result<(), ChannelError>;

    /// Mark messages from `sender` as read.
    async fn mark_read(
        &self,
        message_ids: &[String],
        sender: &CorrespondentAddress,
    ) -> Result<(), ChannelError>;

    /// Drop the session. In-flight work is not awaited.
    async fn disconnect(&self);
}

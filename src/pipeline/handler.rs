//! Message handler: the per-event path from a correspondent to the operators.
//!
//! Flow for a message:
//! 1. Skip our own messages
//! 2. Boot freshness filter
//! 3. Read receipt (best effort)
//! 4. Extract text, drop if empty
//! 5. Resolve or mint the anonymized ID
//! 6. Publish to the outbound stream
//! 7. Auto-response policy: send, echo, mark

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::{ChannelClient, ChannelEvent, InboundMessage};
use crate::config::Phrases;
use crate::error::DatabaseError;
use crate::identity::{AnonymizedId, CorrespondentAddress, IdentityStore};
use crate::pipeline::freshness::FreshnessFilter;
use crate::pipeline::policy::{self, AutoReply};
use crate::relay::RelayProducer;
use crate::suppression::{Category, SuppressionTracker};

/// What the handler did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Sent by this account.
    FromSelf,
    /// Older than the boot grace window.
    Stale,
    /// Nothing textual to relay.
    Empty,
    /// A store step failed; the message was dropped.
    Dropped,
    /// Published, with this many auto-replies sent.
    Relayed { replies: usize },
}

/// Handles channel events. Shared via `Arc`, one task per event.
pub struct MessageHandler {
    client: Arc<dyn ChannelClient>,
    identities: IdentityStore,
    suppression: SuppressionTracker,
    producer: RelayProducer,
    freshness: FreshnessFilter,
    phrases: Phrases,
}

impl MessageHandler {
    pub fn new(
        client: Arc<dyn ChannelClient>,
        identities: IdentityStore,
        suppression: SuppressionTracker,
        producer: RelayProducer,
        freshness: FreshnessFilter,
        phrases: Phrases,
    ) -> Self {
        Self {
            client,
            identities,
            suppression,
            producer,
            freshness,
            phrases,
        }
    }

    pub async fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => {
                let outcome = self.handle_message(&message).await;
                debug!(message_id = %message.id, ?outcome, "Message handled");
            }
            ChannelEvent::Connected => {
                info!(channel = self.client.name(), "Channel connected");
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(channel = self.client.name(), %reason, "Channel disconnected");
            }
            ChannelEvent::LoggedOut => {
                warn!(channel = self.client.name(), "Channel logged out, a new login is required");
            }
        }
    }

    pub async fn handle_message(&self, message: &InboundMessage) -> MessageOutcome {
        if message.from_me {
            return MessageOutcome::FromSelf;
        }

        if !self.freshness.is_fresh(message.timestamp) {
            debug!(
                message_id = %message.id,
                timestamp = %message.timestamp,
                "Dropping message from before the startup window"
            );
            return MessageOutcome::Stale;
        }

        let sender = message.sender.to_non_device();

        if let Err(e) = self
            .client
            .mark_read(std::slice::from_ref(&message.id), &sender)
            .await
        {
            warn!(message_id = %message.id, error = %e, "Failed to mark message read");
        }

        let text = message.body.extract_text();
        if text.is_empty() {
            return MessageOutcome::Empty;
        }

        let id = match self.identities.resolve_or_mint(&sender).await {
            Ok(id) => id,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Failed to resolve anonymized ID");
                return MessageOutcome::Dropped;
            }
        };

        if let Err(e) = self.producer.publish(&id, text).await {
            error!(anon_id = %id, error = %e, "Failed to publish inbound message");
            return MessageOutcome::Dropped;
        }

        let (thank_you, disclaimer) = match self.eligibility(&id).await {
            Ok(flags) => flags,
            Err(e) => {
                error!(anon_id = %id, error = %e, "Failed to read suppression state");
                return MessageOutcome::Dropped;
            }
        };

        let decision = policy::decide(text, thank_you, disclaimer, &self.phrases);
        let mut sent = 0;
        for reply in &decision.replies {
            if self.send_reply(&id, &sender, reply).await {
                sent += 1;
            }
        }

        info!(anon_id = %id, replies = sent, "Relayed inbound message");
        MessageOutcome::Relayed { replies: sent }
    }

    async fn eligibility(&self, id: &AnonymizedId) -> Result<(bool, bool), DatabaseError> {
        let thank_you = self.suppression.eligible(id, Category::ThankYou).await?;
        let disclaimer = self.suppression.eligible(id, Category::Disclaimer).await?;
        Ok((thank_you, disclaimer))
    }

    /// Send one auto-reply, then echo it and set its flag. Returns whether it
    /// went out.
    async fn send_reply(
        &self,
        id: &AnonymizedId,
        to: &CorrespondentAddress,
        reply: &AutoReply,
    ) -> bool {
        if let Err(e) = self.client.send(to, &reply.text).await {
            warn!(anon_id = %id, kind = reply.kind.label(), error = %e, "Failed to send auto-reply");
            return false;
        }

        if let Err(e) = self.producer.publish_auto_response(id, &reply.text).await {
            warn!(anon_id = %id, kind = reply.kind.label(), error = %e, "Failed to echo auto-reply");
        }

        if let Some(category) = reply.kind.suppression() {
            if let Err(e) = self.suppression.mark_sent(id, category).await {
                warn!(anon_id = %id, %category, error = %e, "Failed to set suppression flag");
            }
        }

        true
    }
}

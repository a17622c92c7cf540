//! Reply dispatcher: delivers operator commands to real correspondents.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::channels::ChannelClient;
use crate::error::Error;
use crate::identity::IdentityStore;
use crate::relay::consumer::{CommandAck, ReplyCommand};
use crate::suppression::{Category, SuppressionTracker};

/// What happened to one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent and acknowledged.
    Sent,
    /// No correspondent owns the ID. Acknowledged without sending.
    UnknownTarget,
}

/// Resolves command targets and sends the operator's text.
pub struct ReplyDispatcher {
    identities: IdentityStore,
    suppression: SuppressionTracker,
    client: Arc<dyn ChannelClient>,
    acks: CommandAck,
}

impl ReplyDispatcher {
    pub fn new(
        identities: IdentityStore,
        suppression: SuppressionTracker,
        client: Arc<dyn ChannelClient>,
        acks: CommandAck,
    ) -> Self {
        Self {
            identities,
            suppression,
            client,
            acks,
        }
    }

    /// Dispatch commands until every sender is dropped.
    pub async fn run(self, mut rx: UnboundedReceiver<ReplyCommand>) {
        while let Some(cmd) = rx.recv().await {
            if let Err(e) = self.dispatch(&cmd).await {
                warn!(
                    entry_id = cmd.entry_id,
                    anon_id = %cmd.message.id,
                    error = %e,
                    "Reply dispatch failed, leaving command pending"
                );
            }
        }
        info!("Reply dispatcher stopped");
    }

    /// Handle one command.
    ///
    /// Errors leave the entry pending. A manual reply counts against the
    /// thank-you rate limit like an automatic one.
    pub async fn dispatch(&self, cmd: &ReplyCommand) -> Result<DispatchOutcome, Error> {
        let id = &cmd.message.id;

        let Some(address) = self.identities.reverse_resolve(id).await? else {
            warn!(entry_id = cmd.entry_id, anon_id = %id, "No correspondent for anonymized ID, dropping reply");
            self.acks.ack(cmd.entry_id).await?;
            return Ok(DispatchOutcome::UnknownTarget);
        };

        self.client.send(&address, &cmd.message.msg).await?;
        debug!(entry_id = cmd.entry_id, anon_id = %id, "Operator reply sent");

        // The text is already out; a lost flag only risks one extra thank-you.
        if let Err(e) = self.suppression.mark_sent(id, Category::ThankYou).await {
            warn!(anon_id = %id, error = %e, "Failed to mark thank-you suppression");
        }

        self.acks.ack(cmd.entry_id).await?;
        Ok(DispatchOutcome::Sent)
    }
}

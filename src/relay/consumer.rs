//! Relay consumer: reads operator commands from the inbound stream.
//!
//! Runs as one long-lived loop per process. Entries are claimed through a
//! consumer group, parsed and handed to the dispatcher over an unbounded
//! channel. Acknowledgement is the dispatcher's job, after it has handled the
//! command. Commands left unacknowledged for `claim_idle` are claimed again
//! and retried, including ones held by a consumer name that is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{DatabaseError, RelayError};
use crate::relay::wire::RelayMessage;
use crate::store::{Database, StreamEntry};

/// Upper bound on pending entries replayed at startup.
const PENDING_REPLAY_LIMIT: usize = 1024;

/// Upper bound on idle entries taken over per reclaim pass.
const IDLE_CLAIM_LIMIT: usize = 64;

/// A parsed command plus the stream entry it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyCommand {
    pub entry_id: i64,
    pub message: RelayMessage,
}

/// Acknowledges handled commands on the inbound stream.
#[derive(Clone)]
pub struct CommandAck {
    db: Arc<dyn Database>,
    stream: String,
    group: String,
}

impl CommandAck {
    pub fn new(db: Arc<dyn Database>, stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            db,
            stream: stream.into(),
            group: group.into(),
        }
    }

    /// Returns `false` if the entry was not pending.
    pub async fn ack(&self, entry_id: i64) -> Result<bool, DatabaseError> {
        self.db.stream_ack(&self.stream, &self.group, entry_id).await
    }
}

/// Consumer-group reader for operator commands.
pub struct RelayConsumer {
    db: Arc<dyn Database>,
    stream: String,
    group: String,
    consumer: String,
    poll_interval: Duration,
    claim_idle: Duration,
    /// Set once the startup backlog was handed off. Later runs in the same
    /// process leave in-flight commands to the dispatcher.
    backlog_replayed: AtomicBool,
}

impl RelayConsumer {
    pub fn new(db: Arc<dyn Database>, config: &StreamConfig) -> Self {
        Self {
            db,
            stream: config.inbound.clone(),
            group: config.group.clone(),
            consumer: config.consumer.clone(),
            poll_interval: config.poll_interval,
            claim_idle: config.claim_idle,
            backlog_replayed: AtomicBool::new(false),
        }
    }

    /// Handle for acknowledging entries this consumer delivered.
    pub fn acknowledger(&self) -> CommandAck {
        CommandAck::new(Arc::clone(&self.db), self.stream.clone(), self.group.clone())
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn ensure_group(&self) -> Result<(), RelayError> {
        if self.db.stream_create_group(&self.stream, &self.group).await? {
            info!(stream = %self.stream, group = %self.group, "Created consumer group");
        } else {
            debug!(stream = %self.stream, group = %self.group, "Consumer group already exists");
        }
        Ok(())
    }

    /// Read commands until a fatal error.
    ///
    /// The first run in a process replays entries an earlier process left
    /// pending under the same consumer name. Restarts after that do not, since
    /// those entries may still be with the dispatcher. A malformed entry is
    /// acknowledged and then ends the loop with [`RelayError::Protocol`]. Store
    /// errors end it too.
    pub async fn run(&self, tx: UnboundedSender<ReplyCommand>) -> Result<(), RelayError> {
        self.ensure_group().await?;

        info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "Relay consumer started"
        );

        if !self.backlog_replayed.swap(true, Ordering::SeqCst) {
            let backlog = self
                .db
                .stream_read_pending(&self.stream, &self.group, &self.consumer, PENDING_REPLAY_LIMIT)
                .await?;
            if !backlog.is_empty() {
                info!(count = backlog.len(), "Replaying pending commands");
            }
            for entry in backlog {
                self.forward(entry, &tx).await?;
            }
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_claim = Instant::now();

        loop {
            if last_claim.elapsed() >= self.claim_idle {
                last_claim = Instant::now();
                self.reclaim_idle(&tx).await?;
            }

            let mut batch = self
                .db
                .stream_read_group(&self.stream, &self.group, &self.consumer, 1)
                .await?;

            match batch.pop() {
                Some(entry) => self.forward(entry, &tx).await?,
                None => {
                    interval.tick().await;
                }
            }
        }
    }

    /// Take over commands nobody acknowledged within `claim_idle`.
    async fn reclaim_idle(&self, tx: &UnboundedSender<ReplyCommand>) -> Result<(), RelayError> {
        let idle = self
            .db
            .stream_claim_idle(
                &self.stream,
                &self.group,
                &self.consumer,
                self.claim_idle,
                IDLE_CLAIM_LIMIT,
            )
            .await?;
        if !idle.is_empty() {
            warn!(count = idle.len(), "Retrying unacknowledged commands");
        }
        for entry in idle {
            self.forward(entry, tx).await?;
        }
        Ok(())
    }

    async fn forward(
        &self,
        entry: StreamEntry,
        tx: &UnboundedSender<ReplyCommand>,
    ) -> Result<(), RelayError> {
        let message = match RelayMessage::from_entry(&entry) {
            Ok(m) => m,
            Err(source) => {
                error!(
                    stream = %self.stream,
                    entry_id = entry.id,
                    error = %source,
                    "Malformed command, stopping consumer"
                );
                // Ack first so a restart does not trip over the same entry.
                self.db
                    .stream_ack(&self.stream, &self.group, entry.id)
                    .await?;
                return Err(RelayError::Protocol {
                    stream: self.stream.clone(),
                    entry_id: entry.id,
                    source,
                });
            }
        };

        debug!(entry_id = entry.id, anon_id = %message.id, "Received operator command");
        tx.send(ReplyCommand {
            entry_id: entry.id,
            message,
        })
        .map_err(|_| RelayError::DeliveryClosed)
    }
}

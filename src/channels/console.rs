//! Console channel: stdin/stdout client for local runs.
//!
//! Every stdin line is a message from one fixed local correspondent. Anything
//! sent to a correspondent is printed to stdout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{ChannelClient, ChannelEvent, EventStream, InboundMessage, MessageBody};
use crate::error::ChannelError;
use crate::identity::CorrespondentAddress;

/// A client that reads from stdin and writes to stdout.
pub struct ConsoleClient {
    local: CorrespondentAddress,
    next_id: Arc<AtomicU64>,
}

impl ConsoleClient {
    pub fn new() -> Self {
        Self {
            local: CorrespondentAddress::new("local", "console"),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for ConsoleClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the event for one stdin line, or `None` for blank input.
fn line_to_event(line: &str, sender: &CorrespondentAddress, id: u64) -> Option<ChannelEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(ChannelEvent::Message(InboundMessage::new(
        format!("console-{id}"),
        sender.clone(),
        Utc::now(),
        MessageBody::text(line),
    )))
}

#[async_trait]
impl ChannelClient for ConsoleClient {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = self.local.clone();
        let next_id = Arc::clone(&self.next_id);

        let _ = tx.send(ChannelEvent::Connected);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let id = next_id.fetch_add(1, Ordering::Relaxed);
                        match line_to_event(&line, &sender, id) {
                            Some(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            None => eprint!("> "),
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(ChannelEvent::Disconnected {
                            reason: "stdin closed".into(),
                        });
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(&self, to: &CorrespondentAddress, text: &str) -> Result<(), ChannelError> {
        println!("\n[to {}] {}\n", to, text);
        eprint!("> ");
        Ok(())
    }

    async fn mark_read(
        &self,
        _message_ids: &[String],
        _sender: &CorrespondentAddress,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn disconnect(&self) {}
}

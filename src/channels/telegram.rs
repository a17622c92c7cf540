//! Telegram channel: long-polls the Bot API for updates.
//!
//! Each chat is one correspondent: the chat ID becomes the address user with
//! the server part fixed to `telegram`. Replies are plain `sendMessage` calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{ChannelClient, ChannelEvent, EventStream, InboundMessage, MessageBody};
use crate::error::ChannelError;
use crate::identity::CorrespondentAddress;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Address server part for Telegram chats.
pub const TELEGRAM_SERVER: &str = "telegram";

const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram client: connects to the Bot API via long-polling.
pub struct TelegramClient {
    bot_token: SecretString,
    client: reqwest::Client,
    bot_id: Arc<AtomicI64>,
    stopped: Arc<AtomicBool>,
}

impl TelegramClient {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            bot_id: Arc::new(AtomicI64::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Ask `getMe` who we are so our own messages can be flagged.
    async fn fetch_bot_id(&self) -> Result<i64, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason: e.to_string(),
        })?;

        data.pointer("/result/id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: "getMe response has no bot id".into(),
            })
    }

    /// Send one chunk (≤4096 chars) as plain text.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

#[async_trait]
impl ChannelClient for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let bot_id = self.fetch_bot_id().await?;
        self.bot_id.store(bot_id, Ordering::Relaxed);
        self.stopped.store(false, Ordering::Relaxed);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let stopped = Arc::clone(&self.stopped);

        let _ = tx.send(ChannelEvent::Connected);

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let mut connected = true;

            tracing::info!("Telegram client listening for messages...");

            while !stopped.load(Ordering::Relaxed) {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": LONG_POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        if connected {
                            connected = false;
                            let _ = tx.send(ChannelEvent::Disconnected {
                                reason: e.to_string(),
                            });
                        }
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                // A revoked token will never recover on its own.
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                    let _ = tx.send(ChannelEvent::LoggedOut);
                    return;
                }

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                if !connected {
                    connected = true;
                    let _ = tx.send(ChannelEvent::Connected);
                }

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = update_to_event(update, bot_id) else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }

            tracing::info!("Telegram client stopped polling");
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(&self, to: &CorrespondentAddress, text: &str) -> Result<(), ChannelError> {
        if to.server != TELEGRAM_SERVER {
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("not a telegram address (server {})", to.server),
            });
        }

        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(&to.user, &chunk).await?;
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        _message_ids: &[String],
        _sender: &CorrespondentAddress,
    ) -> Result<(), ChannelError> {
        // Bots have no read receipts.
        Ok(())
    }

    async fn disconnect(&self) {
        tracing::info!("Telegram client shutting down");
        self.stopped.store(true, Ordering::Relaxed);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one `getUpdates` entry into a channel event.
///
/// Returns `None` for updates that carry no message.
fn update_to_event(update: &Value, bot_id: i64) -> Option<ChannelEvent> {
    let message = update.get("message")?;

    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
    let message_id = message
        .get("message_id")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let timestamp = message
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);
    let from_me = message
        .pointer("/from/id")
        .and_then(Value::as_i64)
        .is_some_and(|id| id == bot_id);

    let body = match message.get("text").and_then(Value::as_str) {
        Some(text) => match message.get("reply_to_message") {
            Some(quoted) => MessageBody::ExtendedText {
                text: text.to_string(),
                quoted: quoted.get("text").and_then(Value::as_str).map(String::from),
            },
            None => MessageBody::text(text),
        },
        None => MessageBody::Other,
    };

    let sender = CorrespondentAddress::new(chat_id.to_string(), TELEGRAM_SERVER);
    let mut msg = InboundMessage::new(message_id.to_string(), sender, timestamp, body);
    msg.from_me = from_me;
    Some(ChannelEvent::Message(msg))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        // A limit narrower than one char still has to make progress
        if limit == 0 {
            limit = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

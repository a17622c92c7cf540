//! Relay between correspondents and operators.
//!
//! - `wire`: `{id, ts, msg}` stream entries
//! - `producer`: outbound conversation stream
//! - `consumer`: inbound operator commands via a consumer group
//! - `dispatch`: delivers commands to the real correspondent
//! - `supervisor`: restarts the consumer with backoff

pub mod consumer;
pub mod dispatch;
pub mod producer;
pub mod supervisor;
pub mod wire;

pub use consumer::{CommandAck, RelayConsumer, ReplyCommand};
pub use dispatch::{DispatchOutcome, ReplyDispatcher};
pub use producer::RelayProducer;
pub use supervisor::{RestartBackoff, spawn_consumer_supervisor};
pub use wire::{MessageSource, RelayMessage};

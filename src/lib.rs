//! Anon Relay: anonymizing chat relay between correspondents and operators.
//!
//! Correspondents talk to a bot on a chat channel. Their messages are published
//! to an outbound stream under an anonymized ID, canned replies are sent per the
//! auto-response policy, and operator replies read from an inbound stream are
//! delivered back to the real address.

pub mod channels;
pub mod config;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod relay;
pub mod store;
pub mod suppression;

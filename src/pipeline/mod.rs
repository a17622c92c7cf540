//! Inbound message pipeline.
//!
//! Every channel event flows through `MessageHandler::handle()`:
//! 1. `FreshnessFilter`: drop backlog from before the startup window
//! 2. `IdentityStore`: swap the real address for an anonymized ID
//! 3. `RelayProducer`: publish to the operators' stream
//! 4. `policy::decide()`: pick greeting / thank-you / disclaimer replies

pub mod freshness;
pub mod handler;
pub mod policy;

pub use freshness::FreshnessFilter;
pub use handler::{MessageHandler, MessageOutcome};
pub use policy::{AutoReply, Decision, ReplyKind, decide, is_maybe_greeting};

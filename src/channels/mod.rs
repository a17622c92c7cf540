//! Channel clients: the messaging transports the relay runs on.

pub mod channel;
pub mod console;
pub mod telegram;

pub use channel::*;
pub use console::ConsoleClient;
pub use telegram::TelegramClient;

#[cfg(test)]
pub(crate) mod testing;

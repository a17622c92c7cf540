//! Correspondent anonymization.
//!
//! - `address`: `CorrespondentAddress` and `AnonymizedId`
//! - `words`: candidate ID generation from a fixed word list
//! - `store`: `IdentityStore` (resolve, mint, reverse-resolve)

pub mod address;
pub mod store;
pub mod words;

pub use address::{AnonymizedId, CorrespondentAddress};
pub use store::{DEFAULT_MAX_MINT_ATTEMPTS, IdentityStore};
pub use words::{IdGenerator, WordListGenerator};

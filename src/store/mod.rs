//! Persistence layer: libSQL-backed identities, expiring flags and streams.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, PairInsert, StreamEntry};

//! Unified `Database` trait: the key-value, identity and stream surface the
//! relay needs from its store.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Outcome of writing an address/ID pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairInsert {
    /// Both directions were written.
    Inserted,
    /// The address already maps to this ID; nothing was written.
    AddressTaken(String),
    /// Another address already owns the candidate ID; nothing was written.
    IdTaken,
}

/// A single record on an append-only stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Monotonic position within the store.
    pub id: i64,
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl StreamEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Backend-agnostic store trait.
///
/// Every operation is atomic per key. Nothing here spans more than one key in a
/// transaction, and callers must not assume otherwise.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Identities ──────────────────────────────────────────────────

    /// Forward lookup: address → anonymized ID.
    async fn get_identity_by_address(&self, address: &str)
    -> Result<Option<String>, DatabaseError>;

    /// Reverse lookup: anonymized ID → address.
    async fn get_address_by_identity(&self, anon_id: &str)
    -> Result<Option<String>, DatabaseError>;

    /// Write both directions of a mapping as one unit.
    async fn insert_identity_pair(
        &self,
        address: &str,
        anon_id: &str,
    ) -> Result<PairInsert, DatabaseError>;

    // ── Expiring flags ──────────────────────────────────────────────

    /// Set (or refresh) a flag that disappears after `ttl`.
    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), DatabaseError>;

    /// True while a flag with this key is present and unexpired.
    async fn flag_exists(&self, key: &str) -> Result<bool, DatabaseError>;

    /// Delete expired flags. Returns the number removed.
    async fn purge_expired_flags(&self) -> Result<usize, DatabaseError>;

    // ── Streams ─────────────────────────────────────────────────────

    /// Append an entry. Returns its ID.
    async fn stream_append(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<i64, DatabaseError>;

    /// All entries of a stream in order, oldest first.
    async fn stream_range(&self, stream: &str) -> Result<Vec<StreamEntry>, DatabaseError>;

    /// Create a consumer group positioned after the current last entry.
    /// Returns `false` if the group already existed.
    async fn stream_create_group(&self, stream: &str, group: &str)
    -> Result<bool, DatabaseError>;

    /// Claim up to `count` entries the group has never delivered, recording
    /// them as pending for `consumer`. An entry is claimed by at most one
    /// consumer per group.
    async fn stream_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError>;

    /// Entries delivered to `consumer` that were never acknowledged, oldest first.
    async fn stream_read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError>;

    /// Reassign to `consumer` up to `count` unacknowledged entries that were
    /// last delivered at least `min_idle` ago, whoever held them. Claimed
    /// entries count as freshly delivered.
    async fn stream_claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError>;

    /// Acknowledge an entry. Returns `false` if it was not pending.
    async fn stream_ack(&self, stream: &str, group: &str, entry_id: i64)
    -> Result<bool, DatabaseError>;
}

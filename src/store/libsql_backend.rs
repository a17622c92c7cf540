//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Identities, expiring flags and
//! streams each map onto their own tables (see `migrations`).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, PairInsert, StreamEntry};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn group_exists(&self, stream: &str, group: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM stream_groups WHERE stream = ?1 AND group_name = ?2",
                params![stream, group],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("group_exists: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("group_exists: {e}")))?;
        Ok(row.is_some())
    }

    async fn require_group(&self, stream: &str, group: &str) -> Result<(), DatabaseError> {
        if self.group_exists(stream, group).await? {
            Ok(())
        } else {
            Err(DatabaseError::Query(format!(
                "no consumer group '{group}' on stream '{stream}'"
            )))
        }
    }

    /// Load entries by ID, ordered oldest first.
    async fn load_entries(&self, ids: &[i64]) -> Result<Vec<StreamEntry>, DatabaseError> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let mut rows = self
                .conn()
                .query(
                    &format!("SELECT {ENTRY_COLUMNS} FROM stream_entries WHERE id = ?1"),
                    params![*id],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("load_entries: {e}")))?;

            if let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("load_entries: {e}")))?
            {
                entries.push(row_to_entry(&row)?);
            }
        }
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl_ms)
}

/// Map a libsql Row to a StreamEntry.
///
/// Column order matches ENTRY_COLUMNS: 0:id, 1:fields, 2:created_at
fn row_to_entry(row: &libsql::Row) -> Result<StreamEntry, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("stream entry id: {e}")))?;
    let fields_json: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("stream entry fields: {e}")))?;
    let created_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("stream entry created_at: {e}")))?;

    let fields: BTreeMap<String, String> = serde_json::from_str(&fields_json)
        .map_err(|e| DatabaseError::Serialization(format!("stream entry {id} fields: {e}")))?;

    Ok(StreamEntry {
        id,
        fields,
        created_at: parse_datetime(&created_str),
    })
}

async fn collect_ids(mut rows: libsql::Rows, op: &str) -> Result<Vec<i64>, DatabaseError> {
    let mut ids = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
    {
        let id: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
        ids.push(id);
    }
    Ok(ids)
}

// ── Trait implementation ────────────────────────────────────────────

const ENTRY_COLUMNS: &str = "id, fields, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Identities ──────────────────────────────────────────────────

    async fn get_identity_by_address(
        &self,
        address: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT anon_id FROM identities WHERE address = ?1",
                params![address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_identity_by_address: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_identity_by_address: {e}"))),
        }
    }

    async fn get_address_by_identity(
        &self,
        anon_id: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT address FROM identities WHERE anon_id = ?1",
                params![anon_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_address_by_identity: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let address: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(address))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_address_by_identity: {e}"))),
        }
    }

    async fn insert_identity_pair(
        &self,
        address: &str,
        anon_id: &str,
    ) -> Result<PairInsert, DatabaseError> {
        // Single-row insert: both directions land together or not at all.
        let changed = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO identities (address, anon_id, created_at) VALUES (?1, ?2, ?3)",
                params![address, anon_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_identity_pair: {e}")))?;

        if changed == 1 {
            debug!(anon_id, "Identity pair inserted");
            return Ok(PairInsert::Inserted);
        }

        match self.get_identity_by_address(address).await? {
            Some(existing) => Ok(PairInsert::AddressTaken(existing)),
            None => Ok(PairInsert::IdTaken),
        }
    }

    // ── Expiring flags ──────────────────────────────────────────────

    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO flags (key, expires_at_ms) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET expires_at_ms = excluded.expires_at_ms",
                params![key, expiry_ms(ttl)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_flag: {e}")))?;

        debug!(key, ttl_secs = ttl.as_secs(), "Flag set");
        Ok(())
    }

    async fn flag_exists(&self, key: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM flags WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, now_ms()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("flag_exists: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("flag_exists: {e}")))?;
        Ok(row.is_some())
    }

    async fn purge_expired_flags(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM flags WHERE expires_at_ms <= ?1",
                params![now_ms()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("purge_expired_flags: {e}")))?;

        if count > 0 {
            info!(count, "Purged expired flags");
        }
        Ok(count as usize)
    }

    // ── Streams ─────────────────────────────────────────────────────

    async fn stream_append(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<i64, DatabaseError> {
        let fields_json = serde_json::to_string(fields)
            .map_err(|e| DatabaseError::Serialization(format!("stream_append: {e}")))?;

        let rows = self
            .conn()
            .query(
                "INSERT INTO stream_entries (stream, fields, created_at) VALUES (?1, ?2, ?3) RETURNING id",
                params![stream, fields_json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_append: {e}")))?;

        let ids = collect_ids(rows, "stream_append").await?;
        let id = ids
            .first()
            .copied()
            .ok_or_else(|| DatabaseError::Query("stream_append: no id returned".into()))?;

        debug!(stream, entry_id = id, "Stream entry appended");
        Ok(id)
    }

    async fn stream_range(&self, stream: &str) -> Result<Vec<StreamEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM stream_entries WHERE stream = ?1 ORDER BY id ASC"
                ),
                params![stream],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_range: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_range: {e}")))?
        {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn stream_create_group(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<bool, DatabaseError> {
        // New groups only see entries appended after creation.
        let changed = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO stream_groups (stream, group_name, start_after_id)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(id), 0) FROM stream_entries WHERE stream = ?1))",
                params![stream, group],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_create_group: {e}")))?;

        if changed == 1 {
            debug!(stream, group, "Consumer group row inserted");
        }
        Ok(changed == 1)
    }

    async fn stream_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError> {
        self.require_group(stream, group).await?;

        // Claiming is one statement; the primary key on stream_deliveries keeps
        // competing consumers from claiming the same entry.
        let rows = self
            .conn()
            .query(
                "INSERT INTO stream_deliveries (stream, group_name, entry_id, consumer, delivered_at, delivered_at_ms)
                 SELECT e.stream, g.group_name, e.id, ?3, ?4, ?6
                 FROM stream_entries e
                 JOIN stream_groups g ON g.stream = e.stream AND g.group_name = ?2
                 WHERE e.stream = ?1
                   AND e.id > g.start_after_id
                   AND NOT EXISTS (
                       SELECT 1 FROM stream_deliveries d
                       WHERE d.stream = e.stream AND d.group_name = g.group_name AND d.entry_id = e.id
                   )
                 ORDER BY e.id ASC
                 LIMIT ?5
                 RETURNING entry_id",
                params![
                    stream,
                    group,
                    consumer,
                    Utc::now().to_rfc3339(),
                    count as i64,
                    now_ms()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_read_group: {e}")))?;

        let ids = collect_ids(rows, "stream_read_group").await?;
        if !ids.is_empty() {
            debug!(stream, group, consumer, count = ids.len(), "Stream entries claimed");
        }
        self.load_entries(&ids).await
    }

    async fn stream_read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError> {
        self.require_group(stream, group).await?;

        let rows = self
            .conn()
            .query(
                "SELECT entry_id FROM stream_deliveries
                 WHERE stream = ?1 AND group_name = ?2 AND consumer = ?3 AND acked_at IS NULL
                 ORDER BY entry_id ASC
                 LIMIT ?4",
                params![stream, group, consumer, count as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_read_pending: {e}")))?;

        let ids = collect_ids(rows, "stream_read_pending").await?;
        self.load_entries(&ids).await
    }

    async fn stream_claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, DatabaseError> {
        self.require_group(stream, group).await?;

        let now = now_ms();
        let idle_ms = i64::try_from(min_idle.as_millis()).unwrap_or(i64::MAX);
        let rows = self
            .conn()
            .query(
                "UPDATE stream_deliveries
                 SET consumer = ?3, delivered_at = ?4, delivered_at_ms = ?5
                 WHERE rowid IN (
                     SELECT rowid FROM stream_deliveries
                     WHERE stream = ?1 AND group_name = ?2 AND acked_at IS NULL
                       AND delivered_at_ms <= ?6
                     ORDER BY entry_id ASC
                     LIMIT ?7
                 )
                 RETURNING entry_id",
                params![
                    stream,
                    group,
                    consumer,
                    Utc::now().to_rfc3339(),
                    now,
                    now.saturating_sub(idle_ms),
                    count as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_claim_idle: {e}")))?;

        let ids = collect_ids(rows, "stream_claim_idle").await?;
        if !ids.is_empty() {
            debug!(stream, group, consumer, count = ids.len(), "Idle stream entries reclaimed");
        }
        self.load_entries(&ids).await
    }

    async fn stream_ack(
        &self,
        stream: &str,
        group: &str,
        entry_id: i64,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE stream_deliveries SET acked_at = ?4
                 WHERE stream = ?1 AND group_name = ?2 AND entry_id = ?3 AND acked_at IS NULL",
                params![stream, group, entry_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stream_ack: {e}")))?;

        debug!(stream, group, entry_id, acked = changed == 1, "Stream entry acknowledged");
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── Identity tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn identity_pair_both_directions() {
        let db = test_db().await;
        let outcome = db
            .insert_identity_pair("447700900123@s.whatsapp.net", "otter-maple-quill")
            .await
            .unwrap();
        assert_eq!(outcome, PairInsert::Inserted);

        assert_eq!(
            db.get_identity_by_address("447700900123@s.whatsapp.net")
                .await
                .unwrap()
                .as_deref(),
            Some("otter-maple-quill")
        );
        assert_eq!(
            db.get_address_by_identity("otter-maple-quill")
                .await
                .unwrap()
                .as_deref(),
            Some("447700900123@s.whatsapp.net")
        );
    }

    #[tokio::test]
    async fn identity_lookup_not_found() {
        let db = test_db().await;
        assert!(db.get_identity_by_address("nobody@x").await.unwrap().is_none());
        assert!(db.get_address_by_identity("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_pair_rejects_taken_id() {
        let db = test_db().await;
        db.insert_identity_pair("a@x", "same-id-here").await.unwrap();

        let outcome = db.insert_identity_pair("b@x", "same-id-here").await.unwrap();
        assert_eq!(outcome, PairInsert::IdTaken);
        // No half-mapping left behind for the loser
        assert!(db.get_identity_by_address("b@x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_pair_reports_existing_address() {
        let db = test_db().await;
        db.insert_identity_pair("a@x", "first-id-one").await.unwrap();

        let outcome = db.insert_identity_pair("a@x", "second-id-two").await.unwrap();
        assert_eq!(outcome, PairInsert::AddressTaken("first-id-one".into()));
        assert!(db.get_address_by_identity("second-id-two").await.unwrap().is_none());
    }

    // ── Flag tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn flag_set_and_exists() {
        let db = test_db().await;
        assert!(!db.flag_exists("ty:abc").await.unwrap());

        db.set_flag("ty:abc", Duration::from_secs(60)).await.unwrap();
        assert!(db.flag_exists("ty:abc").await.unwrap());
        assert!(!db.flag_exists("disclaimer:abc").await.unwrap());
    }

    #[tokio::test]
    async fn flag_expires() {
        let db = test_db().await;
        db.set_flag("ty:abc", Duration::from_millis(30)).await.unwrap();
        assert!(db.flag_exists("ty:abc").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!db.flag_exists("ty:abc").await.unwrap());
    }

    #[tokio::test]
    async fn flag_set_refreshes_ttl() {
        let db = test_db().await;
        db.set_flag("ty:abc", Duration::from_millis(30)).await.unwrap();
        db.set_flag("ty:abc", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(db.flag_exists("ty:abc").await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let db = test_db().await;
        db.set_flag("ty:old", Duration::from_millis(10)).await.unwrap();
        db.set_flag("ty:new", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let purged = db.purge_expired_flags().await.unwrap();
        assert_eq!(purged, 1);
        assert!(db.flag_exists("ty:new").await.unwrap());
    }

    // ── Stream tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn append_and_range_in_order() {
        let db = test_db().await;
        let a = db.stream_append("gec", &fields(&[("msg", "one")])).await.unwrap();
        let b = db.stream_append("gec", &fields(&[("msg", "two")])).await.unwrap();
        db.stream_append("other", &fields(&[("msg", "x")])).await.unwrap();
        assert!(b > a);

        let entries = db.stream_range("gec").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].field("msg"), Some("one"));
        assert_eq!(entries[1].field("msg"), Some("two"));
    }

    #[tokio::test]
    async fn create_group_is_idempotent() {
        let db = test_db().await;
        assert!(db.stream_create_group("in", "bots").await.unwrap());
        assert!(!db.stream_create_group("in", "bots").await.unwrap());
    }

    #[tokio::test]
    async fn group_only_sees_entries_after_creation() {
        let db = test_db().await;
        db.stream_append("in", &fields(&[("msg", "backlog")])).await.unwrap();
        db.stream_create_group("in", "bots").await.unwrap();
        db.stream_append("in", &fields(&[("msg", "fresh")])).await.unwrap();

        let got = db.stream_read_group("in", "bots", "c1", 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].field("msg"), Some("fresh"));
    }

    #[tokio::test]
    async fn read_group_without_group_fails() {
        let db = test_db().await;
        assert!(db.stream_read_group("in", "missing", "c1", 1).await.is_err());
    }

    #[tokio::test]
    async fn competing_consumers_never_share_entries() {
        let db = test_db().await;
        db.stream_create_group("in", "bots").await.unwrap();
        for i in 0..4 {
            let msg = i.to_string();
            db.stream_append("in", &fields(&[("msg", msg.as_str())]))
                .await
                .unwrap();
        }

        let c1 = db.stream_read_group("in", "bots", "c1", 1).await.unwrap();
        let c2 = db.stream_read_group("in", "bots", "c2", 1).await.unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c2.len(), 1);
        assert_ne!(c1[0].id, c2[0].id);
        assert!(c1[0].id < c2[0].id);

        let rest = db.stream_read_group("in", "bots", "c1", 10).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(db.stream_read_group("in", "bots", "c2", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_until_acked() {
        let db = test_db().await;
        db.stream_create_group("in", "bots").await.unwrap();
        let id = db.stream_append("in", &fields(&[("msg", "hi")])).await.unwrap();

        db.stream_read_group("in", "bots", "c1", 1).await.unwrap();
        let pending = db.stream_read_pending("in", "bots", "c1", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        // Pending entries belong to their consumer only
        assert!(db.stream_read_pending("in", "bots", "c2", 10).await.unwrap().is_empty());

        assert!(db.stream_ack("in", "bots", id).await.unwrap());
        assert!(!db.stream_ack("in", "bots", id).await.unwrap());
        assert!(db.stream_read_pending("in", "bots", "c1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn idle_entries_move_to_the_claiming_consumer() {
        let db = test_db().await;
        db.stream_create_group("in", "bots").await.unwrap();
        let stuck = db.stream_append("in", &fields(&[("msg", "stuck")])).await.unwrap();
        db.stream_read_group("in", "bots", "gone", 1).await.unwrap();

        // Too recent to take over
        let early = db
            .stream_claim_idle("in", "bots", "c1", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(early.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let claimed = db
            .stream_claim_idle("in", "bots", "c1", Duration::from_millis(20), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, stuck);
        assert!(db.stream_read_pending("in", "bots", "gone", 10).await.unwrap().is_empty());
        assert_eq!(db.stream_read_pending("in", "bots", "c1", 10).await.unwrap().len(), 1);

        // Claiming resets the idle clock
        let again = db
            .stream_claim_idle("in", "bots", "c2", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(again.is_empty());

        // Acked entries are never reclaimed
        assert!(db.stream_ack("in", "bots", stuck).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            db.stream_claim_idle("in", "bots", "c2", Duration::from_millis(20), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn groups_track_delivery_independently() {
        let db = test_db().await;
        db.stream_create_group("in", "a").await.unwrap();
        db.stream_create_group("in", "b").await.unwrap();
        db.stream_append("in", &fields(&[("msg", "hi")])).await.unwrap();

        assert_eq!(db.stream_read_group("in", "a", "c", 5).await.unwrap().len(), 1);
        assert_eq!(db.stream_read_group("in", "b", "c", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("relay.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_identity_pair("a@x", "kept-across-opens").await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(
            db.get_address_by_identity("kept-across-opens")
                .await
                .unwrap()
                .as_deref(),
            Some("a@x")
        );
    }
}

//! Suppression tracker: per-(ID, category) "recently sent" flags.
//!
//! `eligible()` followed by `mark_sent()` is not atomic: two deliveries for the
//! same ID racing through the check can both send. The relay assumes a single
//! logical consumer per correspondent and accepts that window; no per-ID lock
//! is taken.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::DatabaseError;
use crate::identity::AnonymizedId;
use crate::store::Database;

/// Rate-limited auto-response categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ThankYou,
    Disclaimer,
}

impl Category {
    /// How long a send suppresses the next one.
    pub fn ttl(self) -> Duration {
        match self {
            Category::ThankYou => Duration::from_secs(30 * 60),
            Category::Disclaimer => Duration::from_secs(24 * 60 * 60),
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            Category::ThankYou => "ty",
            Category::Disclaimer => "disclaimer",
        }
    }

    /// Store key for this category and ID.
    pub fn key(self, id: &AnonymizedId) -> String {
        format!("{}:{}", self.key_prefix(), id)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::ThankYou => f.write_str("thank_you"),
            Category::Disclaimer => f.write_str("disclaimer"),
        }
    }
}

/// Tracks which auto-responses were sent recently.
#[derive(Clone)]
pub struct SuppressionTracker {
    db: Arc<dyn Database>,
}

impl SuppressionTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// True iff no live flag exists for (id, category).
    pub async fn eligible(&self, id: &AnonymizedId, category: Category) -> Result<bool, DatabaseError> {
        Ok(!self.db.flag_exists(&category.key(id)).await?)
    }

    /// Record a send with the category's default TTL.
    pub async fn mark_sent(&self, id: &AnonymizedId, category: Category) -> Result<(), DatabaseError> {
        self.mark_sent_for(id, category, category.ttl()).await
    }

    /// Record a send with an explicit TTL.
    pub async fn mark_sent_for(
        &self,
        id: &AnonymizedId,
        category: Category,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        self.db.set_flag(&category.key(id), ttl).await?;
        debug!(anon_id = %id, %category, ttl_secs = ttl.as_secs(), "Suppression flag set");
        Ok(())
    }
}

/// Spawn a background task that periodically deletes expired flags.
///
/// Reads already ignore expired rows; this only keeps the table small.
pub fn spawn_flag_sweeper(db: Arc<dyn Database>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = db.purge_expired_flags().await {
                tracing::warn!(error = %e, "Failed to purge expired flags");
            }
        }
    })
}

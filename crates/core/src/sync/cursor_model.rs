//! Sync cursor domain model and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::records::SyncDomain;

/// Persisted high-water mark for one sync domain.
///
/// `last_sync_at` is the instant up to which incremental sync completed; it
/// is monotonically non-decreasing and only moves after a run with zero
/// domain-fatal errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub domain: SyncDomain,
    pub last_sync_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn new(domain: SyncDomain, last_sync_at: DateTime<Utc>) -> Self {
        Self {
            domain,
            last_sync_at,
            updated_at: Utc::now(),
        }
    }
}

/// Trait for cursor persistence.
///
/// Reads are required to degrade: a missing table, missing row, or
/// unreadable timestamp yields `Ok(None)` (triggering the bounded full-sync
/// fallback), never an error.
#[async_trait]
pub trait SyncCursorRepositoryTrait: Send + Sync {
    /// Get the cursor for a domain, or `None` when no usable cursor exists.
    fn get(&self, domain: SyncDomain) -> Result<Option<SyncCursor>>;

    /// Advance the cursor for a domain. Implementations must keep
    /// `last_sync_at` monotonic: a timestamp earlier than the stored one
    /// leaves the row untouched.
    async fn advance(&self, domain: SyncDomain, to: DateTime<Utc>) -> Result<()>;
}

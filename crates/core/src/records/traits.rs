//! Repository traits for the local replica, implemented by the storage crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{ProjectedRecord, SyncDomain};
use crate::errors::Result;

/// Outcome of an idempotent upsert into the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for this external id; one was inserted.
    Created,
    /// An existing row was refreshed (at minimum its `synced_at`).
    Updated,
    /// The record was deliberately not written, e.g. a booking whose
    /// local-first twin is still waiting for backfill linking.
    Skipped,
}

/// Trait for per-domain replica tables.
///
/// One implementation per [`SyncDomain`]; the sync engine works against
/// `Arc<dyn RecordRepositoryTrait>` so tests can substitute in-memory fakes.
#[async_trait]
pub trait RecordRepositoryTrait: Send + Sync {
    /// The domain this repository persists.
    fn domain(&self) -> SyncDomain;

    /// Idempotently write a projected record, keyed on its external id.
    ///
    /// Re-running with unchanged input must mutate nothing but `synced_at`.
    async fn upsert(&self, record: ProjectedRecord) -> Result<UpsertOutcome>;

    /// Local ids of rows with this idempotency key and no external id yet.
    ///
    /// Only meaningful for domains whose records can be created
    /// local-first; others keep the default empty answer.
    fn find_unlinked_by_idempotency_key(&self, _key: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Set `external_id` and `synced_at` on a local-first row, touching no
    /// other column. Must refuse to reassign a non-null external id.
    async fn link_external_id(
        &self,
        local_id: &str,
        external_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()>;
}

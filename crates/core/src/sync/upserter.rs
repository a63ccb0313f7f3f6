//! Bounded-concurrency idempotent upserts into the local replica.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};

use examsync_crm::CRM_BATCH_LIMIT;

use crate::constants::INTER_BATCH_DELAY_MS;
use crate::records::{ProjectedRecord, RecordRepositoryTrait, UpsertOutcome};

/// Outcome counts for one upsert batch.
///
/// Per-record failures are folded in here rather than raised, so one bad
/// record never aborts the records around it.
#[derive(Debug, Clone, Default)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// `(external_id, error)` pairs for records that failed to write.
    pub failed: Vec<(String, String)>,
}

impl UpsertSummary {
    /// Records that ended up written (created or refreshed).
    pub fn records_synced(&self) -> usize {
        self.created + self.updated
    }
}

/// Writes projected records through the domain repository in fixed-size
/// waves: fan out one chunk, await all of it, pause briefly, continue.
/// Records are independently keyed by external id, so ordering across
/// chunks is irrelevant.
pub struct Upserter {
    repository: Arc<dyn RecordRepositoryTrait>,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl Upserter {
    pub fn new(repository: Arc<dyn RecordRepositoryTrait>) -> Self {
        Self {
            repository,
            batch_size: CRM_BATCH_LIMIT,
            inter_batch_delay: Duration::from_millis(INTER_BATCH_DELAY_MS),
        }
    }

    #[cfg(test)]
    pub fn with_batch_size(repository: Arc<dyn RecordRepositoryTrait>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size: batch_size.max(1),
            inter_batch_delay: Duration::from_millis(0),
        }
    }

    pub async fn upsert_batch(&self, records: Vec<ProjectedRecord>) -> UpsertSummary {
        let mut summary = UpsertSummary::default();
        let total_chunks = records.len().div_ceil(self.batch_size.max(1));

        for (index, chunk) in records.chunks(self.batch_size.max(1)).enumerate() {
            debug!(
                "Upserting {} chunk {}/{} ({} records)",
                self.repository.domain(),
                index + 1,
                total_chunks,
                chunk.len()
            );

            let writes = chunk.iter().map(|record| {
                let record = record.clone();
                let external_id = record.external_id().to_string();
                let repository = Arc::clone(&self.repository);
                async move { (external_id, repository.upsert(record).await) }
            });

            for (external_id, result) in join_all(writes).await {
                match result {
                    Ok(UpsertOutcome::Created) => summary.created += 1,
                    Ok(UpsertOutcome::Updated) => summary.updated += 1,
                    Ok(UpsertOutcome::Skipped) => summary.skipped += 1,
                    Err(err) => {
                        warn!(
                            "Upsert failed for {} record {}: {}",
                            self.repository.domain(),
                            external_id,
                            err
                        );
                        summary.failed.push((external_id, err.to_string()));
                    }
                }
            }

            // Courtesy pause toward the shared rate limiter.
            if index + 1 < total_chunks && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        summary
    }
}

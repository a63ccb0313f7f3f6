//! Per-domain sync run records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::records::SyncDomain;

/// Final status of a per-domain sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRunStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

/// One domain's slice of a scheduled sync run, persisted best-effort for
/// the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub domain: SyncDomain,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncRunStatus,
    pub fetched: usize,
    pub synced: usize,
    pub linked: usize,
    pub errors_count: usize,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn new(domain: SyncDomain, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain,
            started_at,
            finished_at: None,
            status: SyncRunStatus::Completed,
            fetched: 0,
            synced: 0,
            linked: 0,
            errors_count: 0,
            error: None,
        }
    }

    /// Close the run with the recorded counts deciding the status.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        if self.error.is_some() {
            self.status = SyncRunStatus::Failed;
        } else if self.errors_count > 0 {
            self.status = SyncRunStatus::CompletedWithErrors;
        } else {
            self.status = SyncRunStatus::Completed;
        }
    }

    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.finish();
    }
}

/// Trait for persisting run records. Writes are best-effort; the runner
/// logs and ignores failures here.
#[async_trait]
pub trait SyncRunRepositoryTrait: Send + Sync {
    async fn record_run(&self, run: SyncRun) -> Result<()>;
}

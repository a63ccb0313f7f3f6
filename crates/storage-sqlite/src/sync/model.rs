//! Database models for sync cursors and run records.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use examsync_core::records::SyncDomain;
use examsync_core::sync::{SyncRun, SyncRunStatus};

pub(crate) fn parse_domain(value: &str) -> Option<SyncDomain> {
    match value {
        "exams" => Some(SyncDomain::Exams),
        "bookings" => Some(SyncDomain::Bookings),
        "contacts" => Some(SyncDomain::Contacts),
        _ => None,
    }
}

fn status_str(status: SyncRunStatus) -> &'static str {
    match status {
        SyncRunStatus::Completed => "COMPLETED",
        SyncRunStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
        SyncRunStatus::Failed => "FAILED",
    }
}

#[derive(Queryable, Insertable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_cursors)]
#[diesel(primary_key(domain))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncCursorDB {
    pub domain: String,
    pub last_sync_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Insertable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub domain: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub fetched: i64,
    pub synced: i64,
    pub linked: i64,
    pub errors_count: i64,
    pub error: Option<String>,
}

impl SyncRunDB {
    /// Convert back to the domain model. Rows with an unknown domain tag or
    /// an unreadable start timestamp are dropped.
    pub fn into_domain(self) -> Option<SyncRun> {
        let domain = parse_domain(&self.domain)?;
        let started_at = chrono::DateTime::parse_from_rfc3339(&self.started_at)
            .ok()?
            .with_timezone(&chrono::Utc);
        let finished_at = self
            .finished_at
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&chrono::Utc));
        Some(SyncRun {
            id: self.id,
            domain,
            started_at,
            finished_at,
            status: parse_status(&self.status),
            fetched: self.fetched as usize,
            synced: self.synced as usize,
            linked: self.linked as usize,
            errors_count: self.errors_count as usize,
            error: self.error,
        })
    }
}

fn parse_status(value: &str) -> SyncRunStatus {
    match value {
        "FAILED" => SyncRunStatus::Failed,
        "COMPLETED_WITH_ERRORS" => SyncRunStatus::CompletedWithErrors,
        _ => SyncRunStatus::Completed,
    }
}

impl From<SyncRun> for SyncRunDB {
    fn from(run: SyncRun) -> Self {
        Self {
            id: run.id,
            domain: run.domain.as_str().to_string(),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            status: status_str(run.status).to_string(),
            fetched: run.fetched as i64,
            synced: run.synced as i64,
            linked: run.linked as i64,
            errors_count: run.errors_count as i64,
            error: run.error,
        }
    }
}

//! The synchronization engine: incremental change detection, projection,
//! idempotent upserts, and external-id backfill, coordinated per domain.

mod backfill;
mod cursor_model;
mod fetcher;
mod run_model;
mod runner;
mod upserter;

pub use backfill::{BackfillMatcher, BackfillSummary};
pub use cursor_model::{SyncCursor, SyncCursorRepositoryTrait};
pub use fetcher::IncrementalFetcher;
pub use run_model::{SyncRun, SyncRunRepositoryTrait, SyncRunStatus};
pub use runner::{SyncRunResponse, SyncRunner, SyncRunnerConfig, SyncSummary};
pub use upserter::{Upserter, UpsertSummary};

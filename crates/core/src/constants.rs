//! Shared constants for the sync engine.

/// First-run recency window: without a cursor, only records created within
/// this many days are fetched. Bounds full-sync cost by design.
pub const FIRST_SYNC_WINDOW_DAYS: i64 = 30;

/// Page size for CRM search calls.
pub const SEARCH_PAGE_LIMIT: u32 = 100;

/// Safety cap on search pages per domain per run.
pub const MAX_SEARCH_PAGES: usize = 1_000;

/// Wall-clock budget for a whole scheduled sync run, in seconds.
pub const DEFAULT_RUN_BUDGET_SECS: u64 = 55;

/// Courtesy pause between consecutive write batches, in milliseconds.
pub const INTER_BATCH_DELAY_MS: u64 = 150;

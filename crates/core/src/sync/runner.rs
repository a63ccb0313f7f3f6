//! Top-level sync scheduling: cursor -> fetch -> project -> upsert -> backfill.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use examsync_crm::CrmApi;

use super::backfill::BackfillMatcher;
use super::cursor_model::SyncCursorRepositoryTrait;
use super::fetcher::IncrementalFetcher;
use super::run_model::{SyncRun, SyncRunRepositoryTrait};
use super::upserter::Upserter;
use crate::constants::DEFAULT_RUN_BUDGET_SECS;
use crate::events::{spawn_cascade, DomainEvent, DomainEventSink};
use crate::records::{projector, RecordRepositoryTrait, SyncDomain};

/// Configuration for a scheduled sync run.
#[derive(Debug, Clone)]
pub struct SyncRunnerConfig {
    /// Wall-clock budget for the whole run. On expiry the run is reported
    /// as failed; retrying is safe because cursors only advance on clean
    /// per-domain completion and every write is an idempotent upsert.
    pub run_budget: Duration,
}

impl Default for SyncRunnerConfig {
    fn default() -> Self {
        Self {
            run_budget: Duration::from_secs(DEFAULT_RUN_BUDGET_SECS),
        }
    }
}

impl SyncRunnerConfig {
    /// Read the run budget from `EXAMSYNC_SYNC_BUDGET_SECS`, keeping the
    /// default when unset or unparseable.
    pub fn from_env() -> Self {
        let run_budget = std::env::var("EXAMSYNC_SYNC_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_RUN_BUDGET_SECS));
        Self { run_budget }
    }
}

/// Aggregate counts for a run, serialized into the trigger response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub records_synced: usize,
    pub errors_count: usize,
    pub duration_ms: u64,
}

/// JSON response returned to the scheduled and administrative triggers.
///
/// Partial failure is best-effort: per-record errors are embedded in
/// `errors` while `success` stays true as long as no domain failed
/// outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResponse {
    pub success: bool,
    pub summary: SyncSummary,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

#[derive(Debug)]
struct DomainReport {
    domain: SyncDomain,
    fetched: usize,
    synced: usize,
    linked: usize,
    errors: Vec<String>,
    /// Set when the whole domain failed (fetch error, stuck pagination).
    /// Blocks cursor advancement for this domain only.
    fatal: Option<String>,
}

impl DomainReport {
    fn new(domain: SyncDomain) -> Self {
        Self {
            domain,
            fetched: 0,
            synced: 0,
            linked: 0,
            errors: Vec::new(),
            fatal: None,
        }
    }
}

/// Coordinates one sync invocation across all domains.
///
/// Domains are processed independently: an error in one is collected and
/// never short-circuits its siblings. Concurrent invocations of the same
/// domain are assumed to be prevented by the external scheduler; this
/// runner takes no distributed lock.
pub struct SyncRunner {
    fetcher: IncrementalFetcher,
    cursor_repository: Arc<dyn SyncCursorRepositoryTrait>,
    repositories: Vec<Arc<dyn RecordRepositoryTrait>>,
    run_repository: Option<Arc<dyn SyncRunRepositoryTrait>>,
    event_sink: Arc<dyn DomainEventSink>,
    config: SyncRunnerConfig,
}

impl SyncRunner {
    pub fn new(
        crm: Arc<dyn CrmApi>,
        cursor_repository: Arc<dyn SyncCursorRepositoryTrait>,
        repositories: Vec<Arc<dyn RecordRepositoryTrait>>,
        event_sink: Arc<dyn DomainEventSink>,
        config: SyncRunnerConfig,
    ) -> Self {
        Self {
            fetcher: IncrementalFetcher::new(crm),
            cursor_repository,
            repositories,
            run_repository: None,
            event_sink,
            config,
        }
    }

    /// Attach a repository for persisting per-domain run records.
    pub fn with_run_repository(mut self, run_repository: Arc<dyn SyncRunRepositoryTrait>) -> Self {
        self.run_repository = Some(run_repository);
        self
    }

    /// Execute one full sync run within the wall-clock budget.
    pub async fn run(&self) -> SyncRunResponse {
        let run_start = Utc::now();
        let clock = Instant::now();
        info!("Starting sync run at {}", run_start);

        let reports = match tokio::time::timeout(self.config.run_budget, self.run_all(run_start))
            .await
        {
            Ok(reports) => reports,
            Err(_) => {
                error!(
                    "Sync run exceeded its {}s budget; reporting failure",
                    self.config.run_budget.as_secs()
                );
                return SyncRunResponse {
                    success: false,
                    summary: SyncSummary {
                        records_synced: 0,
                        errors_count: 1,
                        duration_ms: clock.elapsed().as_millis() as u64,
                    },
                    errors: vec![
                        crate::errors::Error::RunBudgetExceeded(self.config.run_budget.as_secs())
                            .to_string(),
                    ],
                };
            }
        };

        let mut errors: Vec<String> = Vec::new();
        let mut records_synced = 0;
        let mut success = true;
        for report in &reports {
            records_synced += report.synced + report.linked;
            if let Some(fatal) = &report.fatal {
                success = false;
                errors.push(format!("{}: {}", report.domain, fatal));
            }
            errors.extend(
                report
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", report.domain, e)),
            );
        }

        let response = SyncRunResponse {
            success,
            summary: SyncSummary {
                records_synced,
                errors_count: errors.len(),
                duration_ms: clock.elapsed().as_millis() as u64,
            },
            errors,
        };
        info!(
            "Sync run finished: success={}, {} record(s), {} error(s), {} ms",
            response.success,
            response.summary.records_synced,
            response.summary.errors_count,
            response.summary.duration_ms
        );
        response
    }

    async fn run_all(&self, run_start: DateTime<Utc>) -> Vec<DomainReport> {
        let mut reports = Vec::with_capacity(self.repositories.len());

        for repository in &self.repositories {
            let mut report = self.sync_domain(Arc::clone(repository), run_start).await;
            let domain = report.domain;

            if report.fatal.is_none() {
                // Per-record failures were recorded rather than thrown, so
                // they do not block advancement.
                if let Err(err) = self.cursor_repository.advance(domain, run_start).await {
                    warn!("Failed to advance cursor for {}: {}", domain, err);
                    report.errors.push(format!("cursor advance: {}", err));
                }
            } else {
                info!(
                    "Cursor for {} left untouched after a fatal domain error",
                    domain
                );
            }

            self.persist_run(&report, run_start).await;

            if report.synced > 0 {
                spawn_cascade(
                    Arc::clone(&self.event_sink),
                    vec![DomainEvent::RecordsSynced {
                        domain,
                        count: report.synced,
                    }],
                );
            }

            reports.push(report);
        }

        reports
    }

    async fn sync_domain(
        &self,
        repository: Arc<dyn RecordRepositoryTrait>,
        _run_start: DateTime<Utc>,
    ) -> DomainReport {
        let domain = repository.domain();
        let mut report = DomainReport::new(domain);

        // A broken cursor read degrades to a bounded full sync instead of
        // failing the domain.
        let since = match self.cursor_repository.get(domain) {
            Ok(cursor) => cursor.map(|c| c.last_sync_at),
            Err(err) => {
                warn!(
                    "Cursor read failed for {} ({}); falling back to first-sync window",
                    domain, err
                );
                None
            }
        };

        let records = match self.fetcher.fetch_changed(domain, since).await {
            Ok(records) => records,
            Err(err) => {
                error!("Fetch failed for {}: {}", domain, err);
                report.fatal = Some(err.to_string());
                return report;
            }
        };
        report.fetched = records.len();

        let mut projected = Vec::with_capacity(records.len());
        for record in &records {
            match projector::project(domain, record) {
                Ok(p) => projected.push(p),
                Err(err) => report
                    .errors
                    .push(format!("projection of record {}: {}", record.id, err)),
            }
        }

        let upserter = Upserter::new(Arc::clone(&repository));
        let upsert = upserter.upsert_batch(projected.clone()).await;
        report.synced = upsert.records_synced();
        report.errors.extend(
            upsert
                .failed
                .into_iter()
                .map(|(id, err)| format!("upsert of record {}: {}", id, err)),
        );

        let matcher = BackfillMatcher::new(repository, Arc::clone(&self.event_sink));
        let backfill = matcher.backfill(&projected).await;
        report.linked = backfill.linked;
        report.errors.extend(backfill.errors);

        report
    }

    async fn persist_run(&self, report: &DomainReport, run_start: DateTime<Utc>) {
        let Some(run_repository) = &self.run_repository else {
            return;
        };

        let mut run = SyncRun::new(report.domain, run_start);
        run.fetched = report.fetched;
        run.synced = report.synced;
        run.linked = report.linked;
        run.errors_count = report.errors.len();
        match &report.fatal {
            Some(fatal) => run.fail(fatal.clone()),
            None => run.finish(),
        }

        if let Err(err) = run_repository.record_run(run).await {
            warn!(
                "Failed to persist run record for {}: {}",
                report.domain, err
            );
        }
    }
}

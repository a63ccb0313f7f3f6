//! Repositories for sync cursors and run records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;

use examsync_core::errors::Result;
use examsync_core::records::SyncDomain;
use examsync_core::sync::{SyncCursor, SyncCursorRepositoryTrait, SyncRun, SyncRunRepositoryTrait};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sync_cursors, sync_runs};

use super::model::{SyncCursorDB, SyncRunDB};

pub struct SyncCursorRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl SyncCursorRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncCursorRepositoryTrait for SyncCursorRepository {
    /// Cursor reads degrade to `Ok(None)`: a missing row, an unreadable
    /// timestamp, or a query failure all fall back to the bounded
    /// first-sync window instead of blocking the run.
    fn get(&self, domain: SyncDomain) -> Result<Option<SyncCursor>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_cursors::table
            .find(domain.as_str())
            .first::<SyncCursorDB>(&mut conn)
            .optional();

        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("Cursor query failed for {}: {}", domain, err);
                return Ok(None);
            }
        };
        let Some(row) = row else {
            return Ok(None);
        };

        let last_sync_at = match DateTime::parse_from_rfc3339(&row.last_sync_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(err) => {
                warn!(
                    "Unreadable cursor timestamp {:?} for {}: {}",
                    row.last_sync_at, domain, err
                );
                return Ok(None);
            }
        };
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(last_sync_at);

        Ok(Some(SyncCursor {
            domain,
            last_sync_at,
            updated_at,
        }))
    }

    async fn advance(&self, domain: SyncDomain, to: DateTime<Utc>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let existing = sync_cursors::table
                    .find(domain.as_str())
                    .first::<SyncCursorDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match existing {
                    Some(row) => {
                        // Never move backwards. An unreadable stored value
                        // is overwritten.
                        let stored = DateTime::parse_from_rfc3339(&row.last_sync_at)
                            .map(|t| t.with_timezone(&Utc))
                            .ok();
                        if stored.is_some_and(|s| s >= to) {
                            return Ok(());
                        }
                        diesel::update(sync_cursors::table.find(domain.as_str()))
                            .set((
                                sync_cursors::last_sync_at.eq(to.to_rfc3339()),
                                sync_cursors::updated_at.eq(&now),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    None => {
                        diesel::insert_into(sync_cursors::table)
                            .values(SyncCursorDB {
                                domain: domain.as_str().to_string(),
                                last_sync_at: to.to_rfc3339(),
                                updated_at: now,
                            })
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }
}

pub struct SyncRunRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl SyncRunRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Most recent runs first, for the admin surface.
    pub fn recent(&self, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_runs::table
            .order(sync_runs::started_at.desc())
            .limit(limit)
            .load::<SyncRunDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().filter_map(SyncRunDB::into_domain).collect())
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    async fn record_run(&self, run: SyncRun) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_runs::table)
                    .values(SyncRunDB::from(run))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

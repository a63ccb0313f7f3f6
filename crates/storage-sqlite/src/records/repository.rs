//! Repository implementations for the replica tables.
//!
//! All mutations go through the write actor; reads use the shared pool.
//! Upserts are keyed on `external_id` and re-running one with unchanged
//! input touches nothing but `synced_at` and `updated_at`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use examsync_core::errors::{DatabaseError, Error, Result};
use examsync_core::records::{
    BookingRecord, ContactRecord, ExamRecord, ProjectedRecord, RecordRepositoryTrait,
    SyncDomain, UpsertOutcome,
};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{bookings, contacts, exams};

use super::model::{to_db_ts, BookingDB, ContactDB, ExamDB};

fn wrong_domain(expected: SyncDomain, got: SyncDomain) -> Error {
    Error::Unexpected(format!(
        "{} repository received a {} record",
        expected, got
    ))
}

pub struct ExamRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl ExamRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Result<Option<ExamRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = exams::table
            .filter(exams::external_id.eq(external_id))
            .first::<ExamDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Into::into))
    }

    pub fn list(&self) -> Result<Vec<ExamRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = exams::table
            .order(exams::starts_at.asc())
            .load::<ExamDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl RecordRepositoryTrait for ExamRepository {
    fn domain(&self) -> SyncDomain {
        SyncDomain::Exams
    }

    async fn upsert(&self, record: ProjectedRecord) -> Result<UpsertOutcome> {
        let got = record.domain();
        let ProjectedRecord::Exam(exam) = record else {
            return Err(wrong_domain(SyncDomain::Exams, got));
        };

        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let existing: Option<String> = exams::table
                    .filter(exams::external_id.eq(&exam.external_id))
                    .select(exams::id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match existing {
                    Some(row_id) => {
                        diesel::update(exams::table.filter(exams::id.eq(&row_id)))
                            .set((
                                exams::name.eq(exam.name),
                                exams::exam_level.eq(exam.exam_level),
                                exams::location.eq(exam.location),
                                exams::starts_at.eq(to_db_ts(&exam.starts_at)),
                                exams::capacity.eq(exam.capacity),
                                exams::status.eq(exam.status),
                                exams::last_modified_at.eq(to_db_ts(&exam.last_modified)),
                                exams::synced_at.eq(Some(now.clone())),
                                exams::updated_at.eq(&now),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        Ok(UpsertOutcome::Updated)
                    }
                    None => {
                        diesel::insert_into(exams::table)
                            .values(ExamDB::new_row(&exam, &now))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        Ok(UpsertOutcome::Created)
                    }
                }
            })
            .await
    }

    async fn link_external_id(
        &self,
        _local_id: &str,
        _external_id: &str,
        _synced_at: DateTime<Utc>,
    ) -> Result<()> {
        Err(Error::Repository(
            "exam rows are never created locally".to_string(),
        ))
    }
}

pub struct BookingRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl BookingRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Result<Option<BookingRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = bookings::table
            .filter(bookings::external_id.eq(external_id))
            .first::<BookingDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Into::into))
    }

    /// Insert a booking made on this platform, before any CRM counterpart
    /// exists. Returns the new local row id.
    pub async fn create_local(
        &self,
        record: BookingRecord,
        idempotency_key: String,
    ) -> Result<String> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let mut row = BookingDB::new_row(&record, &now);
                row.external_id = None;
                row.idempotency_key = Some(idempotency_key);
                row.synced_at = None;
                let id = row.id.clone();

                diesel::insert_into(bookings::table)
                    .values(row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(id)
            })
            .await
    }
}

#[async_trait]
impl RecordRepositoryTrait for BookingRepository {
    fn domain(&self) -> SyncDomain {
        SyncDomain::Bookings
    }

    async fn upsert(&self, record: ProjectedRecord) -> Result<UpsertOutcome> {
        let got = record.domain();
        let ProjectedRecord::Booking(booking) = record else {
            return Err(wrong_domain(SyncDomain::Bookings, got));
        };

        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let existing: Option<String> = bookings::table
                    .filter(bookings::external_id.eq(&booking.external_id))
                    .select(bookings::id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                if let Some(row_id) = existing {
                    diesel::update(bookings::table.filter(bookings::id.eq(&row_id)))
                        .set((
                            bookings::idempotency_key.eq(booking.idempotency_key),
                            bookings::contact_external_id.eq(booking.contact_external_id),
                            bookings::exam_external_id.eq(booking.exam_external_id),
                            bookings::status.eq(booking.status),
                            bookings::credit_type.eq(booking.credit_type),
                            bookings::price.eq(booking.price.map(|p| p.to_string())),
                            bookings::booked_at.eq(to_db_ts(&booking.booked_at)),
                            bookings::last_modified_at.eq(to_db_ts(&booking.last_modified)),
                            bookings::synced_at.eq(Some(now.clone())),
                            bookings::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    return Ok(UpsertOutcome::Updated);
                }

                // A local-first row waiting to be linked claims this record;
                // inserting a second row here would leave a duplicate the
                // moment backfill links the first one.
                if let Some(key) = &booking.idempotency_key {
                    let unlinked: i64 = bookings::table
                        .filter(bookings::idempotency_key.eq(key))
                        .filter(bookings::external_id.is_null())
                        .count()
                        .get_result(conn)
                        .map_err(StorageError::from)?;
                    if unlinked > 0 {
                        return Ok(UpsertOutcome::Skipped);
                    }
                }

                diesel::insert_into(bookings::table)
                    .values(BookingDB::new_row(&booking, &now))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(UpsertOutcome::Created)
            })
            .await
    }

    fn find_unlinked_by_idempotency_key(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let ids = bookings::table
            .filter(bookings::idempotency_key.eq(key))
            .filter(bookings::external_id.is_null())
            .order(bookings::created_at.asc())
            .select(bookings::id)
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(ids)
    }

    async fn link_external_id(
        &self,
        local_id: &str,
        external_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let local_id = local_id.to_string();
        let external_id = external_id.to_string();

        self.writer
            .exec(move |conn| {
                let current: Option<Option<String>> = bookings::table
                    .filter(bookings::id.eq(&local_id))
                    .select(bookings::external_id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match current {
                    None => Err(Error::Database(DatabaseError::NotFound(format!(
                        "booking row {} not found",
                        local_id
                    )))),
                    Some(Some(existing)) if existing == external_id => Ok(()),
                    Some(Some(existing)) => Err(Error::Validation(format!(
                        "booking row {} is already linked to external id {}",
                        local_id, existing
                    ))),
                    Some(None) => {
                        let now = Utc::now().to_rfc3339();
                        diesel::update(
                            bookings::table
                                .filter(bookings::id.eq(&local_id))
                                .filter(bookings::external_id.is_null()),
                        )
                        .set((
                            bookings::external_id.eq(Some(external_id)),
                            bookings::synced_at.eq(Some(synced_at.to_rfc3339())),
                            bookings::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                        Ok(())
                    }
                }
            })
            .await
    }
}

pub struct ContactRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl ContactRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Result<Option<ContactRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = contacts::table
            .filter(contacts::external_id.eq(external_id))
            .first::<ContactDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl RecordRepositoryTrait for ContactRepository {
    fn domain(&self) -> SyncDomain {
        SyncDomain::Contacts
    }

    async fn upsert(&self, record: ProjectedRecord) -> Result<UpsertOutcome> {
        let got = record.domain();
        let ProjectedRecord::Contact(contact) = record else {
            return Err(wrong_domain(SyncDomain::Contacts, got));
        };

        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let existing: Option<String> = contacts::table
                    .filter(contacts::external_id.eq(&contact.external_id))
                    .select(contacts::id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match existing {
                    Some(row_id) => {
                        diesel::update(contacts::table.filter(contacts::id.eq(&row_id)))
                            .set((
                                contacts::email.eq(contact.email),
                                contacts::first_name.eq(contact.first_name),
                                contacts::last_name.eq(contact.last_name),
                                contacts::phone.eq(contact.phone),
                                contacts::last_modified_at.eq(to_db_ts(&contact.last_modified)),
                                contacts::synced_at.eq(Some(now.clone())),
                                contacts::updated_at.eq(&now),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        Ok(UpsertOutcome::Updated)
                    }
                    None => {
                        diesel::insert_into(contacts::table)
                            .values(ContactDB::new_row(&contact, &now))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        Ok(UpsertOutcome::Created)
                    }
                }
            })
            .await
    }

    async fn link_external_id(
        &self,
        _local_id: &str,
        _external_id: &str,
        _synced_at: DateTime<Utc>,
    ) -> Result<()> {
        Err(Error::Repository(
            "contact rows are never created locally".to_string(),
        ))
    }
}

/// Build one repository per domain, sharing the pool and write handle.
pub fn replica_repositories(
    pool: DbPool,
    writer: WriteHandle,
) -> Vec<Arc<dyn RecordRepositoryTrait>> {
    vec![
        Arc::new(ExamRepository::new(Arc::clone(&pool), writer.clone())),
        Arc::new(BookingRepository::new(Arc::clone(&pool), writer.clone())),
        Arc::new(ContactRepository::new(pool, writer)),
    ]
}

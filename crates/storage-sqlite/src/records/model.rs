//! Database models for the replica tables.
//!
//! Timestamps are stored as RFC3339 text. Values that fail to parse on the
//! way out degrade to `None`; the replica never refuses a read over one bad
//! column.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use examsync_core::records::{BookingRecord, ContactRecord, ExamRecord};

pub(crate) fn to_db_ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

pub(crate) fn parse_db_ts(value: &Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Queryable, Insertable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::exams)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExamDB {
    pub id: String,
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub exam_level: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<String>,
    pub capacity: Option<i64>,
    pub status: Option<String>,
    pub last_modified_at: Option<String>,
    pub synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ExamDB {
    pub fn new_row(record: &ExamRecord, now: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: Some(record.external_id.clone()),
            name: record.name.clone(),
            exam_level: record.exam_level.clone(),
            location: record.location.clone(),
            starts_at: to_db_ts(&record.starts_at),
            capacity: record.capacity,
            status: record.status.clone(),
            last_modified_at: to_db_ts(&record.last_modified),
            synced_at: Some(now.to_string()),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

impl From<ExamDB> for ExamRecord {
    fn from(db: ExamDB) -> Self {
        Self {
            external_id: db.external_id.unwrap_or_default(),
            name: db.name,
            exam_level: db.exam_level,
            location: db.location,
            starts_at: parse_db_ts(&db.starts_at),
            capacity: db.capacity,
            status: db.status,
            last_modified: parse_db_ts(&db.last_modified_at),
        }
    }
}

#[derive(Queryable, Insertable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::bookings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BookingDB {
    pub id: String,
    pub external_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub contact_external_id: Option<String>,
    pub exam_external_id: Option<String>,
    pub status: Option<String>,
    pub credit_type: Option<String>,
    pub price: Option<String>,
    pub booked_at: Option<String>,
    pub last_modified_at: Option<String>,
    pub synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BookingDB {
    pub fn new_row(record: &BookingRecord, now: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: Some(record.external_id.clone()),
            idempotency_key: record.idempotency_key.clone(),
            contact_external_id: record.contact_external_id.clone(),
            exam_external_id: record.exam_external_id.clone(),
            status: record.status.clone(),
            credit_type: record.credit_type.clone(),
            price: record.price.map(|p| p.to_string()),
            booked_at: to_db_ts(&record.booked_at),
            last_modified_at: to_db_ts(&record.last_modified),
            synced_at: Some(now.to_string()),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

impl From<BookingDB> for BookingRecord {
    fn from(db: BookingDB) -> Self {
        Self {
            external_id: db.external_id.unwrap_or_default(),
            idempotency_key: db.idempotency_key,
            contact_external_id: db.contact_external_id,
            exam_external_id: db.exam_external_id,
            status: db.status,
            credit_type: db.credit_type,
            price: db.price.as_deref().and_then(|p| p.parse::<Decimal>().ok()),
            booked_at: parse_db_ts(&db.booked_at),
            last_modified: parse_db_ts(&db.last_modified_at),
        }
    }
}

#[derive(Queryable, Insertable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::contacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContactDB {
    pub id: String,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub last_modified_at: Option<String>,
    pub synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ContactDB {
    pub fn new_row(record: &ContactRecord, now: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: Some(record.external_id.clone()),
            email: record.email.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            phone: record.phone.clone(),
            last_modified_at: to_db_ts(&record.last_modified),
            synced_at: Some(now.to_string()),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

impl From<ContactDB> for ContactRecord {
    fn from(db: ContactDB) -> Self {
        Self {
            external_id: db.external_id.unwrap_or_default(),
            email: db.email,
            first_name: db.first_name,
            last_name: db.last_name,
            phone: db.phone,
            last_modified: parse_db_ts(&db.last_modified_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 6, 10, 8, 30, 0).single();
        let db = to_db_ts(&ts);
        assert_eq!(parse_db_ts(&db), ts);
    }

    #[test]
    fn test_unparseable_timestamp_degrades_to_none() {
        assert_eq!(parse_db_ts(&Some("not a date".to_string())), None);
        assert_eq!(parse_db_ts(&None), None);
    }

    #[test]
    fn test_booking_round_trip_preserves_price() {
        let record = BookingRecord {
            external_id: "ext-1".to_string(),
            idempotency_key: Some("bk-1".to_string()),
            contact_external_id: Some("c-1".to_string()),
            exam_external_id: Some("e-1".to_string()),
            status: Some("CONFIRMED".to_string()),
            credit_type: Some("Mock Discussion Token".to_string()),
            price: Some("49.50".parse().unwrap()),
            booked_at: None,
            last_modified: None,
        };
        let db = BookingDB::new_row(&record, "2026-06-10T00:00:00+00:00");
        assert_eq!(db.price.as_deref(), Some("49.50"));

        let back: BookingRecord = db.into();
        assert_eq!(back.price, record.price);
        assert_eq!(back.external_id, "ext-1");
    }
}

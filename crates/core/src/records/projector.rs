//! Projection of CRM property bags into typed local records.
//!
//! Each domain has an explicit allow-list of properties; anything outside
//! it is dropped here. Absent, null, and empty values all normalize to
//! `None`, and timestamps arrive either as millisecond epochs or RFC 3339
//! strings depending on the endpoint that produced them.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use examsync_crm::models::CrmRecord;

use super::model::{BookingRecord, ContactRecord, ExamRecord, ProjectedRecord, SyncDomain};
use crate::errors::{Error, Result};

/// Project a raw CRM record into the typed record for its domain.
///
/// Fails only when the record has no id; individual property values that
/// fail to parse degrade to `None` rather than poisoning the record.
pub fn project(domain: SyncDomain, record: &CrmRecord) -> Result<ProjectedRecord> {
    if record.id.trim().is_empty() {
        return Err(Error::Validation(format!(
            "CRM {} record has an empty id",
            domain
        )));
    }

    let last_modified = record
        .property(domain.modified_property())
        .and_then(parse_timestamp)
        .or(record.updated_at);

    let projected = match domain {
        SyncDomain::Exams => ProjectedRecord::Exam(ExamRecord {
            external_id: record.id.clone(),
            name: owned(record.property("name")),
            exam_level: owned(record.property("exam_level")),
            location: owned(record.property("location")),
            starts_at: record.property("exam_date").and_then(parse_timestamp),
            capacity: record.property("capacity").and_then(|v| v.parse().ok()),
            status: owned(record.property("exam_status")),
            last_modified,
        }),
        SyncDomain::Bookings => ProjectedRecord::Booking(BookingRecord {
            external_id: record.id.clone(),
            idempotency_key: owned(record.property("booking_key")),
            contact_external_id: owned(record.property("contact_id")),
            exam_external_id: owned(record.property("exam_id")),
            status: owned(record.property("booking_status")),
            credit_type: owned(record.property("token_type")),
            price: record
                .property("price")
                .and_then(|v| Decimal::from_str(v).ok()),
            booked_at: record.property("booking_date").and_then(parse_timestamp),
            last_modified,
        }),
        SyncDomain::Contacts => ProjectedRecord::Contact(ContactRecord {
            external_id: record.id.clone(),
            email: owned(record.property("email")),
            first_name: owned(record.property("firstname")),
            last_name: owned(record.property("lastname")),
            phone: owned(record.property("phone")),
            last_modified,
        }),
    };

    Ok(projected)
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Parse a CRM timestamp: millisecond epoch digits or an RFC 3339 string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        let millis: i64 = raw.parse().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

//! Typed local record models mirrored from the CRM.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A sync domain: one CRM object type mirrored into one local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDomain {
    Exams,
    Bookings,
    Contacts,
}

impl SyncDomain {
    /// All domains, in the order the runner processes them.
    pub fn all() -> [SyncDomain; 3] {
        [SyncDomain::Exams, SyncDomain::Bookings, SyncDomain::Contacts]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDomain::Exams => "exams",
            SyncDomain::Bookings => "bookings",
            SyncDomain::Contacts => "contacts",
        }
    }

    /// CRM object type path segment for this domain.
    pub fn object_type(&self) -> &'static str {
        self.as_str()
    }

    /// CRM property holding the last-modified timestamp.
    pub fn modified_property(&self) -> &'static str {
        match self {
            // Contacts predate the generic object model and kept the
            // legacy property name.
            SyncDomain::Contacts => "lastmodifieddate",
            _ => "hs_lastmodifieddate",
        }
    }

    /// CRM property holding the creation timestamp.
    pub fn created_property(&self) -> &'static str {
        "createdate"
    }

    /// Allow-list of properties requested from the CRM for this domain.
    pub fn search_properties(&self) -> &'static [&'static str] {
        match self {
            SyncDomain::Exams => &[
                "name",
                "exam_level",
                "location",
                "exam_date",
                "capacity",
                "exam_status",
                "hs_lastmodifieddate",
            ],
            SyncDomain::Bookings => &[
                "booking_key",
                "contact_id",
                "exam_id",
                "booking_status",
                "token_type",
                "price",
                "booking_date",
                "hs_lastmodifieddate",
            ],
            SyncDomain::Contacts => &[
                "email",
                "firstname",
                "lastname",
                "phone",
                "lastmodifieddate",
            ],
        }
    }
}

impl std::fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local mirror of a CRM exam record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub external_id: String,
    pub name: Option<String>,
    pub exam_level: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
    pub status: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Local mirror of a CRM booking record.
///
/// Bookings are the only domain that can be created local-first; the
/// `idempotency_key` links such rows to their CRM counterpart once it
/// becomes observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub external_id: String,
    pub idempotency_key: Option<String>,
    pub contact_external_id: Option<String>,
    pub exam_external_id: Option<String>,
    pub status: Option<String>,
    pub credit_type: Option<String>,
    pub price: Option<Decimal>,
    pub booked_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Local mirror of a CRM contact record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub external_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A projected record ready for upserting into the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "camelCase")]
pub enum ProjectedRecord {
    Exam(ExamRecord),
    Booking(BookingRecord),
    Contact(ContactRecord),
}

impl ProjectedRecord {
    pub fn domain(&self) -> SyncDomain {
        match self {
            ProjectedRecord::Exam(_) => SyncDomain::Exams,
            ProjectedRecord::Booking(_) => SyncDomain::Bookings,
            ProjectedRecord::Contact(_) => SyncDomain::Contacts,
        }
    }

    pub fn external_id(&self) -> &str {
        match self {
            ProjectedRecord::Exam(r) => &r.external_id,
            ProjectedRecord::Booking(r) => &r.external_id,
            ProjectedRecord::Contact(r) => &r.external_id,
        }
    }

    /// The correlation key used by backfill, if this record carries one.
    pub fn idempotency_key(&self) -> Option<&str> {
        match self {
            ProjectedRecord::Booking(r) => r.idempotency_key.as_deref(),
            _ => None,
        }
    }
}

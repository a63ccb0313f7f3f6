//! Backfill of external identifiers onto local-first records.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};

use crate::events::{spawn_cascade, DomainEvent, DomainEventSink};
use crate::records::{ProjectedRecord, RecordRepositoryTrait};

/// Outcome of one backfill pass.
#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    /// Local rows that received their external id.
    pub linked: usize,
    /// Per-record errors, recorded rather than raised.
    pub errors: Vec<String>,
}

/// Links local-first records to newly observed external records via the
/// idempotency key, writing only `external_id` and `synced_at`. The local
/// store stays authoritative for every other column.
pub struct BackfillMatcher {
    repository: Arc<dyn RecordRepositoryTrait>,
    event_sink: Arc<dyn DomainEventSink>,
}

impl BackfillMatcher {
    pub fn new(
        repository: Arc<dyn RecordRepositoryTrait>,
        event_sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            repository,
            event_sink,
        }
    }

    pub async fn backfill(&self, records: &[ProjectedRecord]) -> BackfillSummary {
        let mut summary = BackfillSummary::default();
        let mut events: Vec<DomainEvent> = Vec::new();
        let domain = self.repository.domain();

        for record in records {
            let Some(key) = record.idempotency_key() else {
                continue;
            };
            let external_id = record.external_id();

            let matches = match self.repository.find_unlinked_by_idempotency_key(key) {
                Ok(matches) => matches,
                Err(err) => {
                    summary
                        .errors
                        .push(format!("backfill lookup for key {}: {}", key, err));
                    continue;
                }
            };

            let Some(local_id) = matches.first() else {
                // Not created locally yet, or already linked. Either way
                // there is nothing to do for this record.
                continue;
            };

            if matches.len() > 1 {
                // The key carries a uniqueness contract; more than one
                // unlinked row means upstream data is inconsistent.
                warn!(
                    "Integrity warning: idempotency key {} matches {} unlinked {} rows; linking {} and leaving the rest",
                    key,
                    matches.len(),
                    domain,
                    local_id
                );
            }

            match self
                .repository
                .link_external_id(local_id, external_id, Utc::now())
                .await
            {
                Ok(()) => {
                    debug!(
                        "Backfilled {} row {} with external id {}",
                        domain, local_id, external_id
                    );
                    summary.linked += 1;
                    events.push(DomainEvent::ExternalIdLinked {
                        domain,
                        local_id: local_id.clone(),
                        external_id: external_id.to_string(),
                    });
                }
                Err(err) => {
                    summary
                        .errors
                        .push(format!("backfill link for row {}: {}", local_id, err));
                }
            }
        }

        spawn_cascade(Arc::clone(&self.event_sink), events);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;

    use crate::errors::{Error, Result};
    use crate::events::MockDomainEventSink;
    use crate::records::{BookingRecord, SyncDomain, UpsertOutcome};

    /// In-memory stand-in for the bookings table.
    struct FakeBookingRepository {
        /// key -> unlinked local row ids
        unlinked: Mutex<HashMap<String, Vec<String>>>,
        links: Mutex<Vec<(String, String)>>,
        fail_links: bool,
    }

    impl FakeBookingRepository {
        fn new(unlinked: &[(&str, &[&str])]) -> Self {
            Self {
                unlinked: Mutex::new(
                    unlinked
                        .iter()
                        .map(|(k, ids)| {
                            (
                                k.to_string(),
                                ids.iter().map(|s| s.to_string()).collect(),
                            )
                        })
                        .collect(),
                ),
                links: Mutex::new(Vec::new()),
                fail_links: false,
            }
        }
    }

    #[async_trait]
    impl RecordRepositoryTrait for FakeBookingRepository {
        fn domain(&self) -> SyncDomain {
            SyncDomain::Bookings
        }

        async fn upsert(&self, _record: ProjectedRecord) -> Result<UpsertOutcome> {
            Ok(UpsertOutcome::Created)
        }

        fn find_unlinked_by_idempotency_key(&self, key: &str) -> Result<Vec<String>> {
            Ok(self
                .unlinked
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_default())
        }

        async fn link_external_id(
            &self,
            local_id: &str,
            external_id: &str,
            _synced_at: DateTime<Utc>,
        ) -> Result<()> {
            if self.fail_links {
                return Err(Error::Repository("link refused".to_string()));
            }
            self.links
                .lock()
                .unwrap()
                .push((local_id.to_string(), external_id.to_string()));
            Ok(())
        }
    }

    fn booking(external_id: &str, key: Option<&str>) -> ProjectedRecord {
        ProjectedRecord::Booking(BookingRecord {
            external_id: external_id.to_string(),
            idempotency_key: key.map(str::to_string),
            contact_external_id: None,
            exam_external_id: None,
            status: None,
            credit_type: None,
            price: None,
            booked_at: None,
            last_modified: None,
        })
    }

    #[tokio::test]
    async fn test_single_match_links_external_id_only() {
        let repository = Arc::new(FakeBookingRepository::new(&[("bk-1", &["local-9"])]));
        let matcher = BackfillMatcher::new(
            repository.clone(),
            Arc::new(MockDomainEventSink::new()),
        );

        let summary = matcher.backfill(&[booking("ext-42", Some("bk-1"))]).await;

        assert_eq!(summary.linked, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(
            repository.links.lock().unwrap().as_slice(),
            &[("local-9".to_string(), "ext-42".to_string())]
        );
    }

    #[tokio::test]
    async fn test_zero_matches_skips_silently() {
        let repository = Arc::new(FakeBookingRepository::new(&[]));
        let matcher = BackfillMatcher::new(
            repository.clone(),
            Arc::new(MockDomainEventSink::new()),
        );

        let summary = matcher.backfill(&[booking("ext-1", Some("unknown"))]).await;

        assert_eq!(summary.linked, 0);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_records_without_key_are_ignored() {
        let repository = Arc::new(FakeBookingRepository::new(&[("bk-1", &["local-1"])]));
        let matcher = BackfillMatcher::new(
            repository.clone(),
            Arc::new(MockDomainEventSink::new()),
        );

        let summary = matcher.backfill(&[booking("ext-1", None)]).await;
        assert_eq!(summary.linked, 0);
    }

    #[tokio::test]
    async fn test_multiple_matches_link_first_and_warn() {
        let repository = Arc::new(FakeBookingRepository::new(&[(
            "bk-dup",
            &["local-1", "local-2"],
        )]));
        let matcher = BackfillMatcher::new(
            repository.clone(),
            Arc::new(MockDomainEventSink::new()),
        );

        let summary = matcher.backfill(&[booking("ext-7", Some("bk-dup"))]).await;

        assert_eq!(summary.linked, 1);
        let links = repository.links.lock().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "local-1");
    }

    #[tokio::test]
    async fn test_link_failure_recorded_not_raised() {
        let mut repository = FakeBookingRepository::new(&[("bk-1", &["local-1"])]);
        repository.fail_links = true;
        let matcher = BackfillMatcher::new(
            Arc::new(repository),
            Arc::new(MockDomainEventSink::new()),
        );

        let summary = matcher.backfill(&[booking("ext-1", Some("bk-1"))]).await;

        assert_eq!(summary.linked, 0);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_successful_links_emit_events() {
        let repository = Arc::new(FakeBookingRepository::new(&[("bk-1", &["local-1"])]));
        let sink = Arc::new(MockDomainEventSink::new());
        let matcher = BackfillMatcher::new(repository, sink.clone());

        matcher.backfill(&[booking("ext-1", Some("bk-1"))]).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(sink.len(), 1);
    }
}

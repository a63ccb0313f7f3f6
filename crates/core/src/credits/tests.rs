use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use examsync_crm::models::{BatchUpdateInput, CrmRecord, SearchRequest, SearchResponse};
use examsync_crm::{CrmApi, CrmError};

use super::model::{CreditUnit, FailReason, SkipReason};
use super::orchestrator::CreditRefundOrchestrator;
use crate::events::MockDomainEventSink;

/// Scripted CRM double for refund runs. Balances are shared across
/// properties; failure sets make whole chunks error out.
#[derive(Default)]
struct MockCrm {
    balances: Mutex<HashMap<String, i64>>,
    /// A read chunk containing any of these contact ids fails.
    fail_read_ids: HashSet<String>,
    /// A contact update chunk containing any of these ids fails.
    fail_update_ids: HashSet<String>,
    /// Booking ids silently missing from the marking response.
    drop_marking_ids: HashSet<String>,
    read_chunk_sizes: Mutex<Vec<usize>>,
    contact_updates: Mutex<Vec<BatchUpdateInput>>,
    contact_update_chunk_sizes: Mutex<Vec<usize>>,
    booking_updates: Mutex<Vec<BatchUpdateInput>>,
}

impl MockCrm {
    fn with_balances(balances: &[(&str, i64)]) -> Self {
        Self {
            balances: Mutex::new(
                balances
                    .iter()
                    .map(|(id, b)| (id.to_string(), *b))
                    .collect(),
            ),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CrmApi for MockCrm {
    async fn search_records(
        &self,
        _object_type: &str,
        _request: SearchRequest,
    ) -> Result<SearchResponse, CrmError> {
        Ok(SearchResponse {
            total: None,
            results: Vec::new(),
            paging: None,
        })
    }

    async fn batch_read(
        &self,
        _object_type: &str,
        ids: &[String],
        properties: &[String],
    ) -> Result<Vec<CrmRecord>, CrmError> {
        self.read_chunk_sizes.lock().unwrap().push(ids.len());
        if ids.iter().any(|id| self.fail_read_ids.contains(id)) {
            return Err(CrmError::Api {
                status: 500,
                message: "read refused".to_string(),
            });
        }
        let balances = self.balances.lock().unwrap();
        // Contacts without a recorded balance are left out of the response,
        // the way the CRM omits unknown ids.
        Ok(ids
            .iter()
            .filter_map(|id| {
                let balance = balances.get(id)?;
                let mut record_properties = HashMap::new();
                for property in properties {
                    record_properties.insert(property.clone(), Some(balance.to_string()));
                }
                Some(CrmRecord {
                    id: id.clone(),
                    properties: record_properties,
                    updated_at: None,
                })
            })
            .collect())
    }

    async fn batch_update(
        &self,
        object_type: &str,
        inputs: Vec<BatchUpdateInput>,
    ) -> Result<Vec<CrmRecord>, CrmError> {
        if object_type == "contacts" {
            self.contact_update_chunk_sizes
                .lock()
                .unwrap()
                .push(inputs.len());
            if inputs.iter().any(|i| self.fail_update_ids.contains(&i.id)) {
                return Err(CrmError::Api {
                    status: 500,
                    message: "update refused".to_string(),
                });
            }
            let records = echo(&inputs);
            self.contact_updates.lock().unwrap().extend(inputs);
            return Ok(records);
        }

        let records: Vec<CrmRecord> = inputs
            .iter()
            .filter(|i| !self.drop_marking_ids.contains(&i.id))
            .map(|i| CrmRecord {
                id: i.id.clone(),
                properties: HashMap::new(),
                updated_at: None,
            })
            .collect();
        self.booking_updates.lock().unwrap().extend(inputs);
        Ok(records)
    }
}

fn echo(inputs: &[BatchUpdateInput]) -> Vec<CrmRecord> {
    inputs
        .iter()
        .map(|i| CrmRecord {
            id: i.id.clone(),
            properties: HashMap::new(),
            updated_at: None,
        })
        .collect()
}

fn unit(id: &str, beneficiary: &str, credit_type: &str) -> CreditUnit {
    CreditUnit {
        id: id.to_string(),
        beneficiary_id: Some(beneficiary.to_string()),
        credit_type: Some(credit_type.to_string()),
        refunded: false,
        refunded_at: None,
        refund_actor: None,
    }
}

fn orchestrator(crm: Arc<MockCrm>) -> (CreditRefundOrchestrator, Arc<MockDomainEventSink>) {
    let sink = Arc::new(MockDomainEventSink::new());
    let orchestrator = CreditRefundOrchestrator::new(crm, sink.clone()).without_delay();
    (orchestrator, sink)
}

#[tokio::test]
async fn test_mixed_eligibility_reconciles_every_unit() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 2)]));
    let (orchestrator, _) = orchestrator(crm);

    let units = vec![
        unit("1", "c-1", "Mock Discussion Token"),
        CreditUnit {
            refunded: true,
            ..unit("2", "c-2", "Mock Discussion Token")
        },
        unit("3", "c-3", "Unknown Token"),
    ];
    let result = orchestrator.refund_units(units, "admin@example.com").await;

    assert_eq!(result.successful, vec!["1".to_string()]);
    assert!(result.failed.is_empty());
    assert_eq!(result.skipped.len(), 2);
    assert_eq!(result.skipped[0].unit_id, "2");
    assert_eq!(result.skipped[0].reason, SkipReason::AlreadyRefunded);
    assert_eq!(result.skipped[0].reason.as_str(), "already refunded");
    assert_eq!(result.skipped[1].unit_id, "3");
    assert_eq!(result.skipped[1].reason, SkipReason::UnknownCreditType);
    assert_eq!(result.skipped[1].reason.as_str(), "invalid token type");
    assert_eq!(result.total(), 3);
}

#[tokio::test]
async fn test_already_refunded_wins_over_other_reasons() {
    let crm = Arc::new(MockCrm::default());
    let (orchestrator, _) = orchestrator(crm);

    // Refunded and missing a credit type at once.
    let units = vec![CreditUnit {
        id: "9".to_string(),
        beneficiary_id: None,
        credit_type: None,
        refunded: true,
        refunded_at: None,
        refund_actor: None,
    }];
    let result = orchestrator.refund_units(units, "ops").await;

    assert_eq!(result.skipped[0].reason, SkipReason::AlreadyRefunded);
}

#[tokio::test]
async fn test_balance_incremented_from_current_value() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 5)]));
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator
        .refund_units(vec![unit("1", "c-1", "Mock Exam Token")], "ops")
        .await;

    assert_eq!(result.successful, vec!["1".to_string()]);
    let updates = crm.contact_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, "c-1");
    assert_eq!(
        updates[0].properties.get("mock_exam_tokens"),
        Some(&"6".to_string())
    );
}

#[tokio::test]
async fn test_shared_beneficiary_folds_into_one_write() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 1)]));
    let (orchestrator, _) = orchestrator(crm.clone());

    let units = vec![
        unit("1", "c-1", "Writing Review Token"),
        unit("2", "c-1", "Writing Review Token"),
    ];
    let result = orchestrator.refund_units(units, "ops").await;

    assert_eq!(result.successful.len(), 2);
    let updates = crm.contact_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].properties.get("writing_review_tokens"),
        Some(&"3".to_string())
    );
    // The beneficiary was read once, not once per unit.
    assert_eq!(crm.read_chunk_sizes.lock().unwrap().as_slice(), &[1]);
}

#[tokio::test]
async fn test_beneficiary_unknown_to_crm_starts_from_zero() {
    let crm = Arc::new(MockCrm::default());
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator
        .refund_units(vec![unit("1", "c-new", "Mock Discussion Token")], "ops")
        .await;

    assert_eq!(result.successful, vec!["1".to_string()]);
    let updates = crm.contact_updates.lock().unwrap();
    assert_eq!(
        updates[0].properties.get("mock_discussion_tokens"),
        Some(&"1".to_string())
    );
}

#[tokio::test]
async fn test_distinct_credit_types_update_distinct_properties() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 0)]));
    let (orchestrator, _) = orchestrator(crm.clone());

    let units = vec![
        unit("1", "c-1", "Mock Discussion Token"),
        unit("2", "c-1", "Mock Exam Token"),
    ];
    let result = orchestrator.refund_units(units, "ops").await;

    assert_eq!(result.successful.len(), 2);
    let updates = crm.contact_updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    let properties: HashSet<&str> = updates
        .iter()
        .flat_map(|u| u.properties.keys().map(String::as_str))
        .collect();
    assert!(properties.contains("mock_discussion_tokens"));
    assert!(properties.contains("mock_exam_tokens"));
}

#[tokio::test]
async fn test_marking_units_carries_actor_and_flag() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 0)]));
    let (orchestrator, _) = orchestrator(crm.clone());

    orchestrator
        .refund_units(vec![unit("1", "c-1", "Mock Discussion Token")], "admin@example.com")
        .await;

    let updates = crm.booking_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, "1");
    assert_eq!(
        updates[0].properties.get("refunded"),
        Some(&"true".to_string())
    );
    assert_eq!(
        updates[0].properties.get("refund_actor"),
        Some(&"admin@example.com".to_string())
    );
    assert!(updates[0].properties.contains_key("refunded_at"));
}

#[tokio::test]
async fn test_marking_miss_reported_as_failed() {
    let mut crm = MockCrm::with_balances(&[("c-1", 0)]);
    crm.drop_marking_ids.insert("4".to_string());
    let crm = Arc::new(crm);
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator
        .refund_units(vec![unit("4", "c-1", "Mock Discussion Token")], "ops")
        .await;

    assert!(result.successful.is_empty());
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].unit_id, "4");
    assert_eq!(result.failed[0].reason, FailReason::MarkingFailed);
    assert_eq!(result.failed[0].reason.as_str(), "marking failed");
    // The balance write still happened; reconciliation is manual.
    assert_eq!(crm.contact_updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_read_failure_fails_balance_phase_without_writes() {
    let mut crm = MockCrm::with_balances(&[("c-1", 0)]);
    crm.fail_read_ids.insert("c-1".to_string());
    let crm = Arc::new(crm);
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator
        .refund_units(vec![unit("1", "c-1", "Mock Discussion Token")], "ops")
        .await;

    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].reason, FailReason::BalanceUpdateFailed);
    assert!(crm.contact_updates.lock().unwrap().is_empty());
    assert!(crm.booking_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_failure_blocks_marking_for_that_unit() {
    let mut crm = MockCrm::with_balances(&[("c-1", 0)]);
    crm.fail_update_ids.insert("c-1".to_string());
    let crm = Arc::new(crm);
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator
        .refund_units(vec![unit("1", "c-1", "Mock Discussion Token")], "ops")
        .await;

    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].reason, FailReason::BalanceUpdateFailed);
    assert_eq!(result.failed[0].reason.as_str(), "balance update failed");
    assert!(crm.booking_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_large_input_respects_batch_limit() {
    let crm = Arc::new(MockCrm::default());
    let (orchestrator, _) = orchestrator(crm.clone());

    let units: Vec<CreditUnit> = (0..250)
        .map(|i| {
            unit(
                &format!("b-{}", i),
                &format!("c-{}", i),
                "Mock Discussion Token",
            )
        })
        .collect();
    let result = orchestrator.refund_units(units, "ops").await;

    assert_eq!(result.successful.len(), 250);
    let read_sizes = crm.read_chunk_sizes.lock().unwrap();
    assert_eq!(read_sizes.as_slice(), &[100, 100, 50]);
    let update_sizes = crm.contact_update_chunk_sizes.lock().unwrap();
    assert!(update_sizes.iter().all(|&s| s <= 100));
    assert_eq!(update_sizes.iter().sum::<usize>(), 250);
}

#[tokio::test]
async fn test_conservation_across_buckets() {
    let mut crm = MockCrm::with_balances(&[("c-1", 0), ("c-2", 0)]);
    crm.drop_marking_ids.insert("2".to_string());
    let crm = Arc::new(crm);
    let (orchestrator, _) = orchestrator(crm);

    let units = vec![
        unit("1", "c-1", "Mock Discussion Token"),
        unit("2", "c-2", "Mock Discussion Token"),
        CreditUnit {
            refunded: true,
            ..unit("3", "c-3", "Mock Exam Token")
        },
        CreditUnit {
            beneficiary_id: None,
            ..unit("4", "c-4", "Mock Exam Token")
        },
        unit("5", "c-5", "Bogus Token"),
    ];
    let total = units.len();
    let result = orchestrator.refund_units(units, "ops").await;

    assert_eq!(result.total(), total);
    assert_eq!(result.successful.len(), 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.skipped.len(), 3);
}

#[tokio::test]
async fn test_empty_input_is_a_no_op() {
    let crm = Arc::new(MockCrm::default());
    let (orchestrator, _) = orchestrator(crm.clone());

    let result = orchestrator.refund_units(Vec::new(), "ops").await;

    assert_eq!(result.total(), 0);
    assert!(crm.read_chunk_sizes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_successful_refunds_emit_events() {
    let crm = Arc::new(MockCrm::with_balances(&[("c-1", 0)]));
    let (orchestrator, sink) = orchestrator(crm);

    orchestrator
        .refund_units(vec![unit("1", "c-1", "Mock Discussion Token")], "ops")
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(sink.len(), 1);
}

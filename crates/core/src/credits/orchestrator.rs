//! Batched credit refunds against the CRM.
//!
//! Refunding is a two-phase write: first the beneficiary's balance property
//! is incremented, then the consuming booking is marked refunded. The
//! orchestrator never raises for a business rejection or a CRM failure;
//! every input unit is reconciled into exactly one bucket of the returned
//! [`RefundResult`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use examsync_crm::models::BatchUpdateInput;
use examsync_crm::{chunk_ids, CrmApi};

use super::model::{
    balance_property, CreditUnit, FailReason, FailedRefund, RefundResult, SkipReason,
    SkippedRefund,
};
use crate::constants::INTER_BATCH_DELAY_MS;
use crate::events::{spawn_cascade, DomainEvent, DomainEventSink};

const BENEFICIARY_OBJECT: &str = "contacts";
const UNIT_OBJECT: &str = "bookings";

/// A unit that passed every eligibility check.
struct EligibleUnit {
    unit_id: String,
    beneficiary_id: String,
    credit_type: String,
    /// Contact property holding this credit type's balance.
    property: &'static str,
}

/// Restores credit balances for cancelled bookings in batches.
pub struct CreditRefundOrchestrator {
    crm: Arc<dyn CrmApi>,
    event_sink: Arc<dyn DomainEventSink>,
    inter_batch_delay: Duration,
}

impl CreditRefundOrchestrator {
    pub fn new(crm: Arc<dyn CrmApi>, event_sink: Arc<dyn DomainEventSink>) -> Self {
        Self {
            crm,
            event_sink,
            inter_batch_delay: Duration::from_millis(INTER_BATCH_DELAY_MS),
        }
    }

    #[cfg(test)]
    pub(crate) fn without_delay(mut self) -> Self {
        self.inter_batch_delay = Duration::ZERO;
        self
    }

    /// Refund each unit's credit to its beneficiary, attributing the action
    /// to `actor`.
    ///
    /// Ineligible units are skipped without any write. Units sharing a
    /// beneficiary and credit type are folded into a single balance write.
    pub async fn refund_units(&self, units: Vec<CreditUnit>, actor: &str) -> RefundResult {
        let mut result = RefundResult::default();
        let mut eligible: Vec<EligibleUnit> = Vec::new();

        for unit in &units {
            match check_eligibility(unit) {
                Ok(e) => eligible.push(e),
                Err(reason) => {
                    debug!("Skipping unit {}: {}", unit.id, reason.as_str());
                    result.skipped.push(SkippedRefund {
                        unit_id: unit.id.clone(),
                        reason,
                    });
                }
            }
        }

        if eligible.is_empty() {
            return result;
        }
        info!(
            "Refunding {} eligible unit(s) out of {} ({} skipped)",
            eligible.len(),
            units.len(),
            result.skipped.len()
        );

        // Grouped by balance property so each group reads and writes a
        // single contact property.
        let mut groups: BTreeMap<&'static str, Vec<&EligibleUnit>> = BTreeMap::new();
        for unit in &eligible {
            groups.entry(unit.property).or_default().push(unit);
        }

        let balance_updated = self.update_balances(&groups).await;
        let marked = self.mark_refunded(&eligible, &balance_updated, actor).await;

        let mut events: Vec<DomainEvent> = Vec::new();
        for unit in &eligible {
            if !balance_updated.contains(&(unit.property, unit.beneficiary_id.as_str())) {
                result.failed.push(FailedRefund {
                    unit_id: unit.unit_id.clone(),
                    reason: FailReason::BalanceUpdateFailed,
                });
            } else if !marked.contains(unit.unit_id.as_str()) {
                // The balance write landed but the unit is still unmarked;
                // surfaced for manual reconciliation rather than rolled back.
                warn!(
                    "Unit {} has its balance restored but is not marked refunded",
                    unit.unit_id
                );
                result.failed.push(FailedRefund {
                    unit_id: unit.unit_id.clone(),
                    reason: FailReason::MarkingFailed,
                });
            } else {
                result.successful.push(unit.unit_id.clone());
                events.push(DomainEvent::CreditRefunded {
                    unit_id: unit.unit_id.clone(),
                    beneficiary_id: unit.beneficiary_id.clone(),
                    credit_type: unit.credit_type.clone(),
                    actor: actor.to_string(),
                });
            }
        }

        info!(
            "Refund pass finished: {} successful, {} failed, {} skipped",
            result.successful.len(),
            result.failed.len(),
            result.skipped.len()
        );
        spawn_cascade(Arc::clone(&self.event_sink), events);
        result
    }

    /// Read current balances and write incremented ones, one group per
    /// balance property. Returns the `(property, beneficiary)` pairs whose
    /// new balance is confirmed written.
    async fn update_balances<'a>(
        &self,
        groups: &BTreeMap<&'static str, Vec<&'a EligibleUnit>>,
    ) -> HashSet<(&'static str, &'a str)> {
        let mut confirmed: HashSet<(&'static str, &'a str)> = HashSet::new();

        for (&property, units) in groups {
            // Dedupe beneficiaries, preserving first-seen order.
            let mut seen: HashSet<&str> = HashSet::new();
            let mut beneficiaries: Vec<&str> = Vec::new();
            let mut increments: HashMap<&str, i64> = HashMap::new();
            for unit in units {
                let id = unit.beneficiary_id.as_str();
                if seen.insert(id) {
                    beneficiaries.push(id);
                }
                *increments.entry(id).or_insert(0) += 1;
            }

            let ids: Vec<String> = beneficiaries.iter().map(|s| s.to_string()).collect();
            let mut balances: HashMap<&str, i64> = HashMap::new();
            for chunk in chunk_ids(&ids) {
                match self
                    .crm
                    .batch_read(BENEFICIARY_OBJECT, chunk, &[property.to_string()])
                    .await
                {
                    Ok(records) => {
                        // A beneficiary the CRM did not echo back is treated
                        // as holding a zero balance.
                        let mut read: HashMap<String, i64> = HashMap::new();
                        for record in &records {
                            let current = record
                                .property(property)
                                .and_then(|v| v.parse::<i64>().ok())
                                .unwrap_or(0);
                            read.insert(record.id.clone(), current);
                        }
                        for id in chunk {
                            let id = id.as_str();
                            if let Some(&original) =
                                beneficiaries.iter().find(|b| **b == id)
                            {
                                balances
                                    .insert(original, read.get(id).copied().unwrap_or(0));
                            }
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Balance read failed for {} beneficiary id(s) on {}: {}",
                            chunk.len(),
                            property,
                            err
                        );
                    }
                }
                tokio::time::sleep(self.inter_batch_delay).await;
            }

            // Only beneficiaries with a known current balance are written.
            let inputs: Vec<BatchUpdateInput> = beneficiaries
                .iter()
                .filter_map(|id| {
                    let current = *balances.get(id)?;
                    let increment = increments.get(id).copied().unwrap_or(0);
                    let mut properties = HashMap::new();
                    properties
                        .insert(property.to_string(), (current + increment).to_string());
                    Some(BatchUpdateInput {
                        id: id.to_string(),
                        properties,
                    })
                })
                .collect();

            for chunk in chunk_slices(&inputs) {
                match self
                    .crm
                    .batch_update(BENEFICIARY_OBJECT, chunk.to_vec())
                    .await
                {
                    Ok(records) => {
                        let returned: HashSet<&str> =
                            records.iter().map(|r| r.id.as_str()).collect();
                        for input in chunk {
                            if returned.contains(input.id.as_str()) {
                                if let Some(&original) =
                                    beneficiaries.iter().find(|b| **b == input.id.as_str())
                                {
                                    confirmed.insert((property, original));
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Balance update failed for a chunk of {} contact(s) on {}: {}",
                            chunk.len(),
                            property,
                            err
                        );
                    }
                }
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        confirmed
    }

    /// Mark units whose balance write is confirmed as refunded. Returns the
    /// unit ids the CRM confirmed.
    async fn mark_refunded<'a>(
        &self,
        eligible: &'a [EligibleUnit],
        balance_updated: &HashSet<(&'static str, &'a str)>,
        actor: &str,
    ) -> HashSet<&'a str> {
        let refunded_at = Utc::now().timestamp_millis().to_string();
        let inputs: Vec<BatchUpdateInput> = eligible
            .iter()
            .filter(|u| balance_updated.contains(&(u.property, u.beneficiary_id.as_str())))
            .map(|u| {
                let mut properties = HashMap::new();
                properties.insert("refunded".to_string(), "true".to_string());
                properties.insert("refunded_at".to_string(), refunded_at.clone());
                properties.insert("refund_actor".to_string(), actor.to_string());
                BatchUpdateInput {
                    id: u.unit_id.clone(),
                    properties,
                }
            })
            .collect();

        let mut marked: HashSet<&str> = HashSet::new();
        for chunk in chunk_slices(&inputs) {
            match self.crm.batch_update(UNIT_OBJECT, chunk.to_vec()).await {
                Ok(records) => {
                    let returned: HashSet<String> =
                        records.into_iter().map(|r| r.id).collect();
                    for input in chunk {
                        if returned.contains(&input.id) {
                            if let Some(unit) =
                                eligible.iter().find(|u| u.unit_id == input.id)
                            {
                                marked.insert(unit.unit_id.as_str());
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Marking update failed for a chunk of {} unit(s): {}",
                        chunk.len(),
                        err
                    );
                }
            }
            tokio::time::sleep(self.inter_batch_delay).await;
        }
        marked
    }
}

/// Eligibility gate; the first failing check decides the skip reason.
fn check_eligibility(unit: &CreditUnit) -> Result<EligibleUnit, SkipReason> {
    if unit.refunded {
        return Err(SkipReason::AlreadyRefunded);
    }
    let credit_type = match unit.credit_type.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(SkipReason::MissingCreditType),
    };
    let beneficiary_id = match unit.beneficiary_id.as_deref().map(str::trim) {
        Some(b) if !b.is_empty() => b,
        _ => return Err(SkipReason::MissingBeneficiary),
    };
    let property = balance_property(credit_type).ok_or(SkipReason::UnknownCreditType)?;

    Ok(EligibleUnit {
        unit_id: unit.id.clone(),
        beneficiary_id: beneficiary_id.to_string(),
        credit_type: credit_type.to_string(),
        property,
    })
}

/// Chunk owned update inputs under the CRM batch limit.
fn chunk_slices(inputs: &[BatchUpdateInput]) -> impl Iterator<Item = &[BatchUpdateInput]> {
    inputs.chunks(examsync_crm::CRM_BATCH_LIMIT)
}

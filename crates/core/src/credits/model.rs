//! Credit refund domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A booking that consumed one prepaid credit of a given type.
///
/// Handed to the refund orchestrator by the cancellation workflow. A unit
/// is refunded at most once: `refunded` is checked before any write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditUnit {
    /// CRM id of the booking record.
    pub id: String,
    /// CRM id of the contact whose balance is restored.
    pub beneficiary_id: Option<String>,
    /// Display name of the consumed credit type, e.g. "Mock Discussion Token".
    pub credit_type: Option<String>,
    pub refunded: bool,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_actor: Option<String>,
}

/// Why a unit was skipped without any write. First failing reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    AlreadyRefunded,
    MissingCreditType,
    MissingBeneficiary,
    UnknownCreditType,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyRefunded => "already refunded",
            SkipReason::MissingCreditType => "no token type recorded",
            SkipReason::MissingBeneficiary => "missing beneficiary id",
            SkipReason::UnknownCreditType => "invalid token type",
        }
    }
}

/// Which half of the two-phase write failed for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    /// The beneficiary's balance write did not land.
    BalanceUpdateFailed,
    /// The balance landed but marking the unit processed did not.
    MarkingFailed,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::BalanceUpdateFailed => "balance update failed",
            FailReason::MarkingFailed => "marking failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRefund {
    pub unit_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRefund {
    pub unit_id: String,
    pub reason: FailReason,
}

/// Reconciled outcome of one orchestrator call.
///
/// Every input unit lands in exactly one of the three buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub successful: Vec<String>,
    pub failed: Vec<FailedRefund>,
    pub skipped: Vec<SkippedRefund>,
}

impl RefundResult {
    /// Total units accounted for across all buckets.
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len() + self.skipped.len()
    }
}

/// Resolve a credit type's display name to the CRM contact property that
/// stores its balance. Unknown types make a unit ineligible.
pub fn balance_property(credit_type: &str) -> Option<&'static str> {
    match credit_type {
        "Mock Discussion Token" => Some("mock_discussion_tokens"),
        "Mock Exam Token" => Some("mock_exam_tokens"),
        "Writing Review Token" => Some("writing_review_tokens"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_credit_types_resolve() {
        assert_eq!(
            balance_property("Mock Discussion Token"),
            Some("mock_discussion_tokens")
        );
        assert_eq!(
            balance_property("Mock Exam Token"),
            Some("mock_exam_tokens")
        );
        assert_eq!(
            balance_property("Writing Review Token"),
            Some("writing_review_tokens")
        );
    }

    #[test]
    fn test_unknown_credit_type_is_none() {
        assert_eq!(balance_property("Unknown"), None);
        assert_eq!(balance_property(""), None);
        // Matching is exact, not case-insensitive.
        assert_eq!(balance_property("mock discussion token"), None);
    }

    #[test]
    fn test_skip_reason_messages() {
        assert_eq!(SkipReason::AlreadyRefunded.as_str(), "already refunded");
        assert_eq!(SkipReason::UnknownCreditType.as_str(), "invalid token type");
    }

    #[test]
    fn test_refund_result_total() {
        let result = RefundResult {
            successful: vec!["1".to_string()],
            failed: vec![FailedRefund {
                unit_id: "2".to_string(),
                reason: FailReason::MarkingFailed,
            }],
            skipped: vec![SkippedRefund {
                unit_id: "3".to_string(),
                reason: SkipReason::AlreadyRefunded,
            }],
        };
        assert_eq!(result.total(), 3);
    }
}

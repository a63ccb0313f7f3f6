//! Domain events emitted after successful mutations.

use serde::{Deserialize, Serialize};

use crate::records::SyncDomain;

/// Events emitted by core services for downstream cascades (webhooks,
/// notifications). Delivery is best-effort and never blocks the emitting
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    /// A sync run upserted records for a domain.
    RecordsSynced {
        domain: SyncDomain,
        count: usize,
    },

    /// A local-first record was linked to its external counterpart.
    ExternalIdLinked {
        domain: SyncDomain,
        local_id: String,
        external_id: String,
    },

    /// A credit unit was refunded and marked processed.
    CreditRefunded {
        unit_id: String,
        beneficiary_id: String,
        credit_type: String,
        actor: String,
    },
}

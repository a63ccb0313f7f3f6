//! Batched credit refunds for cancelled bookings.

mod model;
mod orchestrator;

pub use model::{
    balance_property, CreditUnit, FailReason, FailedRefund, RefundResult, SkipReason,
    SkippedRefund,
};
pub use orchestrator::CreditRefundOrchestrator;

#[cfg(test)]
mod tests;

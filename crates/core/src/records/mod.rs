//! Typed record models, projection, and replica repository traits.

mod model;
pub mod projector;
mod traits;

pub use model::{BookingRecord, ContactRecord, ExamRecord, ProjectedRecord, SyncDomain};
pub use traits::{RecordRepositoryTrait, UpsertOutcome};

//! CRM record store client for examsync.
//!
//! This crate owns everything wire-level about the authoritative record
//! store: the rate-limited HTTP client with bounded backoff, the search and
//! batch endpoint models, and the per-call batch size limit. It knows
//! nothing about local storage or the sync engine; `examsync-core` consumes
//! it through the [`CrmApi`] trait.

pub mod chunk;
pub mod client;
pub mod errors;
pub mod models;
pub mod traits;

pub use chunk::{chunk_ids, CRM_BATCH_LIMIT};
pub use client::{CrmApiClient, CrmClientConfig, RateLimitStatus};
pub use errors::CrmError;
pub use traits::CrmApi;

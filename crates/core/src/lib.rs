//! Core domain logic for examsync.
//!
//! This crate holds the storage-agnostic heart of the platform: the sync
//! engine that keeps the local read store consistent with the CRM, the
//! credit refund orchestrator, domain events, and the shared error types.
//! Persistence lives behind repository traits implemented by
//! `examsync-storage-sqlite`; the wire protocol lives in `examsync-crm`.

pub mod constants;
pub mod credits;
pub mod errors;
pub mod events;
pub mod records;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};

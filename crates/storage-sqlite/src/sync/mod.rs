//! Sync cursor and run record persistence.

pub mod model;
pub mod repository;

pub use model::{SyncCursorDB, SyncRunDB};
pub use repository::{SyncCursorRepository, SyncRunRepository};

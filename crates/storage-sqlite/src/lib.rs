//! SQLite storage implementation for examsync.
//!
//! This crate provides all database-related functionality using Diesel ORM
//! with SQLite. It implements the repository traits defined in
//! `examsync-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations for the replica schema
//! - Repository implementations for the replica tables, sync cursors, and
//!   run records
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies
//! exist. `core` and `crm` are database-agnostic and work with traits.
//!
//! ```text
//! core (sync + refunds)      crm (wire client)
//!         │                        │
//!         └──────────┬─────────────┘
//!                    │
//!                    ▼
//!           storage-sqlite (this crate)
//!                    │
//!                    ▼
//!                SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

// Repository implementations
pub mod records;
pub mod sync;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors
pub use errors::StorageError;

// Re-export from examsync-core for convenience
pub use examsync_core::errors::{DatabaseError, Error, Result};

//! Storage Layer Module
//!
//! Persistence for shielding address registrations.
//!
//! This module contains:
//! - Storage trait definition for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryDepositStore;
pub use sqlite::SqliteDepositStore;
pub use traits::{DepositStore, StorageError, StorageResult};

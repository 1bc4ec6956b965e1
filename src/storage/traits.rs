//! Storage Trait Definitions
//!
//! Registry of shielding address registrations. Implementations can use
//! SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChainCode, DepositRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Receiver key already registered: {0}")]
    ReceiverKeyTaken(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Shielding address registry
///
/// Records are unique by (chain code mode, chain code, btc address) and each
/// receiver key belongs to at most one record. `insert` writes a record and
/// its receiver keys atomically.
///
/// Implementations:
/// - `SqliteDepositStore` - Production storage with SQLite
/// - `MemoryDepositStore` - In-memory storage for testing
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Insert a new registration.
    ///
    /// Fails with `Duplicate` when the (chain code, address) pair exists and
    /// with `ReceiverKeyTaken` when any receiver key is already bound.
    async fn insert(&self, record: &DepositRecord) -> StorageResult<()>;

    /// Whether a registration for this (chain code, address) pair exists
    async fn exists(&self, chain_code: &ChainCode, btc_address: &str) -> StorageResult<bool>;

    /// Registered address for a chain code
    async fn address_for(&self, chain_code: &ChainCode) -> StorageResult<Option<String>>;

    /// Registrations with `from <= created_at < to`, oldest first
    async fn list_by_time(&self, from: i64, to: i64) -> StorageResult<Vec<DepositRecord>>;

    /// Whether a receiver key is bound to any registration
    async fn receiver_key_used(&self, receiver_key: &str) -> StorageResult<bool>;

    /// Check the backend is reachable
    async fn ping(&self) -> StorageResult<()>;
}

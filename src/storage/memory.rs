//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{DepositStore, StorageError, StorageResult};
use crate::types::{ChainCode, DepositRecord};

#[derive(Default)]
struct MemoryState {
    /// Records in insertion order
    records: Vec<DepositRecord>,
    /// Index: (chain code, btc address)
    pairs: HashSet<(ChainCode, String)>,
    receiver_keys: HashSet<String>,
}

/// In-memory registration store
///
/// All checks and writes of an insert happen under one write lock, which gives
/// the same all-or-nothing behavior as the SQLite transaction.
#[derive(Clone, Default)]
pub struct MemoryDepositStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryDepositStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored registrations
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DepositStore for MemoryDepositStore {
    async fn insert(&self, record: &DepositRecord) -> StorageResult<()> {
        let mut state = self.state.write().await;

        let pair = (record.chain_code.clone(), record.btc_address.clone());
        if state.pairs.contains(&pair) {
            return Err(StorageError::Duplicate(format!(
                "{} -> {}",
                record.chain_code, record.btc_address
            )));
        }

        let mut batch = HashSet::with_capacity(record.receiver_keys.len());
        for key in &record.receiver_keys {
            if state.receiver_keys.contains(key) || !batch.insert(key.as_str()) {
                return Err(StorageError::ReceiverKeyTaken(key.clone()));
            }
        }

        state.pairs.insert(pair);
        state
            .receiver_keys
            .extend(record.receiver_keys.iter().cloned());
        state.records.push(record.clone());

        Ok(())
    }

    async fn exists(&self, chain_code: &ChainCode, btc_address: &str) -> StorageResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .pairs
            .contains(&(chain_code.clone(), btc_address.to_string())))
    }

    async fn address_for(&self, chain_code: &ChainCode) -> StorageResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .find(|r| &r.chain_code == chain_code)
            .map(|r| r.btc_address.clone()))
    }

    async fn list_by_time(&self, from: i64, to: i64) -> StorageResult<Vec<DepositRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<DepositRecord> = state
            .records
            .iter()
            .filter(|r| r.created_at >= from && r.created_at < to)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn receiver_key_used(&self, receiver_key: &str) -> StorageResult<bool> {
        Ok(self.state.read().await.receiver_keys.contains(receiver_key))
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

//! Deposit History Reconciliation
//!
//! History is never stored. Each query reads the node's live unspent outputs
//! for the registered address and looks up every funding transaction:
//!
//! ```text
//! chain code ──► registry ──► address ──► listunspent ──► gettransaction (fan-out)
//!                                                               │
//!                                          entries ◄────────────┤
//!                                          dropped ◄────────────┘ (error / timeout / panic)
//! ```
//!
//! Fetches run concurrently, at most `concurrency` at a time and each under
//! `fetch_timeout`. A failed fetch drops that entry from the result and is
//! reported back as a `DroppedUtxo`; the query itself still succeeds.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Txid};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::btc_node::{BitcoinNode, Utxo, WalletTransaction};
use crate::common::config::{
    DEFAULT_HISTORY_CONCURRENCY, DEFAULT_HISTORY_TIMEOUT_SECS, DEFAULT_MAX_CONF, DEFAULT_MIN_CONF,
};
use crate::common::{Result, ShieldError};
use crate::storage::DepositStore;
use crate::types::{btc_to_inner_units, ChainCode, DepositHistoryEntry};

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub network: Network,
    pub min_conf: u32,
    pub max_conf: u32,
    /// Max in-flight transaction fetches per query
    pub concurrency: usize,
    pub fetch_timeout: Duration,
}

impl ReconcilerConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            min_conf: DEFAULT_MIN_CONF,
            max_conf: DEFAULT_MAX_CONF,
            concurrency: DEFAULT_HISTORY_CONCURRENCY,
            fetch_timeout: Duration::from_secs(DEFAULT_HISTORY_TIMEOUT_SECS),
        }
    }
}

/// Why a UTXO was left out of a history result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    Node(String),
    Timeout,
    Panicked,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Node(e) => write!(f, "node error: {}", e),
            FetchFailure::Timeout => f.write_str("timed out"),
            FetchFailure::Panicked => f.write_str("fetch task panicked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedUtxo {
    pub txid: String,
    pub vout: u32,
    pub reason: FetchFailure,
}

/// Point-in-time history of one address
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Unordered
    pub entries: Vec<DepositHistoryEntry>,
    pub dropped: Vec<DroppedUtxo>,
}

pub struct HistoryReconciler {
    node: Arc<dyn BitcoinNode>,
    config: ReconcilerConfig,
}

impl HistoryReconciler {
    pub fn new(node: Arc<dyn BitcoinNode>, config: ReconcilerConfig) -> Self {
        Self { node, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// History of the address registered for `chain_code`
    pub async fn reconcile(
        &self,
        store: &dyn DepositStore,
        chain_code: &ChainCode,
    ) -> Result<Reconciliation> {
        let address = store
            .address_for(chain_code)
            .await?
            .ok_or_else(|| ShieldError::NoSuchDeposit(chain_code.to_string()))?;

        self.reconcile_address(chain_code, &address).await
    }

    /// History of `address`, attributed to `chain_code`
    pub async fn reconcile_address(
        &self,
        chain_code: &ChainCode,
        address: &str,
    ) -> Result<Reconciliation> {
        let checked = Address::<NetworkUnchecked>::from_str(address)
            .map_err(|e| ShieldError::internal(format!("stored address {}: {}", address, e)))?
            .require_network(self.config.network)
            .map_err(|e| ShieldError::internal(format!("stored address {}: {}", address, e)))?;

        let utxos = self
            .node
            .list_unspent(
                self.config.min_conf,
                self.config.max_conf,
                &[checked.to_string()],
            )
            .await?;

        tracing::debug!(
            target: "shield::history",
            chain_code = %chain_code,
            address = %checked,
            utxos = utxos.len(),
            "listed unspent outputs"
        );

        let mut reconciliation = Reconciliation::default();
        for (utxo, fetched) in self.fetch_transactions(utxos).await {
            match fetched {
                Ok(tx) => reconciliation.entries.push(DepositHistoryEntry::for_owner(
                    chain_code,
                    utxo.txid.to_string(),
                    btc_to_inner_units(utxo.amount),
                    tx.time * 1000,
                    utxo.confirmations,
                )),
                Err(reason) => {
                    tracing::warn!(
                        target: "shield::history",
                        chain_code = %chain_code,
                        txid = %utxo.txid,
                        vout = utxo.vout,
                        reason = %reason,
                        "dropping deposit from history"
                    );
                    reconciliation.dropped.push(DroppedUtxo {
                        txid: utxo.txid.to_string(),
                        vout: utxo.vout,
                        reason,
                    });
                }
            }
        }

        Ok(reconciliation)
    }

    /// Shielding status of a single external transaction
    pub async fn status_for_external_tx(&self, external_tx_id: &str) -> Result<DepositHistoryEntry> {
        let txid = Txid::from_str(external_tx_id).map_err(|e| {
            ShieldError::invalid_params(format!("invalid external txID {}: {}", external_tx_id, e))
        })?;

        let tx = self.node.get_transaction(&txid).await?;
        Ok(DepositHistoryEntry::status_only(
            external_tx_id.to_string(),
            tx.confirmations,
        ))
    }

    async fn fetch_transactions(
        &self,
        utxos: Vec<Utxo>,
    ) -> Vec<(Utxo, std::result::Result<WalletTransaction, FetchFailure>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut outstanding: HashMap<usize, Utxo> = utxos.iter().cloned().enumerate().collect();
        let mut tasks = JoinSet::new();

        for (idx, utxo) in utxos.into_iter().enumerate() {
            let node = Arc::clone(&self.node);
            let semaphore = Arc::clone(&semaphore);
            let fetch_timeout = self.config.fetch_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let fetched =
                    match tokio::time::timeout(fetch_timeout, node.get_transaction(&utxo.txid)).await
                    {
                        Ok(Ok(tx)) => Ok(tx),
                        Ok(Err(e)) => Err(FetchFailure::Node(e.to_string())),
                        Err(_) => Err(FetchFailure::Timeout),
                    };
                (idx, fetched)
            });
        }

        let mut results = Vec::with_capacity(outstanding.len());
        while let Some(joined) = tasks.join_next().await {
            // A panicked task leaves its UTXO in `outstanding`
            if let Ok((idx, fetched)) = joined {
                if let Some(utxo) = outstanding.remove(&idx) {
                    results.push((utxo, fetched));
                }
            }
        }
        results.extend(
            outstanding
                .into_values()
                .map(|utxo| (utxo, Err(FetchFailure::Panicked))),
        );

        results
    }
}

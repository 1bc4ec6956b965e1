//! Bitcoin Node Access
//!
//! The portal watches deposit addresses through a Bitcoin Core wallet: the
//! address is imported watch-only at registration time, and history queries
//! read the wallet's unspent outputs and transactions.

pub mod rpc;

use async_trait::async_trait;
use bdk_bitcoind_rpc::bitcoincore_rpc;
use bitcoin::Txid;
use thiserror::Error;

pub use rpc::RpcClient;

/// Bitcoin node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid address {0}: {1}")]
    InvalidAddress(String, String),

    #[error("RPC task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<bitcoincore_rpc::Error> for NodeError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        NodeError::Rpc(err.to_string())
    }
}

pub type NodeResult<T> = Result<T, NodeError>;

/// An unspent output paying a watched address
#[derive(Debug, Clone, PartialEq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    /// Amount in BTC, as reported by the node
    pub amount: f64,
    pub confirmations: i64,
}

/// Wallet view of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletTransaction {
    /// Unix seconds
    pub time: i64,
    pub confirmations: i64,
}

/// Operations the portal needs from a Bitcoin node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BitcoinNode: Send + Sync {
    /// Unspent outputs paying any of `addresses` with confirmations in
    /// `[min_conf, max_conf]`
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> NodeResult<Vec<Utxo>>;

    /// Wallet transaction details
    async fn get_transaction(&self, txid: &Txid) -> NodeResult<WalletTransaction>;

    /// Watch `address` without rescanning the chain
    async fn import_address(&self, address: &str) -> NodeResult<()>;

    /// Check the node is reachable
    async fn ping(&self) -> NodeResult<()>;
}

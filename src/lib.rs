//! Shielding Portal
//!
//! Issues per-user Bitcoin deposit addresses for a privacy ledger and reports
//! the deposits they receive.
//!
//! ## Components
//!
//! - **address**: deterministic P2WSH multisig derivation from master keys
//! - **validation**: registration checks (address binding, receiver signatures)
//! - **storage**: registry of shielding addresses (SQLite, in-memory)
//! - **history**: reconciles node UTXOs into deposit history entries
//! - **service**: the portal operations, over the collaborators above
//! - **api**: HTTP surface

pub mod address;
pub mod api;
pub mod btc_node;
pub mod common;
pub mod fee;
pub mod history;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;

pub use address::{DepositAddress, DeriveError, MasterKeySet};
pub use btc_node::{BitcoinNode, NodeError, RpcClient};
pub use common::{Result, ShieldConfig, ShieldError};
pub use history::{HistoryReconciler, ReconcilerConfig, Reconciliation};
pub use service::{RegisterOutcome, ServiceConfig, SharedShieldService, ShieldService};
pub use storage::{DepositStore, MemoryDepositStore, SqliteDepositStore};
pub use types::{ChainCode, DepositHistoryEntry, DepositRecord, RegistrationRequest, ShieldStatus};
pub use validation::{RejectReason, RequestValidator};

//! Shared Types Module
//!
//! Data types shared across the shielding portal.

pub mod deposit;
pub mod history;
pub mod units;

// Re-exports for convenience
pub use deposit::{ChainCode, ChainCodeMode, DepositRecord, RegistrationRequest};
pub use history::{DepositHistoryEntry, ShieldStatus};
pub use units::{btc_to_inner_units, btc_to_sats, INNER_UNITS_PER_SAT, SATS_PER_BTC};

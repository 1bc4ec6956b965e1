//! Deposit History Types
//!
//! History entries are derived on every query from the node's live UTXO set
//! and never persisted.

use serde::{Serialize, Serializer};

use super::deposit::ChainCode;

/// Shielding status of a deposit
///
/// Serialized as its integer code. This service only ever reports `Pending`
/// and `Processing`; `Failed` and `Success` are reserved for the minting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShieldStatus {
    Failed = 0,
    Success = 1,
    Pending = 2,
    Processing = 3,
}

impl ShieldStatus {
    /// Deposits with at least one confirmation are processing. Everything
    /// else is pending, including conflicted transactions (negative counts).
    pub fn from_confirmations(confirmations: i64) -> Self {
        if confirmations > 0 {
            ShieldStatus::Processing
        } else {
            ShieldStatus::Pending
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl Serialize for ShieldStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// One deposit into a registered shielding address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositHistoryEntry {
    /// Amount in inner-ledger units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(rename = "externalTxID")]
    pub external_tx_id: String,
    #[serde(rename = "incognitoAddress", skip_serializing_if = "Option::is_none")]
    pub incognito_address: Option<String>,
    #[serde(rename = "depositpubkey", skip_serializing_if = "Option::is_none")]
    pub deposit_pub_key: Option<String>,
    pub status: ShieldStatus,
    /// Transaction time in unix milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    pub confirmations: i64,
}

impl DepositHistoryEntry {
    /// Entry for a deposit owned by `chain_code`
    pub fn for_owner(
        chain_code: &ChainCode,
        external_tx_id: String,
        amount: u64,
        time_ms: i64,
        confirmations: i64,
    ) -> Self {
        let (incognito_address, deposit_pub_key) = match chain_code {
            ChainCode::Account(a) => (Some(a.clone()), None),
            ChainCode::DepositKey(k) => (None, Some(k.clone())),
        };

        Self {
            amount: Some(amount),
            external_tx_id,
            incognito_address,
            deposit_pub_key,
            status: ShieldStatus::from_confirmations(confirmations),
            time: Some(time_ms),
            confirmations,
        }
    }

    /// Status-only entry for a bare external transaction lookup
    pub fn status_only(external_tx_id: String, confirmations: i64) -> Self {
        Self {
            amount: None,
            external_tx_id,
            incognito_address: None,
            deposit_pub_key: None,
            status: ShieldStatus::from_confirmations(confirmations),
            time: None,
            confirmations,
        }
    }
}

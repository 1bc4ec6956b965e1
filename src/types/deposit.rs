//! Registration Types
//!
//! A depositor is identified by a chain code in one of two modes:
//! - `Account`: legacy mode, the inner-ledger payment address
//! - `DepositKey`: one-time mode, a base58check deposit public key
//!
//! The chain code seeds address derivation and partitions the registry.

use serde::{Deserialize, Serialize};

use crate::validation::RejectReason;

/// Depositor identity, tagged with its mode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ChainCode {
    /// Legacy inner-ledger account address
    Account(String),
    /// One-time deposit public key
    DepositKey(String),
}

impl ChainCode {
    /// Raw chain code string, also the derivation seed
    pub fn as_str(&self) -> &str {
        match self {
            ChainCode::Account(s) | ChainCode::DepositKey(s) => s,
        }
    }

    pub fn mode(&self) -> ChainCodeMode {
        match self {
            ChainCode::Account(_) => ChainCodeMode::Account,
            ChainCode::DepositKey(_) => ChainCodeMode::DepositKey,
        }
    }

    pub fn from_parts(mode: ChainCodeMode, value: String) -> Self {
        match mode {
            ChainCodeMode::Account => ChainCode::Account(value),
            ChainCodeMode::DepositKey => ChainCode::DepositKey(value),
        }
    }
}

impl std::fmt::Display for ChainCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.mode(), self.as_str())
    }
}

/// Chain code mode, as stored in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainCodeMode {
    Account,
    DepositKey,
}

impl ChainCodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainCodeMode::Account => "account",
            ChainCodeMode::DepositKey => "deposit_key",
        }
    }
}

impl std::fmt::Display for ChainCodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChainCodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(Self::Account),
            "deposit_key" => Ok(Self::DepositKey),
            _ => Err(format!("unknown chain code mode: {}", s)),
        }
    }
}

/// A shielding address registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationRequest {
    /// Legacy registration bound to an inner-ledger account
    Legacy {
        account_address: String,
        btc_address: String,
    },
    /// One-time registration authorized by receiver signatures
    OneTime {
        deposit_public_key: String,
        receivers: Vec<String>,
        signatures: Vec<String>,
        btc_address: String,
    },
}

impl RegistrationRequest {
    /// Build a request from the flat transport shape.
    ///
    /// Exactly one of `account_address` and `deposit_public_key` must be
    /// non-empty.
    pub fn from_parts(
        account_address: Option<String>,
        deposit_public_key: Option<String>,
        receivers: Vec<String>,
        signatures: Vec<String>,
        btc_address: String,
    ) -> Result<Self, RejectReason> {
        let account_address = account_address.filter(|s| !s.is_empty());
        let deposit_public_key = deposit_public_key.filter(|s| !s.is_empty());

        match (account_address, deposit_public_key) {
            (Some(account_address), None) => Ok(Self::Legacy {
                account_address,
                btc_address,
            }),
            (None, Some(deposit_public_key)) => Ok(Self::OneTime {
                deposit_public_key,
                receivers,
                signatures,
                btc_address,
            }),
            _ => Err(RejectReason::AmbiguousChainCode),
        }
    }

    pub fn chain_code(&self) -> ChainCode {
        match self {
            Self::Legacy {
                account_address, ..
            } => ChainCode::Account(account_address.clone()),
            Self::OneTime {
                deposit_public_key,
                ..
            } => ChainCode::DepositKey(deposit_public_key.clone()),
        }
    }

    pub fn btc_address(&self) -> &str {
        match self {
            Self::Legacy { btc_address, .. } | Self::OneTime { btc_address, .. } => btc_address,
        }
    }
}

/// A persisted registration; immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub chain_code: ChainCode,
    pub btc_address: String,
    /// Opaque receiver descriptors (one-time mode only)
    pub receivers: Vec<String>,
    /// Signatures over the receivers (one-time mode only)
    pub signatures: Vec<String>,
    /// Hex public keys extracted from `receivers`; each may be used once
    pub receiver_keys: Vec<String>,
    /// Unix timestamp (seconds) of registration
    pub created_at: i64,
}

impl DepositRecord {
    /// Record for `request`, stamped with the current time
    pub fn stamped_now(request: &RegistrationRequest, receiver_keys: Vec<String>) -> Self {
        Self::stamped_at(request, receiver_keys, chrono::Utc::now().timestamp())
    }

    /// Record for `request`, stamped with an explicit time
    pub fn stamped_at(
        request: &RegistrationRequest,
        receiver_keys: Vec<String>,
        created_at: i64,
    ) -> Self {
        let (receivers, signatures) = match request {
            RegistrationRequest::Legacy { .. } => (Vec::new(), Vec::new()),
            RegistrationRequest::OneTime {
                receivers,
                signatures,
                ..
            } => (receivers.clone(), signatures.clone()),
        };

        Self {
            chain_code: request.chain_code(),
            btc_address: request.btc_address().to_string(),
            receivers,
            signatures,
            receiver_keys,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_requires_exactly_one_chain_code() {
        let both = RegistrationRequest::from_parts(
            Some("acct".into()),
            Some("key".into()),
            vec![],
            vec![],
            "tb1q".into(),
        );
        assert_eq!(both, Err(RejectReason::AmbiguousChainCode));

        let neither =
            RegistrationRequest::from_parts(None, Some(String::new()), vec![], vec![], "tb1q".into());
        assert_eq!(neither, Err(RejectReason::AmbiguousChainCode));

        let legacy =
            RegistrationRequest::from_parts(Some("acct".into()), None, vec![], vec![], "tb1q".into())
                .unwrap();
        assert_eq!(legacy.chain_code(), ChainCode::Account("acct".into()));
        assert_eq!(legacy.btc_address(), "tb1q");
    }

    #[test]
    fn test_chain_code_serialization() {
        let code = ChainCode::DepositKey("abc".into());
        let json = serde_json::to_value(&code).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "deposit_key", "value": "abc"}));
        assert_eq!(code.to_string(), "deposit_key:abc");
        assert_eq!("account".parse::<ChainCodeMode>(), Ok(ChainCodeMode::Account));
    }

    #[test]
    fn test_record_stamping() {
        let request = RegistrationRequest::OneTime {
            deposit_public_key: "key".into(),
            receivers: vec!["r1".into()],
            signatures: vec!["s1".into()],
            btc_address: "tb1q".into(),
        };

        let record = DepositRecord::stamped_at(&request, vec!["02ab".into()], 1_700_000_000);
        assert_eq!(record.created_at, 1_700_000_000);
        assert_eq!(record.chain_code, ChainCode::DepositKey("key".into()));
        assert_eq!(record.receivers, vec!["r1".to_string()]);

        let before = chrono::Utc::now().timestamp();
        let now = DepositRecord::stamped_now(&request, vec![]);
        assert!(now.created_at >= before);
    }
}

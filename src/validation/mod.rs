//! Registration Request Validation
//!
//! Checks run in order and stop at the first failure:
//! 1. exactly one chain code (enforced when the request is built)
//! 2. one-time: receivers non-empty and paired 1:1 with signatures
//! 3. one-time: deposit key decodes to a valid point
//! 4. one-time, per receiver: decodes, key never used, signature verifies
//! 5. re-derived address equals the claimed address

pub mod receiver;

use std::collections::HashSet;

use bitcoin::Network;
use thiserror::Error;

use crate::address::{DepositAddress, DeriveError, MasterKeySet};
use crate::common::logging::log_security_event;
use crate::common::Result;
use crate::storage::DepositStore;
use crate::types::{ChainCode, DepositRecord, RegistrationRequest};

pub use receiver::{
    decode_deposit_key, encode_deposit_key, sign_receiver, verify_receiver_signature,
    OtaReceiver, ReceiverError,
};

/// Why a registration request was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("exactly one of incognito address and deposit public key must be set")]
    AmbiguousChainCode,

    #[error("need at least one receiver and one signature per receiver (got {receivers} receivers, {signatures} signatures)")]
    ReceiverSignatureMismatch { receivers: usize, signatures: usize },

    #[error("invalid deposit public key: {0}")]
    InvalidKey(String),

    #[error("invalid receiver: {0}")]
    InvalidReceiver(String),

    #[error("receiver key {0} has already been used")]
    ReceiverAlreadyUsed(String),

    #[error("invalid receiver signature")]
    InvalidSignature,

    #[error("btc address does not match the derived shielding address")]
    AddressMismatch,

    #[error("invalid multisig threshold: {0}")]
    InvalidThreshold(String),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::AmbiguousChainCode => "AMBIGUOUS_CHAIN_CODE",
            RejectReason::ReceiverSignatureMismatch { .. } => "RECEIVER_SIGNATURE_MISMATCH",
            RejectReason::InvalidKey(_) => "INVALID_KEY",
            RejectReason::InvalidReceiver(_) => "INVALID_RECEIVER",
            RejectReason::ReceiverAlreadyUsed(_) => "RECEIVER_ALREADY_USED",
            RejectReason::InvalidSignature => "INVALID_SIGNATURE",
            RejectReason::AddressMismatch => "ADDRESS_MISMATCH",
            RejectReason::InvalidThreshold(_) => "INVALID_THRESHOLD",
        }
    }
}

impl From<DeriveError> for RejectReason {
    fn from(err: DeriveError) -> Self {
        match err {
            DeriveError::InvalidKey(msg) => RejectReason::InvalidKey(msg),
            e @ DeriveError::InvalidThreshold { .. } => RejectReason::InvalidThreshold(e.to_string()),
        }
    }
}

/// A request that passed every check
#[derive(Debug, Clone)]
pub struct ValidatedRegistration {
    pub request: RegistrationRequest,
    pub chain_code: ChainCode,
    pub deposit_address: DepositAddress,
    /// Hex receiver public keys this registration consumes
    pub receiver_keys: Vec<String>,
}

impl ValidatedRegistration {
    /// Persistable record, stamped with the current time
    pub fn into_record(self) -> DepositRecord {
        DepositRecord::stamped_now(&self.request, self.receiver_keys)
    }
}

/// Validates registration requests against the configured master keys
#[derive(Debug, Clone)]
pub struct RequestValidator {
    master_keys: MasterKeySet,
    network: Network,
}

impl RequestValidator {
    pub fn new(master_keys: MasterKeySet, network: Network) -> Self {
        Self {
            master_keys,
            network,
        }
    }

    pub fn master_keys(&self) -> &MasterKeySet {
        &self.master_keys
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Validate `request`. Reads the store for receiver reuse; never writes.
    pub async fn validate(
        &self,
        request: &RegistrationRequest,
        store: &dyn DepositStore,
    ) -> Result<ValidatedRegistration> {
        let receiver_keys = match request {
            RegistrationRequest::Legacy { .. } => Vec::new(),
            RegistrationRequest::OneTime {
                deposit_public_key,
                receivers,
                signatures,
                ..
            } => {
                self.check_receivers(deposit_public_key, receivers, signatures, store)
                    .await?
            }
        };

        let chain_code = request.chain_code();
        let deposit_address = self
            .master_keys
            .derive(&chain_code, self.network)
            .map_err(RejectReason::from)?;

        if deposit_address.address != request.btc_address() {
            tracing::debug!(
                target: "shield::validation",
                chain_code = %chain_code,
                claimed = request.btc_address(),
                derived = %deposit_address.address,
                "address mismatch"
            );
            return Err(RejectReason::AddressMismatch.into());
        }

        Ok(ValidatedRegistration {
            request: request.clone(),
            chain_code,
            deposit_address,
            receiver_keys,
        })
    }

    async fn check_receivers(
        &self,
        deposit_public_key: &str,
        receivers: &[String],
        signatures: &[String],
        store: &dyn DepositStore,
    ) -> Result<Vec<String>> {
        if receivers.is_empty() || receivers.len() != signatures.len() {
            return Err(RejectReason::ReceiverSignatureMismatch {
                receivers: receivers.len(),
                signatures: signatures.len(),
            }
            .into());
        }

        let deposit_key = decode_deposit_key(deposit_public_key)
            .map_err(|e| RejectReason::InvalidKey(e.to_string()))?;

        let mut seen = HashSet::with_capacity(receivers.len());
        let mut keys = Vec::with_capacity(receivers.len());

        for (raw_receiver, signature) in receivers.iter().zip(signatures) {
            let receiver: OtaReceiver = raw_receiver
                .parse()
                .map_err(|e: ReceiverError| RejectReason::InvalidReceiver(e.to_string()))?;

            let key_id = receiver.key_id();
            if !seen.insert(key_id.clone()) || store.receiver_key_used(&key_id).await? {
                log_security_event(
                    "receiver_reuse",
                    false,
                    serde_json::json!({ "receiver_key": key_id }),
                );
                return Err(RejectReason::ReceiverAlreadyUsed(key_id).into());
            }

            if let Err(e) = verify_receiver_signature(&deposit_key, &receiver, signature) {
                log_security_event(
                    "receiver_signature",
                    false,
                    serde_json::json!({
                        "deposit_public_key": deposit_public_key,
                        "receiver_key": key_id,
                        "error": e.to_string(),
                    }),
                );
                return Err(RejectReason::InvalidSignature.into());
            }

            keys.push(key_id);
        }

        Ok(keys)
    }
}

//! One-Time Receivers and Deposit Keys
//!
//! Wire formats (all base58check):
//! - deposit key: 33-byte compressed secp256k1 public key
//! - receiver: `[version = 1][33-byte public key][32-byte tx random]`
//! - signature: 64-byte BIP340 Schnorr signature over SHA256(receiver bytes)

use std::fmt;
use std::str::FromStr;

use bitcoin::base58;
use bitcoin::secp256k1::{schnorr, Keypair, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const RECEIVER_VERSION: u8 = 1;
pub const RECEIVER_LEN: usize = 1 + 33 + 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("base58check decode failed: {0}")]
    Encoding(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unsupported receiver version {0}")]
    Version(u8),

    #[error("invalid public key: {0}")]
    Key(String),

    #[error("invalid signature: {0}")]
    Signature(String),
}

/// A one-time receiver descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaReceiver {
    pub public_key: PublicKey,
    pub tx_random: [u8; 32],
}

impl OtaReceiver {
    pub fn new(public_key: PublicKey, tx_random: [u8; 32]) -> Self {
        Self {
            public_key,
            tx_random,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECEIVER_LEN] {
        let mut out = [0u8; RECEIVER_LEN];
        out[0] = RECEIVER_VERSION;
        out[1..34].copy_from_slice(&self.public_key.serialize());
        out[34..].copy_from_slice(&self.tx_random);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReceiverError> {
        if bytes.len() != RECEIVER_LEN {
            return Err(ReceiverError::Length {
                expected: RECEIVER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != RECEIVER_VERSION {
            return Err(ReceiverError::Version(bytes[0]));
        }

        let public_key =
            PublicKey::from_slice(&bytes[1..34]).map_err(|e| ReceiverError::Key(e.to_string()))?;
        let mut tx_random = [0u8; 32];
        tx_random.copy_from_slice(&bytes[34..]);

        Ok(Self {
            public_key,
            tx_random,
        })
    }

    /// Identifier used for replay protection: hex of the compressed public key
    pub fn key_id(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Digest the deposit key signs over
    pub fn signing_digest(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }
}

impl FromStr for OtaReceiver {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base58::decode_check(s).map_err(|e| ReceiverError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for OtaReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58::encode_check(&self.to_bytes()))
    }
}

pub fn encode_deposit_key(key: &PublicKey) -> String {
    base58::encode_check(&key.serialize())
}

pub fn decode_deposit_key(s: &str) -> Result<PublicKey, ReceiverError> {
    let bytes = base58::decode_check(s).map_err(|e| ReceiverError::Encoding(e.to_string()))?;
    if bytes.len() != 33 {
        return Err(ReceiverError::Length {
            expected: 33,
            actual: bytes.len(),
        });
    }
    PublicKey::from_slice(&bytes).map_err(|e| ReceiverError::Key(e.to_string()))
}

/// Check `signature` (base58check) by `deposit_key` over `receiver`.
pub fn verify_receiver_signature(
    deposit_key: &PublicKey,
    receiver: &OtaReceiver,
    signature: &str,
) -> Result<(), ReceiverError> {
    let raw =
        base58::decode_check(signature).map_err(|e| ReceiverError::Encoding(e.to_string()))?;
    let sig =
        schnorr::Signature::from_slice(&raw).map_err(|e| ReceiverError::Signature(e.to_string()))?;

    let (xonly, _parity) = deposit_key.x_only_public_key();
    let msg = Message::from_digest(receiver.signing_digest());

    Secp256k1::verification_only()
        .verify_schnorr(&sig, &msg, &xonly)
        .map_err(|e| ReceiverError::Signature(e.to_string()))
}

/// Sign `receiver` with the deposit key's secret, as a wallet would.
pub fn sign_receiver(secret_key: &SecretKey, receiver: &OtaReceiver) -> String {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, secret_key);
    let msg = Message::from_digest(receiver.signing_digest());
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
    base58::encode_check(&sig[..])
}

//! Deposit Address Derivation
//!
//! Every depositor gets a deterministic m-of-n P2WSH multisig address. The
//! depositor's chain code seeds one non-hardened BIP32 step below each master
//! key; the derived keys form the redeem script in master-key order.
//!
//! ```text
//! child_i = CKDpub(master_i, chain_code = SHA256(seed), index = 0)
//! script  = OP_m <child_1> ... <child_n> OP_n OP_CHECKMULTISIG
//! address = P2WSH(SHA256(script))
//! ```
//!
//! An empty seed skips derivation and uses the master keys directly.

use bitcoin::bip32::{ChainCode, ChildNumber, Fingerprint, Xpub};
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::Builder;
use bitcoin::secp256k1::{PublicKey, Secp256k1};
use bitcoin::{Address, Network, NetworkKind, ScriptBuf};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::ChainCode as DepositChainCode;

/// Derivation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("threshold {threshold} is greater than the number of keys {keys}")]
    InvalidThreshold { threshold: usize, keys: usize },
}

/// A derived deposit address with its witness script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositAddress {
    pub redeem_script: ScriptBuf,
    pub address: String,
}

/// Derive the child key for `seed` one level below `master`.
pub fn derive_child_key(master: &PublicKey, seed: &[u8]) -> Result<PublicKey, DeriveError> {
    if seed.is_empty() {
        return Ok(*master);
    }

    let chain_code: [u8; 32] = Sha256::digest(seed).into();
    // Only public_key and chain_code feed CKDpub; the rest is metadata.
    let parent = Xpub {
        network: NetworkKind::Main,
        depth: 0,
        parent_fingerprint: Fingerprint::from([0u8; 4]),
        child_number: ChildNumber::Normal { index: 0 },
        public_key: *master,
        chain_code: ChainCode::from(chain_code),
    };

    let secp = Secp256k1::verification_only();
    let child = parent
        .ckd_pub(&secp, ChildNumber::Normal { index: 0 })
        .map_err(|e| DeriveError::InvalidKey(e.to_string()))?;

    Ok(child.public_key)
}

/// Build the `threshold`-of-n multisig deposit address for `seed`.
pub fn build_multisig_address(
    master_keys: &[PublicKey],
    threshold: usize,
    seed: &[u8],
    network: Network,
) -> Result<DepositAddress, DeriveError> {
    if threshold > master_keys.len() {
        return Err(DeriveError::InvalidThreshold {
            threshold,
            keys: master_keys.len(),
        });
    }

    let mut builder = Builder::new().push_int(threshold as i64);
    for master in master_keys {
        let child = derive_child_key(master, seed)?;
        builder = builder.push_key(&bitcoin::PublicKey::new(child));
    }
    let redeem_script = builder
        .push_int(master_keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();

    let address = Address::p2wsh(&redeem_script, network).to_string();

    Ok(DepositAddress {
        redeem_script,
        address,
    })
}

/// The portal's configured signer keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeySet {
    keys: Vec<PublicKey>,
    threshold: usize,
}

impl MasterKeySet {
    pub fn new(keys: Vec<PublicKey>, threshold: usize) -> Result<Self, DeriveError> {
        if keys.is_empty() {
            return Err(DeriveError::InvalidKey("no master keys".to_string()));
        }
        if threshold > keys.len() {
            return Err(DeriveError::InvalidThreshold {
                threshold,
                keys: keys.len(),
            });
        }
        Ok(Self { keys, threshold })
    }

    /// Parse hex-encoded compressed or uncompressed keys
    pub fn from_hex<S: AsRef<str>>(keys: &[S], threshold: usize) -> Result<Self, DeriveError> {
        let parsed = keys
            .iter()
            .map(|k| {
                let bytes = hex::decode(k.as_ref().trim())
                    .map_err(|e| DeriveError::InvalidKey(format!("{}: {}", k.as_ref(), e)))?;
                PublicKey::from_slice(&bytes)
                    .map_err(|e| DeriveError::InvalidKey(format!("{}: {}", k.as_ref(), e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(parsed, threshold)
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Deposit address for a depositor's chain code
    pub fn derive(
        &self,
        chain_code: &DepositChainCode,
        network: Network,
    ) -> Result<DepositAddress, DeriveError> {
        build_multisig_address(
            &self.keys,
            self.threshold,
            chain_code.as_str().as_bytes(),
            network,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;

    fn master_keys(n: u8) -> Vec<PublicKey> {
        let secp = Secp256k1::new();
        (1..=n)
            .map(|i| {
                let sk = SecretKey::from_slice(&[i; 32]).unwrap();
                PublicKey::from_secret_key(&secp, &sk)
            })
            .collect()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let keys = master_keys(3);
        let a = build_multisig_address(&keys, 2, b"A1", Network::Testnet).unwrap();
        let b = build_multisig_address(&keys, 2, b"A1", Network::Testnet).unwrap();
        assert_eq!(a, b);

        let other = build_multisig_address(&keys, 2, b"A2", Network::Testnet).unwrap();
        assert_ne!(a.address, other.address);
    }

    #[test]
    fn test_empty_seed_uses_master_keys() {
        let keys = master_keys(1);
        assert_eq!(derive_child_key(&keys[0], b"").unwrap(), keys[0]);
        assert_ne!(derive_child_key(&keys[0], b"seed").unwrap(), keys[0]);
    }

    #[test]
    fn test_redeem_script_layout() {
        let keys = master_keys(3);
        let derived = build_multisig_address(&keys, 2, b"A1", Network::Testnet).unwrap();
        let bytes = derived.redeem_script.as_bytes();

        // OP_2, 3 x (push33 + key), OP_3, OP_CHECKMULTISIG
        assert_eq!(bytes.len(), 105);
        assert_eq!(bytes[0], 0x52);
        assert_eq!(bytes[bytes.len() - 2], 0x53);
        assert_eq!(bytes[bytes.len() - 1], 0xae);
    }

    #[test]
    fn test_address_network_prefix() {
        let keys = master_keys(3);
        let testnet = build_multisig_address(&keys, 2, b"A1", Network::Testnet).unwrap();
        let mainnet = build_multisig_address(&keys, 2, b"A1", Network::Bitcoin).unwrap();
        assert!(testnet.address.starts_with("tb1q"));
        assert!(mainnet.address.starts_with("bc1q"));
        assert_eq!(testnet.redeem_script, mainnet.redeem_script);
    }

    #[test]
    fn test_threshold_above_key_count() {
        let keys = master_keys(3);
        let err = build_multisig_address(&keys, 4, b"A1", Network::Testnet).unwrap_err();
        assert_eq!(
            err,
            DeriveError::InvalidThreshold {
                threshold: 4,
                keys: 3
            }
        );
        assert!(MasterKeySet::new(keys, 4).is_err());
    }

    #[test]
    fn test_master_key_set_from_hex() {
        let keys = master_keys(2);
        let hex_keys: Vec<String> = keys.iter().map(|k| hex::encode(k.serialize())).collect();

        let set = MasterKeySet::from_hex(&hex_keys, 2).unwrap();
        assert_eq!(set.keys(), keys.as_slice());
        assert_eq!(set.threshold(), 2);

        assert!(matches!(
            MasterKeySet::from_hex(&["zz"], 1),
            Err(DeriveError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_master_key_set_derive_matches_builder() {
        let keys = master_keys(3);
        let set = MasterKeySet::new(keys.clone(), 2).unwrap();
        let chain_code = DepositChainCode::Account("A1".to_string());

        let via_set = set.derive(&chain_code, Network::Regtest).unwrap();
        let direct = build_multisig_address(&keys, 2, b"A1", Network::Regtest).unwrap();
        assert_eq!(via_set, direct);
        assert!(via_set.address.starts_with("bcrt1q"));
    }
}

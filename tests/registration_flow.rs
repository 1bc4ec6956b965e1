//! End-to-end registration and history flow over the in-memory and SQLite stores.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Network, Txid};

use shield_portal::btc_node::{NodeResult, Utxo, WalletTransaction};
use shield_portal::validation::{encode_deposit_key, sign_receiver, OtaReceiver};
use shield_portal::{
    BitcoinNode, ChainCode, DepositStore, MasterKeySet, MemoryDepositStore, ReconcilerConfig,
    RegisterOutcome, RegistrationRequest, RejectReason, ServiceConfig, ShieldError, ShieldService,
    ShieldStatus, SqliteDepositStore,
};

const TXID_A: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
const TXID_B: &str = "0e3e2357e806b6cdb1f70b54c3a3a17b6714ee1f0e68bebb44a74b1efd512098";

/// Node stub serving a fixed UTXO set and counting imports
#[derive(Default)]
struct StubNode {
    utxos: Vec<Utxo>,
    imports: AtomicUsize,
}

#[async_trait]
impl BitcoinNode for StubNode {
    async fn list_unspent(
        &self,
        _min_conf: u32,
        _max_conf: u32,
        _addresses: &[String],
    ) -> NodeResult<Vec<Utxo>> {
        Ok(self.utxos.clone())
    }

    async fn get_transaction(&self, txid: &Txid) -> NodeResult<WalletTransaction> {
        let confirmations = self
            .utxos
            .iter()
            .find(|u| &u.txid == txid)
            .map(|u| u.confirmations)
            .unwrap_or(0);
        Ok(WalletTransaction {
            time: 1_700_000_000,
            confirmations,
        })
    }

    async fn import_address(&self, _address: &str) -> NodeResult<()> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> NodeResult<()> {
        Ok(())
    }
}

fn master_keys() -> MasterKeySet {
    let secp = Secp256k1::new();
    let keys = (1..=4u8)
        .map(|i| PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[i; 32]).unwrap()))
        .collect();
    MasterKeySet::new(keys, 3).unwrap()
}

fn service_over(store: Arc<dyn DepositStore>, node: Arc<StubNode>) -> Arc<ShieldService> {
    let config = ServiceConfig {
        master_keys: master_keys(),
        network: Network::Testnet,
        token_id: "btc-token".to_string(),
        reconciler: ReconcilerConfig::new(Network::Testnet),
        fee_api_url: None,
    };
    Arc::new(ShieldService::new(config, store, node).unwrap())
}

fn portal(node: Arc<StubNode>) -> (Arc<ShieldService>, MemoryDepositStore) {
    let store = MemoryDepositStore::new();
    let service = service_over(Arc::new(store.clone()), node);
    (service, store)
}

/// File-backed SQLite portal in a fresh temp directory
fn sqlite_portal(node: Arc<StubNode>) -> (Arc<ShieldService>, PathBuf) {
    let dir = std::env::temp_dir().join(format!("shield-test-{}", uuid::Uuid::new_v4()));
    let store = SqliteDepositStore::new(dir.join("shield.db")).unwrap();
    (service_over(Arc::new(store), node), dir)
}

/// Fire `tasks` copies of `request` at once; returns (registered, already registered)
async fn race_registrations(
    service: &Arc<ShieldService>,
    request: RegistrationRequest,
    tasks: usize,
) -> (usize, usize) {
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let service = Arc::clone(service);
            let request = request.clone();
            tokio::spawn(async move { service.register_deposit(request).await })
        })
        .collect();

    let mut registered = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RegisterOutcome::Registered => registered += 1,
            RegisterOutcome::AlreadyRegistered => already += 1,
        }
    }
    (registered, already)
}

fn derive(chain_code: &ChainCode) -> String {
    master_keys()
        .derive(chain_code, Network::Testnet)
        .unwrap()
        .address
}

fn utxo(txid: &str, amount: f64, confirmations: i64) -> Utxo {
    Utxo {
        txid: Txid::from_str(txid).unwrap(),
        vout: 0,
        amount,
        confirmations,
    }
}

#[tokio::test]
async fn account_registration_then_history() {
    let node = Arc::new(StubNode {
        utxos: vec![utxo(TXID_A, 0.29, 0), utxo(TXID_B, 1.0, 6)],
        ..Default::default()
    });
    let (service, _) = portal(Arc::clone(&node));

    let account = ChainCode::Account("A1".into());
    let request = RegistrationRequest::Legacy {
        account_address: "A1".into(),
        btc_address: derive(&account),
    };

    assert_eq!(
        service.register_deposit(request).await.unwrap(),
        RegisterOutcome::Registered
    );
    assert_eq!(node.imports.load(Ordering::SeqCst), 1);
    assert!(service
        .check_exists(&account, &derive(&account))
        .await
        .unwrap());

    let mut history = service.get_history(&account).await.unwrap();
    history.sort_by_key(|e| e.confirmations);
    assert_eq!(history.len(), 2);

    assert_eq!(history[0].external_tx_id, TXID_A);
    assert_eq!(history[0].amount, Some(290_000_000));
    assert_eq!(history[0].status, ShieldStatus::Pending);
    assert_eq!(history[0].incognito_address.as_deref(), Some("A1"));
    assert_eq!(history[0].time, Some(1_700_000_000_000));

    assert_eq!(history[1].amount, Some(1_000_000_000));
    assert_eq!(history[1].status, ShieldStatus::Processing);
}

#[tokio::test]
async fn concurrent_identical_registrations_register_once() {
    let node = Arc::new(StubNode::default());
    let (service, store) = portal(node);

    let account = ChainCode::Account("A2".into());
    let request = RegistrationRequest::Legacy {
        account_address: "A2".into(),
        btc_address: derive(&account),
    };

    let (registered, already) = race_registrations(&service, request, 8).await;
    assert_eq!(registered, 1);
    assert_eq!(already, 7);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn one_time_registration_consumes_receivers() {
    let node = Arc::new(StubNode::default());
    let (service, _) = portal(node);

    let secp = Secp256k1::new();
    let deposit_secret = SecretKey::from_slice(&[9u8; 32]).unwrap();
    let deposit_key = encode_deposit_key(&PublicKey::from_secret_key(&secp, &deposit_secret));

    let receiver = OtaReceiver::new(
        PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[7u8; 32]).unwrap()),
        [3u8; 32],
    );
    let signature = sign_receiver(&deposit_secret, &receiver);

    let chain_code = ChainCode::DepositKey(deposit_key.clone());
    let request = RegistrationRequest::OneTime {
        deposit_public_key: deposit_key.clone(),
        receivers: vec![receiver.to_string()],
        signatures: vec![signature.clone()],
        btc_address: derive(&chain_code),
    };

    assert_eq!(
        service.register_deposit(request.clone()).await.unwrap(),
        RegisterOutcome::Registered
    );
    // Same request again: the pair exists, so this is not a reuse
    assert_eq!(
        service.register_deposit(request).await.unwrap(),
        RegisterOutcome::AlreadyRegistered
    );

    // The receiver cannot be bound to a different deposit key
    let other_secret = SecretKey::from_slice(&[10u8; 32]).unwrap();
    let other_key = encode_deposit_key(&PublicKey::from_secret_key(&secp, &other_secret));
    let reuse = RegistrationRequest::OneTime {
        deposit_public_key: other_key.clone(),
        receivers: vec![receiver.to_string()],
        signatures: vec![sign_receiver(&other_secret, &receiver)],
        btc_address: derive(&ChainCode::DepositKey(other_key)),
    };
    let err = service.register_deposit(reuse).await.unwrap_err();
    assert!(matches!(
        err,
        ShieldError::Rejected(RejectReason::ReceiverAlreadyUsed(_))
    ));

    let history = service
        .get_history_for_deposit_keys(&[deposit_key.clone()])
        .await
        .unwrap();
    assert!(history[&deposit_key].is_empty());
}

#[tokio::test]
async fn history_of_unregistered_chain_code() {
    let (service, _) = portal(Arc::new(StubNode::default()));

    let err = service
        .get_history(&ChainCode::Account("nobody".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ShieldError::NoSuchDeposit(_)));
}

#[tokio::test]
async fn registration_list_is_time_bounded() {
    let (service, _) = portal(Arc::new(StubNode::default()));

    let account = ChainCode::Account("A3".into());
    service
        .register_deposit(RegistrationRequest::Legacy {
            account_address: "A3".into(),
            btc_address: derive(&account),
        })
        .await
        .unwrap();

    let all = service.list_registrations(0, i64::MAX).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].chain_code, account);

    assert!(service.list_registrations(0, 1).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sqlite_concurrent_account_registrations_register_once() {
    let (service, dir) = sqlite_portal(Arc::new(StubNode::default()));

    let account = ChainCode::Account("A4".into());
    let request = RegistrationRequest::Legacy {
        account_address: "A4".into(),
        btc_address: derive(&account),
    };

    let (registered, already) = race_registrations(&service, request, 16).await;
    assert_eq!(registered, 1);
    assert_eq!(already, 15);
    assert_eq!(service.list_registrations(0, i64::MAX).await.unwrap().len(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sqlite_concurrent_one_time_registrations_register_once() {
    let (service, dir) = sqlite_portal(Arc::new(StubNode::default()));

    let secp = Secp256k1::new();
    let deposit_secret = SecretKey::from_slice(&[11u8; 32]).unwrap();
    let deposit_key = encode_deposit_key(&PublicKey::from_secret_key(&secp, &deposit_secret));
    let receiver = OtaReceiver::new(
        PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[12u8; 32]).unwrap()),
        [4u8; 32],
    );

    let chain_code = ChainCode::DepositKey(deposit_key.clone());
    let request = RegistrationRequest::OneTime {
        deposit_public_key: deposit_key,
        receivers: vec![receiver.to_string()],
        signatures: vec![sign_receiver(&deposit_secret, &receiver)],
        btc_address: derive(&chain_code),
    };

    // Losers see either the unique pair or the consumed receiver; both are a repeat
    let (registered, already) = race_registrations(&service, request, 16).await;
    assert_eq!(registered, 1);
    assert_eq!(already, 15);

    let records = service.list_registrations(0, i64::MAX).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chain_code, chain_code);

    std::fs::remove_dir_all(dir).ok();
}

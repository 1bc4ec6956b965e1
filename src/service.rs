//! Shielding Portal Service
//!
//! `ShieldService` owns every collaborator handle (store, node, fee source)
//! and exposes the portal's operations. It keeps no state of its own between
//! requests; duplicate registrations are resolved by the store's unique index.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitcoin::Network;
use serde::Serialize;

use crate::address::MasterKeySet;
use crate::btc_node::BitcoinNode;
use crate::common::logging::log_registration_event;
use crate::common::{Result, ShieldConfig, ShieldError};
use crate::fee::{FeeError, FeeEstimator};
use crate::history::{HistoryReconciler, Reconciliation, ReconcilerConfig};
use crate::storage::{DepositStore, StorageError};
use crate::types::{ChainCode, DepositHistoryEntry, DepositRecord, RegistrationRequest};
use crate::validation::{RejectReason, RequestValidator, ValidatedRegistration};

/// Shared service handle used by the HTTP layer
pub type SharedShieldService = Arc<ShieldService>;

/// Everything the service needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub master_keys: MasterKeySet,
    pub network: Network,
    /// Inner-ledger token ID of shielded BTC
    pub token_id: String,
    pub reconciler: ReconcilerConfig,
    pub fee_api_url: Option<String>,
}

impl From<&ShieldConfig> for ServiceConfig {
    fn from(config: &ShieldConfig) -> Self {
        let network = config.network.bitcoin_network();
        Self {
            master_keys: config.master_keys.clone(),
            network,
            token_id: config.token_id.clone(),
            reconciler: ReconcilerConfig {
                network,
                min_conf: config.min_conf,
                max_conf: config.max_conf,
                concurrency: config.history_concurrency,
                fetch_timeout: config.history_timeout,
            },
            fee_api_url: config.fee_api_url.clone(),
        }
    }
}

/// Outcome of a registration that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Collaborator reachability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub store: &'static str,
    #[serde(rename = "btcfullnode")]
    pub btc_node: &'static str,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct ShieldService {
    validator: RequestValidator,
    reconciler: HistoryReconciler,
    store: Arc<dyn DepositStore>,
    node: Arc<dyn BitcoinNode>,
    fee: Option<FeeEstimator>,
    token_id: String,
}

impl ShieldService {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn DepositStore>,
        node: Arc<dyn BitcoinNode>,
    ) -> Result<Self> {
        let fee = config
            .fee_api_url
            .as_deref()
            .map(FeeEstimator::new)
            .transpose()?;

        Ok(Self {
            validator: RequestValidator::new(config.master_keys, config.network),
            reconciler: HistoryReconciler::new(Arc::clone(&node), config.reconciler),
            store,
            node,
            fee,
            token_id: config.token_id,
        })
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Reject queries for any token other than shielded BTC
    pub fn check_token(&self, token_id: &str) -> Result<()> {
        if token_id != self.token_id {
            return Err(ShieldError::invalid_params(format!(
                "TokenID is not a portal token {}",
                token_id
            )));
        }
        Ok(())
    }

    /// Validate a registration without side effects
    pub async fn validate_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<ValidatedRegistration> {
        self.validator.validate(request, self.store.as_ref()).await
    }

    /// Validate, watch and persist a registration.
    ///
    /// Re-submitting a registered (chain code, address) pair yields
    /// `AlreadyRegistered`, including when a concurrent identical request
    /// won the insert.
    pub async fn register_deposit(&self, request: RegistrationRequest) -> Result<RegisterOutcome> {
        let chain_code = request.chain_code();
        let btc_address = request.btc_address().to_string();

        let validated = match self.validate_registration(&request).await {
            Ok(v) => v,
            // An identical registration already consumed the receivers
            Err(ShieldError::Rejected(RejectReason::ReceiverAlreadyUsed(key))) => {
                let reason = RejectReason::ReceiverAlreadyUsed(key);
                return self
                    .already_registered_or(&chain_code, &btc_address, reason)
                    .await;
            }
            Err(e) => {
                log_registration_event(
                    "registration_rejected",
                    chain_code.as_str(),
                    &btc_address,
                    false,
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };

        if self.store.exists(&chain_code, &btc_address).await? {
            return Ok(self.log_already_registered(&chain_code, &btc_address));
        }

        self.node.import_address(&btc_address).await?;

        let record = validated.into_record();
        match self.store.insert(&record).await {
            Ok(()) => {
                log_registration_event(
                    "registered",
                    chain_code.as_str(),
                    &btc_address,
                    true,
                    None,
                );
                Ok(RegisterOutcome::Registered)
            }
            Err(StorageError::Duplicate(_)) => {
                Ok(self.log_already_registered(&chain_code, &btc_address))
            }
            Err(StorageError::ReceiverKeyTaken(key)) => {
                let reason = RejectReason::ReceiverAlreadyUsed(key);
                self.already_registered_or(&chain_code, &btc_address, reason)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn already_registered_or(
        &self,
        chain_code: &ChainCode,
        btc_address: &str,
        reason: RejectReason,
    ) -> Result<RegisterOutcome> {
        if self.store.exists(chain_code, btc_address).await? {
            return Ok(self.log_already_registered(chain_code, btc_address));
        }
        log_registration_event(
            "registration_rejected",
            chain_code.as_str(),
            btc_address,
            false,
            Some(&reason.to_string()),
        );
        Err(reason.into())
    }

    fn log_already_registered(&self, chain_code: &ChainCode, btc_address: &str) -> RegisterOutcome {
        log_registration_event(
            "already_registered",
            chain_code.as_str(),
            btc_address,
            true,
            None,
        );
        RegisterOutcome::AlreadyRegistered
    }

    pub async fn check_exists(&self, chain_code: &ChainCode, btc_address: &str) -> Result<bool> {
        Ok(self.store.exists(chain_code, btc_address).await?)
    }

    /// Registrations created in `[from, to)`
    pub async fn list_registrations(&self, from: i64, to: i64) -> Result<Vec<DepositRecord>> {
        if to == 0 || from > to {
            return Err(ShieldError::invalid_params(format!(
                "invalid time range [{}, {})",
                from, to
            )));
        }
        Ok(self.store.list_by_time(from, to).await?)
    }

    /// Full reconciliation, including dropped UTXOs
    pub async fn reconcile_history(&self, chain_code: &ChainCode) -> Result<Reconciliation> {
        self.reconciler
            .reconcile(self.store.as_ref(), chain_code)
            .await
    }

    pub async fn get_history(&self, chain_code: &ChainCode) -> Result<Vec<DepositHistoryEntry>> {
        Ok(self.reconcile_history(chain_code).await?.entries)
    }

    /// Histories for several one-time deposit keys, keyed by deposit key
    pub async fn get_history_for_deposit_keys(
        &self,
        deposit_keys: &[String],
    ) -> Result<BTreeMap<String, Vec<DepositHistoryEntry>>> {
        let mut histories = BTreeMap::new();
        for key in deposit_keys {
            let entries = self
                .get_history(&ChainCode::DepositKey(key.clone()))
                .await?;
            histories.insert(key.clone(), entries);
        }
        Ok(histories)
    }

    pub async fn get_history_by_external_tx(
        &self,
        external_tx_id: &str,
    ) -> Result<DepositHistoryEntry> {
        self.reconciler.status_for_external_tx(external_tx_id).await
    }

    /// Estimated unshielding fee in satoshis
    pub async fn estimate_unshielding_fee(&self) -> Result<f64> {
        let fee = self.fee.as_ref().ok_or(FeeError::NotConfigured)?;
        Ok(fee.estimate().await?)
    }

    pub async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!(target: "shield::health", error = %e, "store ping failed");
                "disconnected"
            }
        };
        let btc_node = match self.node.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!(target: "shield::health", error = %e, "bitcoin node ping failed");
                "disconnected"
            }
        };

        let status = if store == "connected" && btc_node == "connected" {
            "healthy"
        } else {
            "unhealthy"
        };

        HealthReport {
            status,
            store,
            btc_node,
        }
    }
}

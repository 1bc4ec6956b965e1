//! Bitcoin Core RPC Adapter
//!
//! Wraps the blocking `bitcoincore_rpc` client; every call runs on the
//! blocking pool.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bdk_bitcoind_rpc::bitcoincore_rpc::{Auth, Client, RpcApi};
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Txid};

use super::{BitcoinNode, NodeError, NodeResult, Utxo, WalletTransaction};
use crate::common::BtcRpcConfig;

/// Bitcoin Core wallet RPC client
pub struct RpcClient {
    client: Arc<Client>,
    network: Network,
}

impl RpcClient {
    pub fn new(config: &BtcRpcConfig, network: Network) -> NodeResult<Self> {
        let auth = match (&config.user, &config.password) {
            (Some(user), Some(pass)) => Auth::UserPass(user.clone(), pass.clone()),
            (Some(user), None) => Auth::UserPass(user.clone(), String::new()),
            _ => Auth::None,
        };
        let client = Client::new(&config.url, auth)?;

        Ok(Self {
            client: Arc::new(client),
            network,
        })
    }

    fn checked_address(&self, address: &str) -> NodeResult<Address> {
        Address::<NetworkUnchecked>::from_str(address)
            .map_err(|e| NodeError::InvalidAddress(address.to_string(), e.to_string()))?
            .require_network(self.network)
            .map_err(|e| NodeError::InvalidAddress(address.to_string(), e.to_string()))
    }

    async fn blocking<T, F>(&self, call: F) -> NodeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> NodeResult<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || call(&client)).await?
    }
}

#[async_trait]
impl BitcoinNode for RpcClient {
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> NodeResult<Vec<Utxo>> {
        let addresses = addresses
            .iter()
            .map(|a| self.checked_address(a))
            .collect::<NodeResult<Vec<_>>>()?;

        let entries = self
            .blocking(move |client| {
                let refs: Vec<&Address> = addresses.iter().collect();
                Ok(client.list_unspent(
                    Some(min_conf as usize),
                    Some(max_conf as usize),
                    Some(refs.as_slice()),
                    None,
                    None,
                )?)
            })
            .await?;

        Ok(entries
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                amount: u.amount.to_btc(),
                confirmations: i64::from(u.confirmations),
            })
            .collect())
    }

    async fn get_transaction(&self, txid: &Txid) -> NodeResult<WalletTransaction> {
        let txid = *txid;
        let tx = self
            .blocking(move |client| Ok(client.get_transaction(&txid, Some(true))?))
            .await?;

        let time = i64::try_from(tx.info.time)
            .map_err(|_| NodeError::InvalidResponse(format!("{}: time out of range", txid)))?;

        Ok(WalletTransaction {
            time,
            confirmations: i64::from(tx.info.confirmations),
        })
    }

    async fn import_address(&self, address: &str) -> NodeResult<()> {
        let address = self.checked_address(address)?;
        self.blocking(move |client| Ok(client.import_address(&address, Some(""), Some(false))?))
            .await
    }

    async fn ping(&self) -> NodeResult<()> {
        self.blocking(|client| Ok(client.ping()?)).await
    }
}

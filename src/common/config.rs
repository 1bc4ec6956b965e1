//! Environment-based Configuration for the Shielding Portal
//!
//! All values come from environment variables (a `.env` file is honored by the
//! binary through `dotenv`). Nothing sensitive is hardcoded.
//!
//! # Environment Variables
//!
//! ## Network
//! - `SHIELD_NETWORK` - "mainnet", "testnet" or "regtest" (default: "testnet")
//! - `SHIELD_TOKEN_ID` - inner-ledger token ID of the shielded BTC (required
//!   except on regtest)
//!
//! ## Deposit addresses
//! - `SHIELD_MASTER_PUBKEYS` - comma-separated hex master public keys
//! - `SHIELD_NUM_SIGS_REQUIRED` - multisig threshold
//!
//! ## Collaborators
//! - `SHIELD_BTC_RPC_URL` - Bitcoin Core JSON-RPC endpoint (network default)
//! - `SHIELD_BTC_RPC_USER` / `SHIELD_BTC_RPC_PASS` - RPC credentials
//! - `SHIELD_DB_PATH` - SQLite database file (default: "./data/shield.db")
//! - `SHIELD_FEE_API_URL` - fee rate endpoint (optional)
//!
//! ## Optional Settings
//! - `SHIELD_API_HOST` / `SHIELD_API_PORT` - bind address (default: 127.0.0.1:9090)
//! - `SHIELD_BTC_MIN_CONF` / `SHIELD_BTC_MAX_CONF` - listunspent window
//! - `SHIELD_HISTORY_CONCURRENCY` - max in-flight transaction fetches per query
//! - `SHIELD_HISTORY_TIMEOUT_SECS` - per-transaction fetch timeout
//! - `SHIELD_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `SHIELD_LOG_JSON` - set to "1" for JSON log output

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::address::MasterKeySet;

pub const DEFAULT_API_PORT: u16 = 9090;
pub const DEFAULT_DB_PATH: &str = "./data/shield.db";
pub const DEFAULT_MIN_CONF: u32 = 0;
pub const DEFAULT_MAX_CONF: u32 = 9_999_999;
pub const DEFAULT_HISTORY_CONCURRENCY: usize = 16;
pub const DEFAULT_HISTORY_TIMEOUT_SECS: u64 = 10;

/// Token ID used on regtest when `SHIELD_TOKEN_ID` is unset
pub const REGTEST_TOKEN_ID: &str =
    "0000000000000000000000000000000000000000000000000000000000000b7c";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Bitcoin network the portal serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "SHIELD_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Default Bitcoin Core RPC endpoint for this network
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "http://127.0.0.1:8332",
            Network::Testnet => "http://127.0.0.1:18332",
            Network::Regtest => "http://127.0.0.1:18443",
        }
    }
}

/// Bitcoin Core connection settings
#[derive(Debug, Clone)]
pub struct BtcRpcConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    /// Network environment
    pub network: Network,

    /// Inner-ledger token ID accepted by history queries
    pub token_id: String,

    /// Master keys and threshold for deposit address derivation
    pub master_keys: MasterKeySet,

    /// Bitcoin Core RPC
    pub btc_rpc: BtcRpcConfig,

    /// SQLite database path
    pub db_path: String,

    /// Fee rate endpoint for unshielding fee estimates
    pub fee_api_url: Option<String>,

    /// API bind host
    pub api_host: String,

    /// API port
    pub api_port: u16,

    /// Minimum confirmations for listunspent
    pub min_conf: u32,

    /// Maximum confirmations for listunspent
    pub max_conf: u32,

    /// Max concurrent transaction fetches per history query
    pub history_concurrency: usize,

    /// Timeout for a single transaction fetch
    pub history_timeout: Duration,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub log_json: bool,
}

impl ShieldConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("SHIELD_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .parse()?;

        let token_id = match env::var("SHIELD_TOKEN_ID") {
            Ok(value) => value,
            Err(_) if network == Network::Regtest => REGTEST_TOKEN_ID.to_string(),
            Err(_) => return Err(ConfigError::MissingEnvVar("SHIELD_TOKEN_ID".to_string())),
        };

        let master_keys = load_master_keys()?;

        let btc_rpc = BtcRpcConfig {
            url: env::var("SHIELD_BTC_RPC_URL")
                .unwrap_or_else(|_| network.default_rpc_url().to_string()),
            user: env::var("SHIELD_BTC_RPC_USER").ok(),
            password: env::var("SHIELD_BTC_RPC_PASS").ok(),
        };

        let db_path = env::var("SHIELD_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let fee_api_url = env::var("SHIELD_FEE_API_URL").ok().filter(|v| !v.is_empty());
        let api_host = env::var("SHIELD_API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let api_port = parse_or("SHIELD_API_PORT", DEFAULT_API_PORT)?;
        let min_conf = parse_or("SHIELD_BTC_MIN_CONF", DEFAULT_MIN_CONF)?;
        let max_conf = parse_or("SHIELD_BTC_MAX_CONF", DEFAULT_MAX_CONF)?;
        if min_conf > max_conf {
            return Err(ConfigError::InvalidValue(
                "SHIELD_BTC_MIN_CONF".to_string(),
                format!("{} exceeds SHIELD_BTC_MAX_CONF {}", min_conf, max_conf),
            ));
        }

        let history_concurrency =
            parse_or("SHIELD_HISTORY_CONCURRENCY", DEFAULT_HISTORY_CONCURRENCY)?.max(1);
        let history_timeout = Duration::from_secs(parse_or(
            "SHIELD_HISTORY_TIMEOUT_SECS",
            DEFAULT_HISTORY_TIMEOUT_SECS,
        )?);

        let log_level = env::var("SHIELD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("SHIELD_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            network,
            token_id,
            master_keys,
            btc_rpc,
            db_path,
            fee_api_url,
            api_host,
            api_port,
            min_conf,
            max_conf,
            history_concurrency,
            history_timeout,
            log_level,
            log_json,
        })
    }

    /// Log configuration summary (hiding credentials)
    pub fn log_summary(&self) {
        tracing::info!(
            target: "shield::config",
            network = ?self.network,
            token_id = %self.token_id,
            signers = self.master_keys.keys().len(),
            threshold = self.master_keys.threshold(),
            btc_rpc = %self.btc_rpc.url,
            db_path = %self.db_path,
            fee_api = self.fee_api_url.as_deref().unwrap_or("<disabled>"),
            confirmations = %format!("{}..={}", self.min_conf, self.max_conf),
            "configuration loaded"
        );
    }
}

/// Parse an optional numeric env var, falling back to `default` when unset
fn parse_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), format!("not a number: {}", value))
        }),
        Err(_) => Ok(default),
    }
}

/// Load master keys and threshold from environment
fn load_master_keys() -> Result<MasterKeySet, ConfigError> {
    let raw = env::var("SHIELD_MASTER_PUBKEYS")
        .map_err(|_| ConfigError::MissingEnvVar("SHIELD_MASTER_PUBKEYS".to_string()))?;
    let keys = parse_key_list(&raw);

    let threshold: usize = env::var("SHIELD_NUM_SIGS_REQUIRED")
        .map_err(|_| ConfigError::MissingEnvVar("SHIELD_NUM_SIGS_REQUIRED".to_string()))?
        .trim()
        .parse()
        .map_err(|_| {
            ConfigError::InvalidValue(
                "SHIELD_NUM_SIGS_REQUIRED".to_string(),
                "must be a non-negative number".to_string(),
            )
        })?;

    MasterKeySet::from_hex(&keys, threshold)
        .map_err(|e| ConfigError::InvalidValue("SHIELD_MASTER_PUBKEYS".to_string(), e.to_string()))
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

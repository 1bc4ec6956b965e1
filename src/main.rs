//! Shielding Portal
//!
//! Run modes:
//!   shield-portal api [--port <port>]                  - Start the HTTP API
//!   shield-portal derive <chain-code> [--deposit-key]  - Print a deposit address

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use shield_portal::api;
use shield_portal::common::logging::init_from_config;
use shield_portal::common::ShieldConfig;
use shield_portal::{ChainCode, RpcClient, ServiceConfig, ShieldService, SqliteDepositStore};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match ShieldConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args[1].as_str() {
        "api" => run_api_server(config, &args[2..]).await,
        "derive" => run_derive(&config, &args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("Shielding Portal - BTC deposit addresses for the privacy ledger");
    println!();
    println!("Usage:");
    println!("  shield-portal api [--port <port>]                  Start the HTTP API (default: 9090)");
    println!("  shield-portal derive <chain-code> [--deposit-key]  Print the deposit address");
    println!();
    println!("Environment Variables:");
    println!("  SHIELD_NETWORK             mainnet | testnet | regtest (default: testnet)");
    println!("  SHIELD_MASTER_PUBKEYS      Comma-separated hex master public keys");
    println!("  SHIELD_NUM_SIGS_REQUIRED   Multisig threshold");
    println!("  SHIELD_TOKEN_ID            Inner-ledger token ID of shielded BTC");
    println!("  SHIELD_BTC_RPC_URL         Bitcoin Core RPC endpoint");
    println!("  SHIELD_BTC_RPC_USER        Bitcoin Core RPC user");
    println!("  SHIELD_BTC_RPC_PASS        Bitcoin Core RPC password");
    println!("  SHIELD_DB_PATH             SQLite database (default: ./data/shield.db)");
    println!("  SHIELD_FEE_API_URL         Fee rate endpoint (optional)");
    println!("  SHIELD_API_PORT            API port (default: 9090)");
    println!("  SHIELD_LOG_LEVEL           Log level (default: info)");
}

async fn run_api_server(
    mut config: ShieldConfig,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.api_port = args[i + 1].parse()?;
                i += 2;
            }
            _ => i += 1,
        }
    }

    init_from_config(&config)?;
    config.log_summary();

    let store = SqliteDepositStore::new(&config.db_path)?;
    let node = RpcClient::new(&config.btc_rpc, config.network.bitcoin_network())?;
    let service = ShieldService::new(
        ServiceConfig::from(&config),
        Arc::new(store),
        Arc::new(node),
    )?;

    api::start_server(Arc::new(service), &config.api_host, config.api_port).await?;
    Ok(())
}

fn run_derive(config: &ShieldConfig, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut value = None;
    let mut deposit_key = false;
    for arg in args {
        match arg.as_str() {
            "--deposit-key" => deposit_key = true,
            other => value = Some(other.to_string()),
        }
    }

    let Some(value) = value else {
        print_usage();
        return Ok(());
    };

    let chain_code = if deposit_key {
        ChainCode::DepositKey(value)
    } else {
        ChainCode::Account(value)
    };

    let derived = config
        .master_keys
        .derive(&chain_code, config.network.bitcoin_network())?;

    println!("Chain code:    {}", chain_code);
    println!("Address:       {}", derived.address);
    println!("Redeem script: {}", hex::encode(derived.redeem_script.as_bytes()));
    Ok(())
}

//! proxy-signer CLI.
//!
//! ```text
//! inspect:  proxy chain string → hops, real account, wrapped sample call (JSON)
//! simulate: config → dev chain + block production → signer → batch of remarks → outcomes
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use serde_json::json;

use proxy_signer::blockchain::batch::{send_all_and_wait, BatchOptions, BatchSummary};
use proxy_signer::blockchain::dev_chain::{DevChain, ProxyDefinition};
use proxy_signer::blockchain::{Call, ProxyChain, ProxyChainSigner, ProxyType, Wallet};
use proxy_signer::config::{load_config, ToolConfig};
use proxy_signer::lifecycle::{signals, Shutdown};
use proxy_signer::observability::logging::init_logging;

/// Well-known development key (Alith). Never holds real funds.
const DEV_PRIVATE_KEY: &str = "5fb92d6e98884f76de468fa3f6278f8807c48bebc13595d45af5bdc4da702133";

#[derive(Parser)]
#[command(name = "proxy-signer")]
#[command(about = "Proxy-chain extrinsic signing and confirmation tracking", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a proxy chain wraps a call
    Inspect {
        /// Proxy chain, "addr[:type][,addr[:type]...]"; defaults to the configured one
        #[arg(short, long)]
        proxy_chain: Option<String>,

        /// Signing address used when the chain is empty
        #[arg(short, long)]
        signer: Option<Address>,
    },
    /// Run a batch of remarks against the in-process dev chain
    Simulate {
        /// Number of remarks to submit
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Sign with the built-in development key instead of the configured env var
        #[arg(long)]
        dev_key: bool,

        /// Register the delegations the configured proxy chain needs
        #[arg(long)]
        register_proxies: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ToolConfig::default(),
    };
    init_logging(&config.observability.log_level);

    match cli.command {
        Commands::Inspect {
            proxy_chain,
            signer,
        } => inspect(&config, proxy_chain, signer),
        Commands::Simulate {
            count,
            dev_key,
            register_proxies,
        } => simulate(&config, count, dev_key, register_proxies).await,
    }
}

fn inspect(
    config: &ToolConfig,
    proxy_chain: Option<String>,
    signer: Option<Address>,
) -> Result<(), Box<dyn std::error::Error>> {
    let chain = ProxyChain::parse(proxy_chain.as_deref().unwrap_or(&config.signer.proxy_chain))?;
    let signer = match signer {
        Some(address) => address,
        None => Wallet::from_private_key(DEV_PRIVATE_KEY, config.signer.chain_id)?.address(),
    };

    let report = json!({
        "signer": signer,
        "hops": chain.hops(),
        "real_account": chain.effective_account(signer),
        "wrapped_call": chain.wrap(Call::remark("example")),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Delegations that let `signer` walk `chain`: each hop is a proxy of the next.
fn delegations_for(chain: &ProxyChain, signer: Address) -> Vec<ProxyDefinition> {
    let mut delegate = signer;
    chain
        .hops()
        .iter()
        .map(|hop| {
            let definition = ProxyDefinition {
                real: hop.address,
                delegate,
                proxy_type: hop.proxy_type.unwrap_or(ProxyType::Any),
            };
            delegate = hop.address;
            definition
        })
        .collect()
}

async fn simulate(
    config: &ToolConfig,
    count: usize,
    dev_key: bool,
    register_proxies: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let chain_id = config.signer.chain_id;
    let wallet = if dev_key {
        Wallet::from_private_key(DEV_PRIVATE_KEY, chain_id)?
    } else {
        Wallet::from_env(&config.signer.private_key_env, chain_id)?
    };
    let proxy_chain = ProxyChain::parse(&config.signer.proxy_chain)?;

    let mut dev_chain = DevChain::from_config(&config.dev_chain, chain_id)?;
    if register_proxies {
        for definition in delegations_for(&proxy_chain, wallet.address()) {
            dev_chain = dev_chain.with_proxy(definition);
        }
    }
    let dev_chain = Arc::new(dev_chain);

    let shutdown = Shutdown::new();
    let _ctrl_c = signals::trigger_on_ctrl_c(&shutdown);
    let producer = dev_chain.spawn_block_production(
        Duration::from_millis(config.dev_chain.block_time_ms),
        &shutdown,
    );

    let signer = ProxyChainSigner::new(dev_chain.clone(), wallet, proxy_chain)
        .await?
        .with_confirmation_timeout(Duration::from_millis(config.signer.confirmation_timeout_ms));

    let calls = (0..count)
        .map(|i| Call::remark(format!("proxy-signer simulation #{}", i)))
        .collect();
    let options = BatchOptions {
        max_in_flight: config.batch.max_in_flight,
        tip: Some(u128::from(config.signer.tip)),
    };
    let results = send_all_and_wait(&signer, calls, options).await;

    shutdown.trigger();
    producer.await?;

    for result in &results {
        match &result.outcome {
            Ok(block_hash) => println!(
                "#{:<4} nonce {:<6} included in {}",
                result.index, result.nonce, block_hash
            ),
            Err(e) => println!("#{:<4} nonce {:<6} {}", result.index, result.nonce, e),
        }
    }

    let summary = BatchSummary::from_results(&results);
    println!(
        "confirmed {} / dispatch failed {} / transport failed {} / timed out {}",
        summary.confirmed, summary.dispatch_failed, summary.transport_failed, summary.timed_out
    );

    if summary.all_confirmed() {
        Ok(())
    } else {
        Err(format!("{} of {} extrinsics did not confirm", count - summary.confirmed, count).into())
    }
}

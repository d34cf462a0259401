//! multirpc CLI — send JSON-RPC calls through a failover or fallback router.
//!
//! Usage:
//! ```bash
//! # Health-check a set of endpoints through a failover router
//! multirpc test --url https://rpc.ankr.com/eth --url https://cloudflare-eth.com
//!
//! # Send a raw JSON-RPC call, trying every endpoint in order
//! multirpc call --url http://127.0.0.1:8545 --url https://rpc.ankr.com/eth \
//!     --method eth_getBlockByNumber --params '["latest", false]' --strategy fallback
//!
//! # Show the name an endpoint is logged under
//! multirpc normalize https://eth-mainnet.g.alchemy.com/v2/KEY
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;

use multirpc_core::{
    display_name, normalize_provider, AsyncMultiProvider, Router, Strategy, TracingInstrumentation,
};
use multirpc_observability::{init_tracing, LogConfig};
use multirpc_providers::{connect, ProviderConfig};

#[derive(Parser)]
#[command(name = "multirpc", version)]
#[command(about = "Route JSON-RPC calls across redundant endpoints", long_about = None)]
struct Cli {
    /// Provider config file (JSON). `--url` and `--strategy` override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging: -v info, -vv debug, -vvv trace.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one JSON-RPC call and print its result
    Call {
        /// Endpoint URI; repeat for more endpoints, in priority order
        #[arg(long = "url")]
        urls: Vec<String>,
        #[arg(long)]
        method: String,
        /// Params as a JSON array
        #[arg(long, default_value = "[]")]
        params: String,
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Use the blocking router instead of the async one
        #[arg(long)]
        blocking: bool,
    },
    /// Query chain id and head block through a failover router
    Test {
        #[arg(long = "url")]
        urls: Vec<String>,
    },
    /// Print the normalised provider name of a URI
    Normalize { uri: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = init_tracing(&LogConfig {
        level: level.into(),
        ..LogConfig::default()
    });

    match cli.command {
        Commands::Call {
            urls,
            method,
            params,
            strategy,
            blocking,
        } => {
            let config = provider_config(cli.config.as_ref(), urls, strategy)?;
            let params = parse_params(&params)?;
            tracing::info!(
                strategy = %config.strategy,
                endpoints = config.endpoints.len(),
                blocking,
                method = %method,
                "sending call"
            );
            let result = if blocking {
                tokio::task::spawn_blocking(move || -> Result<Value> {
                    let router = config.build_blocking(Some(Arc::new(TracingInstrumentation)))?;
                    Ok(router.request(&method, params)?)
                })
                .await??
            } else {
                let router = config.build_async(Some(Arc::new(TracingInstrumentation))).await?;
                router.request(&method, params).await?
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Test { urls } => {
            let config = provider_config(cli.config.as_ref(), urls, Some(Strategy::Failover))?;
            cmd_test(&config).await?;
        }
        Commands::Normalize { uri } => {
            println!("{}", normalize_provider(&uri)?);
        }
    }

    Ok(())
}

fn provider_config(path: Option<&PathBuf>, urls: Vec<String>, strategy: Option<Strategy>) -> Result<ProviderConfig> {
    let mut config = match path {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::default(),
    };
    if !urls.is_empty() {
        config.endpoints = urls;
    }
    if let Some(strategy) = strategy {
        config.strategy = strategy;
    }
    if config.endpoints.is_empty() {
        bail!("no endpoints: pass --url or --config");
    }
    Ok(config)
}

fn parse_params(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(raw).context("--params must be JSON")? {
        Value::Array(items) => Ok(items),
        other => bail!("--params must be a JSON array, got {other}"),
    }
}

/// Decode a hex `QUANTITY` such as `"0x1b4"`.
fn parse_quantity(raw: &str) -> Result<u64> {
    let digits = raw
        .strip_prefix("0x")
        .with_context(|| format!("{raw:?} has no 0x prefix"))?;
    u64::from_str_radix(digits, 16).with_context(|| format!("{raw:?} is not a hex number"))
}

async fn cmd_test(config: &ProviderConfig) -> Result<()> {
    let pool = connect(&config.endpoints, &config.transport_options()).await?;
    let router = AsyncMultiProvider::new(pool).with_poa_policy(config.poa);

    for uri in router.endpoint_uris() {
        println!("Endpoint: {}", display_name(uri));
    }
    println!();

    let start = Instant::now();
    let chain: String = router.call("eth_chainId", vec![]).await?;
    let chain_latency = start.elapsed();

    let start = Instant::now();
    let block: String = router.call("eth_blockNumber", vec![]).await?;
    let block_latency = start.elapsed();

    let chain_id = parse_quantity(&chain).context("eth_chainId returned an invalid quantity")?;
    let block_num = parse_quantity(&block).context("eth_blockNumber returned an invalid quantity")?;

    println!("  Status:       OK");
    println!("  Answered by:  {}", display_name(router.current_endpoint_uri()));
    println!("  Chain id:     {chain_id} ({}ms)", chain_latency.as_millis());
    println!("  Block number: {block_num} ({}ms)", block_latency.as_millis());

    Ok(())
}

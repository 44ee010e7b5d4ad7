//! Hardhat Transaction Spammer CLI
//!
//! A command-line tool for dispatching transactions to a network of nodes.

use clap::{Parser, Subcommand};
use hardhat_core::ChainQuery;
use hardhat_spammer::client::RpcClient;
use hardhat_spammer::config::{SpammerConfig, DEFAULT_CONFIG_FILE};
use hardhat_spammer::runner::{Collaborators, DispatchEngine, EngineOptions, Topology};
use hardhat_spammer::signer::Ed25519Signer;
use hardhat_spammer::workloads::{JsonMessageBuilder, RequestGenerator};
use hardhat_types::{Endpoint, MessageKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hardhat-spammer")]
#[command(about = "Transaction spammer for nonce-ordered ledger networks")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch transactions against the configured nodes
    Run {
        /// RPC endpoints (comma-separated), replacing `nodes.rpc`
        #[arg(short, long, value_delimiter = ',')]
        endpoints: Vec<String>,

        /// REST API endpoint, replacing `nodes.api`
        #[arg(long)]
        api: Option<String>,

        /// Chain id; queried from the first endpoint when unset
        #[arg(long)]
        chain_id: Option<String>,

        /// Message type (bank_send, ibc_transfer, store_code, instantiate_contract)
        #[arg(long)]
        msg_type: Option<MessageKind>,

        /// Workers per pool
        #[arg(long)]
        concurrency: Option<usize>,

        /// Worker topology (global, per-endpoint)
        #[arg(long, value_parser = parse_topology)]
        topology: Option<Topology>,

        /// Number of requests to dispatch
        #[arg(short = 'n', long)]
        total: Option<u64>,

        /// Duration to run (e.g., "30s", "5m", "1h")
        #[arg(short, long)]
        duration: Option<humantime::Duration>,

        /// Retries per request after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seed for random memos and receivers
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print chain id per endpoint and the state of every configured account
    ChainInfo,
}

fn parse_topology(s: &str) -> Result<Topology, String> {
    match s.to_lowercase().as_str() {
        "global" => Ok(Topology::Global),
        "per-endpoint" | "per_endpoint" | "perendpoint" => Ok(Topology::PerEndpoint),
        _ => Err(format!("Unknown topology: {}", s)),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn rpc_client(config: &SpammerConfig) -> Result<Arc<RpcClient>, Box<dyn std::error::Error>> {
    Ok(Arc::new(RpcClient::new(
        config.endpoints(),
        Endpoint::new(config.nodes.api.as_str()),
    )?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = SpammerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            endpoints,
            api,
            chain_id,
            msg_type,
            concurrency,
            topology,
            total,
            duration,
            max_retries,
            seed,
        } => {
            if !endpoints.is_empty() {
                config = config.with_rpc_endpoints(endpoints);
            }
            if let Some(api) = api {
                config = config.with_api(api);
            }
            if let Some(chain_id) = chain_id {
                config = config.with_chain_id(chain_id);
            }
            if let Some(kind) = msg_type {
                config = config.with_msg_type(kind);
            }
            if let Some(concurrency) = concurrency {
                config = config.with_concurrency(concurrency);
            }
            if let Some(topology) = topology {
                config = config.with_topology(topology);
            }
            if let Some(total) = total {
                config = config.with_total_requests(total);
            }
            if let Some(duration) = duration {
                config = config.with_duration(*duration);
            }
            if let Some(max_retries) = max_retries {
                config = config.with_max_retries(max_retries);
            }
            config.validate()?;

            let client = rpc_client(&config)?;
            let mut builder = JsonMessageBuilder::from_config(&config);
            if let Some(seed) = seed {
                builder = builder.with_seed(seed);
            }
            let signer = Ed25519Signer::from_config(&config)?;
            let accounts = config.account_addresses()?;

            let collaborators = Collaborators {
                builder: Arc::new(builder),
                signer: Arc::new(signer),
                transport: client.clone(),
                query: client,
            };
            let engine = DispatchEngine::bootstrap(
                EngineOptions::from_config(&config),
                &accounts,
                collaborators,
            )
            .await?;

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        println!("\nInterrupted, draining in-flight transactions...");
                        cancel.cancel();
                    }
                });
            }
            if let Some(duration) = config.engine.duration {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    cancel.cancel();
                });
            }
            if config.engine.total_requests.is_none() && config.engine.duration.is_none() {
                warn!("Neither a request count nor a duration is set; running until interrupted");
            }

            info!(
                msg_type = %config.msg_type,
                total = ?config.engine.total_requests,
                duration = ?config.engine.duration,
                "Starting spammer"
            );
            let requests = RequestGenerator::from_config(&config)?.into_stream();
            let report = engine.run_until_cancelled(requests, cancel).await;
            report.print();
        }

        Commands::ChainInfo => {
            let client = rpc_client(&config)?;
            for endpoint in client.endpoints() {
                match client.chain_id(&endpoint).await {
                    Ok(chain_id) => println!("{}: chain id {}", endpoint, chain_id),
                    Err(e) => println!("{}: error: {}", endpoint, e),
                }
            }
            for account in config.account_addresses()? {
                match client.account_state(&account).await {
                    Ok(state) => println!(
                        "{}: sequence {}, account number {}",
                        account, state.sequence, state.account_number
                    ),
                    Err(e) => println!("{}: error: {}", account, e),
                }
            }
        }
    }

    Ok(())
}

//! Dispatch engine: bootstrap, routing, lifetime.

use crate::accounts::SequenceAllocator;
use crate::classify::{ClassifierConfig, ErrorClassifier};
use crate::config::{duration_str, option_duration_str, SpammerConfig};
use crate::pool::{DispatchWorkerPool, Dispatcher, Job};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::stats::{ResultAggregator, StatsSnapshot};
use futures::future::try_join_all;
use futures::{Stream, StreamExt};
use hardhat_core::{ChainQuery, MessageBuilder, QueryError, Signer, Transport};
use hardhat_types::{AccountAddress, AccountState, ChainId, DispatchRequest, Endpoint};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How workers are laid out over endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// One pool; requests without an endpoint are spread round-robin.
    #[default]
    Global,
    /// One pool per endpoint, each with the full concurrency.
    PerEndpoint,
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workers per pool.
    pub concurrency: usize,
    pub topology: Topology,
    /// Jobs buffered per pool before intake waits.
    pub queue_capacity: usize,
    /// Requests the generator produces. Unbounded when absent.
    pub total_requests: Option<u64>,
    /// Wall-clock limit of a run. Unbounded when absent.
    #[serde(with = "option_duration_str")]
    pub duration: Option<Duration>,
    #[serde(with = "duration_str")]
    pub progress_interval: Duration,
    /// Record "already in cache" outcomes as successes.
    pub count_duplicates_as_success: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            topology: Topology::Global,
            queue_capacity: 1024,
            total_requests: None,
            duration: None,
            progress_interval: Duration::from_secs(5),
            count_duplicates_as_success: false,
        }
    }
}

/// The four collaborator seams.
#[derive(Clone)]
pub struct Collaborators {
    pub builder: Arc<dyn MessageBuilder>,
    pub signer: Arc<dyn Signer>,
    pub transport: Arc<dyn Transport>,
    pub query: Arc<dyn ChainQuery>,
}

/// Everything the engine is configured with.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub engine: EngineConfig,
    pub retry: RetryConfig,
    pub classifier: ClassifierConfig,
    /// Endpoints to use. Taken from the chain query when empty.
    pub endpoints: Vec<Endpoint>,
    /// Chain id override. Queried from the first endpoint when absent.
    pub chain_id: Option<ChainId>,
}

impl EngineOptions {
    /// Engine-relevant parts of a spammer configuration.
    pub fn from_config(config: &SpammerConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            retry: config.retry.clone(),
            classifier: config.classifier.clone(),
            endpoints: config.endpoints(),
            chain_id: config.chain_id_override(),
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// Concurrent transaction dispatch engine.
///
/// Built once by [`bootstrap`](Self::bootstrap), which resolves endpoints,
/// the chain id and every account's starting sequence. Each run spawns fresh
/// worker pools, feeds them from a request stream and drains them before
/// returning; outcome counters accumulate across runs.
pub struct DispatchEngine {
    config: EngineConfig,
    endpoints: Vec<Endpoint>,
    chain_id: ChainId,
    query: Arc<dyn ChainQuery>,
    allocator: SequenceAllocator,
    stats: Arc<ResultAggregator>,
    dispatcher: Arc<Dispatcher>,
    round_robin: AtomicUsize,
}

impl DispatchEngine {
    /// Resolve endpoints, chain id and account state, then build the engine.
    ///
    /// Fails before any dispatch if there is nothing to send to, the chain
    /// id cannot be resolved or an account cannot be queried.
    pub async fn bootstrap(
        options: EngineOptions,
        accounts: &[AccountAddress],
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        let Collaborators {
            builder,
            signer,
            transport,
            query,
        } = collaborators;

        let endpoints = if options.endpoints.is_empty() {
            query.endpoints()
        } else {
            options.endpoints
        };
        let Some(first) = endpoints.first() else {
            return Err(EngineError::NoEndpoints);
        };
        if accounts.is_empty() {
            return Err(EngineError::NoAccounts);
        }

        let chain_id = match options.chain_id {
            Some(chain_id) => chain_id,
            None => query
                .chain_id(first)
                .await
                .map_err(|source| EngineError::ChainId {
                    endpoint: first.clone(),
                    source,
                })?,
        };

        let allocator = SequenceAllocator::new();
        let states = try_join_all(accounts.iter().map(|account| {
            let query = Arc::clone(&query);
            async move {
                query
                    .account_state(account)
                    .await
                    .map(|state| (account.clone(), state))
                    .map_err(|source| EngineError::AccountState {
                        account: account.clone(),
                        source,
                    })
            }
        }))
        .await?;
        for (account, state) in states {
            info!(
                account = %account,
                sequence = state.sequence,
                account_number = %state.account_number,
                "Registered account"
            );
            allocator.register(account, state);
        }

        let stats = Arc::new(ResultAggregator::new());
        let dispatcher = Arc::new(Dispatcher {
            allocator: allocator.clone(),
            classifier: ErrorClassifier::new(options.classifier),
            retry: RetryPolicy::new(options.retry),
            stats: Arc::clone(&stats),
            builder,
            signer,
            transport,
            chain_id: chain_id.clone(),
            count_duplicates_as_success: options.engine.count_duplicates_as_success,
        });

        info!(
            chain_id = %chain_id,
            endpoints = endpoints.len(),
            accounts = accounts.len(),
            concurrency = options.engine.concurrency,
            topology = ?options.engine.topology,
            "Dispatch engine ready"
        );

        Ok(Self {
            config: options.engine,
            endpoints,
            chain_id,
            query,
            allocator,
            stats,
            dispatcher,
            round_robin: AtomicUsize::new(0),
        })
    }

    /// Dispatch every request of `requests`, then drain.
    pub async fn run<S>(&self, requests: S) -> EngineReport
    where
        S: Stream<Item = DispatchRequest>,
    {
        self.run_until_cancelled(requests, CancellationToken::new())
            .await
    }

    /// Dispatch for at most `duration`.
    pub async fn run_for<S>(&self, requests: S, duration: Duration) -> EngineReport
    where
        S: Stream<Item = DispatchRequest>,
    {
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                cancel.cancel();
            })
        };
        let report = self.run_until_cancelled(requests, cancel).await;
        timer.abort();
        report
    }

    /// Dispatch until the stream ends or `cancel` fires, then drain.
    ///
    /// Cancellation only stops intake: queued and in-flight requests still
    /// run to their terminal outcome.
    pub async fn run_until_cancelled<S>(&self, requests: S, cancel: CancellationToken) -> EngineReport
    where
        S: Stream<Item = DispatchRequest>,
    {
        let start = Instant::now();
        let before = self.stats.snapshot();
        let pools = self.spawn_pools();
        let progress_stop = CancellationToken::new();
        let progress = self.spawn_progress_reporter(start, progress_stop.clone());

        tokio::pin!(requests);
        let mut submitted = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                request = requests.next() => request,
            };
            let Some(request) = next else {
                break;
            };
            submitted += 1;
            let (pool, endpoint) = self.route(&pools, &request);
            if let Err(e) = pools[pool].submit(Job { request, endpoint }).await {
                warn!(error = %e, "Dropping request");
                self.stats.record_failure(None, Duration::ZERO);
            }
        }

        info!(submitted, "Intake closed, draining workers");
        for pool in pools {
            pool.shutdown().await;
        }
        progress_stop.cancel();
        if let Err(e) = progress.await {
            error!(error = %e, "Progress reporter panicked");
        }

        let duration = start.elapsed();
        let stats = self.stats.snapshot();
        print_progress(&stats, duration);
        let completed = stats.total() - before.total();
        EngineReport {
            duration,
            submitted,
            avg_tps: if duration.as_secs_f64() > 0.0 {
                completed as f64 / duration.as_secs_f64()
            } else {
                0.0
            },
            stats,
        }
    }

    /// Live outcome counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Re-query an account and overwrite its sequence.
    pub async fn resync_account(&self, account: &AccountAddress) -> Result<AccountState, EngineError> {
        let state = self
            .query
            .account_state(account)
            .await
            .map_err(|source| EngineError::AccountState {
                account: account.clone(),
                source,
            })?;
        info!(account = %account, sequence = state.sequence, "Resynchronized account");
        self.allocator.register(account.clone(), state);
        Ok(state)
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    fn spawn_pools(&self) -> Vec<DispatchWorkerPool> {
        let concurrency = self.config.concurrency;
        let capacity = self.config.queue_capacity;
        match self.config.topology {
            Topology::Global => vec![DispatchWorkerPool::spawn(
                "global",
                concurrency,
                capacity,
                Arc::clone(&self.dispatcher),
            )],
            Topology::PerEndpoint => self
                .endpoints
                .iter()
                .map(|endpoint| {
                    DispatchWorkerPool::spawn(
                        endpoint.as_str(),
                        concurrency,
                        capacity,
                        Arc::clone(&self.dispatcher),
                    )
                })
                .collect(),
        }
    }

    /// Pick the pool index and endpoint for a request.
    fn route(&self, pools: &[DispatchWorkerPool], request: &DispatchRequest) -> (usize, Endpoint) {
        let pinned = request
            .endpoint
            .as_ref()
            .map(|ep| (self.endpoints.iter().position(|known| known == ep), ep.clone()));

        let next = || self.round_robin.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();

        match (self.config.topology, pinned) {
            (Topology::Global, Some((_, endpoint))) => (0, endpoint),
            (Topology::Global, None) => (0, self.endpoints[next()].clone()),
            (Topology::PerEndpoint, Some((Some(idx), endpoint))) => (idx, endpoint),
            (Topology::PerEndpoint, Some((None, endpoint))) => (next() % pools.len(), endpoint),
            (Topology::PerEndpoint, None) => {
                let idx = next();
                (idx, self.endpoints[idx].clone())
            }
        }
    }

    fn spawn_progress_reporter(&self, start: Instant, stop: CancellationToken) -> JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let interval = self.config.progress_interval.max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => print_progress(&stats.snapshot(), start.elapsed()),
                }
            }
        })
    }
}

fn print_progress(stats: &StatsSnapshot, elapsed: Duration) {
    let tps = if elapsed.as_secs_f64() > 0.0 {
        stats.total() as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    println!(
        "[{:>3}s] success: {} | failure: {} | attempts: {} | corrections: {} | tps: {:.0}",
        elapsed.as_secs(),
        stats.success,
        stats.failure,
        stats.attempts,
        stats.corrections,
        tps
    );
}

/// Report generated after a run.
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub duration: Duration,
    /// Requests taken from the stream in this run.
    pub submitted: u64,
    /// Terminal outcomes per second over this run.
    pub avg_tps: f64,
    /// Engine counters at the end of the run.
    pub stats: StatsSnapshot,
}

impl EngineReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Dispatch Report ===");
        println!("Duration: {:?}", self.duration);
        println!("Submitted: {}", self.submitted);
        println!("Avg TPS: {:.2}", self.avg_tps);
        self.stats.print();
    }
}

/// Setup errors. Once dispatch starts, nothing aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no endpoints available to send transactions")]
    NoEndpoints,

    #[error("no accounts to send from")]
    NoAccounts,

    #[error("failed to get chain ID from {endpoint}: {source}")]
    ChainId {
        endpoint: Endpoint,
        #[source]
        source: QueryError,
    },

    #[error("failed to get account state of {account}: {source}")]
    AccountState {
        account: AccountAddress,
        #[source]
        source: QueryError,
    },
}

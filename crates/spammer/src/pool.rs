//! Dispatch workers.
//!
//! A [`DispatchWorkerPool`] runs a fixed number of long-lived tokio tasks that
//! pull jobs from one bounded queue. At most `concurrency` attempts are in
//! flight per pool; dropping the queue's sender is the shutdown signal, after
//! which workers finish what they hold and exit.
//!
//! Each job goes through [`Dispatcher::execute`]:
//!
//! ```text
//! reserve ─► build ─► sign ─► broadcast ─┬─ code 0 ──────────────► success
//!   ▲                          ▲          └─ failure ─► classify
//!   │                          └── Transient (same bytes, after delay)
//!   └── SequenceMismatch (correct allocator, new reservation)
//! ```

use crate::accounts::{Reservation, SequenceAllocator};
use crate::classify::{Classification, ErrorClassifier, Failure};
use crate::retry::RetryPolicy;
use crate::stats::ResultAggregator;
use hardhat_core::{MessageBuilder, SignContext, Signer, Transport, TransportError};
use hardhat_types::{ChainId, DispatchRequest, Endpoint, OutcomeRecord, ResponseCode, TxHash};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One unit of work: a request with its endpoint already resolved.
#[derive(Debug, Clone)]
pub struct Job {
    pub request: DispatchRequest,
    pub endpoint: Endpoint,
}

/// Everything a worker needs to carry a request to a terminal outcome.
///
/// Shared by every worker of every pool.
pub struct Dispatcher {
    pub(crate) allocator: SequenceAllocator,
    pub(crate) classifier: ErrorClassifier,
    pub(crate) retry: RetryPolicy,
    pub(crate) stats: Arc<ResultAggregator>,
    pub(crate) builder: Arc<dyn MessageBuilder>,
    pub(crate) signer: Arc<dyn Signer>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) chain_id: ChainId,
    pub(crate) count_duplicates_as_success: bool,
}

/// How a request ended.
enum Verdict {
    Success,
    Failure,
}

/// Per-request bookkeeping.
struct Attempts {
    start: Instant,
    broadcasts: u32,
    corrections: u32,
    code: Option<ResponseCode>,
    log: String,
}

impl Attempts {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            broadcasts: 0,
            corrections: 0,
            code: None,
            log: String::new(),
        }
    }
}

impl Dispatcher {
    /// Carry one request to its terminal outcome and record it.
    ///
    /// Never fails: every error ends as a recorded failure.
    pub async fn execute(&self, job: Job) -> OutcomeRecord {
        let Job { request, endpoint } = job;
        let mut state = Attempts::new();

        let mut reservation = match self.allocator.reserve(&request.account) {
            Ok(r) => r,
            Err(e) => {
                error!(account = %request.account, error = %e, "Cannot reserve sequence");
                state.log = e.to_string();
                return self.conclude(Verdict::Failure, state, None);
            }
        };

        'resubmit: loop {
            let tx_bytes = match self.prepare(&request, &reservation) {
                Ok(bytes) => bytes,
                Err(reason) => {
                    let released = self.release_unsent(&reservation);
                    warn!(
                        account = %reservation.account,
                        sequence = reservation.sequence,
                        released,
                        error = %reason,
                        "Failed to build transaction"
                    );
                    state.code = None;
                    state.log = reason;
                    return self.conclude(Verdict::Failure, state, None);
                }
            };

            // Whether these bytes were broadcast, and whether the next
            // broadcast is a transient retry.
            let mut sent = false;
            let mut retrying = false;
            loop {
                let Some(deadline) = self.retry.attempt_deadline(state.start.elapsed()) else {
                    let released = !sent && self.release_unsent(&reservation);
                    warn!(
                        account = %reservation.account,
                        sequence = reservation.sequence,
                        attempts = state.broadcasts,
                        released,
                        "Retry budget exhausted"
                    );
                    return self.conclude(Verdict::Failure, state, None);
                };

                if std::mem::take(&mut retrying) {
                    self.stats.record_retry();
                }
                sent = true;
                state.broadcasts += 1;
                self.stats.record_attempt();
                let result = match tokio::time::timeout(
                    deadline,
                    self.transport.broadcast(&tx_bytes, &endpoint),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(deadline)),
                };

                let classification = match &result {
                    Ok(response) if response.code.is_success() => {
                        debug!(
                            account = %reservation.account,
                            sequence = reservation.sequence,
                            endpoint = %endpoint,
                            attempt = state.broadcasts,
                            elapsed_ms = state.start.elapsed().as_millis() as u64,
                            "Transaction accepted"
                        );
                        state.code = Some(response.code);
                        state.log = response.log.clone();
                        let hash = response.hash.or_else(|| Some(TxHash::of(&tx_bytes)));
                        return self.conclude(Verdict::Success, state, hash);
                    }
                    Ok(response) => {
                        let failure = Failure::Rejected {
                            code: response.code,
                            log: &response.log,
                        };
                        state.code = Some(response.code);
                        state.log = failure.to_string();
                        self.classifier.classify(&failure)
                    }
                    Err(err) => {
                        let failure = Failure::Transport(err);
                        state.code = None;
                        state.log = failure.to_string();
                        self.classifier.classify(&failure)
                    }
                };

                let elapsed = state.start.elapsed();
                match classification {
                    Classification::SequenceMismatch { expected } => {
                        self.stats.record_correction();
                        if let Err(e) = self.allocator.correct(&reservation.account, expected) {
                            error!(account = %reservation.account, error = %e, "Cannot correct sequence");
                            return self.conclude(Verdict::Failure, state, None);
                        }
                        warn!(
                            account = %reservation.account,
                            sequence = reservation.sequence,
                            expected,
                            "Set sequence to expected value due to mismatch"
                        );
                        if !self.retry.allows_correction(state.corrections)
                            || !self.retry.should_retry(state.broadcasts, elapsed, &classification)
                        {
                            self.log_failure(&reservation, &state, "Giving up after sequence mismatch");
                            return self.conclude(Verdict::Failure, state, None);
                        }
                        state.corrections += 1;
                        reservation = match self.allocator.reserve(&reservation.account) {
                            Ok(r) => r,
                            Err(e) => {
                                error!(account = %reservation.account, error = %e, "Cannot reserve sequence");
                                return self.conclude(Verdict::Failure, state, None);
                            }
                        };
                        continue 'resubmit;
                    }
                    Classification::DuplicateSubmission => {
                        self.stats.record_duplicate();
                        if let Err(e) = self
                            .allocator
                            .advance_past(&reservation.account, reservation.sequence)
                        {
                            error!(account = %reservation.account, error = %e, "Cannot advance sequence");
                        }
                        debug!(
                            account = %reservation.account,
                            sequence = reservation.sequence,
                            "Transaction already known to node"
                        );
                        let verdict = if self.count_duplicates_as_success {
                            Verdict::Success
                        } else {
                            Verdict::Failure
                        };
                        return self.conclude(verdict, state, Some(TxHash::of(&tx_bytes)));
                    }
                    Classification::Transient => {
                        if !self.retry.should_retry(state.broadcasts, elapsed, &classification) {
                            self.log_failure(&reservation, &state, "Transaction failed after retries");
                            return self.conclude(Verdict::Failure, state, None);
                        }
                        retrying = true;
                        debug!(
                            account = %reservation.account,
                            sequence = reservation.sequence,
                            attempt = state.broadcasts,
                            error = %state.log,
                            "Retrying transaction"
                        );
                        let delay = self.retry.delay_for(&classification);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Classification::Permanent => {
                        self.log_failure(&reservation, &state, "Transaction rejected");
                        return self.conclude(Verdict::Failure, state, None);
                    }
                }
            }
        }
    }

    /// Build and sign the request at the reserved sequence.
    fn prepare(&self, request: &DispatchRequest, reservation: &Reservation) -> Result<Vec<u8>, String> {
        let message = self
            .builder
            .build(&request.account, request.kind, &request.params)
            .map_err(|e| e.to_string())?;
        let ctx = SignContext {
            account: &reservation.account,
            chain_id: &self.chain_id,
            sequence: reservation.sequence,
            account_number: reservation.account_number,
        };
        self.signer
            .sign_and_encode(&message, &ctx)
            .map_err(|e| e.to_string())
    }

    /// Hand back a reservation that was never broadcast.
    fn release_unsent(&self, reservation: &Reservation) -> bool {
        match self.allocator.release(reservation) {
            Ok(released) => released,
            Err(e) => {
                error!(account = %reservation.account, error = %e, "Cannot release sequence");
                false
            }
        }
    }

    fn log_failure(&self, reservation: &Reservation, state: &Attempts, msg: &str) {
        warn!(
            account = %reservation.account,
            sequence = reservation.sequence,
            attempts = state.broadcasts,
            elapsed_ms = state.start.elapsed().as_millis() as u64,
            error = %state.log,
            "{}", msg
        );
    }

    fn conclude(&self, verdict: Verdict, state: Attempts, hash: Option<TxHash>) -> OutcomeRecord {
        let elapsed = state.start.elapsed();
        match verdict {
            Verdict::Success => self
                .stats
                .record_success(state.code.unwrap_or(ResponseCode::OK), elapsed),
            Verdict::Failure => self.stats.record_failure(state.code, elapsed),
        }
        OutcomeRecord {
            code: state.code,
            log: state.log,
            hash,
            elapsed,
            attempts: state.broadcasts,
        }
    }
}

/// The pool's queue is closed.
#[derive(Debug, thiserror::Error)]
#[error("dispatch pool {0} is closed")]
pub struct PoolClosed(pub String);

/// Fixed set of workers draining one bounded queue.
pub struct DispatchWorkerPool {
    name: String,
    sender: mpsc::Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl DispatchWorkerPool {
    /// Spawn `concurrency` workers (at least one) behind a queue of
    /// `queue_capacity` jobs.
    pub fn spawn(
        name: impl Into<String>,
        concurrency: usize,
        queue_capacity: usize,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let jobs = Arc::new(Mutex::new(receiver));

        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    jobs: Arc::clone(&jobs),
                    dispatcher: Arc::clone(&dispatcher),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(pool = %name, workers = concurrency.max(1), "Dispatch pool started");
        Self {
            name,
            sender,
            handles,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), PoolClosed> {
        self.sender
            .send(job)
            .await
            .map_err(|_| PoolClosed(self.name.clone()))
    }

    /// Close the queue and wait until every worker has drained it.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(pool = %self.name, error = %e, "Dispatch worker panicked");
            }
        }
        debug!(pool = %self.name, "Dispatch pool drained");
    }
}

struct Worker {
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    dispatcher: Arc<Dispatcher>,
}

impl Worker {
    async fn run(self) {
        loop {
            // Hold the receiver only while waiting, never while dispatching.
            let job = { self.jobs.lock().await.recv().await };
            match job {
                Some(job) => {
                    self.dispatcher.execute(job).await;
                }
                None => break,
            }
        }
        debug!(worker = self.worker_id, "Dispatch worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierConfig, CODE_TX_IN_MEMPOOL_CACHE};
    use crate::retry::RetryConfig;
    use hardhat_test_helpers::{
        mismatch_log, Fallback, MockLedger, PlainSigner, ScriptedTransport, StaticMessageBuilder,
    };
    use hardhat_types::{AccountAddress, AccountNumber, AccountState, MessageKind, MsgParams};
    use std::time::Duration;

    const ENDPOINT: &str = "http://mock-node:26657";

    fn retry_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            max_elapsed: Duration::from_secs(30),
            retry_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(2),
            max_corrections: 1,
        }
    }

    fn dispatcher(
        transport: Arc<dyn Transport>,
        start_sequence: u64,
        retry: RetryConfig,
    ) -> Arc<Dispatcher> {
        dispatcher_with(
            transport,
            Arc::new(StaticMessageBuilder::new()),
            Arc::new(PlainSigner::new()),
            start_sequence,
            retry,
        )
    }

    fn dispatcher_with(
        transport: Arc<dyn Transport>,
        builder: Arc<dyn MessageBuilder>,
        signer: Arc<dyn Signer>,
        start_sequence: u64,
        retry: RetryConfig,
    ) -> Arc<Dispatcher> {
        let allocator = SequenceAllocator::new();
        allocator.register(
            AccountAddress::new("alice"),
            AccountState {
                sequence: start_sequence,
                account_number: AccountNumber(1),
            },
        );
        Arc::new(Dispatcher {
            allocator,
            classifier: ErrorClassifier::new(ClassifierConfig::default()),
            retry: RetryPolicy::new(retry),
            stats: Arc::new(ResultAggregator::new()),
            builder,
            signer,
            transport,
            chain_id: ChainId("test-1".into()),
            count_duplicates_as_success: false,
        })
    }

    fn job(account: &str) -> Job {
        Job {
            request: DispatchRequest::new(
                MessageKind::BankSend,
                Arc::new(MsgParams::default()),
                AccountAddress::new(account),
            ),
            endpoint: Endpoint::new(ENDPOINT),
        }
    }

    fn alice() -> AccountAddress {
        AccountAddress::new("alice")
    }

    #[tokio::test]
    async fn test_success_records_code_zero() {
        let ledger = Arc::new(MockLedger::new("test-1").with_account("alice", 0, 1));
        let d = dispatcher(ledger.clone(), 0, retry_config(1));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, Some(ResponseCode::OK));
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.hash.is_some());
        assert_eq!(ledger.committed("alice"), vec![0]);
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mismatch_corrects_and_resubmits_once() {
        // Ledger is at 12 while the allocator believes 10.
        let ledger = Arc::new(MockLedger::new("test-1").with_account("alice", 12, 1));
        let d = dispatcher(ledger.clone(), 10, retry_config(1));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, Some(ResponseCode::OK));
        assert_eq!(outcome.attempts, 2);
        assert_eq!(ledger.committed("alice"), vec![12]);
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 13);
        let snap = d.stats.snapshot();
        assert_eq!((snap.success, snap.failure, snap.corrections), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_mismatch_correction_sets_next_reservation() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .then_reject(32, mismatch_log(12, 10))
                .then_reject(5, "insufficient funds"),
        );
        let d = dispatcher(transport, 10, retry_config(1));

        let outcome = d.execute(job("alice")).await;

        // Resubmitted at 12, then rejected permanently.
        assert_eq!(outcome.code, Some(ResponseCode(5)));
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 13);
        assert_eq!(d.allocator.reserve(&alice()).unwrap().sequence, 13);
    }

    #[tokio::test]
    async fn test_second_mismatch_is_terminal() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .then_reject(32, mismatch_log(12, 10))
                .then_reject(32, mismatch_log(20, 12)),
        );
        let d = dispatcher(transport.clone(), 10, retry_config(5));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, Some(ResponseCode(32)));
        assert_eq!(transport.call_count(), 2);
        // The second piece of evidence is still applied.
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 20);
        assert_eq!(d.stats.snapshot().failure, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_twice_then_success() {
        let transport = Arc::new(ScriptedTransport::new().then_fail().then_fail());
        let d = dispatcher(transport.clone(), 0, retry_config(3));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, Some(ResponseCode::OK));
        assert_eq!(outcome.attempts, 3);
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        // Same reservation, same bytes.
        assert!(calls.iter().all(|(bytes, _)| bytes == &calls[0].0));
        let snap = d.stats.snapshot();
        assert_eq!((snap.success, snap.failure, snap.retries), (1, 0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_is_bounded() {
        let transport = Arc::new(ScriptedTransport::new().with_fallback(Fallback::Connect));
        let config = retry_config(3);
        let budget = config.max_elapsed + config.retry_delay;
        let d = dispatcher(transport.clone(), 0, config);

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.attempts, 4);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(outcome.code, None);
        assert!(outcome.elapsed <= budget);
        let snap = d.stats.snapshot();
        assert_eq!((snap.success, snap.failure, snap.no_response), (0, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_node_times_out_within_budget() {
        let transport = Arc::new(ScriptedTransport::new().with_fallback(Fallback::Hang));
        let config = RetryConfig {
            max_retries: 10,
            max_elapsed: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(2),
            max_corrections: 1,
        };
        let d = dispatcher(transport.clone(), 0, config);

        let outcome = d.execute(job("alice")).await;

        // Attempts start at 0s and 2.5s. A third would start at exactly 5s
        // with nothing left to spend, so it is neither delayed for nor counted.
        assert_eq!(outcome.attempts, 2);
        assert_eq!(transport.call_count(), 2);
        assert!(outcome.elapsed >= Duration::from_millis(4_500));
        assert!(outcome.elapsed < Duration::from_secs(5));
        assert!(outcome.log.contains("timed out"));
        let snap = d.stats.snapshot();
        assert_eq!((snap.attempts, snap.retries), (2, 1));
    }

    #[tokio::test]
    async fn test_budget_spent_during_rebuild_releases_sequence() {
        // The mismatch arrives with budget left, but rebuilding at the
        // corrected sequence spends the rest of it.
        let transport = Arc::new(ScriptedTransport::new().then_reject(32, mismatch_log(12, 10)));
        let config = RetryConfig {
            max_retries: 3,
            max_elapsed: Duration::from_millis(150),
            retry_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(2),
            max_corrections: 1,
        };
        let d = dispatcher_with(
            transport.clone(),
            Arc::new(StaticMessageBuilder::new().with_build_delay(Duration::from_millis(80))),
            Arc::new(PlainSigner::new()),
            10,
            config,
        );

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.code, Some(ResponseCode(32)));
        assert_eq!(transport.call_count(), 1);
        // 12 was reserved and built but never sent, so it is handed out again.
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 12);
        assert_eq!(d.allocator.reserve(&alice()).unwrap().sequence, 12);
        assert_eq!(d.stats.snapshot().failure, 1);
    }

    #[tokio::test]
    async fn test_duplicate_advances_past_and_is_failure() {
        let transport = Arc::new(
            ScriptedTransport::new().then_reject(CODE_TX_IN_MEMPOOL_CACHE, "tx already exists in cache"),
        );
        let d = dispatcher(transport.clone(), 4, retry_config(3));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, Some(ResponseCode(19)));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 5);
        let snap = d.stats.snapshot();
        assert_eq!((snap.success, snap.failure, snap.duplicates), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_duplicate_counted_as_success_when_configured() {
        let transport = Arc::new(
            ScriptedTransport::new().then_reject(CODE_TX_IN_MEMPOOL_CACHE, ""),
        );
        let allocator = SequenceAllocator::new();
        allocator.register(
            alice(),
            AccountState {
                sequence: 0,
                account_number: AccountNumber(1),
            },
        );
        let d = Dispatcher {
            allocator,
            classifier: ErrorClassifier::default(),
            retry: RetryPolicy::default(),
            stats: Arc::new(ResultAggregator::new()),
            builder: Arc::new(StaticMessageBuilder::new()),
            signer: Arc::new(PlainSigner::new()),
            transport,
            chain_id: ChainId("test-1".into()),
            count_duplicates_as_success: true,
        };

        d.execute(job("alice")).await;

        let snap = d.stats.snapshot();
        assert_eq!((snap.success, snap.failure), (1, 0));
        assert_eq!(snap.codes.get(&ResponseCode(19)), Some(&1));
    }

    #[tokio::test]
    async fn test_permanent_rejection_not_retried() {
        let transport = Arc::new(ScriptedTransport::new().then_reject(5, "insufficient funds"));
        let d = dispatcher(transport.clone(), 0, retry_config(3));

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(d.stats.snapshot().codes.get(&ResponseCode(5)), Some(&1));
    }

    #[tokio::test]
    async fn test_build_failure_releases_reservation() {
        let transport = Arc::new(ScriptedTransport::new());
        let d = dispatcher_with(
            transport.clone(),
            Arc::new(StaticMessageBuilder::failing("bad amount")),
            Arc::new(PlainSigner::new()),
            7,
            retry_config(3),
        );

        let outcome = d.execute(job("alice")).await;

        assert_eq!(outcome.code, None);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.log.contains("bad amount"));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(d.allocator.peek(&alice()).unwrap(), 7);
        assert_eq!(d.stats.snapshot().no_response, 1);
    }

    #[tokio::test]
    async fn test_sign_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        let signer = Arc::new(PlainSigner::failing("encoder broke"));
        let d = dispatcher_with(
            transport.clone(),
            Arc::new(StaticMessageBuilder::new()),
            signer.clone(),
            0,
            retry_config(3),
        );

        d.execute(job("alice")).await;

        assert_eq!(signer.calls(), 1);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(d.stats.snapshot().failure, 1);
    }

    #[tokio::test]
    async fn test_unknown_account_is_recorded_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        let d = dispatcher(transport.clone(), 0, retry_config(1));

        let outcome = d.execute(job("mallory")).await;

        assert_eq!(outcome.attempts, 0);
        assert!(outcome.log.contains("not registered"));
        assert_eq!(d.stats.snapshot().failure, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_in_flight_attempts() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(5)));
        let d = dispatcher(transport.clone(), 0, retry_config(1));
        let pool = DispatchWorkerPool::spawn("global", 4, 8, Arc::clone(&d));

        for _ in 0..50 {
            pool.submit(job("alice")).await.unwrap();
        }
        pool.shutdown().await;

        assert_eq!(transport.call_count(), 50);
        assert!(transport.max_in_flight() <= 4);
        let snap = d.stats.snapshot();
        assert_eq!(snap.success + snap.failure, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_conserves_outcomes_under_contention() {
        let ledger = Arc::new(
            MockLedger::new("test-1")
                .with_account("alice", 0, 1)
                .with_latency(Duration::from_millis(1)),
        );
        let d = dispatcher(ledger.clone(), 0, retry_config(1));
        let pool = DispatchWorkerPool::spawn("global", 16, 64, Arc::clone(&d));

        for _ in 0..200 {
            pool.submit(job("alice")).await.unwrap();
        }
        pool.shutdown().await;

        let snap = d.stats.snapshot();
        assert_eq!(snap.success + snap.failure, 200);
        let committed = ledger.committed("alice");
        let expected: Vec<u64> = (0..committed.len() as u64).collect();
        assert_eq!(committed, expected);
    }
}

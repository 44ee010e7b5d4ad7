//! Test helpers for hardhat.
//!
//! In-memory stand-ins for every collaborator the dispatch engine consumes:
//!
//! - [`MockLedger`]: a nonce-ordered ledger that enforces sequences exactly
//!   like a node's CheckTx, reports mismatches in the node's wording, and
//!   counts any `(account, sequence)` pair broadcast twice concurrently.
//! - [`ScriptedTransport`]: replays a fixed list of responses and failures.
//! - [`PlainSigner`]: encodes `account:sequence:type_url`, no cryptography.
//! - [`StaticMessageBuilder`]: returns a fixed message, or a fixed error.

use async_trait::async_trait;
use hardhat_core::{
    BuildError, BuiltMessage, ChainQuery, MessageBuilder, QueryError, SignContext, SignError,
    Signer, Transport, TransportError,
};
use hardhat_types::{
    AccountAddress, AccountNumber, AccountState, BroadcastResponse, ChainId, Endpoint,
    MessageKind, MsgParams, TxHash,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Code nodes return for an out-of-order sequence.
pub const CODE_WRONG_SEQUENCE: u32 = 32;
/// Code nodes return for a transaction already in the mempool cache.
pub const CODE_TX_IN_CACHE: u32 = 19;
/// Code for bytes the ledger cannot decode.
pub const CODE_TX_DECODE: u32 = 2;

/// Mismatch log in the node's exact wording.
pub fn mismatch_log(expected: u64, got: u64) -> String {
    format!(
        "account sequence mismatch, expected {}, got {}: incorrect account sequence",
        expected, got
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Signer / builder
// ═══════════════════════════════════════════════════════════════════════════

/// Encodes `account:sequence:type_url` as the transaction bytes.
#[derive(Debug, Default)]
pub struct PlainSigner {
    fail_with: Option<String>,
    calls: AtomicU64,
}

impl PlainSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signer whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of `sign_and_encode` calls made.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Signer for PlainSigner {
    fn sign_and_encode(
        &self,
        message: &BuiltMessage,
        ctx: &SignContext<'_>,
    ) -> Result<Vec<u8>, SignError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(SignError::Encode(reason.clone()));
        }
        Ok(format!("{}:{}:{}", ctx.account, ctx.sequence, message.type_url).into_bytes())
    }
}

/// Decode bytes produced by [`PlainSigner`] into `(account, sequence)`.
pub fn decode_plain(tx_bytes: &[u8]) -> Option<(AccountAddress, u64)> {
    let text = std::str::from_utf8(tx_bytes).ok()?;
    let mut parts = text.splitn(3, ':');
    let account = parts.next()?;
    let sequence = parts.next()?.parse().ok()?;
    Some((AccountAddress::new(account), sequence))
}

/// Returns the same message for every request.
#[derive(Debug, Default)]
pub struct StaticMessageBuilder {
    fail_with: Option<String>,
    delay: Duration,
}

impl StaticMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Block each build for `delay`, like an expensive encoder.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl MessageBuilder for StaticMessageBuilder {
    fn build(
        &self,
        account: &AccountAddress,
        kind: MessageKind,
        params: &MsgParams,
    ) -> Result<BuiltMessage, BuildError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(reason) = &self.fail_with {
            return Err(BuildError::InvalidParam {
                name: "params",
                reason: reason.clone(),
            });
        }
        Ok(BuiltMessage {
            type_url: format!("/test.{}", kind),
            payload: serde_json::json!({
                "sender": account.as_str(),
                "amount": params.amount,
            }),
            memo: String::new(),
            gas_limit: 200_000,
            fee_amount: 0,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MockLedger
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct LedgerAccount {
    expected: u64,
    account_number: AccountNumber,
    seen: HashSet<TxHash>,
    committed: Vec<u64>,
}

/// In-memory nonce-ordered ledger.
///
/// Accepts a transaction only at the account's expected sequence. Lower or
/// higher sequences are rejected with code 32 and the node's mismatch text;
/// byte-identical resubmissions of an accepted transaction get code 19.
#[derive(Debug)]
pub struct MockLedger {
    chain_id: ChainId,
    endpoints: Vec<Endpoint>,
    latency: Duration,
    accounts: Mutex<HashMap<AccountAddress, LedgerAccount>>,
    in_flight: Mutex<HashSet<(AccountAddress, u64)>>,
    concurrent_duplicates: AtomicU64,
    broadcasts: AtomicU64,
    failures_left: AtomicU32,
    endpoint_hits: Mutex<HashMap<Endpoint, u64>>,
}

impl MockLedger {
    /// An empty ledger with one endpoint.
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: ChainId(chain_id.into()),
            endpoints: vec![Endpoint::new("http://mock-node:26657")],
            latency: Duration::ZERO,
            accounts: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            concurrent_duplicates: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            failures_left: AtomicU32::new(0),
            endpoint_hits: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the advertised endpoints (may be empty).
    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Delay every broadcast by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Open an account whose next expected sequence is `sequence`.
    pub fn with_account(self, account: &str, sequence: u64, account_number: u64) -> Self {
        self.accounts.lock().insert(
            AccountAddress::new(account),
            LedgerAccount {
                expected: sequence,
                account_number: AccountNumber(account_number),
                seen: HashSet::new(),
                committed: Vec::new(),
            },
        );
        self
    }

    /// Fail the next `n` broadcasts with a connection error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Move an account's expected sequence, as an outside submitter would.
    pub fn set_expected(&self, account: &str, sequence: u64) {
        if let Some(acc) = self.accounts.lock().get_mut(&AccountAddress::new(account)) {
            acc.expected = sequence;
        }
    }

    /// Next sequence the ledger will accept for `account`.
    pub fn expected_sequence(&self, account: &str) -> Option<u64> {
        self.accounts
            .lock()
            .get(&AccountAddress::new(account))
            .map(|acc| acc.expected)
    }

    /// Sequences accepted for `account`, in acceptance order.
    pub fn committed(&self, account: &str) -> Vec<u64> {
        self.accounts
            .lock()
            .get(&AccountAddress::new(account))
            .map(|acc| acc.committed.clone())
            .unwrap_or_default()
    }

    /// Times an `(account, sequence)` pair arrived while the same pair was
    /// still being processed.
    pub fn concurrent_duplicates(&self) -> u64 {
        self.concurrent_duplicates.load(Ordering::SeqCst)
    }

    /// Broadcast calls received, failed ones included.
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Broadcast calls received per endpoint.
    pub fn hits(&self, endpoint: &Endpoint) -> u64 {
        self.endpoint_hits.lock().get(endpoint).copied().unwrap_or(0)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_tx(&self, account: &AccountAddress, sequence: u64, hash: TxHash) -> BroadcastResponse {
        let mut accounts = self.accounts.lock();
        let Some(acc) = accounts.get_mut(account) else {
            return BroadcastResponse::rejected(9, format!("account {} not found", account));
        };
        if acc.seen.contains(&hash) {
            return BroadcastResponse::rejected(CODE_TX_IN_CACHE, "tx already exists in cache");
        }
        if sequence != acc.expected {
            return BroadcastResponse::rejected(
                CODE_WRONG_SEQUENCE,
                mismatch_log(acc.expected, sequence),
            );
        }
        acc.expected += 1;
        acc.seen.insert(hash);
        acc.committed.push(sequence);
        BroadcastResponse::accepted(Some(hash))
    }
}

/// Removes an in-flight marker when the broadcast ends or is cancelled.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(AccountAddress, u64)>>,
    key: Option<(AccountAddress, u64)>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.set.lock().remove(&key);
        }
    }
}

#[async_trait]
impl Transport for MockLedger {
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        endpoint: &Endpoint,
    ) -> Result<BroadcastResponse, TransportError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        *self.endpoint_hits.lock().entry(endpoint.clone()).or_insert(0) += 1;

        if self.take_failure() {
            return Err(TransportError::Connect(format!(
                "connection refused: {}",
                endpoint
            )));
        }

        let Some((account, sequence)) = decode_plain(tx_bytes) else {
            return Ok(BroadcastResponse::rejected(CODE_TX_DECODE, "tx parse error"));
        };

        let key = (account.clone(), sequence);
        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.insert(key.clone()) {
                InFlightGuard {
                    set: &self.in_flight,
                    key: Some(key),
                }
            } else {
                self.concurrent_duplicates.fetch_add(1, Ordering::SeqCst);
                InFlightGuard {
                    set: &self.in_flight,
                    key: None,
                }
            }
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        Ok(self.check_tx(&account, sequence, TxHash::of(tx_bytes)))
    }
}

#[async_trait]
impl ChainQuery for MockLedger {
    async fn account_state(&self, account: &AccountAddress) -> Result<AccountState, QueryError> {
        self.accounts
            .lock()
            .get(account)
            .map(|acc| AccountState {
                sequence: acc.expected,
                account_number: acc.account_number,
            })
            .ok_or_else(|| QueryError::AccountNotFound(account.to_string()))
    }

    async fn chain_id(&self, _endpoint: &Endpoint) -> Result<ChainId, QueryError> {
        Ok(self.chain_id.clone())
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ScriptedTransport
// ═══════════════════════════════════════════════════════════════════════════

/// One scripted broadcast result.
#[derive(Debug)]
pub enum Step {
    /// Answer with this response.
    Respond(BroadcastResponse),
    /// Fail with this error.
    Fail(TransportError),
    /// Never answer; the caller's deadline has to fire.
    Hang,
}

/// What to do once the script is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Accept with code 0.
    Accept,
    /// Fail with a connection error.
    Connect,
    /// Never answer.
    Hang,
}

/// Replays scripted results in order, then the fallback.
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Fallback,
    delay: Duration,
    calls: Mutex<Vec<(Vec<u8>, Endpoint)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// An empty script that accepts everything.
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Fallback::Accept,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Append a step.
    pub fn then(self, step: Step) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    /// Append a rejection.
    pub fn then_reject(self, code: u32, log: impl Into<String>) -> Self {
        self.then(Step::Respond(BroadcastResponse::rejected(code, log)))
    }

    /// Append a connection failure.
    pub fn then_fail(self) -> Self {
        self.then(Step::Fail(TransportError::Connect("connection reset".into())))
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Delay every answer by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every broadcast received, in order.
    pub fn calls(&self) -> Vec<(Vec<u8>, Endpoint)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of broadcasts observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct CountGuard<'a>(&'a AtomicUsize);

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        endpoint: &Endpoint,
    ) -> Result<BroadcastResponse, TransportError> {
        self.calls.lock().push((tx_bytes.to_vec(), endpoint.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = CountGuard(&self.in_flight);

        let step = self.steps.lock().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = step.unwrap_or(match self.fallback {
            Fallback::Accept => Step::Respond(BroadcastResponse::accepted(Some(TxHash::of(
                tx_bytes,
            )))),
            Fallback::Connect => Step::Fail(TransportError::Connect("connection refused".into())),
            Fallback::Hang => Step::Hang,
        });

        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}

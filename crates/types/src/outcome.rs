//! Node responses and per-request outcomes.

use crate::{AccountNumber, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Integer outcome indicator returned by a node. Zero means accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCode(pub u32);

impl ResponseCode {
    /// Accepted into the mempool.
    pub const OK: Self = ResponseCode(0);

    /// Check whether the code signals acceptance.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node answered to a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    /// Response code, 0 on acceptance.
    pub code: ResponseCode,
    /// Free-form log text; carries the rejection reason.
    pub log: String,
    /// Transaction hash as reported by the node, if any.
    pub hash: Option<TxHash>,
}

impl BroadcastResponse {
    /// An accepting response.
    pub fn accepted(hash: Option<TxHash>) -> Self {
        Self {
            code: ResponseCode::OK,
            log: String::new(),
            hash,
        }
    }

    /// A rejecting response.
    pub fn rejected(code: u32, log: impl Into<String>) -> Self {
        Self {
            code: ResponseCode(code),
            log: log.into(),
            hash: None,
        }
    }
}

/// On-chain ordering state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    /// Next sequence the ledger will accept.
    pub sequence: u64,
    /// Stable account number.
    pub account_number: AccountNumber,
}

/// Terminal outcome of one dispatch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    /// Response code, absent when no node response was ever obtained
    /// (build failure, exhausted transport retries).
    pub code: Option<ResponseCode>,
    /// Last log or error text.
    pub log: String,
    /// Hash of the accepted transaction.
    pub hash: Option<TxHash>,
    /// Wall-clock time from first attempt to terminal outcome.
    pub elapsed: Duration,
    /// Number of broadcast attempts made.
    pub attempts: u32,
}

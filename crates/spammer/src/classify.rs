//! Failure classification.
//!
//! Maps every failed broadcast to one recovery directive. The only coupling to
//! the ledger's free-text output is [`parse_expected_sequence`], kept separate
//! so its grammar can be tested on its own:
//!
//! ```text
//! text     := <anything> marker digits <anything>
//! marker   := "expected "            (configurable)
//! digits   := [0-9]+                 (maximal run, parsed as u64)
//! ```
//!
//! Only the first occurrence of the marker is considered.

use hardhat_core::TransportError;
use hardhat_types::ResponseCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker preceding the expected sequence in mismatch errors,
/// e.g. `account sequence mismatch, expected 42, got 41: incorrect account sequence`.
pub const DEFAULT_SEQUENCE_MARKER: &str = "expected ";

/// Response code for "tx already in mempool cache".
pub const CODE_TX_IN_MEMPOOL_CACHE: u32 = 19;

/// Log text nodes emit when the exact transaction was already seen.
pub const TX_ALREADY_IN_CACHE: &str = "tx already exists in cache";

/// A failed broadcast, as seen by the classifier.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// No node response: timeout, connection or protocol failure.
    Transport(&'a TransportError),
    /// Node answered with a non-zero code.
    Rejected {
        /// Response code.
        code: ResponseCode,
        /// Log text.
        log: &'a str,
    },
}

impl Failure<'_> {
    /// Response code, if the node answered.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            Failure::Transport(_) => None,
            Failure::Rejected { code, .. } => Some(*code),
        }
    }
}

impl fmt::Display for Failure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transport(err) => write!(f, "{}", err),
            Failure::Rejected { code, log } => write!(f, "broadcast error code {}: {}", code, log),
        }
    }
}

/// Recovery directive for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The ledger expects `expected` next: correct the allocator and resubmit once.
    SequenceMismatch { expected: u64 },
    /// The exact transaction was already seen: do not resubmit.
    DuplicateSubmission,
    /// Retry the same reservation within the retry budget.
    Transient,
    /// Record the failure, no retry.
    Permanent,
}

/// Classifier rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Phrase that precedes the expected sequence in mismatch errors.
    pub sequence_marker: String,
    /// Response codes that mean "already seen".
    pub duplicate_codes: Vec<u32>,
    /// Log or error substrings that mean "already seen".
    pub duplicate_markers: Vec<String>,
    /// Response codes worth retrying (e.g. a full mempool).
    pub transient_codes: Vec<u32>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sequence_marker: DEFAULT_SEQUENCE_MARKER.to_string(),
            duplicate_codes: vec![CODE_TX_IN_MEMPOOL_CACHE],
            duplicate_markers: vec![TX_ALREADY_IN_CACHE.to_string()],
            transient_codes: Vec::new(),
        }
    }
}

/// Maps failures to [`Classification`]s.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    /// Create a classifier with the given rules.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify one failure.
    ///
    /// Duplicate rules win over the mismatch rule; a failure with no usable
    /// expected sequence falls back to `Transient` for transport errors and
    /// `Permanent` for response codes (unless listed as transient).
    pub fn classify(&self, failure: &Failure<'_>) -> Classification {
        match failure {
            Failure::Rejected { code, log } => {
                if self.config.duplicate_codes.contains(&code.0) || self.is_duplicate_text(log) {
                    return Classification::DuplicateSubmission;
                }
                if let Some(expected) = parse_expected_sequence(log, &self.config.sequence_marker) {
                    return Classification::SequenceMismatch { expected };
                }
                if self.config.transient_codes.contains(&code.0) {
                    Classification::Transient
                } else {
                    Classification::Permanent
                }
            }
            // Only JSON-RPC errors carry CheckTx logs; other transport text
            // comes from the HTTP stack or the decoder.
            Failure::Transport(TransportError::Rpc { message, .. }) => {
                if self.is_duplicate_text(message) {
                    return Classification::DuplicateSubmission;
                }
                match parse_expected_sequence(message, &self.config.sequence_marker) {
                    Some(expected) => Classification::SequenceMismatch { expected },
                    None => Classification::Transient,
                }
            }
            Failure::Transport(_) => Classification::Transient,
        }
    }

    fn is_duplicate_text(&self, text: &str) -> bool {
        self.config
            .duplicate_markers
            .iter()
            .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
    }
}

/// Extract the sequence the ledger expects from an error text.
///
/// Finds the first `marker`, then reads the maximal run of ASCII digits right
/// after it. Returns `None` if the marker is absent, no digit follows it, or
/// the number does not fit in a `u64`.
pub fn parse_expected_sequence(text: &str, marker: &str) -> Option<u64> {
    if marker.is_empty() {
        return None;
    }
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    rest[..end].parse().ok()
}

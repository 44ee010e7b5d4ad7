//! Error types raised by collaborators.

use std::time::Duration;
use thiserror::Error;

/// Message construction failed. Never retried: the request is malformed.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The builder does not support this message kind.
    #[error("unsupported message type: {0}")]
    UnsupportedKind(String),

    /// A required parameter is missing or malformed.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading an input file (e.g. a wasm blob) failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Signing or encoding failed. Never retried.
#[derive(Debug, Error)]
pub enum SignError {
    /// No key is known for the account.
    #[error("no signing key for account {0}")]
    UnknownAccount(String),

    /// Encoding the signed transaction failed.
    #[error("failed to encode transaction: {0}")]
    Encode(String),
}

/// Broadcast did not produce a node response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The per-attempt deadline elapsed.
    #[error("broadcast timed out after {0:?}")]
    Timeout(Duration),

    /// Could not reach the node.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Node answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message and data, joined.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Chain or account discovery failed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request never produced a response.
    #[error("query transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The account does not exist on chain.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// A field of the response could not be parsed.
    #[error("malformed {field}: {value}")]
    Malformed {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

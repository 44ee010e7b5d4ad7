//! Dispatch requests: what the caller wants submitted.

use crate::{AccountAddress, Endpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of message a request asks to be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Native token transfer between two accounts.
    BankSend,
    /// Cross-chain token transfer over an IBC channel.
    IbcTransfer,
    /// Upload of a wasm contract blob.
    StoreCode,
    /// Instantiation of a previously stored contract.
    InstantiateContract,
}

impl MessageKind {
    /// All supported kinds.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::BankSend,
        MessageKind::IbcTransfer,
        MessageKind::StoreCode,
        MessageKind::InstantiateContract,
    ];

    /// Wire name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::BankSend => "bank_send",
            MessageKind::IbcTransfer => "ibc_transfer",
            MessageKind::StoreCode => "store_code",
            MessageKind::InstantiateContract => "instantiate_contract",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown message kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported message type: {0}")]
pub struct UnknownMessageKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownMessageKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMessageKind(s.to_string()))
    }
}

/// Message-specific parameters.
///
/// Every field is optional in configuration; each message builder reads only
/// the fields relevant to its kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsgParams {
    /// Amount transferred, in the smallest denomination.
    pub amount: u64,
    /// Receiver on the counterparty chain (IBC).
    pub receiver: String,
    /// Receiver on this chain (bank send). Empty means a random account.
    pub to_address: String,
    /// Path to a wasm blob (store code).
    pub wasm_file: String,
    /// Stored code to instantiate.
    pub code_id: u64,
    /// JSON instantiate message.
    pub init_msg: String,
    /// Contract address for executions.
    pub contract_addr: String,
    /// JSON execute message.
    pub exec_msg: String,
    /// Label given to instantiated contracts.
    pub label: String,
}

/// Immutable description of one desired transaction.
///
/// Parameters are shared behind an `Arc` so generating millions of requests
/// against the same template does not copy them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// What to build.
    pub kind: MessageKind,
    /// How to build it.
    pub params: Arc<MsgParams>,
    /// Signing account; its sequence orders the transaction.
    pub account: AccountAddress,
    /// Target node. `None` lets the engine pick one.
    pub endpoint: Option<Endpoint>,
}

impl DispatchRequest {
    /// Create a request without a fixed endpoint.
    pub fn new(kind: MessageKind, params: Arc<MsgParams>, account: AccountAddress) -> Self {
        Self {
            kind,
            params,
            account,
            endpoint: None,
        }
    }

    /// Pin the request to a specific endpoint.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

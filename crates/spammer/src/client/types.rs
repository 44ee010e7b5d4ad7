//! Wire types for node RPC and REST communication.

use hardhat_core::{QueryError, TransportError};
use hardhat_types::{AccountNumber, AccountState, BroadcastResponse, ChainId, ResponseCode, TxHash};
use serde::Deserialize;

/// JSON-RPC envelope returned by `broadcast_tx_sync`.
#[derive(Debug, Deserialize)]
pub struct BroadcastTxResponse {
    #[serde(default)]
    pub result: Option<BroadcastResult>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// CheckTx result of a broadcast.
#[derive(Debug, Deserialize)]
pub struct BroadcastResult {
    pub code: u32,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub hash: String,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl JsonRpcError {
    /// Message and data joined, so classifiers see both.
    fn describe(&self) -> String {
        match &self.data {
            Some(data) if !data.is_empty() => format!("{}: {}", self.message, data),
            _ => self.message.clone(),
        }
    }
}

/// Response of the `/status` endpoint.
#[derive(Debug, Deserialize)]
pub struct NodeStatusResponse {
    pub result: NodeStatusResult,
}

#[derive(Debug, Deserialize)]
pub struct NodeStatusResult {
    pub node_info: NodeInfo,
}

#[derive(Debug, Deserialize)]
pub struct NodeInfo {
    pub network: String,
}

/// Response of `/cosmos/auth/v1beta1/accounts/{address}`.
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub account: AccountInfo,
}

/// Account fields are decimal strings on the wire.
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub sequence: String,
    #[serde(default)]
    pub account_number: String,
}

impl AccountInfo {
    /// Parse into an [`AccountState`]. A missing sequence means a fresh
    /// account.
    pub fn to_state(&self) -> Result<AccountState, QueryError> {
        let sequence = parse_decimal("sequence", &self.sequence)?;
        let account_number = parse_decimal("account_number", &self.account_number)?;
        Ok(AccountState {
            sequence,
            account_number: AccountNumber(account_number),
        })
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<u64, QueryError> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| QueryError::Malformed {
        field,
        value: value.to_string(),
    })
}

/// Decode a `broadcast_tx_sync` answer.
///
/// JSON-RPC errors come back with non-2xx statuses on some node versions, so
/// the body is inspected before the status.
pub fn decode_broadcast(status: u16, body: &str) -> Result<BroadcastResponse, TransportError> {
    match serde_json::from_str::<BroadcastTxResponse>(body) {
        Ok(BroadcastTxResponse {
            error: Some(err), ..
        }) => Err(TransportError::Rpc {
            code: err.code,
            message: err.describe(),
        }),
        Ok(BroadcastTxResponse {
            result: Some(result),
            ..
        }) if is_success(status) => Ok(BroadcastResponse {
            code: ResponseCode(result.code),
            hash: TxHash::from_hex(&result.hash).ok(),
            log: result.log,
        }),
        _ if !is_success(status) => Err(TransportError::Http {
            status,
            body: body.to_string(),
        }),
        Ok(_) => Err(TransportError::Decode(
            "response has neither result nor error".to_string(),
        )),
        Err(e) => Err(TransportError::Decode(e.to_string())),
    }
}

/// Decode a `/status` answer into the chain id.
pub fn decode_chain_id(status: u16, body: &str) -> Result<ChainId, QueryError> {
    if !is_success(status) {
        return Err(TransportError::Http {
            status,
            body: body.to_string(),
        }
        .into());
    }
    let response: NodeStatusResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    let network = response.result.node_info.network;
    if network.is_empty() {
        return Err(QueryError::Malformed {
            field: "node_info.network",
            value: String::new(),
        });
    }
    Ok(ChainId(network))
}

/// Decode an account query answer.
pub fn decode_account(address: &str, status: u16, body: &str) -> Result<AccountState, QueryError> {
    if status == 404 {
        return Err(QueryError::AccountNotFound(address.to_string()));
    }
    if !is_success(status) {
        return Err(TransportError::Http {
            status,
            body: body.to_string(),
        }
        .into());
    }
    let response: AccountResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    response.account.to_state()
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

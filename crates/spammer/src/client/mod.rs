//! HTTP client for node RPC and REST endpoints.
//!
//! Implements [`Transport`] over CometBFT's URI RPC (`broadcast_tx_sync`) and
//! [`ChainQuery`] over `/status` and the auth module's REST account query.

pub mod types;

use async_trait::async_trait;
use hardhat_core::{ChainQuery, QueryError, Transport, TransportError};
use hardhat_types::{AccountAddress, AccountState, BroadcastResponse, ChainId, Endpoint};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC client construction errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client for submitting transactions and querying chain state.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    endpoints: Vec<Endpoint>,
    api: Endpoint,
    timeout: Duration,
}

impl RpcClient {
    /// Create a client over the given RPC endpoints and REST API.
    pub fn new(endpoints: Vec<Endpoint>, api: Endpoint) -> Result<Self, RpcError> {
        Self::with_timeout(endpoints, api, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        endpoints: Vec<Endpoint>,
        api: Endpoint,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            endpoints,
            api,
            timeout,
        })
    }

    /// REST API base URL.
    pub fn api(&self) -> &Endpoint {
        &self.api
    }

    /// GET `url` and return status and body.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<(u16, String), TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok((status, body))
    }

    fn transport_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for RpcClient {
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        endpoint: &Endpoint,
    ) -> Result<BroadcastResponse, TransportError> {
        let url = format!("{}/broadcast_tx_sync", endpoint);
        let tx = format!("0x{}", hex::encode(tx_bytes));
        let (status, body) = self.get(&url, &[("tx", &tx)]).await?;
        let response = types::decode_broadcast(status, &body)?;
        debug!(endpoint = %endpoint, code = response.code.0, "Broadcast answered");
        Ok(response)
    }
}

#[async_trait]
impl ChainQuery for RpcClient {
    async fn account_state(&self, account: &AccountAddress) -> Result<AccountState, QueryError> {
        let url = format!("{}/cosmos/auth/v1beta1/accounts/{}", self.api, account);
        let (status, body) = self.get(&url, &[]).await?;
        types::decode_account(account.as_str(), status, &body).inspect_err(|e| {
            warn!(account = %account, error = %e, "Failed to get account state");
        })
    }

    async fn chain_id(&self, endpoint: &Endpoint) -> Result<ChainId, QueryError> {
        let url = format!("{}/status", endpoint);
        let (status, body) = self.get(&url, &[]).await?;
        types::decode_chain_id(status, &body)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }
}

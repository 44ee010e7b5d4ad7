//! Request generation.

use crate::config::{ConfigError, SpammerConfig};
use crate::runner::Topology;
use futures::Stream;
use hardhat_types::{AccountAddress, DispatchRequest, Endpoint, MessageKind, MsgParams};
use std::sync::Arc;

/// Produces requests of one kind, cycling over accounts.
///
/// When endpoints are set each request is also pinned to the next endpoint
/// in turn. Bounded by `total` when set, endless otherwise.
#[derive(Debug, Clone)]
pub struct RequestGenerator {
    kind: MessageKind,
    params: Arc<MsgParams>,
    accounts: Vec<AccountAddress>,
    endpoints: Vec<Endpoint>,
    total: Option<u64>,
    produced: u64,
}

impl RequestGenerator {
    pub fn new(kind: MessageKind, params: MsgParams, accounts: Vec<AccountAddress>) -> Self {
        Self {
            kind,
            params: Arc::new(params),
            accounts,
            endpoints: Vec::new(),
            total: None,
            produced: 0,
        }
    }

    /// Generator for the configured message, accounts and request count.
    /// Requests are pinned to endpoints in per-endpoint topology.
    pub fn from_config(config: &SpammerConfig) -> Result<Self, ConfigError> {
        let mut generator = Self::new(
            config.msg_type,
            config.msg_params.clone(),
            config.account_addresses()?,
        );
        generator.total = config.engine.total_requests;
        if config.engine.topology == Topology::PerEndpoint {
            generator.endpoints = config.endpoints();
        }
        Ok(generator)
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Requests produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Turn the generator into a request stream.
    pub fn into_stream(self) -> impl Stream<Item = DispatchRequest> {
        futures::stream::iter(self)
    }
}

impl Iterator for RequestGenerator {
    type Item = DispatchRequest;

    fn next(&mut self) -> Option<DispatchRequest> {
        if self.accounts.is_empty() || self.total.is_some_and(|total| self.produced >= total) {
            return None;
        }
        let index = self.produced as usize;
        self.produced += 1;

        let account = self.accounts[index % self.accounts.len()].clone();
        let request = DispatchRequest::new(self.kind, Arc::clone(&self.params), account);
        if self.endpoints.is_empty() {
            Some(request)
        } else {
            let endpoint = self.endpoints[index % self.endpoints.len()].clone();
            Some(request.with_endpoint(endpoint))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn accounts() -> Vec<AccountAddress> {
        vec![AccountAddress::new("a"), AccountAddress::new("b"), AccountAddress::new("c")]
    }

    #[test]
    fn test_cycles_accounts_and_stops_at_total() {
        let generator =
            RequestGenerator::new(MessageKind::BankSend, MsgParams::default(), accounts()).with_total(7);
        let names: Vec<String> = generator.map(|r| r.account.0).collect();
        assert_eq!(names, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_pins_endpoints_in_turn() {
        let endpoints = vec![Endpoint::new("http://x"), Endpoint::new("http://y")];
        let requests: Vec<_> = RequestGenerator::new(MessageKind::BankSend, MsgParams::default(), accounts())
            .with_endpoints(endpoints.clone())
            .with_total(4)
            .collect();
        let pinned: Vec<_> = requests.iter().map(|r| r.endpoint.clone().unwrap()).collect();
        assert_eq!(pinned, vec![endpoints[0].clone(), endpoints[1].clone(), endpoints[0].clone(), endpoints[1].clone()]);
    }

    #[test]
    fn test_no_accounts_yields_nothing() {
        let mut generator = RequestGenerator::new(MessageKind::BankSend, MsgParams::default(), Vec::new());
        assert!(generator.next().is_none());
        assert_eq!(generator.produced(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = SpammerConfig::default()
            .with_account("2a".repeat(32))
            .with_total_requests(2)
            .with_topology(Topology::PerEndpoint)
            .with_rpc_endpoints(vec!["http://n1:26657".into(), "http://n2:26657".into()]);
        let requests: Vec<_> = RequestGenerator::from_config(&config).unwrap().collect();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].account, config.account_addresses().unwrap()[0]);
        assert_eq!(requests[1].endpoint, Some(Endpoint::new("http://n2:26657")));
        assert_eq!(requests[0].kind, MessageKind::BankSend);
    }

    #[tokio::test]
    async fn test_stream_shares_params() {
        let requests: Vec<_> = RequestGenerator::new(
            MessageKind::IbcTransfer,
            MsgParams {
                amount: 9,
                ..MsgParams::default()
            },
            accounts(),
        )
        .with_total(3)
        .into_stream()
        .collect()
        .await;
        assert_eq!(requests.len(), 3);
        assert!(Arc::ptr_eq(&requests[0].params, &requests[2].params));
        assert_eq!(requests[1].params.amount, 9);
    }
}

//! Spammer configuration.
//!
//! Loaded from a TOML file (`nodes.toml` by default). Every section is
//! optional; missing fields take the defaults below. Durations are written in
//! humantime form (`"2s"`, `"500ms"`, `"1m"`).
//!
//! ```toml
//! denom = "uatom"
//! prefix = "cosmos"
//! msg_type = "bank_send"
//!
//! [msg_params]
//! amount = 1
//!
//! [nodes]
//! rpc = ["http://127.0.0.1:26657"]
//! api = "http://127.0.0.1:1317"
//!
//! [[accounts]]
//! key_seed = "<64 hex chars>"
//! # optional; must be the address the key owns under `prefix`
//! address = "cosmos1..."
//!
//! [engine]
//! concurrency = 32
//! topology = "per_endpoint"
//!
//! [retry]
//! max_retries = 3
//! retry_delay = "250ms"
//! ```

use crate::classify::ClassifierConfig;
use crate::retry::RetryConfig;
use crate::runner::{EngineConfig, Topology};
use crate::signer::account_address;
use hardhat_types::{AccountAddress, ChainId, Endpoint, KeyPair, MessageKind, MsgParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "nodes.toml";

/// Gas price as `low / 10^precision` per gas unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub low: u64,
    pub precision: u32,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            low: 25,
            precision: 2,
        }
    }
}

/// IBC transfer settings. Kept at the top level of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IbcConfig {
    /// Source channel of transfers.
    pub channel: String,
    /// Fragment repeated to build the forward memo's receiver.
    pub ibc_memo: String,
    pub ibc_memo_repeat: usize,
    /// Bounds on the random receiver's length.
    pub rand_min: usize,
    pub rand_max: usize,
    pub revision_number: u64,
    pub timeout_height: u64,
}

impl Default for IbcConfig {
    fn default() -> Self {
        Self {
            channel: "channel-0".to_string(),
            ibc_memo: String::new(),
            ibc_memo_repeat: 1,
            rand_min: 10,
            rand_max: 30,
            revision_number: 4,
            timeout_height: 21_720_608,
        }
    }
}

/// Node addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesConfig {
    /// CometBFT RPC endpoints transactions are broadcast to.
    pub rpc: Vec<String>,
    /// REST endpoint used for account queries.
    pub api: String,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            rpc: vec!["http://127.0.0.1:26657".to_string()],
            api: "http://127.0.0.1:1317".to_string(),
        }
    }
}

/// A signing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Expected address. Derived from the key when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Hex-encoded 32-byte Ed25519 seed.
    pub key_seed: String,
}

impl AccountConfig {
    /// Name used in errors: the configured address, or the entry's position.
    fn label(&self, index: usize) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("accounts[{}]", index))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpammerConfig {
    /// Chain id override. Queried from the first node when absent.
    pub chain_id: Option<String>,
    pub denom: String,
    /// Bech32 prefix of generated addresses.
    pub prefix: String,
    pub gas_per_byte: u64,
    pub base_gas: u64,
    pub gas: GasConfig,
    pub msg_type: MessageKind,
    pub msg_params: MsgParams,
    #[serde(flatten)]
    pub ibc: IbcConfig,
    pub nodes: NodesConfig,
    pub accounts: Vec<AccountConfig>,
    pub engine: EngineConfig,
    pub retry: RetryConfig,
    pub classifier: ClassifierConfig,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            chain_id: None,
            denom: "stake".to_string(),
            prefix: "cosmos".to_string(),
            gas_per_byte: 100,
            base_gas: 200_000,
            gas: GasConfig::default(),
            msg_type: MessageKind::BankSend,
            msg_params: MsgParams::default(),
            ibc: IbcConfig::default(),
            nodes: NodesConfig::default(),
            accounts: Vec::new(),
            engine: EngineConfig::default(),
            retry: RetryConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl SpammerConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_rpc_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.nodes.rpc = endpoints;
        self
    }

    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.nodes.api = api.into();
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn with_msg_type(mut self, kind: MessageKind) -> Self {
        self.msg_type = kind;
        self
    }

    /// Add an account whose address is derived from its key.
    pub fn with_account(mut self, key_seed: impl Into<String>) -> Self {
        self.accounts.push(AccountConfig {
            address: None,
            key_seed: key_seed.into(),
        });
        self
    }

    /// Add an account and the address its key is expected to own.
    pub fn with_account_address(
        mut self,
        address: impl Into<String>,
        key_seed: impl Into<String>,
    ) -> Self {
        self.accounts.push(AccountConfig {
            address: Some(address.into()),
            key_seed: key_seed.into(),
        });
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.engine.concurrency = concurrency;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.engine.topology = topology;
        self
    }

    pub fn with_total_requests(mut self, total: u64) -> Self {
        self.engine.total_requests = Some(total);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.engine.duration = Some(duration);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Broadcast endpoints, normalized.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.nodes.rpc.iter().map(Endpoint::new).collect()
    }

    /// Chain id override, if any.
    pub fn chain_id_override(&self) -> Option<ChainId> {
        self.chain_id.clone().map(ChainId)
    }

    /// Decode every account key and pair it with the address it owns under
    /// `prefix`, in file order.
    pub fn signing_accounts(&self) -> Result<Vec<(AccountAddress, KeyPair)>, ConfigError> {
        self.accounts
            .iter()
            .enumerate()
            .map(|(index, account)| {
                let key = KeyPair::from_hex_seed(&account.key_seed).map_err(|_| {
                    ConfigError::InvalidKey {
                        account: account.label(index),
                    }
                })?;
                let derived = account_address(&self.prefix, &key.public_key()).map_err(|e| {
                    ConfigError::InvalidPrefix {
                        prefix: self.prefix.clone(),
                        reason: e.to_string(),
                    }
                })?;
                match &account.address {
                    Some(configured) if configured.as_str() != derived.as_str() => {
                        Err(ConfigError::AddressMismatch {
                            configured: configured.clone(),
                            derived: derived.to_string(),
                        })
                    }
                    _ => Ok((derived, key)),
                }
            })
            .collect()
    }

    /// Account addresses, in file order.
    pub fn account_addresses(&self) -> Result<Vec<AccountAddress>, ConfigError> {
        Ok(self
            .signing_accounts()?
            .into_iter()
            .map(|(address, _)| address)
            .collect())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        if self.engine.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("retry.attempt_timeout"));
        }
        if self.retry.max_elapsed.is_zero() {
            return Err(ConfigError::ZeroDuration("retry.max_elapsed"));
        }
        if self.engine.progress_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("engine.progress_interval"));
        }
        if self.ibc.rand_min > self.ibc.rand_max {
            return Err(ConfigError::InvalidRandRange {
                min: self.ibc.rand_min,
                max: self.ibc.rand_max,
            });
        }
        self.signing_accounts()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("at least one account is required")]
    NoAccounts,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("rand_min ({min}) must not exceed rand_max ({max})")]
    InvalidRandRange { min: usize, max: usize },

    #[error("invalid key seed for account {account}")]
    InvalidKey { account: String },

    #[error("invalid address prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("account {configured} does not match its key, which owns {derived}")]
    AddressMismatch { configured: String, derived: String },
}

/// Serde adapter for humantime durations (`"2s"`, `"150ms"`).
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional humantime durations.
pub mod option_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = "2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a";

    const NODES_TOML: &str = r#"
        chain_id = "hardhat-1"
        denom = "uatom"
        prefix = "cosmos"
        gas_per_byte = 80
        base_gas = 110000
        channel = "channel-569"
        ibc_memo = "Contact us for pentesting services."
        ibc_memo_repeat = 3
        rand_min = 30
        rand_max = 60
        msg_type = "ibc_transfer"

        [msg_params]
        amount = 7
        receiver = "osmo1xyz"

        [gas]
        low = 1
        precision = 3

        [nodes]
        rpc = ["http://node-a:26657/", "http://node-b:26657"]
        api = "http://node-a:1317"

        [[accounts]]
        key_seed = "2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a"

        [engine]
        concurrency = 8
        topology = "per_endpoint"
        duration = "30s"

        [retry]
        max_retries = 3
        retry_delay = "250ms"

        [classifier]
        transient_codes = [20]
    "#;

    #[test]
    fn test_parse_full_file() {
        let config = SpammerConfig::from_toml_str(NODES_TOML).unwrap();

        assert_eq!(config.chain_id_override(), Some(ChainId("hardhat-1".into())));
        assert_eq!(config.msg_type, MessageKind::IbcTransfer);
        assert_eq!(config.msg_params.amount, 7);
        assert_eq!(config.ibc.channel, "channel-569");
        assert_eq!(config.ibc.ibc_memo_repeat, 3);
        assert_eq!(config.gas, GasConfig { low: 1, precision: 3 });
        assert_eq!(
            config.endpoints(),
            vec![Endpoint::new("http://node-a:26657"), Endpoint::new("http://node-b:26657")]
        );
        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.engine.topology, Topology::PerEndpoint);
        assert_eq!(config.engine.duration, Some(Duration::from_secs(30)));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
        assert_eq!(config.classifier.transient_codes, vec![20]);
        assert_eq!(config.classifier.duplicate_codes, vec![19]);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_file_takes_defaults() {
        let config = SpammerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SpammerConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::NoAccounts)));
    }

    #[test]
    fn test_unsupported_msg_type_rejected_at_parse() {
        let err = SpammerConfig::from_toml_str(r#"msg_type = "gov_vote""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_duration_rejected_at_parse() {
        let err = SpammerConfig::from_toml_str("[retry]\nretry_delay = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    fn seed_address(prefix: &str) -> AccountAddress {
        account_address(prefix, &KeyPair::from_hex_seed(SEED).unwrap().public_key()).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = SpammerConfig::default().with_account(SEED);
        base.validate().unwrap();

        assert!(matches!(
            base.clone().with_concurrency(0).validate(),
            Err(ConfigError::ZeroConcurrency)
        ));

        let mut zero_timeout = base.clone();
        zero_timeout.retry.attempt_timeout = Duration::ZERO;
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::ZeroDuration("retry.attempt_timeout"))
        ));

        let mut zero_budget = base.clone();
        zero_budget.retry.max_elapsed = Duration::ZERO;
        assert!(matches!(
            zero_budget.validate(),
            Err(ConfigError::ZeroDuration("retry.max_elapsed"))
        ));

        let mut bad_range = base.clone();
        bad_range.ibc.rand_min = 50;
        bad_range.ibc.rand_max = 10;
        assert!(matches!(
            bad_range.validate(),
            Err(ConfigError::InvalidRandRange { min: 50, max: 10 })
        ));

        let bad_key = SpammerConfig::default().with_account_address("cosmos1b", "not-hex");
        assert!(matches!(
            bad_key.validate(),
            Err(ConfigError::InvalidKey { account }) if account == "cosmos1b"
        ));

        let unnamed_bad_key = base.clone().with_account("00");
        assert!(matches!(
            unnamed_bad_key.validate(),
            Err(ConfigError::InvalidKey { account }) if account == "accounts[1]"
        ));
    }

    #[test]
    fn test_address_must_match_key() {
        let derived = seed_address("cosmos");
        let matching = SpammerConfig::default().with_account_address(derived.as_str(), SEED);
        matching.validate().unwrap();
        assert_eq!(matching.account_addresses().unwrap(), vec![derived.clone()]);

        let mismatched = SpammerConfig::default().with_account_address("cosmos1alice", SEED);
        assert!(matches!(
            mismatched.validate(),
            Err(ConfigError::AddressMismatch { configured, derived: owned })
                if configured == "cosmos1alice" && owned == derived.as_str()
        ));

        // The same key owns a different address under another prefix.
        let mut other_prefix = matching.clone();
        other_prefix.prefix = "osmo".to_string();
        assert!(matches!(
            other_prefix.validate(),
            Err(ConfigError::AddressMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = SpammerConfig::default().with_account(SEED);
        config.prefix = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPrefix { .. })));
    }

    #[test]
    fn test_builders() {
        let config = SpammerConfig::default()
            .with_rpc_endpoints(vec!["http://x:26657".into()])
            .with_api("http://x:1317")
            .with_chain_id("c-1")
            .with_msg_type(MessageKind::StoreCode)
            .with_concurrency(3)
            .with_topology(Topology::PerEndpoint)
            .with_total_requests(10)
            .with_duration(Duration::from_secs(5))
            .with_max_retries(0);

        assert_eq!(config.endpoints(), vec![Endpoint::new("http://x:26657")]);
        assert_eq!(config.nodes.api, "http://x:1317");
        assert_eq!(config.chain_id.as_deref(), Some("c-1"));
        assert_eq!(config.msg_type, MessageKind::StoreCode);
        assert_eq!(config.engine.concurrency, 3);
        assert_eq!(config.engine.total_requests, Some(10));
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NODES_TOML.as_bytes()).unwrap();

        let config = SpammerConfig::load(file.path()).unwrap();
        assert_eq!(config.accounts[0].address, None);
        assert_eq!(config.account_addresses().unwrap(), vec![seed_address("cosmos")]);

        let missing = SpammerConfig::load("/nonexistent/nodes.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_durations_serialize_as_humantime() {
        let text = toml::to_string(&RetryConfig::default()).unwrap();
        assert!(text.contains("retry_delay = \"2s\""));
        assert!(text.contains("max_elapsed = \"10s\""));
    }
}

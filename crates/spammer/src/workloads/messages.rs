//! JSON message builders for the supported message kinds.

use crate::config::{GasConfig, IbcConfig, SpammerConfig};
use bech32::{ToBase32, Variant};
use hardhat_core::{BuildError, BuiltMessage, MessageBuilder};
use hardhat_types::{AccountAddress, MessageKind, MsgParams};
use parking_lot::Mutex;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tracing::debug;

/// Length of the random memo attached to bank, wasm and contract messages.
pub const MEMO_LEN: usize = 256;

/// Source port of IBC transfers.
pub const IBC_PORT: &str = "transfer";

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Byte length of generated account addresses.
const ADDRESS_BYTES: usize = 20;

const MSG_SEND: &str = "/cosmos.bank.v1beta1.MsgSend";
const MSG_TRANSFER: &str = "/ibc.applications.transfer.v1.MsgTransfer";
const MSG_STORE_CODE: &str = "/cosmwasm.wasm.v1.MsgStoreCode";
const MSG_INSTANTIATE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";

/// Builds Cosmos SDK style JSON messages.
///
/// Gas is estimated from the serialized payload size and the fee from the
/// configured gas price, both carried on the [`BuiltMessage`].
pub struct JsonMessageBuilder {
    denom: String,
    prefix: String,
    gas_per_byte: u64,
    base_gas: u64,
    gas: GasConfig,
    ibc: IbcConfig,
    /// Seeded generator; thread-local entropy when absent.
    rng: Option<Mutex<ChaCha8Rng>>,
}

impl JsonMessageBuilder {
    pub fn from_config(config: &SpammerConfig) -> Self {
        Self {
            denom: config.denom.clone(),
            prefix: config.prefix.clone(),
            gas_per_byte: config.gas_per_byte,
            base_gas: config.base_gas,
            gas: config.gas.clone(),
            ibc: config.ibc.clone(),
            rng: None,
        }
    }

    /// Make random memos and receivers reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(Mutex::new(ChaCha8Rng::seed_from_u64(seed)));
        self
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match &self.rng {
            Some(rng) => f(&mut *rng.lock()),
            None => f(&mut rand::thread_rng()),
        }
    }

    /// Gas limit for a payload of `payload_len` bytes.
    pub fn gas_limit(&self, payload_len: usize) -> u64 {
        (payload_len as u64)
            .saturating_mul(self.gas_per_byte)
            .saturating_add(self.base_gas)
    }

    /// Fee for `gas_limit` at `low / 10^precision` per unit, rounded to the
    /// nearest integer.
    pub fn fee_for(&self, gas_limit: u64) -> u64 {
        let scale = 10u128.checked_pow(self.gas.precision).unwrap_or(u128::MAX);
        let raw = gas_limit as u128 * self.gas.low as u128;
        let fee = raw / scale + u128::from(raw % scale >= scale.div_ceil(2));
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    fn coin(&self, amount: u64) -> Value {
        json!({ "denom": self.denom, "amount": amount.to_string() })
    }

    fn check_sender(&self, sender: &AccountAddress) -> Result<(), BuildError> {
        if self.is_local_address(sender.as_str()) {
            Ok(())
        } else {
            Err(BuildError::InvalidParam {
                name: "sender",
                reason: format!("{} is not a {} address", sender, self.prefix),
            })
        }
    }

    fn is_local_address(&self, address: &str) -> bool {
        matches!(bech32::decode(address), Ok((hrp, _, _)) if hrp == self.prefix)
    }

    fn encode_address(&self, bytes: &[u8]) -> Result<String, BuildError> {
        bech32::encode(&self.prefix, bytes.to_base32(), Variant::Bech32).map_err(|e| {
            BuildError::InvalidParam {
                name: "prefix",
                reason: e.to_string(),
            }
        })
    }

    fn random_memo(&self) -> String {
        self.with_rng(|rng| random_alphanumeric(rng, MEMO_LEN))
    }

    fn bank_send(&self, sender: &AccountAddress, params: &MsgParams) -> Result<(Value, String), BuildError> {
        let to_address = if self.is_local_address(&params.to_address) {
            params.to_address.clone()
        } else {
            debug!(to_address = %params.to_address, "Invalid to address, sending to a random new account");
            let bytes = self.with_rng(|rng| {
                let mut bytes = [0u8; ADDRESS_BYTES];
                rng.fill_bytes(&mut bytes);
                bytes
            });
            self.encode_address(&bytes)?
        };
        let payload = json!({
            "from_address": sender.as_str(),
            "to_address": to_address,
            "amount": [self.coin(params.amount)],
        });
        Ok((payload, self.random_memo()))
    }

    fn ibc_transfer(&self, sender: &AccountAddress, params: &MsgParams) -> Result<(Value, String), BuildError> {
        let memo = forward_memo(&self.ibc);
        let receiver_hex = self.with_rng(|rng| {
            random_hex_in_range(rng, self.ibc.rand_min, self.ibc.rand_max)
        });
        let receiver = self.encode_address(receiver_hex.as_bytes())?;
        let payload = json!({
            "source_port": IBC_PORT,
            "source_channel": self.ibc.channel,
            "token": self.coin(params.amount),
            "sender": sender.as_str(),
            "receiver": receiver,
            "timeout_height": {
                "revision_number": self.ibc.revision_number.to_string(),
                "revision_height": self.ibc.timeout_height.to_string(),
            },
            "timeout_timestamp": "0",
            "memo": memo,
        });
        Ok((payload, memo))
    }

    fn store_code(&self, sender: &AccountAddress, params: &MsgParams) -> Result<(Value, String), BuildError> {
        if params.wasm_file.is_empty() {
            return Err(BuildError::InvalidParam {
                name: "wasm_file",
                reason: "WASM file path is empty".to_string(),
            });
        }
        let code = std::fs::read(&params.wasm_file).map_err(|source| BuildError::Io {
            path: params.wasm_file.clone(),
            source,
        })?;
        let payload = json!({
            "sender": sender.as_str(),
            "wasm_byte_code": hex::encode(code),
        });
        Ok((payload, self.random_memo()))
    }

    fn instantiate_contract(
        &self,
        sender: &AccountAddress,
        params: &MsgParams,
    ) -> Result<(Value, String), BuildError> {
        let msg: Value = if params.init_msg.is_empty() {
            json!({})
        } else {
            serde_json::from_str(&params.init_msg).map_err(|e| BuildError::InvalidParam {
                name: "init_msg",
                reason: e.to_string(),
            })?
        };
        let payload = json!({
            "sender": sender.as_str(),
            "admin": sender.as_str(),
            "code_id": params.code_id.to_string(),
            "label": params.label,
            "msg": msg,
            "funds": [self.coin(params.amount)],
        });
        Ok((payload, self.random_memo()))
    }
}

impl MessageBuilder for JsonMessageBuilder {
    fn build(
        &self,
        account: &AccountAddress,
        kind: MessageKind,
        params: &MsgParams,
    ) -> Result<BuiltMessage, BuildError> {
        self.check_sender(account)?;
        let (type_url, (payload, memo)) = match kind {
            MessageKind::BankSend => (MSG_SEND, self.bank_send(account, params)?),
            MessageKind::IbcTransfer => (MSG_TRANSFER, self.ibc_transfer(account, params)?),
            MessageKind::StoreCode => (MSG_STORE_CODE, self.store_code(account, params)?),
            MessageKind::InstantiateContract => (
                MSG_INSTANTIATE_CONTRACT,
                self.instantiate_contract(account, params)?,
            ),
        };

        let gas_limit = self.gas_limit(payload.to_string().len());
        Ok(BuiltMessage {
            type_url: type_url.to_string(),
            payload,
            memo,
            gas_limit,
            fee_amount: self.fee_for(gas_limit),
        })
    }
}

/// Packet-forward memo sent with IBC transfers.
fn forward_memo(ibc: &IbcConfig) -> String {
    json!({
        "forward": {
            "receiver": ibc.ibc_memo.repeat(ibc.ibc_memo_repeat),
            "port": IBC_PORT,
            "channel": "channel-569",
            "timeout": "12h",
            "retries": 10,
        }
    })
    .to_string()
}

fn random_alphanumeric(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// Hex string of `2 * (size / 2)` characters, `size` uniform in `[min, max]`.
fn random_hex_in_range(rng: &mut dyn RngCore, min: usize, max: usize) -> String {
    let size = rng.gen_range(min..=max.max(min));
    let mut bytes = vec![0u8; size / 2];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

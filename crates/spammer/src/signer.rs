//! Ed25519 envelope signer.
//!
//! Signs a canonical JSON sign document prefixed with [`SIGN_DOMAIN`] and
//! encodes the transaction as a JSON envelope:
//!
//! ```text
//! { body: { messages, memo },
//!   auth_info: { sequence, account_number, public_key, fee },
//!   chain_id, signature }
//! ```
//!
//! Ed25519 signatures are deterministic, so signing the same message at the
//! same sequence yields identical bytes.
//!
//! An account's address is owned by its key: see [`account_address`].

use crate::config::{ConfigError, SpammerConfig};
use bech32::{ToBase32, Variant};
use hardhat_core::{BuiltMessage, SignContext, SignError, Signer};
use hardhat_types::{AccountAddress, KeyPair, PublicKey};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Bech32 address of the account `key` signs for.
pub fn account_address(prefix: &str, key: &PublicKey) -> Result<AccountAddress, bech32::Error> {
    let address = bech32::encode(prefix, key.address_bytes().to_base32(), Variant::Bech32)?;
    Ok(AccountAddress::new(address))
}

/// Domain separator of sign documents.
pub const SIGN_DOMAIN: &[u8] = b"hardhat-tx-v1:";

/// Signs with one Ed25519 key per account.
pub struct Ed25519Signer {
    denom: String,
    keys: HashMap<AccountAddress, KeyPair>,
}

impl Ed25519Signer {
    /// A signer without keys. Fees are declared in `denom`.
    pub fn new(denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            keys: HashMap::new(),
        }
    }

    /// Load every configured account key, each under the address it owns.
    pub fn from_config(config: &SpammerConfig) -> Result<Self, ConfigError> {
        let signer = config
            .signing_accounts()?
            .into_iter()
            .fold(Self::new(config.denom.clone()), |signer, (address, key)| {
                signer.with_key(address, key)
            });
        Ok(signer)
    }

    pub fn with_key(mut self, account: AccountAddress, key: KeyPair) -> Self {
        self.keys.insert(account, key);
        self
    }

    /// Public key registered for `account`.
    pub fn public_key(&self, account: &AccountAddress) -> Option<PublicKey> {
        self.keys.get(account).map(KeyPair::public_key)
    }

    fn sign_doc(&self, message: &BuiltMessage, ctx: &SignContext<'_>) -> Value {
        json!({
            "chain_id": ctx.chain_id.as_str(),
            "account_number": ctx.account_number.0.to_string(),
            "sequence": ctx.sequence.to_string(),
            "body": body(message),
            "fee": self.fee(message),
        })
    }

    fn fee(&self, message: &BuiltMessage) -> Value {
        json!({
            "amount": [{ "denom": self.denom, "amount": message.fee_amount.to_string() }],
            "gas_limit": message.gas_limit.to_string(),
        })
    }
}

/// Transaction body: the message with its type inlined, and the memo.
fn body(message: &BuiltMessage) -> Value {
    let mut msg = match &message.payload {
        Value::Object(fields) => Value::Object(fields.clone()),
        other => json!({ "value": other }),
    };
    msg["@type"] = Value::String(message.type_url.clone());
    json!({ "messages": [msg], "memo": message.memo })
}

/// Bytes covered by the signature.
pub fn sign_bytes(doc: &Value) -> Result<Vec<u8>, SignError> {
    let mut bytes = SIGN_DOMAIN.to_vec();
    serde_json::to_writer(&mut bytes, doc).map_err(|e| SignError::Encode(e.to_string()))?;
    Ok(bytes)
}

impl Signer for Ed25519Signer {
    fn sign_and_encode(
        &self,
        message: &BuiltMessage,
        ctx: &SignContext<'_>,
    ) -> Result<Vec<u8>, SignError> {
        let key = self
            .keys
            .get(ctx.account)
            .ok_or_else(|| SignError::UnknownAccount(ctx.account.to_string()))?;

        let doc = self.sign_doc(message, ctx);
        let signature = key.sign(&sign_bytes(&doc)?);

        let envelope = json!({
            "body": body(message),
            "auth_info": {
                "sequence": ctx.sequence.to_string(),
                "account_number": ctx.account_number.0.to_string(),
                "public_key": key.public_key().to_hex(),
                "fee": self.fee(message),
            },
            "chain_id": ctx.chain_id.as_str(),
            "signature": signature.to_hex(),
        });
        serde_json::to_vec(&envelope).map_err(|e| SignError::Encode(e.to_string()))
    }
}

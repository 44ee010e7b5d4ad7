//! Built messages and signing context handed between collaborators.

use hardhat_types::{AccountAddress, AccountNumber, ChainId};
use serde_json::Value;

/// A built, not yet signed, transaction message.
///
/// The engine never looks inside `payload`; it only passes it from the
/// [`MessageBuilder`](crate::MessageBuilder) to the [`Signer`](crate::Signer).
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltMessage {
    /// Message type URL, e.g. `/cosmos.bank.v1beta1.MsgSend`.
    pub type_url: String,
    /// Message body.
    pub payload: Value,
    /// Transaction memo.
    pub memo: String,
    /// Gas limit the transaction declares.
    pub gas_limit: u64,
    /// Fee amount in the fee denomination.
    pub fee_amount: u64,
}

/// Everything a signer needs besides the message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignContext<'a> {
    /// Signing account.
    pub account: &'a AccountAddress,
    /// Chain the transaction is bound to.
    pub chain_id: &'a ChainId,
    /// Reserved ordering token.
    pub sequence: u64,
    /// Ledger account number.
    pub account_number: AccountNumber,
}

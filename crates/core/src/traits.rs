//! Traits for the engine's external collaborators.

use crate::{BuildError, BuiltMessage, QueryError, SignContext, SignError, TransportError};
use async_trait::async_trait;
use hardhat_types::{
    AccountAddress, AccountState, BroadcastResponse, ChainId, Endpoint, MessageKind, MsgParams,
};

/// Turns request parameters into a signable message.
///
/// Pure function of its inputs; called concurrently from every worker, so
/// implementations must not rely on interior mutability beyond what is
/// `Sync`.
pub trait MessageBuilder: Send + Sync {
    /// Build one message for `account`.
    ///
    /// # Errors
    ///
    /// Any error is permanent for the request that triggered it.
    fn build(
        &self,
        account: &AccountAddress,
        kind: MessageKind,
        params: &MsgParams,
    ) -> Result<BuiltMessage, BuildError>;
}

/// Signs a built message and encodes it into transport-ready bytes.
pub trait Signer: Send + Sync {
    /// Sign `message` with the key of `ctx.account` at `ctx.sequence`.
    ///
    /// Signing the same message at the same sequence must yield bytes the
    /// node treats as the same transaction, so a transient retry can reuse
    /// them.
    fn sign_and_encode(
        &self,
        message: &BuiltMessage,
        ctx: &SignContext<'_>,
    ) -> Result<Vec<u8>, SignError>;
}

/// Submits encoded transactions to a node.
///
/// Blocking-style contract: the future resolves once the node has answered
/// (or failed to). The engine wraps every call in its own deadline, so
/// implementations need not enforce one, though they may.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcast `tx_bytes` to `endpoint`.
    ///
    /// A non-zero response code is *not* an error: it is returned in the
    /// [`BroadcastResponse`] so the engine can classify it.
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        endpoint: &Endpoint,
    ) -> Result<BroadcastResponse, TransportError>;
}

/// Account and chain discovery.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Current on-chain sequence and account number of `account`.
    async fn account_state(&self, account: &AccountAddress) -> Result<AccountState, QueryError>;

    /// Chain identifier advertised by `endpoint`.
    async fn chain_id(&self, endpoint: &Endpoint) -> Result<ChainId, QueryError>;

    /// Known node endpoints. May be empty.
    fn endpoints(&self) -> Vec<Endpoint>;
}

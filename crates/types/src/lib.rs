//! Core types for the hardhat transaction dispatch engine.
//!
//! # Modules
//!
//! - [`identifiers`]: account addresses, endpoints, chain ids
//! - [`request`]: message kinds, parameters and dispatch requests
//! - [`outcome`]: node responses, account state and per-request outcomes
//! - [`hash`]: transaction hashes
//! - [`crypto`]: Ed25519 account keys and the addresses they own

pub mod crypto;
pub mod hash;
pub mod identifiers;
pub mod outcome;
pub mod request;

pub use crypto::{KeyError, KeyPair, PublicKey, Signature, ADDRESS_LEN};
pub use hash::{HexError, TxHash};
pub use identifiers::{AccountAddress, AccountNumber, ChainId, Endpoint};
pub use outcome::{AccountState, BroadcastResponse, OutcomeRecord, ResponseCode};
pub use request::{DispatchRequest, MessageKind, MsgParams, UnknownMessageKind};

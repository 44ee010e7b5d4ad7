//! Collaborator seams of the hardhat dispatch engine.
//!
//! The engine owns sequencing, concurrency, retries and aggregation. Anything
//! that depends on a concrete ledger (message encoding, keys, the RPC
//! protocol, account discovery) sits behind one of these traits:
//!
//! - [`MessageBuilder`]: request parameters -> [`BuiltMessage`]
//! - [`Signer`]: message + [`SignContext`] -> transaction bytes
//! - [`Transport`]: transaction bytes -> node response
//! - [`ChainQuery`]: account state, chain id, endpoint list

mod error;
mod message;
mod traits;

pub use error::{BuildError, QueryError, SignError, TransportError};
pub use message::{BuiltMessage, SignContext};
pub use traits::{ChainQuery, MessageBuilder, Signer, Transport};

//! Hardhat transaction dispatch engine
//!
//! A library and CLI tool for building, signing and broadcasting transactions
//! at high concurrency against nonce-ordered ledger networks.
//!
//! # Modules
//!
//! - [`accounts`]: Per-account sequence allocation (SequenceAllocator)
//! - [`classify`]: Failure classification and mismatch parsing
//! - [`retry`]: Attempt and time budgets per request
//! - [`pool`]: Dispatch workers
//! - [`stats`]: Outcome aggregation and the final report
//! - [`runner`]: Dispatch engine orchestrator
//! - [`client`]: RPC client for broadcasting and chain discovery
//! - [`workloads`]: Message building and request generation
//! - [`signer`]: Ed25519 transaction signing
//! - [`config`]: Configuration types

pub mod accounts;
pub mod classify;
pub mod client;
pub mod config;
pub mod pool;
pub mod retry;
pub mod runner;
pub mod signer;
pub mod stats;
pub mod workloads;

pub use accounts::{Reservation, SequenceAllocator, SequenceError};
pub use classify::{Classification, ClassifierConfig, ErrorClassifier, Failure};
pub use client::{RpcClient, RpcError};
pub use config::{ConfigError, SpammerConfig};
pub use pool::{DispatchWorkerPool, Dispatcher, Job};
pub use retry::{RetryConfig, RetryPolicy};
pub use runner::{
    Collaborators, DispatchEngine, EngineConfig, EngineError, EngineOptions, EngineReport, Topology,
};
pub use signer::Ed25519Signer;
pub use stats::{ResultAggregator, StatsSnapshot};
pub use workloads::{JsonMessageBuilder, RequestGenerator};

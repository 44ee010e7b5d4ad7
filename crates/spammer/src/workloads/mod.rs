//! Workload generation: what gets built and who sends it.
//!
//! - [`JsonMessageBuilder`]: the [`MessageBuilder`](hardhat_core::MessageBuilder)
//!   for bank sends, IBC transfers, wasm uploads and contract instantiations
//! - [`RequestGenerator`]: the request stream fed to the engine

mod generator;
mod messages;

pub use generator::RequestGenerator;
pub use messages::{JsonMessageBuilder, IBC_PORT, MEMO_LEN};

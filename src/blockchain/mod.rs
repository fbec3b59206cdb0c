//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! ChainConfig (one per chain)
//!     → client.rs (RPC with timeouts, failover, receipt polling)
//!     → registry.rs (ChainKind → client, built at startup)
//!     → abi.rs (typed contract calls)
//!     → transaction.rs (price, nonce, sign, broadcast, confirm)
//! ```
//!
//! # Security Constraints
//! - Keys stay in `WalletStore`; this layer only sees signed bytes
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when a chain is unreachable

pub mod abi;
pub mod client;
pub mod registry;
pub mod transaction;
pub mod types;

pub use client::{ChainClient, ChainRpc};
pub use registry::{ChainHealth, ChainRegistry};
pub use transaction::{NonceManager, ReadyTx, TxIntent, TxSubmitter};
pub use types::{ChainError, ChainResult, Receipt};

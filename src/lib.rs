//! Stake settlement service library.
//!
//! Turns a confirmed fiat payment into a confirmed on-chain stake: the
//! delivered native currency is swapped into the project's token, the
//! staking contract is approved, and the contribution is staked.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod resilience;
pub mod settlement;
pub mod swap;
pub mod wallet;

pub use config::ServiceConfig;
pub use error::{ErrorKind, SettlementError, SettlementResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use payments::PaymentGatewayAdapter;
pub use settlement::SettlementPipeline;

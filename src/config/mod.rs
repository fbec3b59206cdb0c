//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settlement.toml
//!     → loader.rs (parse, env overrides for secrets)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → chain registry, pipeline, gateway, HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the process lifetime; chain endpoints and
//!   contract addresses never change under a running settlement
//! - All fields have defaults to allow minimal configs
//! - Secrets may come from the environment instead of the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    AdminConfig, ApprovalMode, ChainConfig, ChainKind, GasLimits, GatewayConfig, LedgerConfig,
    ObservabilityConfig, ProjectConfig, ServerConfig, ServiceConfig, SettlementConfig,
    WalletConfig,
};

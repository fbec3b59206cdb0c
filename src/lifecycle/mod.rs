//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → logging → metrics → chains → wallets → store
//!     → pipeline → recovery → workers → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → workers drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, Components, Service, StartupError};

//! Settlement subsystem.
//!
//! # Data Flow
//! ```text
//! PaymentGatewayAdapter
//!     → pipeline.rs start (persist PENDING, enqueue id)
//!     → worker.rs (bounded queue, semaphore-limited tasks)
//!     → pipeline.rs run: swap → approve.rs → stake.rs
//!     → store.rs (every transition persisted)
//!     → ledger.rs (campaign increment on completion)
//! ```
//!
//! # Design Decisions
//! - Stages never retry on their own; resume is explicit
//! - No compensating swap when a later stage fails; tokens stay in the
//!   contributor's custodial wallet
//! - One run per request id at a time

pub mod approve;
pub mod ledger;
pub mod pipeline;
pub mod stake;
pub mod store;
pub mod types;
pub mod worker;

pub use approve::TokenApprover;
pub use ledger::{CampaignLedger, CampaignTotals, HttpLedger, InMemoryLedger};
pub use pipeline::{PipelineSummary, RecoveryReport, SettlementPipeline};
pub use stake::StakeExecutor;
pub use store::{FileSettlementStore, SettlementStore};
pub use types::{Failure, NewSettlement, SettlementRequest, SettlementStatus, Stage};
pub use worker::SettlementWorker;

//! Fiat payment gateway integration.
//!
//! # Data Flow
//! ```text
//! checkout: email + USD amount + project
//!     → custodial wallet (get or create)
//!     → correlation token → signed widget URL
//!
//! callback: {payload:{data}} | {data}
//!     → status != completed → ack only
//!     → correlation token + amount + wallet → SettlementPipeline::start
//! ```

pub mod catalog;
pub mod checkout;
pub mod correlation;
pub mod gateway;
pub mod types;

pub use catalog::{ProjectCatalog, StaticCatalog};
pub use correlation::CorrelationToken;
pub use gateway::PaymentGatewayAdapter;
pub use types::{CallbackAck, CallbackError, CheckoutRequest, CheckoutSession};

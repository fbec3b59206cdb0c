//! Native → project token swaps.
//!
//! # Data Flow
//! ```text
//! quote:   getAmountsOut([wrapped native, token]) → Quote (+ slippage floor)
//! execute: quote → balance checks → swapExactETHForTokens{value}
//!          → receipt → token balance delta → SwapOutcome
//! ```

pub mod router;
pub mod types;

pub use router::{swap_failure, token_balance, SwapRouter};
pub use types::{apply_slippage, PreparedSwap, Quote, SwapOutcome};

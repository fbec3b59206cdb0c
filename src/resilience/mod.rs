//! Resilience helpers.
//!
//! Every RPC call has a deadline (enforced in `blockchain::client`); receipt
//! polling backs off exponentially between attempts. Submissions are never
//! retried automatically: a second broadcast of the same intent could settle
//! twice.

pub mod backoff;

pub use backoff::poll_delay;

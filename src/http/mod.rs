//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request id, metrics)
//!     → handlers.rs (gateway callback, checkout, settlement view, quote,
//!       wallet verification, health)
//!     → admin (bearer-protected operations)
//!     → response.rs (structured error bodies)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ErrorBody};
pub use server::{build_router, AppState, HttpServer};

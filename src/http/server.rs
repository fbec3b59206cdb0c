//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with public and admin routes
//! - Wire up middleware (tracing, timeout, body limit, request id, metrics)
//! - Serve until the shutdown broadcast fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_requests};
use crate::payments::PaymentGatewayAdapter;
use crate::settlement::SettlementPipeline;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SettlementPipeline>,
    pub gateway: Arc<PaymentGatewayAdapter>,
    pub config: Arc<ServiceConfig>,
}

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires. In-flight requests finish.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let timeout = Duration::from_secs(server.request_timeout_secs);
    let body_limit = server.max_body_size;

    Router::new()
        .route("/callbacks/gateway", post(handlers::gateway_callback))
        .route("/checkout", post(handlers::create_checkout))
        .route("/settlements/{id}", get(handlers::get_settlement))
        .route("/quote", get(handlers::get_quote))
        .route("/wallets/challenge", get(handlers::wallet_challenge))
        .route("/wallets/verify", post(handlers::verify_wallet))
        .route("/health", get(handlers::health))
        .merge(setup_admin_router(state.clone()))
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

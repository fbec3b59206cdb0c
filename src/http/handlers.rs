//! Public API handlers.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::Address;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blockchain::ChainHealth;
use crate::config::ChainKind;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::payments::{CallbackAck, CallbackError, CheckoutRequest, CheckoutSession};
use crate::settlement::{SettlementRequest, SettlementStatus, Stage};
use crate::swap::Quote;

pub async fn gateway_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CallbackAck>, ApiError> {
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| CallbackError::Malformed(format!("invalid JSON: {}", e)))?;
    let ack = state.gateway.handle_callback(payload).await.map_err(|e| {
        if e.is_client_error() {
            tracing::warn!(error = %e, code = e.code(), "Rejected gateway callback");
        }
        e
    })?;
    Ok(Json(ack))
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), ApiError> {
    let session = state.gateway.create_checkout(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Serialize)]
pub struct ExplorerLink {
    pub stage: Stage,
    pub url: String,
}

/// A settlement as reported to clients.
#[derive(Debug, Serialize)]
pub struct SettlementView {
    #[serde(flatten)]
    pub request: SettlementRequest,
    pub status: SettlementStatus,
    pub running: bool,
    pub explorer_links: Vec<ExplorerLink>,
}

impl SettlementView {
    pub fn build(state: &AppState, request: SettlementRequest) -> Self {
        let explorer_links = state
            .pipeline
            .explorer_links(&request)
            .into_iter()
            .map(|(stage, url)| ExplorerLink { stage, url })
            .collect();
        Self {
            status: request.status(),
            running: state.pipeline.is_running(request.id),
            explorer_links,
            request,
        }
    }
}

pub async fn get_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementView>, ApiError> {
    let request = state.pipeline.get(id).await?;
    Ok(Json(SettlementView::build(&state, request)))
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub chain: ChainKind,
    /// Whole native units, e.g. `0.05`.
    pub native_amount: String,
    pub token: Address,
}

pub async fn get_quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Quote>, ApiError> {
    let native = parse_ether(params.native_amount.trim())
        .map_err(|e| ApiError::BadRequest(format!("native_amount: {}", e)))?;
    let quote = state
        .pipeline
        .swap_router()
        .quote(params.chain, native, params.token)
        .await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct VerifyWalletRequest {
    pub address: Address,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyWalletResponse {
    pub valid: bool,
}

pub async fn verify_wallet(
    State(state): State<AppState>,
    Json(request): Json<VerifyWalletRequest>,
) -> Json<VerifyWalletResponse> {
    let valid = state
        .pipeline
        .wallets()
        .verify_ownership(request.address, &request.signature);
    Json(VerifyWalletResponse { valid })
}

pub async fn wallet_challenge(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": state.pipeline.wallets().challenge_message() }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub chains: Vec<ChainHealth>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let chains = state.pipeline.registry().health().await;
    let healthy = chains.iter().all(|c| c.reachable);
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            chains,
        }),
    )
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::blockchain::ChainHealth;
use crate::error::SettlementError;
use crate::http::handlers::SettlementView;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::settlement::{PipelineSummary, Stage};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub chains: Vec<ChainHealth>,
    pub settlements: PipelineSummary,
    pub wallets: usize,
}

#[derive(Serialize)]
pub struct ResumeAccepted {
    pub id: Uuid,
    pub status: &'static str,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<SystemStatus>, ApiError> {
    let chains = state.pipeline.registry().health().await;
    let settlements = state.pipeline.summary().await?;
    let status = if chains.iter().all(|c| c.reachable) {
        "operational"
    } else {
        "degraded"
    };

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        chains,
        settlements,
        wallets: state.pipeline.wallets().len(),
    }))
}

pub async fn list_settlements(
    State(state): State<AppState>,
) -> Result<Json<Vec<SettlementView>>, ApiError> {
    let mut requests = state.pipeline.list().await?;
    requests.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    let views = requests
        .into_iter()
        .map(|r| SettlementView::build(&state, r))
        .collect();
    Ok(Json(views))
}

/// Accept a resume and run it in the background. Poll the settlement for
/// the outcome.
pub async fn resume_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ResumeAccepted>), ApiError> {
    let request = state.pipeline.get(id).await?;
    if state.pipeline.is_running(id) {
        return Err(SettlementError::AlreadyRunning(id).into());
    }
    if request.stage == Stage::Completed && request.ledger_recorded {
        return Err(SettlementError::NotResumable {
            id,
            reason: "settlement already completed".to_string(),
        }
        .into());
    }
    state.pipeline.registry().get(request.chain).map_err(SettlementError::from)?;

    let pipeline = state.pipeline.clone();
    let chain = request.chain;
    tokio::spawn(async move {
        match pipeline.resume(id).await {
            Ok(request) => tracing::info!(
                settlement_id = %id,
                chain = %chain,
                stage = %request.stage,
                "Admin resume finished"
            ),
            Err(e) => tracing::warn!(settlement_id = %id, error = %e, "Admin resume rejected"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ResumeAccepted {
            id,
            status: "resuming",
        }),
    ))
}

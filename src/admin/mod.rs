//! Operator API under `/admin`, protected by a bearer token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/settlements", get(list_settlements))
        .route("/admin/settlements/{id}/resume", post(resume_settlement))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

use axum::{
    extract::{Extension, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use shared::shared_spin_wheel::{SpinRecordView, SpinRequest, WheelState};

use crate::auth::AuthUser;
use crate::error::SpinError;
use crate::AppState;

pub mod engine;

pub fn create_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/spin", post(spin_wheel))
        .route("/settle", post(settle_wheel))
        .route("/release", post(release_wheel))
        .layer(axum::middleware::from_fn_with_state(
            state,
            crate::api_rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(crate::auth::middleware::require_auth));

    Router::new()
        .route("/state", get(get_wheel_state))
        .route("/history", get(get_wheel_history))
        .merge(protected)
}

/// Anyone may poll the wheel; the spin is a shared spectacle.
async fn get_wheel_state(State(state): State<AppState>) -> Result<Json<WheelState>, SpinError> {
    Ok(Json(state.engine.read().await?))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn get_wheel_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SpinRecordView>>, SpinError> {
    Ok(Json(state.engine.history(query.limit.unwrap_or(20)).await?))
}

async fn spin_wheel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SpinRequest>,
) -> Result<Json<WheelState>, SpinError> {
    Ok(Json(state.engine.start(&user, request.wager).await?))
}

async fn settle_wheel(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<WheelState>, SpinError> {
    Ok(Json(state.engine.settle().await?))
}

async fn release_wheel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<WheelState>, SpinError> {
    Ok(Json(state.engine.release(&user).await?))
}

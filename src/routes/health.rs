use axum::{extract::State, routing::get, Json, Router};

use crate::models::{AppState, HealthResponse};
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let indexed_chunks = state.pipeline.indexed_chunks().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        collection: state.pipeline.collection().to_string(),
        indexed_chunks,
    }))
}

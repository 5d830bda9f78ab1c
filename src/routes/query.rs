use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;

use crate::models::{AppState, QueryRequest};
use crate::types::{AppError, AppResult};

pub fn router() -> Router<AppState> {
    Router::new().route("/query", post(query_documents))
}

/// POST /query - stream an answer as plain text
///
/// Generation failures arrive in-band as a final text fragment, since the
/// status line has already been sent by then.
async fn query_documents(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let answer = state.pipeline.query(&request.question).await?;
    let body = Body::from_stream(answer.map(|fragment| Ok::<_, Infallible>(Bytes::from(fragment))));

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

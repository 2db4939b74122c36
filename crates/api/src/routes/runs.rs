use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use types::{GenerationRequest, GenerationRun, RunId, UserId};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct SubmitIn {
    #[serde(flatten)]
    pub request: GenerationRequest,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[utoipa::path(
    post,
    path = "/v1/runs",
    request_body = SubmitIn,
    responses(
        (status = 202, description = "Run accepted", body = GenerationRun),
        (status = 423, description = "Term already has an active run", body = ErrorBody),
        (status = 429, description = "Too many submissions", body = ErrorBody)
    )
)]
pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitIn>,
) -> Result<(StatusCode, Json<GenerationRun>), ApiError> {
    let run = state.runs.submit(body.request, body.actor).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

#[utoipa::path(
    get,
    path = "/v1/runs/{id}",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run record", body = GenerationRun),
        (status = 404, description = "Unknown run", body = ErrorBody)
    )
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> Result<Json<GenerationRun>, ApiError> {
    Ok(Json(state.runs.get(id).await?))
}

#[utoipa::path(
    post,
    path = "/v1/runs/{id}/cancel",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run after the cancellation request", body = GenerationRun)
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> Result<Json<GenerationRun>, ApiError> {
    Ok(Json(state.runs.cancel(id).await?))
}

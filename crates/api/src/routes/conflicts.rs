use axum::{extract::State, Json};
use types::{Conflict, ConflictProbe};

use crate::error::ApiError;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/v1/conflicts/check",
    request_body = ConflictProbe,
    responses(
        (status = 200, description = "Conflicts with the committed schedule", body = [Conflict])
    )
)]
pub async fn check(
    State(state): State<AppState>,
    Json(probe): Json<ConflictProbe>,
) -> Result<Json<Vec<Conflict>>, ApiError> {
    Ok(Json(state.timetables.check_conflicts(&probe).await?))
}

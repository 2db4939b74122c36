use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use timetable::analytics::{TermAnalytics, WorkloadReport};
use types::{TeacherId, TermId};

use crate::error::ApiError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/v1/terms/{id}/analytics",
    params(("id" = u64, Path, description = "Term ID")),
    responses((status = 200, description = "Every report for the term", body = TermAnalytics))
)]
pub async fn term(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TermAnalytics>, ApiError> {
    let report = state.timetables.analytics(TermId(id)).await?;
    Ok(Json(TermAnalytics::clone(&report)))
}

#[derive(Deserialize)]
pub struct WorkloadQuery {
    #[serde(default)]
    pub teacher: Option<TeacherId>,
}

#[utoipa::path(
    get,
    path = "/v1/terms/{id}/analytics/workload",
    params(
        ("id" = u64, Path, description = "Term ID"),
        ("teacher" = Option<u64>, Query, description = "Single teacher")
    ),
    responses((status = 200, description = "Teacher workload", body = WorkloadReport))
)]
pub async fn workload(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<WorkloadQuery>,
) -> Result<Json<WorkloadReport>, ApiError> {
    let out = state
        .timetables
        .teacher_workload(TermId(id), q.teacher)
        .await?;
    Ok(Json(out))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use timetable::{SubstituteCandidate, SubstituteRequest};
use types::{AssignmentId, SubstituteAssignment, SubstituteId, TeacherId, UserId};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[utoipa::path(
    get,
    path = "/v1/assignments/{id}/substitutes",
    params(
        ("id" = u64, Path, description = "Scheduled assignment ID"),
        ("date" = String, Query, description = "Date of the lesson to cover")
    ),
    responses(
        (
            status = 200,
            description = "Candidates, most compatible first",
            body = [SubstituteCandidate]
        )
    )
)]
pub async fn suggest(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<SubstituteCandidate>>, ApiError> {
    let out = state
        .timetables
        .suggest_substitutes(AssignmentId(id), q.date)
        .await?;
    Ok(Json(out))
}

#[utoipa::path(
    post,
    path = "/v1/substitutes",
    request_body = SubstituteRequest,
    responses(
        (status = 201, description = "Substitute booked", body = SubstituteAssignment),
        (status = 409, description = "Substitute is busy or inactive", body = ErrorBody)
    )
)]
pub async fn assign(
    State(state): State<AppState>,
    Json(req): Json<SubstituteRequest>,
) -> Result<(StatusCode, Json<SubstituteAssignment>), ApiError> {
    let created = state.timetables.assign_substitute(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize, ToSchema)]
pub struct ApproveIn {
    pub approver: UserId,
}

#[utoipa::path(
    post,
    path = "/v1/substitutes/{id}/approve",
    params(("id" = u64, Path, description = "Substitute assignment ID")),
    request_body = ApproveIn,
    responses((status = 200, description = "Approved substitute", body = SubstituteAssignment))
)]
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<ApproveIn>,
) -> Result<Json<SubstituteAssignment>, ApiError> {
    let approved = state
        .timetables
        .approve_substitute(SubstituteId(id), body.approver)
        .await?;
    Ok(Json(approved))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub teacher: Option<TeacherId>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/v1/substitutes",
    params(
        ("teacher" = Option<u64>, Query, description = "Covering teacher"),
        ("from" = Option<String>, Query, description = "Earliest date"),
        ("to" = Option<String>, Query, description = "Latest date")
    ),
    responses(
        (status = 200, description = "Substitutions, newest first", body = [SubstituteAssignment])
    )
)]
pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<SubstituteAssignment>>, ApiError> {
    let out = state
        .timetables
        .substitute_history(q.teacher, q.from, q.to)
        .await?;
    Ok(Json(out))
}

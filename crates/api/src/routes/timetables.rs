use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use timetable::{
    BulkEntry, BulkOutcome, CopyOutcome, EntryRequest, RoomDay, ScheduleReport, TimetableEntry,
};
use types::{ClassId, GradeId, RoomId, ScheduledAssignment, TeacherId, TermId, UserId};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TimetableQuery {
    pub term: TermId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/v1/classes/{id}/timetable",
    params(
        ("id" = u64, Path, description = "Class ID"),
        ("term" = u64, Query, description = "Term ID"),
        ("date" = Option<String>, Query, description = "Only lessons effective on this date")
    ),
    responses((status = 200, description = "Lessons by day and period", body = [TimetableEntry]))
)]
pub async fn class_timetable(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<TimetableQuery>,
) -> Result<Json<Vec<TimetableEntry>>, ApiError> {
    let out = state
        .timetables
        .class_timetable(ClassId(id), q.term, q.date)
        .await?;
    Ok(Json(out))
}

#[utoipa::path(
    get,
    path = "/v1/teachers/{id}/timetable",
    params(
        ("id" = u64, Path, description = "Teacher ID"),
        ("term" = u64, Query, description = "Term ID"),
        ("date" = Option<String>, Query, description = "Only lessons effective on this date")
    ),
    responses((status = 200, description = "Lessons by day and period", body = [TimetableEntry]))
)]
pub async fn teacher_timetable(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<TimetableQuery>,
) -> Result<Json<Vec<TimetableEntry>>, ApiError> {
    let out = state
        .timetables
        .teacher_timetable(TeacherId(id), q.term, q.date)
        .await?;
    Ok(Json(out))
}

#[utoipa::path(
    post,
    path = "/v1/entries",
    request_body = EntryRequest,
    responses(
        (status = 201, description = "Entry committed", body = ScheduledAssignment),
        (status = 409, description = "Conflicts with the committed schedule", body = ErrorBody)
    )
)]
pub async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<EntryRequest>,
) -> Result<(StatusCode, Json<ScheduledAssignment>), ApiError> {
    let created = state.timetables.create_entry(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/v1/terms/{id}/schedule/validation",
    params(("id" = u64, Path, description = "Term ID")),
    responses((status = 200, description = "Issues and warnings", body = ScheduleReport))
)]
pub async fn validate_schedule(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ScheduleReport>, ApiError> {
    Ok(Json(state.timetables.validate_term_schedule(TermId(id)).await?))
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub term: TermId,
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/calendar",
    params(
        ("id" = u64, Path, description = "Room ID"),
        ("term" = u64, Query, description = "Term ID")
    ),
    responses((status = 200, description = "Bookings by weekday and period", body = [RoomDay]))
)]
pub async fn room_calendar(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<Vec<RoomDay>>, ApiError> {
    Ok(Json(state.timetables.room_booking_calendar(RoomId(id), q.term).await?))
}

#[derive(Deserialize, ToSchema)]
pub struct BulkIn {
    pub entries: Vec<BulkEntry>,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[utoipa::path(
    post,
    path = "/v1/terms/{id}/entries/bulk",
    params(("id" = u64, Path, description = "Term ID")),
    request_body = BulkIn,
    responses(
        (status = 200, description = "Every line applied", body = BulkOutcome),
        (status = 409, description = "A line conflicts; nothing applied", body = ErrorBody)
    )
)]
pub async fn bulk_update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<BulkIn>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let out = state
        .timetables
        .bulk_update_timetable(TermId(id), body.entries, body.actor)
        .await?;
    Ok(Json(out))
}

#[derive(Deserialize, ToSchema)]
pub struct CopyIn {
    pub source: TermId,
    /// Grades to copy; every grade when empty.
    #[serde(default)]
    pub grades: Vec<GradeId>,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[utoipa::path(
    post,
    path = "/v1/terms/{id}/timetable/copy",
    params(("id" = u64, Path, description = "Target term ID")),
    request_body = CopyIn,
    responses(
        (status = 200, description = "Timetable copied", body = CopyOutcome),
        (status = 409, description = "The copy would double-book", body = ErrorBody)
    )
)]
pub async fn copy_term(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<CopyIn>,
) -> Result<Json<CopyOutcome>, ApiError> {
    let out = state
        .timetables
        .copy_timetable_to_term(body.source, TermId(id), &body.grades, body.actor)
        .await?;
    Ok(Json(out))
}

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use timetable::RoomSuggestion;
use types::{ClassId, Room, RoomType, SubjectId, Teacher, TimeSlotId};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TeachersQuery {
    pub slot: TimeSlotId,
    pub subject: SubjectId,
    pub date: NaiveDate,
    #[serde(default)]
    pub class: Option<ClassId>,
}

#[utoipa::path(
    get,
    path = "/v1/availability/teachers",
    params(
        ("slot" = u64, Query, description = "Time slot ID"),
        ("subject" = u64, Query, description = "Subject ID"),
        ("date" = String, Query, description = "Calendar date"),
        (
            "class" = Option<u64>,
            Query,
            description = "Restrict to teachers authorized for this class"
        )
    ),
    responses((status = 200, description = "Free, authorized teachers", body = [Teacher]))
)]
pub async fn teachers(
    State(state): State<AppState>,
    Query(q): Query<TeachersQuery>,
) -> Result<Json<Vec<Teacher>>, ApiError> {
    let out = state
        .timetables
        .available_teachers(q.slot, q.subject, q.date, q.class)
        .await?;
    Ok(Json(out))
}

#[derive(Deserialize)]
pub struct RoomsQuery {
    pub slot: TimeSlotId,
    pub date: NaiveDate,
    #[serde(default)]
    pub room_type: Option<RoomType>,
    #[serde(default)]
    pub min_capacity: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/v1/availability/rooms",
    params(
        ("slot" = u64, Query, description = "Time slot ID"),
        ("date" = String, Query, description = "Calendar date"),
        ("room_type" = Option<RoomType>, Query, description = "Only rooms of this type"),
        ("min_capacity" = Option<u32>, Query, description = "Minimum seats")
    ),
    responses((status = 200, description = "Free rooms", body = [Room]))
)]
pub async fn rooms(
    State(state): State<AppState>,
    Query(q): Query<RoomsQuery>,
) -> Result<Json<Vec<Room>>, ApiError> {
    let out = state
        .timetables
        .available_rooms(q.slot, q.date, q.room_type, q.min_capacity)
        .await?;
    Ok(Json(out))
}

#[derive(Deserialize)]
pub struct SuggestionQuery {
    pub class: ClassId,
    pub subject: SubjectId,
    pub slot: TimeSlotId,
    pub date: NaiveDate,
}

#[utoipa::path(
    get,
    path = "/v1/rooms/suggestions",
    params(
        ("class" = u64, Query, description = "Class ID"),
        ("subject" = u64, Query, description = "Subject ID"),
        ("slot" = u64, Query, description = "Time slot ID"),
        ("date" = String, Query, description = "Calendar date")
    ),
    responses((status = 200, description = "Free rooms, best first", body = [RoomSuggestion]))
)]
pub async fn suggest_rooms(
    State(state): State<AppState>,
    Query(q): Query<SuggestionQuery>,
) -> Result<Json<Vec<RoomSuggestion>>, ApiError> {
    let out = state
        .timetables
        .suggest_rooms(q.class, q.subject, q.slot, q.date)
        .await?;
    Ok(Json(out))
}

mod error;
mod state;
mod telemetry;
pub mod routes {
    pub mod analytics;
    pub mod availability;
    pub mod conflicts;
    pub mod health;
    pub mod runs;
    pub mod substitutes;
    pub mod timetables;
    pub mod validate;
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use sched_core::config::SchedulingConfig;
use store::MemoryStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use timetable::analytics as reports;

#[derive(OpenApi)]
#[openapi(
        paths(
            routes::health::health,
            routes::runs::submit,
            routes::runs::get_run,
            routes::runs::cancel,
            routes::timetables::class_timetable,
            routes::timetables::teacher_timetable,
            routes::timetables::create_entry,
            routes::timetables::validate_schedule,
            routes::timetables::room_calendar,
            routes::timetables::bulk_update,
            routes::timetables::copy_term,
            routes::conflicts::check,
            routes::availability::teachers,
            routes::availability::rooms,
            routes::availability::suggest_rooms,
            routes::substitutes::suggest,
            routes::substitutes::assign,
            routes::substitutes::approve,
            routes::substitutes::history,
            routes::analytics::term,
            routes::analytics::workload,
            routes::validate::validate_catalog,
            routes::validate::constraint_schemas,
        ),
        components(schemas(
            types::Term, types::Teacher, types::TeacherStatus, types::Room, types::RoomType,
            types::DayOfWeek, types::Algorithm, types::GenerationParams, types::GenerationRequest,
            types::GenerationRun, types::RunStatus, types::RunSummary, types::RunId,
            types::ScheduledAssignment, types::DateRange, types::Conflict, types::ConflictKind,
            types::ConflictParty, types::ConflictProbe, types::SubstituteAssignment,
            types::TermId, types::ClassId, types::SubjectId, types::TeacherId, types::TimeSlotId,
            types::RoomId, types::AssignmentId, types::SubstituteId, types::UserId, types::GradeId,
            timetable::TimetableEntry, timetable::EntryRequest, timetable::ScheduleReport,
            timetable::queries::TeacherLoad, timetable::RoomSuggestion,
            timetable::SubstituteCandidate, timetable::SubstituteRequest, timetable::BulkEntry,
            timetable::BulkOutcome, timetable::CopyOutcome, timetable::RoomDay,
            reports::TermAnalytics, reports::WorkloadReport, reports::TeacherWorkload,
            reports::WorkloadSummary, reports::DayCount, reports::RoomUtilizationReport,
            reports::RoomUsage, reports::RoomTypeUsage, reports::PeakUsage, reports::RoomSummary,
            reports::ConflictReport, reports::DoubleBooking, reports::SubstituteFrequency,
            reports::SubjectDistributionReport, reports::SubjectTiming, reports::PeriodCount,
            reports::DaySubjectCount, reports::GradeSubjectLoad, reports::OptimizationScore,
            reports::ScoreBreakdown, reports::LetterGrade, reports::SlotPopularityReport,
            reports::SlotUsage, reports::ClassDensityReport, reports::ClassDensity,
            error::ErrorBody,
            routes::health::Health,
            routes::runs::SubmitIn,
            routes::timetables::BulkIn,
            routes::timetables::CopyIn,
            routes::substitutes::ApproveIn,
            routes::validate::ValidationReport
        )),
        tags(
            (name = "timetable", description = "School timetable scheduling API")
        )
    )]
struct ApiDoc;

fn router() -> Router<state::AppState> {
    use routes::*;
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/runs", post(runs::submit))
        .route("/v1/runs/:id", get(runs::get_run))
        .route("/v1/runs/:id/cancel", post(runs::cancel))
        .route("/v1/classes/:id/timetable", get(timetables::class_timetable))
        .route("/v1/teachers/:id/timetable", get(timetables::teacher_timetable))
        .route("/v1/entries", post(timetables::create_entry))
        .route("/v1/terms/:id/schedule/validation", get(timetables::validate_schedule))
        .route("/v1/terms/:id/entries/bulk", post(timetables::bulk_update))
        .route("/v1/terms/:id/timetable/copy", post(timetables::copy_term))
        .route("/v1/rooms/:id/calendar", get(timetables::room_calendar))
        .route("/v1/terms/:id/catalog/validation", get(validate::validate_catalog))
        .route("/v1/terms/:id/analytics", get(analytics::term))
        .route("/v1/terms/:id/analytics/workload", get(analytics::workload))
        .route("/v1/conflicts/check", post(conflicts::check))
        .route("/v1/availability/teachers", get(availability::teachers))
        .route("/v1/availability/rooms", get(availability::rooms))
        .route("/v1/rooms/suggestions", get(availability::suggest_rooms))
        .route("/v1/assignments/:id/substitutes", get(substitutes::suggest))
        .route("/v1/substitutes", get(substitutes::history).post(substitutes::assign))
        .route("/v1/substitutes/:id/approve", post(substitutes::approve))
        .route("/v1/schema/constraints", get(validate::constraint_schemas))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config_path = std::env::var_os("TIMETABLE_CONFIG").map(PathBuf::from);
    let cfg = SchedulingConfig::load_with_env(config_path.as_deref())
        .context("loading configuration")?;

    let store = match &cfg.store.fixture {
        Some(path) => MemoryStore::load_fixture(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => MemoryStore::new(),
    };
    let app_state = state::AppState::new(Arc::new(store), &cfg);
    let _sweeper = app_state.runs.spawn_sweeper();

    let app = router()
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(telemetry::stack(cfg.server.body_limit_bytes))
        .with_state(app_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(%addr, fixture = ?cfg.store.fixture, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

use chrono::NaiveDate;
use serde::Serialize;
use types::{AssignmentId, RunId, RunStatus, SubstituteId, TeacherId, TermId, UserId};

/// Side effects other subsystems may care about (notifications, audit).
/// The core only publishes; delivery belongs to whoever owns the sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulingEvent {
    RunSubmitted {
        run: RunId,
        term: TermId,
        actor: Option<UserId>,
    },
    RunStarted {
        run: RunId,
        term: TermId,
    },
    RunFinished {
        run: RunId,
        term: TermId,
        status: RunStatus,
        score: Option<f64>,
    },
    SchedulePersisted {
        term: TermId,
        removed: usize,
        created: usize,
    },
    /// In-place edits of a committed schedule, as opposed to a replacement.
    ScheduleEdited {
        term: TermId,
        updated: usize,
        created: usize,
    },
    SubstituteAssigned {
        substitute: SubstituteId,
        original: AssignmentId,
        teacher: TeacherId,
        date: NaiveDate,
    },
    SubstituteApproved {
        substitute: SubstituteId,
        approver: UserId,
    },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: SchedulingEvent);
}

/// Emits each event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: SchedulingEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(target: "scheduling::events", %payload, "event"),
            Err(e) => tracing::warn!(target: "scheduling::events", ?event, error = %e, "event"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: SchedulingEvent) {}
}

//! Repository contract consumed by the scheduling core.
//!
//! The catalog entities (terms, classes, teachers, rooms, time slots,
//! constraints) belong to surrounding CRUD modules and are read-only here.
//! Scheduled assignments, substitutes and generation runs are owned by the
//! core and written through [`ScheduleRepository`], [`SubstituteRepository`]
//! and [`RunRepository`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use types::{
    AssignmentId, Class, ClassId, GenerationRun, Grade, GradeId, NewAssignment, NewSubstitute,
    Room, RoomId, RunId, RunStatus, ScheduledAssignment, SchedulingConstraint, Subject, SubjectId,
    SubstituteAssignment, SubstituteId, Teacher, TeacherAssignment, TeacherId, Term, TermId,
    TimeSlot, TimeSlotId, UserId,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("term {0} already has a pending or running generation")]
    ActiveRun(TermId),

    #[error("internal repository error: {0}")]
    Internal(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Filter for [`ScheduleRepository::assignments`]. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct AssignmentQuery {
    pub term: Option<TermId>,
    pub class: Option<ClassId>,
    pub teacher: Option<TeacherId>,
    pub subject: Option<SubjectId>,
    pub room: Option<RoomId>,
    pub time_slot: Option<TimeSlotId>,
    /// Only assignments whose effective range covers this date.
    pub date: Option<NaiveDate>,
    pub active_only: bool,
}

impl AssignmentQuery {
    pub fn active_in_term(term: TermId) -> Self {
        Self {
            term: Some(term),
            active_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, a: &ScheduledAssignment) -> bool {
        (!self.active_only || a.is_active)
            && self.term.map_or(true, |t| a.term == t)
            && self.class.map_or(true, |c| a.class == c)
            && self.teacher.map_or(true, |t| a.teacher == t)
            && self.subject.map_or(true, |s| a.subject == s)
            && self.room.map_or(true, |r| a.room == Some(r))
            && self.time_slot.map_or(true, |s| a.time_slot == s)
            && self.date.map_or(true, |d| a.range().contains(d))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubstituteQuery {
    pub original: Option<AssignmentId>,
    pub substitute: Option<TeacherId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SubstituteQuery {
    pub fn matches(&self, s: &SubstituteAssignment) -> bool {
        self.original.map_or(true, |o| s.original == o)
            && self.substitute.map_or(true, |t| s.substitute == t)
            && self.from.map_or(true, |f| s.date >= f)
            && self.to.map_or(true, |t| s.date <= t)
    }
}

/// Outcome of an atomic term replacement.
#[derive(Clone, Debug, Default)]
pub struct ReplaceOutcome {
    pub removed: usize,
    pub created: Vec<ScheduledAssignment>,
}

/// Edits to one term's schedule: in-place rewrites of existing active
/// assignments plus new ones.
#[derive(Clone, Debug, Default)]
pub struct ScheduleChanges {
    pub updates: Vec<(AssignmentId, NewAssignment)>,
    pub inserts: Vec<NewAssignment>,
}

#[derive(Clone, Debug, Default)]
pub struct ChangesOutcome {
    pub updated: Vec<ScheduledAssignment>,
    pub created: Vec<ScheduledAssignment>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn term(&self, id: TermId) -> RepositoryResult<Term>;
    async fn terms(&self) -> RepositoryResult<Vec<Term>>;
    async fn grade(&self, id: GradeId) -> RepositoryResult<Grade>;
    /// Classes of a term; an empty grade list means every grade.
    async fn classes(&self, term: TermId, grades: &[GradeId]) -> RepositoryResult<Vec<Class>>;
    async fn class(&self, id: ClassId) -> RepositoryResult<Class>;
    async fn subjects(&self) -> RepositoryResult<Vec<Subject>>;
    async fn subject(&self, id: SubjectId) -> RepositoryResult<Subject>;
    async fn teachers(&self) -> RepositoryResult<Vec<Teacher>>;
    async fn teacher(&self, id: TeacherId) -> RepositoryResult<Teacher>;
    /// Active teacher-class-subject authorizations of a term, restricted to
    /// classes of the given grades (all grades when empty).
    async fn authorizations(
        &self,
        term: TermId,
        grades: &[GradeId],
    ) -> RepositoryResult<Vec<TeacherAssignment>>;
    /// With `schedulable_only`, inactive and break slots are filtered out.
    async fn time_slots(&self, schedulable_only: bool) -> RepositoryResult<Vec<TimeSlot>>;
    async fn time_slot(&self, id: TimeSlotId) -> RepositoryResult<TimeSlot>;
    async fn rooms(&self, available_only: bool) -> RepositoryResult<Vec<Room>>;
    async fn room(&self, id: RoomId) -> RepositoryResult<Room>;
    async fn constraints(&self, active_only: bool) -> RepositoryResult<Vec<SchedulingConstraint>>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn assignments(
        &self,
        query: &AssignmentQuery,
    ) -> RepositoryResult<Vec<ScheduledAssignment>>;
    async fn assignment(&self, id: AssignmentId) -> RepositoryResult<ScheduledAssignment>;
    /// Deletes every active assignment of `term` and inserts `entries`, all or nothing.
    async fn replace_term_schedule(
        &self,
        term: TermId,
        entries: Vec<NewAssignment>,
    ) -> RepositoryResult<ReplaceOutcome>;
    async fn insert_assignment(
        &self,
        entry: NewAssignment,
    ) -> RepositoryResult<ScheduledAssignment>;
    /// Applies `changes` to `term`, all or nothing. Updated assignments keep
    /// their id and creation stamp.
    async fn apply_schedule_changes(
        &self,
        term: TermId,
        changes: ScheduleChanges,
    ) -> RepositoryResult<ChangesOutcome>;
    /// Monotonic revision bumped on every write touching the term's schedule
    /// or its substitutes. Readers use it as a cache key.
    async fn schedule_revision(&self, term: TermId) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Fails with [`RepositoryError::ActiveRun`] while the term has a
    /// pending or running run.
    async fn create_run(&self, run: GenerationRun) -> RepositoryResult<GenerationRun>;
    async fn run(&self, id: RunId) -> RepositoryResult<GenerationRun>;
    /// Replaces the stored record. Only status and result bookkeeping may
    /// change, and the status must follow [`RunStatus::can_transition_to`].
    async fn update_run(&self, run: GenerationRun) -> RepositoryResult<GenerationRun>;
    /// Records `run` as completed and replaces its term's schedule with
    /// `entries` in one atomic step. The stored run must still be
    /// `running`; otherwise [`RepositoryError::InvalidTransition`] is
    /// returned and the schedule is untouched. The summary's `created` and
    /// `removed` counts are filled from the replacement.
    async fn commit_run(
        &self,
        run: GenerationRun,
        entries: Vec<NewAssignment>,
    ) -> RepositoryResult<(GenerationRun, ReplaceOutcome)>;
    async fn runs_for_term(&self, term: TermId) -> RepositoryResult<Vec<GenerationRun>>;
    async fn active_runs(&self) -> RepositoryResult<Vec<GenerationRun>>;
    /// Deletes terminal runs created before `cutoff`; returns how many went.
    async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize>;
}

#[async_trait]
pub trait SubstituteRepository: Send + Sync {
    /// Unique on (original, date).
    async fn create_substitute(
        &self,
        new: NewSubstitute,
    ) -> RepositoryResult<SubstituteAssignment>;
    async fn substitute(&self, id: SubstituteId) -> RepositoryResult<SubstituteAssignment>;
    async fn substitutes(
        &self,
        query: &SubstituteQuery,
    ) -> RepositoryResult<Vec<SubstituteAssignment>>;
    async fn approve_substitute(
        &self,
        id: SubstituteId,
        approver: UserId,
    ) -> RepositoryResult<SubstituteAssignment>;
}

/// Everything the core needs from storage.
pub trait Repository:
    CatalogRepository + ScheduleRepository + RunRepository + SubstituteRepository
{
}

impl<T> Repository for T where
    T: CatalogRepository + ScheduleRepository + RunRepository + SubstituteRepository
{
}

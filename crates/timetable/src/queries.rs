use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveTime};
use sched_core::catalog::sessions_of;
use sched_core::conflicts;
use sched_core::repo::AssignmentQuery;
use sched_core::{Repository, SchedulingError};
use serde::{Deserialize, Serialize};
use tracing::info;
use types::{
    ClassId, Conflict, ConflictProbe, DateRange, DayOfWeek, NewAssignment, Room, RoomId, RoomType,
    ScheduledAssignment, SubjectId, Teacher, TeacherId, Term, TermId, TimeSlot, TimeSlotId,
    UserId,
};
use utoipa::ToSchema;

use crate::Timetables;

/// A committed assignment with the time it takes place.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct TimetableEntry {
    pub assignment: ScheduledAssignment,
    pub day: DayOfWeek,
    pub period: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Manual timetable entry. Dates default to the term bounds.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct EntryRequest {
    pub class: ClassId,
    pub subject: SubjectId,
    pub teacher: TeacherId,
    pub time_slot: TimeSlotId,
    pub term: TermId,
    #[serde(default)]
    pub room: Option<RoomId>,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct TeacherLoad {
    pub teacher: TeacherId,
    pub periods: usize,
}

/// Health check of a term's committed schedule.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct ScheduleReport {
    pub term: TermId,
    pub total_assignments: usize,
    /// Double bookings; any of these makes the schedule invalid.
    pub issues: Vec<Conflict>,
    pub warnings: Vec<String>,
    pub teacher_loads: Vec<TeacherLoad>,
    pub is_valid: bool,
}

fn entries(
    assignments: Vec<ScheduledAssignment>,
    slots: &HashMap<TimeSlotId, TimeSlot>,
) -> Vec<TimetableEntry> {
    let mut out: Vec<TimetableEntry> = assignments
        .into_iter()
        .filter_map(|a| {
            let slot = slots.get(&a.time_slot)?;
            Some(TimetableEntry {
                day: slot.day,
                period: slot.period,
                start: slot.start,
                end: slot.end,
                assignment: a,
            })
        })
        .collect();
    out.sort_by_key(|e| (e.day, e.period, e.assignment.id));
    out
}

impl<R: Repository> Timetables<R> {
    pub(crate) async fn timetable(
        &self,
        term: TermId,
        query: AssignmentQuery,
    ) -> Result<Vec<TimetableEntry>, SchedulingError> {
        self.inner.repo.term(term).await?;
        let assignments = self
            .inner
            .repo
            .assignments(&AssignmentQuery {
                term: Some(term),
                active_only: true,
                ..query
            })
            .await?;
        Ok(entries(assignments, &self.slot_map().await?))
    }

    /// A class's lessons ordered by (day, period), optionally only those
    /// effective on `date`.
    pub async fn class_timetable(
        &self,
        class: ClassId,
        term: TermId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<TimetableEntry>, SchedulingError> {
        self.inner.repo.class(class).await?;
        self.timetable(
            term,
            AssignmentQuery {
                class: Some(class),
                date,
                ..AssignmentQuery::default()
            },
        )
        .await
    }

    pub async fn teacher_timetable(
        &self,
        teacher: TeacherId,
        term: TermId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<TimetableEntry>, SchedulingError> {
        self.inner.repo.teacher(teacher).await?;
        self.timetable(
            term,
            AssignmentQuery {
                teacher: Some(teacher),
                date,
                ..AssignmentQuery::default()
            },
        )
        .await
    }

    /// Conflicts a hypothetical session would have with the committed
    /// schedule. The existing assignment is the first party of each.
    pub async fn check_conflicts(
        &self,
        probe: &ConflictProbe,
    ) -> Result<Vec<Conflict>, SchedulingError> {
        let existing = self
            .inner
            .repo
            .assignments(&AssignmentQuery {
                time_slot: probe.time_slot,
                active_only: true,
                ..AssignmentQuery::default()
            })
            .await?;
        let sessions = sessions_of(&existing, &self.slot_map().await?);
        Ok(conflicts::probe(&sessions, probe))
    }

    /// Active teachers authorized for `subject` (and `class`, when given)
    /// in a term covering `date`, who are free in `slot` that day.
    pub async fn available_teachers(
        &self,
        slot: TimeSlotId,
        subject: SubjectId,
        date: NaiveDate,
        class: Option<ClassId>,
    ) -> Result<Vec<Teacher>, SchedulingError> {
        let repo = &self.inner.repo;
        let slot = repo.time_slot(slot).await?;
        let mut authorized = BTreeSet::new();
        for term in repo.terms().await?.into_iter().filter(|t| t.contains(date)) {
            authorized.extend(
                repo.authorizations(term.id, &[])
                    .await?
                    .into_iter()
                    .filter(|a| a.subject == subject && class.map_or(true, |c| a.class == c))
                    .map(|a| a.teacher),
            );
        }
        let busy: BTreeSet<TeacherId> = self
            .sessions_on(&slot, date)
            .await?
            .into_iter()
            .map(|s| s.teacher)
            .collect();
        Ok(repo
            .teachers()
            .await?
            .into_iter()
            .filter(|t| t.is_active() && authorized.contains(&t.id) && !busy.contains(&t.id))
            .collect())
    }

    /// Available rooms not booked in `slot` on `date`, optionally of one
    /// type and at least `min_capacity` seats.
    pub async fn available_rooms(
        &self,
        slot: TimeSlotId,
        date: NaiveDate,
        room_type: Option<RoomType>,
        min_capacity: Option<u32>,
    ) -> Result<Vec<Room>, SchedulingError> {
        let repo = &self.inner.repo;
        let slot = repo.time_slot(slot).await?;
        let booked: BTreeSet<RoomId> = self
            .sessions_on(&slot, date)
            .await?
            .into_iter()
            .filter_map(|s| s.room)
            .collect();
        Ok(repo
            .rooms(true)
            .await?
            .into_iter()
            .filter(|r| room_type.map_or(true, |t| r.room_type == t))
            .filter(|r| min_capacity.map_or(true, |c| r.capacity >= c))
            .filter(|r| !booked.contains(&r.id))
            .collect())
    }

    /// Resolves `req` into an entry of `term`. The slot must be schedulable,
    /// the teacher active and authorized, any room available, and the dates
    /// (defaulting to the term bounds) inside the term.
    pub(crate) async fn admit(
        &self,
        term: &Term,
        req: &EntryRequest,
    ) -> Result<NewAssignment, SchedulingError> {
        let repo = &self.inner.repo;
        if req.term != term.id {
            return Err(SchedulingError::Validation(format!(
                "entry for term {} submitted to term {}",
                req.term, term.id
            )));
        }
        let slot = repo.time_slot(req.time_slot).await?;
        if !slot.is_schedulable() {
            return Err(SchedulingError::Validation(format!(
                "time slot {} is inactive or a break",
                slot.id
            )));
        }
        let teacher = repo.teacher(req.teacher).await?;
        if !teacher.is_active() {
            return Err(SchedulingError::TeacherUnavailable {
                teacher: teacher.id,
                reason: format!("status is {:?}", teacher.status),
            });
        }
        let authorized = repo
            .authorizations(term.id, &[])
            .await?
            .iter()
            .any(|a| a.teacher == req.teacher && a.class == req.class && a.subject == req.subject);
        if !authorized {
            return Err(SchedulingError::InvalidSubjectAssignment {
                teacher: req.teacher,
                class: req.class,
                subject: req.subject,
            });
        }
        if let Some(room) = req.room {
            let room = repo.room(room).await?;
            if !room.is_available {
                return Err(SchedulingError::RoomUnavailable {
                    room: room.id,
                    reason: "room is marked unavailable".into(),
                });
            }
        }

        let from = req.effective_from.unwrap_or(term.start_date);
        let to = req.effective_to.unwrap_or(term.end_date);
        if from > to || !term.contains(from) || !term.contains(to) {
            return Err(SchedulingError::Validation(format!(
                "effective range {from}..{to} is outside term {}",
                term.id
            )));
        }
        Ok(NewAssignment {
            class: req.class,
            subject: req.subject,
            teacher: req.teacher,
            time_slot: req.time_slot,
            room: req.room,
            term: term.id,
            effective_from: from,
            effective_to: to,
            created_by: req.created_by,
        })
    }

    /// Commits one assignment by hand after the same checks the optimizer
    /// output goes through.
    pub async fn create_entry(
        &self,
        req: EntryRequest,
    ) -> Result<ScheduledAssignment, SchedulingError> {
        let repo = &self.inner.repo;
        let _writes = self.inner.writes.lock().await;

        let term = repo.term(req.term).await?;
        let entry = self.admit(&term, &req).await?;
        let found = self
            .check_conflicts(&ConflictProbe {
                teacher: Some(entry.teacher),
                room: entry.room,
                class: Some(entry.class),
                time_slot: Some(entry.time_slot),
                date_range: Some(DateRange::new(entry.effective_from, entry.effective_to)),
                exclude: None,
            })
            .await?;
        if !found.is_empty() {
            return Err(SchedulingError::ConstraintViolation { conflicts: found });
        }

        let created = repo.insert_assignment(entry).await?;
        info!(
            assignment = %created.id,
            term = %term.id,
            class = %created.class,
            teacher = %created.teacher,
            time_slot = %created.time_slot,
            "timetable entry created"
        );
        Ok(created)
    }

    /// Double bookings are issues; missing rooms and teachers whose load
    /// is more than 50 % off the mean are warnings.
    pub async fn validate_term_schedule(
        &self,
        term: TermId,
    ) -> Result<ScheduleReport, SchedulingError> {
        let repo = &self.inner.repo;
        repo.term(term).await?;
        let assignments = repo.assignments(&AssignmentQuery::active_in_term(term)).await?;
        let issues = conflicts::detect(&sessions_of(&assignments, &self.slot_map().await?));

        let mut warnings = Vec::new();
        let roomless = assignments.iter().filter(|a| a.room.is_none()).count();
        if roomless > 0 {
            warnings.push(format!("{roomless} assignment(s) have no room"));
        }

        let mut loads: BTreeMap<TeacherId, usize> = BTreeMap::new();
        for a in &assignments {
            *loads.entry(a.teacher).or_default() += 1;
        }
        let teacher_loads: Vec<TeacherLoad> = loads
            .into_iter()
            .map(|(teacher, periods)| TeacherLoad { teacher, periods })
            .collect();
        if !teacher_loads.is_empty() {
            let mean = assignments.len() as f64 / teacher_loads.len() as f64;
            for l in &teacher_loads {
                let periods = l.periods as f64;
                if (periods - mean).abs() > mean * 0.5 {
                    warnings.push(format!(
                        "teacher {} has {} period(s) against a mean of {mean:.1}",
                        l.teacher, l.periods
                    ));
                }
            }
        }

        Ok(ScheduleReport {
            term,
            total_assignments: assignments.len(),
            is_valid: issues.is_empty(),
            issues,
            warnings,
            teacher_loads,
        })
    }
}

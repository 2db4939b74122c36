//! Whole-schedule edits: copying a term's timetable into another term,
//! bulk entry updates, and room booking calendars.

use std::collections::{BTreeMap, HashMap, HashSet};

use sched_core::catalog::sessions_of;
use sched_core::conflicts;
use sched_core::repo::{AssignmentQuery, ScheduleChanges};
use sched_core::{Repository, SchedulingError, SchedulingEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use types::{
    AssignmentId, ClassId, Conflict, DayOfWeek, GradeId, NewAssignment, RoomId,
    ScheduledAssignment, Session, TermId, TimeSlot, UserId,
};
use utoipa::ToSchema;

use crate::queries::{EntryRequest, TimetableEntry};
use crate::Timetables;

/// One line of a bulk update. With `id` the existing assignment is
/// rewritten in place, otherwise a new entry is added.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct BulkEntry {
    #[serde(default)]
    pub id: Option<AssignmentId>,
    #[serde(flatten)]
    pub entry: EntryRequest,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct BulkOutcome {
    pub term: TermId,
    pub updated: Vec<ScheduledAssignment>,
    pub created: Vec<ScheduledAssignment>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct CopyOutcome {
    pub source: TermId,
    pub target: TermId,
    pub copied: usize,
    /// Target entries of classes outside the copied grades, carried over.
    pub kept: usize,
    /// Target entries the copy replaced, carried ones included.
    pub removed: usize,
}

/// A room's bookings on one weekday, by period.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct RoomDay {
    pub day: DayOfWeek,
    pub bookings: Vec<TimetableEntry>,
}

fn session(id: Option<AssignmentId>, e: &NewAssignment, slot: &TimeSlot) -> Session {
    Session {
        assignment: id,
        required_slot: None,
        class: e.class,
        subject: e.subject,
        teacher: e.teacher,
        time_slot: e.time_slot,
        day: slot.day,
        period: slot.period,
        room: e.room,
        effective_from: e.effective_from,
        effective_to: e.effective_to,
    }
}

/// Clashes with at least one party outside `settled`. Clashes among
/// settled assignments predate the edit and do not block it.
fn fresh_conflicts(sessions: &[Session], settled: &HashSet<AssignmentId>) -> Vec<Conflict> {
    let is_settled = |id: Option<AssignmentId>| id.map_or(false, |id| settled.contains(&id));
    conflicts::detect(sessions)
        .into_iter()
        .filter(|c| !(is_settled(c.first.assignment) && is_settled(c.second.assignment)))
        .collect()
}

fn carried(a: &ScheduledAssignment) -> NewAssignment {
    NewAssignment {
        class: a.class,
        subject: a.subject,
        teacher: a.teacher,
        time_slot: a.time_slot,
        room: a.room,
        term: a.term,
        effective_from: a.effective_from,
        effective_to: a.effective_to,
        created_by: a.created_by,
    }
}

impl<R: Repository> Timetables<R> {
    /// Copies the active timetable of `source` into `target`, restricted to
    /// classes of `grades` (every grade when empty).
    ///
    /// Classes belong to a term, so each source class is matched to the
    /// target class with the same grade and name. Copies span the whole
    /// target term. The target's entries for the copied grades are
    /// replaced; its other entries are kept. The result must be free of
    /// double bookings, and nothing is written unless every entry can be
    /// copied.
    pub async fn copy_timetable_to_term(
        &self,
        source: TermId,
        target: TermId,
        grades: &[GradeId],
        actor: Option<UserId>,
    ) -> Result<CopyOutcome, SchedulingError> {
        let repo = &self.inner.repo;
        let _writes = self.inner.writes.lock().await;

        if source == target {
            return Err(SchedulingError::Validation(format!(
                "cannot copy term {source} onto itself"
            )));
        }
        repo.term(source).await?;
        let term = repo.term(target).await?;

        let copied_classes: HashMap<ClassId, (GradeId, String)> = repo
            .classes(source, grades)
            .await?
            .into_iter()
            .map(|c| (c.id, (c.grade, c.name)))
            .collect();
        let target_classes = repo.classes(target, &[]).await?;
        let replaced: HashSet<ClassId> = target_classes
            .iter()
            .filter(|c| grades.is_empty() || grades.contains(&c.grade))
            .map(|c| c.id)
            .collect();
        let counterparts: HashMap<(GradeId, String), ClassId> = target_classes
            .into_iter()
            .map(|c| ((c.grade, c.name), c.id))
            .collect();

        let mut entries = Vec::new();
        for a in repo.assignments(&AssignmentQuery::active_in_term(source)).await? {
            let Some(key) = copied_classes.get(&a.class) else {
                continue;
            };
            let class = counterparts.get(key).copied().ok_or_else(|| {
                SchedulingError::Validation(format!(
                    "class {} ({}) has no counterpart in term {target}",
                    a.class, key.1
                ))
            })?;
            entries.push(NewAssignment {
                class,
                subject: a.subject,
                teacher: a.teacher,
                time_slot: a.time_slot,
                room: a.room,
                term: target,
                effective_from: term.start_date,
                effective_to: term.end_date,
                created_by: actor,
            });
        }
        let copied = entries.len();
        let kept: Vec<NewAssignment> = repo
            .assignments(&AssignmentQuery::active_in_term(target))
            .await?
            .iter()
            .filter(|a| !replaced.contains(&a.class))
            .map(carried)
            .collect();
        let kept_count = kept.len();
        entries.extend(kept);

        let slots = self.slot_map().await?;
        let sessions: Vec<Session> = entries
            .iter()
            .filter_map(|e| Some(session(None, e, slots.get(&e.time_slot)?)))
            .collect();
        let found = conflicts::detect(&sessions);
        if !found.is_empty() {
            return Err(SchedulingError::ConstraintViolation { conflicts: found });
        }

        let out = repo.replace_term_schedule(target, entries).await?;
        info!(
            %source,
            %target,
            copied,
            kept = kept_count,
            removed = out.removed,
            "timetable copied"
        );
        self.inner.events.publish(SchedulingEvent::SchedulePersisted {
            term: target,
            removed: out.removed,
            created: out.created.len(),
        });
        Ok(CopyOutcome {
            source,
            target,
            copied,
            kept: kept_count,
            removed: out.removed,
        })
    }

    /// Applies a batch of entry rewrites and additions to `term`, all or
    /// nothing. Every line passes the manual-entry checks, and the batch
    /// may not double-book against itself or the rest of the schedule.
    pub async fn bulk_update_timetable(
        &self,
        term: TermId,
        lines: Vec<BulkEntry>,
        actor: Option<UserId>,
    ) -> Result<BulkOutcome, SchedulingError> {
        let repo = &self.inner.repo;
        let _writes = self.inner.writes.lock().await;

        let term = repo.term(term).await?;
        if lines.is_empty() {
            return Err(SchedulingError::Validation("bulk update has no entries".into()));
        }
        let mut changes = ScheduleChanges::default();
        for line in &lines {
            let mut entry = self.admit(&term, &line.entry).await?;
            entry.created_by = entry.created_by.or(actor);
            match line.id {
                Some(id) => changes.updates.push((id, entry)),
                None => changes.inserts.push(entry),
            }
        }

        let touched: HashSet<AssignmentId> = changes.updates.iter().map(|(id, _)| *id).collect();
        let existing = repo.assignments(&AssignmentQuery::active_in_term(term.id)).await?;
        let untouched: Vec<&ScheduledAssignment> =
            existing.iter().filter(|a| !touched.contains(&a.id)).collect();
        let settled: HashSet<AssignmentId> = untouched.iter().map(|a| a.id).collect();
        let slots = self.slot_map().await?;
        let mut sessions = sessions_of(untouched, &slots);
        for (id, e) in &changes.updates {
            if let Some(slot) = slots.get(&e.time_slot) {
                sessions.push(session(Some(*id), e, slot));
            }
        }
        for e in &changes.inserts {
            if let Some(slot) = slots.get(&e.time_slot) {
                sessions.push(session(None, e, slot));
            }
        }
        let found = fresh_conflicts(&sessions, &settled);
        if !found.is_empty() {
            return Err(SchedulingError::ConstraintViolation { conflicts: found });
        }

        let out = repo.apply_schedule_changes(term.id, changes).await?;
        info!(
            term = %term.id,
            updated = out.updated.len(),
            created = out.created.len(),
            "timetable bulk update applied"
        );
        self.inner.events.publish(SchedulingEvent::ScheduleEdited {
            term: term.id,
            updated: out.updated.len(),
            created: out.created.len(),
        });
        Ok(BulkOutcome {
            term: term.id,
            updated: out.updated,
            created: out.created,
        })
    }

    /// Active bookings of `room` in `term`, grouped by weekday and ordered
    /// by period. Days without bookings are left out.
    pub async fn room_booking_calendar(
        &self,
        room: RoomId,
        term: TermId,
    ) -> Result<Vec<RoomDay>, SchedulingError> {
        self.inner.repo.room(room).await?;
        let mut days: BTreeMap<DayOfWeek, Vec<TimetableEntry>> = BTreeMap::new();
        let bookings = self
            .timetable(
                term,
                AssignmentQuery {
                    room: Some(room),
                    ..AssignmentQuery::default()
                },
            )
            .await?;
        for entry in bookings {
            days.entry(entry.day).or_default().push(entry);
        }
        Ok(days
            .into_iter()
            .map(|(day, bookings)| RoomDay { day, bookings })
            .collect())
    }
}

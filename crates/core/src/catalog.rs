//! Read-only snapshot of everything one scheduling pass needs.
//!
//! Entities are stored by id in ordered maps and sorted vectors, so any
//! iteration over the snapshot is deterministic.

use std::collections::{BTreeMap, HashMap};

use types::{
    Class, ClassId, GradeId, PlacedSlot, Room, RoomId, RoomType, ScheduledAssignment,
    SchedulingConstraint, Session, Subject, SubjectId, Teacher, TeacherAssignment, TeacherId,
    Term, TimeSlot, TimeSlotId,
};

use crate::config::RulesConfig;
use crate::constraints::ConstraintSet;
use crate::error::SchedulingError;
use crate::priority;
use crate::repo::CatalogRepository;
use crate::validate;

#[derive(Clone, Debug)]
pub struct Catalog {
    pub term: Term,
    pub grades: Vec<GradeId>,
    /// Active, non-break slots ordered by (day, period).
    pub time_slots: Vec<TimeSlot>,
    /// Available rooms ordered by id.
    pub rooms: Vec<Room>,
    pub classes: BTreeMap<ClassId, Class>,
    pub subjects: BTreeMap<SubjectId, Subject>,
    pub teachers: BTreeMap<TeacherId, Teacher>,
    /// Active authorizations for classes in scope, ordered by (class, subject, teacher).
    pub authorizations: Vec<TeacherAssignment>,
    pub constraints: ConstraintSet,
    pub rules: RulesConfig,
    slot_index: HashMap<TimeSlotId, usize>,
    room_index: HashMap<RoomId, usize>,
}

/// Raw entities a [`Catalog`] is assembled from.
#[derive(Clone, Debug, Default)]
pub struct CatalogParts {
    pub grades: Vec<GradeId>,
    pub time_slots: Vec<TimeSlot>,
    pub rooms: Vec<Room>,
    pub classes: Vec<Class>,
    pub subjects: Vec<Subject>,
    pub teachers: Vec<Teacher>,
    pub authorizations: Vec<TeacherAssignment>,
    pub constraints: Vec<SchedulingConstraint>,
}

impl Catalog {
    /// Loads the snapshot for `term` restricted to `grades` (every grade when empty).
    pub async fn load<R: CatalogRepository + ?Sized>(
        repo: &R,
        term: types::TermId,
        grades: &[GradeId],
        rules: &RulesConfig,
    ) -> Result<Self, SchedulingError> {
        let term = repo.term(term).await?;
        for g in grades {
            repo.grade(*g).await?;
        }
        let parts = CatalogParts {
            grades: grades.to_vec(),
            time_slots: repo.time_slots(false).await?,
            rooms: repo.rooms(false).await?,
            classes: repo.classes(term.id, grades).await?,
            subjects: repo.subjects().await?,
            teachers: repo.teachers().await?,
            authorizations: repo.authorizations(term.id, grades).await?,
            constraints: repo.constraints(true).await?,
        };
        Self::from_parts(term, parts, rules.clone())
    }

    /// Validates and indexes the parts. Inactive or break slots, unavailable
    /// rooms and inactive constraints are dropped after validation.
    pub fn from_parts(
        term: Term,
        parts: CatalogParts,
        rules: RulesConfig,
    ) -> Result<Self, SchedulingError> {
        let active_constraints: Vec<SchedulingConstraint> =
            parts.constraints.into_iter().filter(|c| c.is_active).collect();
        validate::validate(&term, &parts.time_slots, &parts.rooms, &active_constraints)?;
        let constraints = ConstraintSet::from_records(&active_constraints, &rules)?;

        let mut time_slots: Vec<TimeSlot> = parts
            .time_slots
            .into_iter()
            .filter(|s| s.is_schedulable())
            .collect();
        time_slots.sort_by_key(|s| (s.day, s.period, s.id));

        let mut rooms: Vec<Room> = parts.rooms.into_iter().filter(|r| r.is_available).collect();
        rooms.sort_by_key(|r| r.id);

        let classes: BTreeMap<ClassId, Class> = parts
            .classes
            .into_iter()
            .filter(|c| c.term == term.id)
            .filter(|c| parts.grades.is_empty() || parts.grades.contains(&c.grade))
            .map(|c| (c.id, c))
            .collect();
        let subjects: BTreeMap<SubjectId, Subject> =
            parts.subjects.into_iter().map(|s| (s.id, s)).collect();
        let teachers: BTreeMap<TeacherId, Teacher> =
            parts.teachers.into_iter().map(|t| (t.id, t)).collect();

        let mut authorizations: Vec<TeacherAssignment> = Vec::new();
        for a in parts.authorizations {
            if !a.is_active || a.term != term.id || !classes.contains_key(&a.class) {
                continue;
            }
            if !subjects.contains_key(&a.subject) {
                return Err(SchedulingError::not_found("subject", a.subject));
            }
            if !teachers.contains_key(&a.teacher) {
                return Err(SchedulingError::not_found("teacher", a.teacher));
            }
            authorizations.push(a);
        }
        authorizations.sort_by_key(|a| (a.class, a.subject, a.teacher, a.id));

        let slot_index = time_slots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let room_index = rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

        Ok(Self {
            term,
            grades: parts.grades,
            time_slots,
            rooms,
            classes,
            subjects,
            teachers,
            authorizations,
            constraints,
            rules,
            slot_index,
            room_index,
        })
    }

    pub fn slot(&self, id: TimeSlotId) -> Option<&TimeSlot> {
        self.slot_index.get(&id).map(|&i| &self.time_slots[i])
    }

    pub fn slot_position(&self, id: TimeSlotId) -> Option<usize> {
        self.slot_index.get(&id).copied()
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.room_index.get(&id).map(|&i| &self.rooms[i])
    }

    pub fn room_position(&self, id: RoomId) -> Option<usize> {
        self.room_index.get(&id).copied()
    }

    pub fn room_type(&self, id: RoomId) -> Option<RoomType> {
        self.room(id).map(|r| r.room_type)
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(&id)
    }

    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.get(&id)
    }

    pub fn teacher(&self, id: TeacherId) -> Option<&Teacher> {
        self.teachers.get(&id)
    }

    pub fn subject_priority(&self, id: SubjectId) -> u8 {
        self.subject(id)
            .map(|s| priority::subject_priority(&s.name))
            .unwrap_or(priority::DEFAULT_PRIORITY)
    }

    /// Subject-specific room types. Empty means an ordinary classroom will do.
    pub fn preferred_room_types(&self, id: SubjectId) -> Vec<RoomType> {
        self.subject(id)
            .map(|s| preferred_room_types(s, &self.constraints))
            .unwrap_or_default()
    }

    pub fn is_authorized(&self, teacher: TeacherId, class: ClassId, subject: SubjectId) -> bool {
        self.authorizations
            .iter()
            .any(|a| a.teacher == teacher && a.class == class && a.subject == subject)
    }

    /// Session for a placement, effective over the whole term.
    pub fn session_for(&self, p: &PlacedSlot) -> Session {
        Session {
            assignment: None,
            required_slot: Some(p.slot.index),
            class: p.slot.class,
            subject: p.slot.subject,
            teacher: p.slot.teacher,
            time_slot: p.time_slot,
            day: p.day,
            period: p.period,
            room: p.room,
            effective_from: self.term.start_date,
            effective_to: self.term.end_date,
        }
    }

    pub fn sessions_for(&self, placed: &[PlacedSlot]) -> Vec<Session> {
        placed.iter().map(|p| self.session_for(p)).collect()
    }
}

/// The subject's own preference, every room requirement naming it, then the
/// conventional types for its name when neither says anything.
pub fn preferred_room_types(subject: &Subject, constraints: &ConstraintSet) -> Vec<RoomType> {
    let mut out: Vec<RoomType> = subject.preferred_room_type.into_iter().collect();
    for t in constraints.required_room_types(subject.id) {
        if !out.contains(&t) {
            out.push(t);
        }
    }
    if out.is_empty() {
        if let Some(conventional) = priority::conventional_room_types(&subject.name) {
            out.extend_from_slice(conventional);
        }
    }
    out
}

/// Resolves committed assignments to sessions. Assignments whose slot is
/// unknown to `slots` are skipped.
pub fn sessions_of<'a>(
    assignments: impl IntoIterator<Item = &'a ScheduledAssignment>,
    slots: &HashMap<TimeSlotId, TimeSlot>,
) -> Vec<Session> {
    assignments
        .into_iter()
        .filter(|a| a.is_active)
        .filter_map(|a| {
            let slot = slots.get(&a.time_slot)?;
            Some(Session {
                assignment: Some(a.id),
                required_slot: None,
                class: a.class,
                subject: a.subject,
                teacher: a.teacher,
                time_slot: a.time_slot,
                day: slot.day,
                period: slot.period,
                room: a.room,
                effective_from: a.effective_from,
                effective_to: a.effective_to,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn snapshot_is_ordered_and_filtered() {
        let (term, mut parts) = testing::small_school();
        parts.time_slots.reverse();
        let mut brk = parts.time_slots[0].clone();
        brk.id = TimeSlotId(99);
        brk.period = 9;
        brk.start = chrono::NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        brk.end = chrono::NaiveTime::from_hms_opt(15, 15, 0).unwrap();
        brk.duration_minutes = 15;
        brk.is_break = true;
        parts.time_slots.push(brk);

        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        assert!(cat.slot(TimeSlotId(99)).is_none());
        let periods: Vec<u32> = cat.time_slots.iter().map(|s| s.period).collect();
        assert_eq!(periods, vec![1, 2, 3]);
        assert!(cat.is_authorized(TeacherId(1), ClassId(1), SubjectId(1)));
        assert!(!cat.is_authorized(TeacherId(2), ClassId(1), SubjectId(1)));
        assert_eq!(cat.subject_priority(SubjectId(1)), 9);
    }

    #[test]
    fn authorization_to_unknown_teacher_is_rejected() {
        let (term, mut parts) = testing::small_school();
        parts.authorizations[0].teacher = TeacherId(404);
        let err = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}

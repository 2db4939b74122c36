use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sched_core::repo::{
    AssignmentQuery, CatalogRepository, ChangesOutcome, ReplaceOutcome, RunRepository,
    ScheduleChanges, ScheduleRepository, SubstituteQuery, SubstituteRepository,
};
use sched_core::{RepositoryError, RepositoryResult};
use tracing::{debug, info};
use types::{
    AssignmentId, AuthorizationId, Class, ClassId, ConstraintId, GenerationRun, Grade, GradeId,
    NewAssignment, NewSubstitute, Room, RoomId, RunId, RunStatus, ScheduledAssignment,
    SchedulingConstraint, Subject, SubjectId, SubstituteAssignment, SubstituteId, Teacher,
    TeacherAssignment, TeacherId, Term, TermId, TimeSlot, TimeSlotId, UserId,
};

use crate::fixture::{Fixture, FixtureError};

/// Repository backed by ordered maps behind one lock. Every write takes the
/// lock once, validates, then mutates, so a failed write changes nothing.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<StoreData>>,
}

#[derive(Default)]
struct StoreData {
    terms: BTreeMap<TermId, Term>,
    grades: BTreeMap<GradeId, Grade>,
    classes: BTreeMap<ClassId, Class>,
    subjects: BTreeMap<SubjectId, Subject>,
    teachers: BTreeMap<TeacherId, Teacher>,
    authorizations: BTreeMap<AuthorizationId, TeacherAssignment>,
    time_slots: BTreeMap<TimeSlotId, TimeSlot>,
    rooms: BTreeMap<RoomId, Room>,
    constraints: BTreeMap<ConstraintId, SchedulingConstraint>,
    assignments: BTreeMap<AssignmentId, ScheduledAssignment>,
    substitutes: BTreeMap<SubstituteId, SubstituteAssignment>,
    runs: HashMap<RunId, GenerationRun>,
    revisions: HashMap<TermId, u64>,
    next_assignment: u64,
    next_substitute: u64,
}

impl StoreData {
    fn bump(&mut self, term: TermId) {
        *self.revisions.entry(term).or_default() += 1;
    }

    fn check_entry(&self, e: &NewAssignment) -> RepositoryResult<()> {
        let term = self
            .terms
            .get(&e.term)
            .ok_or_else(|| RepositoryError::not_found("term", e.term))?;
        let class = self
            .classes
            .get(&e.class)
            .ok_or_else(|| RepositoryError::not_found("class", e.class))?;
        if class.term != e.term {
            return Err(RepositoryError::Validation(format!(
                "class {} does not belong to term {}",
                e.class, e.term
            )));
        }
        if !self.subjects.contains_key(&e.subject) {
            return Err(RepositoryError::not_found("subject", e.subject));
        }
        if !self.teachers.contains_key(&e.teacher) {
            return Err(RepositoryError::not_found("teacher", e.teacher));
        }
        if !self.time_slots.contains_key(&e.time_slot) {
            return Err(RepositoryError::not_found("time slot", e.time_slot));
        }
        if let Some(room) = e.room {
            if !self.rooms.contains_key(&room) {
                return Err(RepositoryError::not_found("room", room));
            }
        }
        if e.effective_from > e.effective_to
            || !term.contains(e.effective_from)
            || !term.contains(e.effective_to)
        {
            return Err(RepositoryError::Validation(format!(
                "effective range {}..{} is outside term {}",
                e.effective_from, e.effective_to, e.term
            )));
        }
        Ok(())
    }

    fn replace(
        &mut self,
        term: TermId,
        entries: Vec<NewAssignment>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<ReplaceOutcome> {
        if !self.terms.contains_key(&term) {
            return Err(RepositoryError::not_found("term", term));
        }
        for e in &entries {
            if e.term != term {
                return Err(RepositoryError::Validation(format!(
                    "entry for term {} in replacement of term {term}",
                    e.term
                )));
            }
            self.check_entry(e)?;
        }

        let before = self.assignments.len();
        self.assignments.retain(|_, a| !(a.term == term && a.is_active));
        let removed = before - self.assignments.len();
        let created = entries
            .into_iter()
            .map(|e| self.insert_entry(e, now))
            .collect::<Vec<_>>();
        self.bump(term);
        debug!(%term, removed, created = created.len(), "term schedule replaced");
        Ok(ReplaceOutcome { removed, created })
    }

    fn apply(
        &mut self,
        term: TermId,
        changes: ScheduleChanges,
        now: DateTime<Utc>,
    ) -> RepositoryResult<ChangesOutcome> {
        if !self.terms.contains_key(&term) {
            return Err(RepositoryError::not_found("term", term));
        }
        let mut seen = HashSet::new();
        for (id, _) in &changes.updates {
            let current = self
                .assignments
                .get(id)
                .ok_or_else(|| RepositoryError::not_found("assignment", *id))?;
            if current.term != term || !current.is_active {
                return Err(RepositoryError::Validation(format!(
                    "assignment {id} is not an active entry of term {term}"
                )));
            }
            if !seen.insert(*id) {
                return Err(RepositoryError::Validation(format!(
                    "assignment {id} is updated twice"
                )));
            }
        }
        for e in changes.updates.iter().map(|(_, e)| e).chain(&changes.inserts) {
            if e.term != term {
                return Err(RepositoryError::Validation(format!(
                    "entry for term {} in changes to term {term}",
                    e.term
                )));
            }
            self.check_entry(e)?;
        }

        let mut updated = Vec::with_capacity(changes.updates.len());
        for (id, e) in changes.updates {
            if let Some(a) = self.assignments.get_mut(&id) {
                a.class = e.class;
                a.subject = e.subject;
                a.teacher = e.teacher;
                a.time_slot = e.time_slot;
                a.room = e.room;
                a.effective_from = e.effective_from;
                a.effective_to = e.effective_to;
                updated.push(a.clone());
            }
        }
        let created: Vec<_> = changes
            .inserts
            .into_iter()
            .map(|e| self.insert_entry(e, now))
            .collect();
        self.bump(term);
        debug!(%term, updated = updated.len(), created = created.len(), "term schedule changed");
        Ok(ChangesOutcome { updated, created })
    }

    fn check_run_update(&self, run: &GenerationRun) -> RepositoryResult<()> {
        let current = self
            .runs
            .get(&run.id)
            .ok_or_else(|| RepositoryError::not_found("run", run.id))?;
        if !current.same_identity(run) {
            return Err(RepositoryError::Validation(format!(
                "run {} may only change its status and results",
                run.id
            )));
        }
        if !current.status.can_transition_to(run.status) {
            return Err(RepositoryError::InvalidTransition {
                id: run.id,
                from: current.status,
                to: run.status,
            });
        }
        Ok(())
    }

    fn insert_entry(&mut self, e: NewAssignment, now: DateTime<Utc>) -> ScheduledAssignment {
        self.next_assignment += 1;
        let a = ScheduledAssignment {
            id: AssignmentId(self.next_assignment),
            class: e.class,
            subject: e.subject,
            teacher: e.teacher,
            time_slot: e.time_slot,
            room: e.room,
            term: e.term,
            effective_from: e.effective_from,
            effective_to: e.effective_to,
            is_active: true,
            created_by: e.created_by,
            created_at: now,
        };
        self.assignments.insert(a.id, a.clone());
        a
    }
}

fn get<K: Ord + std::fmt::Display, V: Clone>(
    map: &BTreeMap<K, V>,
    entity: &'static str,
    id: K,
) -> RepositoryResult<V> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| RepositoryError::not_found(entity, id))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_fixture(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        Ok(Self::from_fixture(Fixture::load(path)?))
    }

    pub fn from_fixture(f: Fixture) -> Self {
        let store = Self::new();
        {
            let mut d = store.data.write();
            d.terms = f.terms.into_iter().map(|x| (x.id, x)).collect();
            d.grades = f.grades.into_iter().map(|x| (x.id, x)).collect();
            d.classes = f.classes.into_iter().map(|x| (x.id, x)).collect();
            d.subjects = f.subjects.into_iter().map(|x| (x.id, x)).collect();
            d.teachers = f.teachers.into_iter().map(|x| (x.id, x)).collect();
            d.authorizations = f.authorizations.into_iter().map(|x| (x.id, x)).collect();
            d.time_slots = f.time_slots.into_iter().map(|x| (x.id, x)).collect();
            d.rooms = f.rooms.into_iter().map(|x| (x.id, x)).collect();
            d.constraints = f.constraints.into_iter().map(|x| (x.id, x)).collect();
            d.next_assignment = f.assignments.iter().map(|a| a.id.0).max().unwrap_or(0);
            d.assignments = f.assignments.into_iter().map(|x| (x.id, x)).collect();
            d.next_substitute = f.substitutes.iter().map(|s| s.id.0).max().unwrap_or(0);
            d.substitutes = f.substitutes.into_iter().map(|x| (x.id, x)).collect();
            info!(
                terms = d.terms.len(),
                classes = d.classes.len(),
                teachers = d.teachers.len(),
                assignments = d.assignments.len(),
                "store seeded from fixture"
            );
        }
        store
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn term(&self, id: TermId) -> RepositoryResult<Term> {
        get(&self.data.read().terms, "term", id)
    }

    async fn terms(&self) -> RepositoryResult<Vec<Term>> {
        Ok(self.data.read().terms.values().cloned().collect())
    }

    async fn grade(&self, id: GradeId) -> RepositoryResult<Grade> {
        get(&self.data.read().grades, "grade", id)
    }

    async fn classes(&self, term: TermId, grades: &[GradeId]) -> RepositoryResult<Vec<Class>> {
        Ok(self
            .data
            .read()
            .classes
            .values()
            .filter(|c| c.term == term && (grades.is_empty() || grades.contains(&c.grade)))
            .cloned()
            .collect())
    }

    async fn class(&self, id: ClassId) -> RepositoryResult<Class> {
        get(&self.data.read().classes, "class", id)
    }

    async fn subjects(&self) -> RepositoryResult<Vec<Subject>> {
        Ok(self.data.read().subjects.values().cloned().collect())
    }

    async fn subject(&self, id: SubjectId) -> RepositoryResult<Subject> {
        get(&self.data.read().subjects, "subject", id)
    }

    async fn teachers(&self) -> RepositoryResult<Vec<Teacher>> {
        Ok(self.data.read().teachers.values().cloned().collect())
    }

    async fn teacher(&self, id: TeacherId) -> RepositoryResult<Teacher> {
        get(&self.data.read().teachers, "teacher", id)
    }

    async fn authorizations(
        &self,
        term: TermId,
        grades: &[GradeId],
    ) -> RepositoryResult<Vec<TeacherAssignment>> {
        let d = self.data.read();
        Ok(d.authorizations
            .values()
            .filter(|a| a.is_active && a.term == term)
            .filter(|a| {
                grades.is_empty()
                    || d.classes
                        .get(&a.class)
                        .is_some_and(|c| grades.contains(&c.grade))
            })
            .cloned()
            .collect())
    }

    async fn time_slots(&self, schedulable_only: bool) -> RepositoryResult<Vec<TimeSlot>> {
        let mut slots: Vec<TimeSlot> = self
            .data
            .read()
            .time_slots
            .values()
            .filter(|s| !schedulable_only || s.is_schedulable())
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.day, s.period, s.id));
        Ok(slots)
    }

    async fn time_slot(&self, id: TimeSlotId) -> RepositoryResult<TimeSlot> {
        get(&self.data.read().time_slots, "time slot", id)
    }

    async fn rooms(&self, available_only: bool) -> RepositoryResult<Vec<Room>> {
        Ok(self
            .data
            .read()
            .rooms
            .values()
            .filter(|r| !available_only || r.is_available)
            .cloned()
            .collect())
    }

    async fn room(&self, id: RoomId) -> RepositoryResult<Room> {
        get(&self.data.read().rooms, "room", id)
    }

    async fn constraints(&self, active_only: bool) -> RepositoryResult<Vec<SchedulingConstraint>> {
        Ok(self
            .data
            .read()
            .constraints
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleRepository for MemoryStore {
    async fn assignments(
        &self,
        query: &AssignmentQuery,
    ) -> RepositoryResult<Vec<ScheduledAssignment>> {
        Ok(self
            .data
            .read()
            .assignments
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect())
    }

    async fn assignment(&self, id: AssignmentId) -> RepositoryResult<ScheduledAssignment> {
        get(&self.data.read().assignments, "assignment", id)
    }

    async fn replace_term_schedule(
        &self,
        term: TermId,
        entries: Vec<NewAssignment>,
    ) -> RepositoryResult<ReplaceOutcome> {
        self.data.write().replace(term, entries, Utc::now())
    }

    async fn apply_schedule_changes(
        &self,
        term: TermId,
        changes: ScheduleChanges,
    ) -> RepositoryResult<ChangesOutcome> {
        self.data.write().apply(term, changes, Utc::now())
    }

    async fn insert_assignment(
        &self,
        entry: NewAssignment,
    ) -> RepositoryResult<ScheduledAssignment> {
        let mut d = self.data.write();
        d.check_entry(&entry)?;
        let term = entry.term;
        let a = d.insert_entry(entry, Utc::now());
        d.bump(term);
        Ok(a)
    }

    async fn schedule_revision(&self, term: TermId) -> RepositoryResult<u64> {
        Ok(self.data.read().revisions.get(&term).copied().unwrap_or(0))
    }
}

#[async_trait]
impl RunRepository for MemoryStore {
    async fn create_run(&self, run: GenerationRun) -> RepositoryResult<GenerationRun> {
        let mut d = self.data.write();
        if !d.terms.contains_key(&run.term) {
            return Err(RepositoryError::not_found("term", run.term));
        }
        if d.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("run {} already exists", run.id)));
        }
        if d.runs.values().any(|r| r.term == run.term && r.status.is_active()) {
            return Err(RepositoryError::ActiveRun(run.term));
        }
        d.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn run(&self, id: RunId) -> RepositoryResult<GenerationRun> {
        self.data
            .read()
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("run", id))
    }

    async fn update_run(&self, run: GenerationRun) -> RepositoryResult<GenerationRun> {
        let mut d = self.data.write();
        d.check_run_update(&run)?;
        d.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn commit_run(
        &self,
        mut run: GenerationRun,
        entries: Vec<NewAssignment>,
    ) -> RepositoryResult<(GenerationRun, ReplaceOutcome)> {
        let mut d = self.data.write();
        let current = d
            .runs
            .get(&run.id)
            .map(|r| r.status)
            .ok_or_else(|| RepositoryError::not_found("run", run.id))?;
        if current != RunStatus::Running || run.status != RunStatus::Completed {
            return Err(RepositoryError::InvalidTransition {
                id: run.id,
                from: current,
                to: run.status,
            });
        }
        d.check_run_update(&run)?;
        let outcome = d.replace(run.term, entries, Utc::now())?;
        if let Some(summary) = run.result_summary.as_mut() {
            summary.created = outcome.created.len();
            summary.removed = outcome.removed;
        }
        d.runs.insert(run.id, run.clone());
        Ok((run, outcome))
    }

    async fn runs_for_term(&self, term: TermId) -> RepositoryResult<Vec<GenerationRun>> {
        let mut runs: Vec<GenerationRun> = self
            .data
            .read()
            .runs
            .values()
            .filter(|r| r.term == term)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn active_runs(&self) -> RepositoryResult<Vec<GenerationRun>> {
        let mut runs: Vec<GenerationRun> = self
            .data
            .read()
            .runs
            .values()
            .filter(|r| r.status.is_active())
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let mut d = self.data.write();
        let before = d.runs.len();
        d.runs
            .retain(|_, r| !(r.status.is_terminal() && r.created_at < cutoff));
        Ok(before - d.runs.len())
    }
}

#[async_trait]
impl SubstituteRepository for MemoryStore {
    async fn create_substitute(
        &self,
        new: NewSubstitute,
    ) -> RepositoryResult<SubstituteAssignment> {
        let mut d = self.data.write();
        let term = d
            .assignments
            .get(&new.original)
            .map(|a| a.term)
            .ok_or_else(|| RepositoryError::not_found("assignment", new.original))?;
        if !d.teachers.contains_key(&new.substitute) {
            return Err(RepositoryError::not_found("teacher", new.substitute));
        }
        if d
            .substitutes
            .values()
            .any(|s| s.original == new.original && s.date == new.date)
        {
            return Err(RepositoryError::Conflict(format!(
                "assignment {} already has a substitute on {}",
                new.original, new.date
            )));
        }
        d.next_substitute += 1;
        let s = SubstituteAssignment {
            id: SubstituteId(d.next_substitute),
            original: new.original,
            substitute: new.substitute,
            date: new.date,
            reason: new.reason,
            notes: new.notes,
            approver: None,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        d.substitutes.insert(s.id, s.clone());
        d.bump(term);
        Ok(s)
    }

    async fn substitute(&self, id: SubstituteId) -> RepositoryResult<SubstituteAssignment> {
        get(&self.data.read().substitutes, "substitute", id)
    }

    async fn substitutes(
        &self,
        query: &SubstituteQuery,
    ) -> RepositoryResult<Vec<SubstituteAssignment>> {
        Ok(self
            .data
            .read()
            .substitutes
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    async fn approve_substitute(
        &self,
        id: SubstituteId,
        approver: UserId,
    ) -> RepositoryResult<SubstituteAssignment> {
        let mut d = self.data.write();
        let original = d
            .substitutes
            .get(&id)
            .map(|s| s.original)
            .ok_or_else(|| RepositoryError::not_found("substitute", id))?;
        let term = d.assignments.get(&original).map(|a| a.term);
        let Some(s) = d.substitutes.get_mut(&id) else {
            return Err(RepositoryError::not_found("substitute", id));
        };
        if let Some(by) = s.approver {
            return Err(RepositoryError::Conflict(format!(
                "substitute {id} is already approved by {by}"
            )));
        }
        s.approver = Some(approver);
        let approved = s.clone();
        if let Some(term) = term {
            d.bump(term);
        }
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::testing;
    use types::GenerationRequest;

    fn store() -> MemoryStore {
        let (term, parts) = testing::small_school();
        MemoryStore::from_fixture(Fixture::from_parts(term, parts))
    }

    fn entry(slot: u64, subject: u64, teacher: u64) -> NewAssignment {
        NewAssignment {
            class: ClassId(1),
            subject: SubjectId(subject),
            teacher: TeacherId(teacher),
            time_slot: TimeSlotId(slot),
            room: Some(RoomId(1)),
            term: TermId(1),
            effective_from: testing::date(2024, 4, 1),
            effective_to: testing::date(2024, 7, 31),
            created_by: None,
        }
    }

    fn run_for(term: u64) -> GenerationRun {
        let now = Utc::now();
        GenerationRun::new(
            GenerationRequest {
                term: TermId(term),
                grades: vec![GradeId(1)],
                algorithm: Default::default(),
                params: Default::default(),
            },
            None,
            now,
            now + chrono::Duration::hours(2),
        )
    }

    #[tokio::test]
    async fn replacement_is_all_or_nothing() {
        let s = store();
        let first = s
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1), entry(2, 1, 1)])
            .await
            .unwrap();
        assert_eq!(first.removed, 0);
        assert_eq!(first.created.len(), 2);
        let rev = s.schedule_revision(TermId(1)).await.unwrap();

        let bad = vec![entry(3, 2, 2), entry(404, 1, 1)];
        let err = s.replace_term_schedule(TermId(1), bad).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        let kept = s.assignments(&AssignmentQuery::active_in_term(TermId(1))).await.unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(s.schedule_revision(TermId(1)).await.unwrap(), rev);

        let second = s.replace_term_schedule(TermId(1), vec![entry(3, 2, 2)]).await.unwrap();
        assert_eq!(second.removed, 2);
        assert!(s.schedule_revision(TermId(1)).await.unwrap() > rev);
    }

    #[tokio::test]
    async fn changes_keep_ids_and_fail_whole() {
        let s = store();
        let first = s
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1)])
            .await
            .unwrap();
        let id = first.created[0].id;
        let rev = s.schedule_revision(TermId(1)).await.unwrap();

        let bad = ScheduleChanges {
            updates: vec![(id, entry(2, 1, 1))],
            inserts: vec![entry(404, 2, 2)],
        };
        let err = s.apply_schedule_changes(TermId(1), bad).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(s.assignment(id).await.unwrap().time_slot, TimeSlotId(1));
        assert_eq!(s.schedule_revision(TermId(1)).await.unwrap(), rev);

        let twice = ScheduleChanges {
            updates: vec![(id, entry(2, 1, 1)), (id, entry(3, 1, 1))],
            inserts: vec![],
        };
        let err = s.apply_schedule_changes(TermId(1), twice).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        let ok = ScheduleChanges {
            updates: vec![(id, entry(2, 1, 1))],
            inserts: vec![entry(3, 2, 2)],
        };
        let out = s.apply_schedule_changes(TermId(1), ok).await.unwrap();
        assert_eq!(out.updated[0].id, id);
        assert_eq!(out.updated[0].time_slot, TimeSlotId(2));
        assert_eq!(out.updated[0].created_at, first.created[0].created_at);
        assert_eq!(out.created.len(), 1);
        let active = s.assignments(&AssignmentQuery::active_in_term(TermId(1))).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(s.schedule_revision(TermId(1)).await.unwrap() > rev);
    }

    #[tokio::test]
    async fn entries_outside_the_term_are_rejected() {
        let s = store();
        let mut e = entry(1, 1, 1);
        e.effective_to = testing::date(2024, 9, 1);
        let err = s.insert_assignment(e).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn one_active_run_per_term() {
        let s = store();
        let mut run = s.create_run(run_for(1)).await.unwrap();
        let err = s.create_run(run_for(1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ActiveRun(TermId(1))));

        run.status = RunStatus::Running;
        let mut run = s.update_run(run).await.unwrap();
        run.status = RunStatus::Completed;
        let run = s.update_run(run).await.unwrap();
        s.create_run(run_for(1)).await.unwrap();

        let mut back = run.clone();
        back.status = RunStatus::Running;
        let err = s.update_run(back).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));

        let mut renamed = run;
        renamed.grades = vec![];
        assert!(matches!(
            s.update_run(renamed).await.unwrap_err(),
            RepositoryError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn commit_needs_a_running_run() {
        let s = store();
        s.replace_term_schedule(TermId(1), vec![entry(1, 1, 1)]).await.unwrap();
        let mut run = s.create_run(run_for(1)).await.unwrap();
        run.status = RunStatus::Running;
        let running = s.update_run(run).await.unwrap();

        // swept past its deadline before the worker could commit
        let mut swept = running.clone();
        swept.status = RunStatus::Failed;
        s.update_run(swept).await.unwrap();
        let rev = s.schedule_revision(TermId(1)).await.unwrap();

        let mut done = running;
        done.status = RunStatus::Completed;
        done.result_summary = Some(Default::default());
        let err = s.commit_run(done.clone(), vec![entry(2, 2, 2)]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
        let kept = s.assignments(&AssignmentQuery::active_in_term(TermId(1))).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].time_slot, TimeSlotId(1));
        assert_eq!(s.schedule_revision(TermId(1)).await.unwrap(), rev);
        assert_eq!(s.run(done.id).await.unwrap().status, RunStatus::Failed);

        let mut next = s.create_run(run_for(1)).await.unwrap();
        next.status = RunStatus::Running;
        let mut next = s.update_run(next).await.unwrap();
        next.status = RunStatus::Completed;
        next.result_summary = Some(Default::default());
        let (stored, outcome) = s.commit_run(next, vec![entry(2, 2, 2)]).await.unwrap();
        assert_eq!((outcome.removed, outcome.created.len()), (1, 1));
        let summary = stored.result_summary.unwrap();
        assert_eq!((summary.removed, summary.created), (1, 1));
        assert_eq!(s.run(stored.id).await.unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn retention_keeps_active_runs() {
        let s = store();
        let mut done = s.create_run(run_for(1)).await.unwrap();
        done.status = RunStatus::Cancelled;
        s.update_run(done).await.unwrap();
        s.create_run(run_for(1)).await.unwrap();

        let removed = s
            .delete_runs_before(Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(s.active_runs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn substitutes_are_unique_per_date() {
        let s = store();
        let a = s.insert_assignment(entry(1, 1, 1)).await.unwrap();
        let new = NewSubstitute {
            original: a.id,
            substitute: TeacherId(2),
            date: testing::date(2024, 4, 8),
            reason: "sick".into(),
            notes: String::new(),
            created_by: None,
        };
        let sub = s.create_substitute(new.clone()).await.unwrap();
        assert!(matches!(
            s.create_substitute(new).await.unwrap_err(),
            RepositoryError::Conflict(_)
        ));
        let approved = s.approve_substitute(sub.id, UserId(7)).await.unwrap();
        assert_eq!(approved.approver, Some(UserId(7)));
        assert!(matches!(
            s.approve_substitute(sub.id, UserId(8)).await.unwrap_err(),
            RepositoryError::Conflict(_)
        ));
        assert_eq!(s.substitute(sub.id).await.unwrap().approver, Some(UserId(7)));
    }
}

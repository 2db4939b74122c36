//! Read side of the committed schedule: timetables, conflict probes,
//! availability, manual and bulk entries, term copies, substitutes,
//! analytics and room suggestions.

pub mod analytics;
pub mod bulk;
mod cache;
pub mod queries;
pub mod rooms;
pub mod substitutes;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use sched_core::config::RulesConfig;
use sched_core::repo::{AssignmentQuery, SubstituteQuery};
use sched_core::{EventSink, Repository, RepositoryError, SchedulingError};
use tracing::debug;
use types::{Session, TeacherId, TermId, TimeSlot, TimeSlotId};

use crate::analytics::{ScheduleSnapshot, TermAnalytics};
use crate::cache::AnalyticsCache;

pub use bulk::{BulkEntry, BulkOutcome, CopyOutcome, RoomDay};
pub use queries::{EntryRequest, ScheduleReport, TimetableEntry};
pub use rooms::RoomSuggestion;
pub use substitutes::{SubstituteCandidate, SubstituteRequest};

pub struct Timetables<R: Repository> {
    inner: Arc<Inner<R>>,
}

impl<R: Repository> Clone for Timetables<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<R: Repository> {
    repo: Arc<R>,
    events: Arc<dyn EventSink>,
    rules: RulesConfig,
    cache: AnalyticsCache,
    /// Serializes check-then-write sequences (manual and bulk entries, term
    /// copies, substitutes).
    writes: tokio::sync::Mutex<()>,
}

impl<R: Repository> Timetables<R> {
    pub fn new(repo: Arc<R>, events: Arc<dyn EventSink>, rules: RulesConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                events,
                rules,
                cache: AnalyticsCache::default(),
                writes: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.inner.repo
    }

    async fn slot_map(&self) -> Result<HashMap<TimeSlotId, TimeSlot>, SchedulingError> {
        Ok(self
            .inner
            .repo
            .time_slots(false)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect())
    }

    /// What actually happens in `slot` on `date`: every active assignment
    /// effective that day, each taught by its substitute when one is booked.
    /// Sessions span only `date`.
    async fn sessions_on(
        &self,
        slot: &TimeSlot,
        date: NaiveDate,
    ) -> Result<Vec<Session>, SchedulingError> {
        let repo = &self.inner.repo;
        let assignments = repo
            .assignments(&AssignmentQuery {
                time_slot: Some(slot.id),
                date: Some(date),
                active_only: true,
                ..AssignmentQuery::default()
            })
            .await?;
        let covered: HashMap<_, TeacherId> = repo
            .substitutes(&SubstituteQuery {
                from: Some(date),
                to: Some(date),
                ..SubstituteQuery::default()
            })
            .await?
            .into_iter()
            .map(|s| (s.original, s.substitute))
            .collect();
        Ok(assignments
            .into_iter()
            .map(|a| Session {
                assignment: Some(a.id),
                required_slot: None,
                class: a.class,
                subject: a.subject,
                teacher: covered.get(&a.id).copied().unwrap_or(a.teacher),
                time_slot: a.time_slot,
                day: slot.day,
                period: slot.period,
                room: a.room,
                effective_from: date,
                effective_to: date,
            })
            .collect())
    }

    async fn snapshot(&self, term: TermId) -> Result<ScheduleSnapshot, SchedulingError> {
        let repo = &self.inner.repo;
        let term = repo.term(term).await?;
        let assignments = repo
            .assignments(&AssignmentQuery::active_in_term(term.id))
            .await?;
        let ids: std::collections::HashSet<_> = assignments.iter().map(|a| a.id).collect();
        let substitutes = repo
            .substitutes(&SubstituteQuery {
                from: Some(term.start_date),
                to: Some(term.end_date),
                ..SubstituteQuery::default()
            })
            .await?
            .into_iter()
            .filter(|s| ids.contains(&s.original))
            .collect();

        let mut grades = BTreeMap::new();
        let classes: BTreeMap<_, _> = repo
            .classes(term.id, &[])
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        for class in classes.values() {
            if grades.contains_key(&class.grade) {
                continue;
            }
            match repo.grade(class.grade).await {
                Ok(g) => {
                    grades.insert(g.id, g);
                }
                // reports fall back to a generated grade name
                Err(RepositoryError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ScheduleSnapshot {
            assignments,
            substitutes,
            slots: self.slot_map().await?,
            rooms: repo.rooms(false).await?.into_iter().map(|r| (r.id, r)).collect(),
            teachers: repo.teachers().await?.into_iter().map(|t| (t.id, t)).collect(),
            subjects: repo.subjects().await?.into_iter().map(|s| (s.id, s)).collect(),
            classes,
            grades,
            morning_last_period: self.inner.rules.morning_last_period,
            term: Some(term),
        })
    }

    /// Every report for `term`, recomputed only when its schedule changed.
    pub async fn analytics(&self, term: TermId) -> Result<Arc<TermAnalytics>, SchedulingError> {
        let revision = self.inner.repo.schedule_revision(term).await?;
        if let Some(hit) = self.inner.cache.get(term, revision) {
            return Ok(hit);
        }
        let snap = self.snapshot(term).await?;
        let fresh = analytics::compute(term, revision, &snap);
        debug!(
            %term,
            revision,
            assignments = snap.assignments.len(),
            score = fresh.score.overall,
            "analytics rebuilt"
        );
        Ok(self.inner.cache.put(fresh))
    }

    /// Workload report, optionally for a single teacher.
    pub async fn teacher_workload(
        &self,
        term: TermId,
        teacher: Option<TeacherId>,
    ) -> Result<analytics::WorkloadReport, SchedulingError> {
        match teacher {
            None => Ok(self.analytics(term).await?.workload.clone()),
            Some(t) => {
                self.inner.repo.teacher(t).await?;
                Ok(analytics::teacher_workload(&self.snapshot(term).await?, Some(t)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sched_core::repo::ScheduleRepository;
    use parking_lot::Mutex;
    use sched_core::testing;
    use sched_core::{CatalogParts, SchedulingEvent};
    use store::{Fixture, MemoryStore};
    use types::{ClassId, NewAssignment, RoomId, SubjectId};

    #[derive(Default)]
    pub(crate) struct Recorder(pub Mutex<Vec<SchedulingEvent>>);

    impl EventSink for Recorder {
        fn publish(&self, event: SchedulingEvent) {
            self.0.lock().push(event);
        }
    }

    pub(crate) fn service_with(
        f: impl FnOnce(&mut CatalogParts),
    ) -> (Timetables<MemoryStore>, Arc<Recorder>) {
        let (term, mut parts) = testing::small_school();
        f(&mut parts);
        let store = MemoryStore::from_fixture(Fixture::from_parts(term, parts));
        let events = Arc::new(Recorder::default());
        let t = Timetables::new(Arc::new(store), events.clone(), RulesConfig::default());
        (t, events)
    }

    pub(crate) fn service() -> Timetables<MemoryStore> {
        service_with(|_| {}).0
    }

    /// Class 1 in room 1 for the whole term.
    pub(crate) fn entry(slot: u64, subject: u64, teacher: u64) -> NewAssignment {
        let term = testing::term_t1();
        NewAssignment {
            class: ClassId(1),
            subject: SubjectId(subject),
            teacher: TeacherId(teacher),
            time_slot: TimeSlotId(slot),
            room: Some(RoomId(1)),
            term: term.id,
            effective_from: term.start_date,
            effective_to: term.end_date,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn analytics_follow_the_schedule_revision() {
        let t = service();
        t.repo()
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1), entry(2, 1, 1), entry(3, 2, 2)])
            .await
            .unwrap();
        let first = t.analytics(TermId(1)).await.unwrap();
        assert!((first.score.overall - 92.5).abs() < 1e-9);
        let again = t.analytics(TermId(1)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        t.repo()
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1)])
            .await
            .unwrap();
        let fresh = t.analytics(TermId(1)).await.unwrap();
        assert!(fresh.revision > first.revision);
        assert_eq!(fresh.workload.teachers.len(), 1);
        assert_eq!(fresh.subjects.grade_load[0].grade_name, "Grade 1");
    }

    #[tokio::test]
    async fn single_teacher_workload() {
        let t = service();
        t.repo()
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1), entry(3, 2, 2)])
            .await
            .unwrap();
        let w = t.teacher_workload(TermId(1), Some(TeacherId(2))).await.unwrap();
        assert_eq!(w.teachers.len(), 1);
        assert_eq!(w.teachers[0].total_periods, 1);
        let err = t.teacher_workload(TermId(1), Some(TeacherId(9))).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}

use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use sched_core::conflicts;
use sched_core::repo::{AssignmentQuery, SubstituteQuery};
use sched_core::{Repository, SchedulingError, SchedulingEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use types::{
    AssignmentId, Conflict, ConflictProbe, DateRange, DayOfWeek, NewSubstitute,
    ScheduledAssignment, SubstituteAssignment, SubstituteId, Teacher, TeacherId, Term, TimeSlot,
    UserId,
};
use utoipa::ToSchema;

use crate::Timetables;

const BASE_COMPATIBILITY: i32 = 100;
const CONFLICT_PENALTY: i32 = 50;
const FAMILIARITY_BONUS: i32 = 20;

/// A teacher who could cover a lesson, ranked by `compatibility`.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct SubstituteCandidate {
    pub teacher: Teacher,
    /// What the candidate already teaches in that period on that date.
    pub conflicts: Vec<Conflict>,
    pub taught_class_before: bool,
    pub compatibility: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct SubstituteRequest {
    pub original: AssignmentId,
    pub substitute: TeacherId,
    pub date: NaiveDate,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// A lesson pinned to one date.
struct Occurrence {
    assignment: ScheduledAssignment,
    slot: TimeSlot,
    term: Term,
    date: NaiveDate,
}

impl Occurrence {
    /// The lesson itself does not count against whoever covers it.
    fn probe(&self, teacher: TeacherId) -> ConflictProbe {
        ConflictProbe {
            teacher: Some(teacher),
            time_slot: Some(self.slot.id),
            date_range: Some(DateRange::single(self.date)),
            exclude: Some(self.assignment.id),
            ..ConflictProbe::default()
        }
    }
}

impl<R: Repository> Timetables<R> {
    async fn occurrence(
        &self,
        original: AssignmentId,
        date: NaiveDate,
    ) -> Result<Occurrence, SchedulingError> {
        let repo = &self.inner.repo;
        let assignment = repo.assignment(original).await?;
        if !assignment.is_active || !assignment.range().contains(date) {
            return Err(SchedulingError::Validation(format!(
                "assignment {original} does not take place on {date}"
            )));
        }
        let term = repo.term(assignment.term).await?;
        if !term.contains(date) {
            return Err(SchedulingError::Validation(format!(
                "{date} is outside term {}",
                term.id
            )));
        }
        let slot = repo.time_slot(assignment.time_slot).await?;
        let weekday = DayOfWeek::from_date(date);
        if weekday != slot.day {
            return Err(SchedulingError::Validation(format!(
                "{date} is a {}, assignment {original} is on {}",
                weekday.name(),
                slot.day.name()
            )));
        }
        Ok(Occurrence {
            assignment,
            slot,
            term,
            date,
        })
    }

    /// Sessions `teacher` would clash with when covering `occ`.
    async fn clashes(
        &self,
        occ: &Occurrence,
        teacher: TeacherId,
    ) -> Result<Vec<Conflict>, SchedulingError> {
        let sessions = self.sessions_on(&occ.slot, occ.date).await?;
        Ok(conflicts::probe(&sessions, &occ.probe(teacher)))
    }

    /// Active teachers authorized for the lesson's subject, best first.
    /// Each clash costs 50 points and having taught the class earns 20.
    pub async fn suggest_substitutes(
        &self,
        original: AssignmentId,
        date: NaiveDate,
    ) -> Result<Vec<SubstituteCandidate>, SchedulingError> {
        let repo = &self.inner.repo;
        let occ = self.occurrence(original, date).await?;
        let a = &occ.assignment;

        let authorizations = repo.authorizations(occ.term.id, &[]).await?;
        let qualified: BTreeSet<TeacherId> = authorizations
            .iter()
            .filter(|x| x.subject == a.subject)
            .map(|x| x.teacher)
            .collect();
        let mut familiar: BTreeSet<TeacherId> = authorizations
            .iter()
            .filter(|x| x.class == a.class)
            .map(|x| x.teacher)
            .collect();
        familiar.extend(
            repo.assignments(&AssignmentQuery {
                class: Some(a.class),
                ..AssignmentQuery::default()
            })
            .await?
            .into_iter()
            .map(|x| x.teacher),
        );

        let sessions = self.sessions_on(&occ.slot, date).await?;
        let mut out: Vec<SubstituteCandidate> = repo
            .teachers()
            .await?
            .into_iter()
            .filter(|t| t.id != a.teacher && t.is_active() && qualified.contains(&t.id))
            .map(|teacher| {
                let conflicts = conflicts::probe(&sessions, &occ.probe(teacher.id));
                let taught_class_before = familiar.contains(&teacher.id);
                let mut compatibility =
                    BASE_COMPATIBILITY - CONFLICT_PENALTY * conflicts.len() as i32;
                if taught_class_before {
                    compatibility += FAMILIARITY_BONUS;
                }
                SubstituteCandidate {
                    teacher,
                    conflicts,
                    taught_class_before,
                    compatibility,
                }
            })
            .collect();
        out.sort_by_key(|c| (Reverse(c.compatibility), c.teacher.id));
        Ok(out)
    }

    /// Books `req.substitute` to cover one occurrence of a lesson.
    pub async fn assign_substitute(
        &self,
        req: SubstituteRequest,
    ) -> Result<SubstituteAssignment, SchedulingError> {
        let repo = &self.inner.repo;
        let _writes = self.inner.writes.lock().await;

        let occ = self.occurrence(req.original, req.date).await?;
        let teacher = repo.teacher(req.substitute).await?;
        if teacher.id == occ.assignment.teacher {
            return Err(SchedulingError::Validation(
                "substitute must differ from the assigned teacher".into(),
            ));
        }
        if !teacher.is_active() {
            return Err(SchedulingError::TeacherUnavailable {
                teacher: teacher.id,
                reason: format!("status is {:?}", teacher.status),
            });
        }
        let covered = repo
            .substitutes(&SubstituteQuery {
                original: Some(req.original),
                from: Some(req.date),
                to: Some(req.date),
                ..SubstituteQuery::default()
            })
            .await?;
        if !covered.is_empty() {
            return Err(SchedulingError::Validation(format!(
                "assignment {} already has a substitute on {}",
                req.original, req.date
            )));
        }
        let clashes = self.clashes(&occ, teacher.id).await?;
        if !clashes.is_empty() {
            return Err(SchedulingError::TeacherUnavailable {
                teacher: teacher.id,
                reason: format!("already teaching period {} on {}", occ.slot.period, occ.date),
            });
        }

        let created = repo
            .create_substitute(NewSubstitute {
                original: req.original,
                substitute: req.substitute,
                date: req.date,
                reason: req.reason,
                notes: req.notes,
                created_by: req.created_by,
            })
            .await?;
        info!(
            substitute = %created.id,
            original = %created.original,
            teacher = %created.substitute,
            date = %created.date,
            "substitute assigned"
        );
        self.inner.events.publish(SchedulingEvent::SubstituteAssigned {
            substitute: created.id,
            original: created.original,
            teacher: created.substitute,
            date: created.date,
        });
        Ok(created)
    }

    pub async fn approve_substitute(
        &self,
        id: SubstituteId,
        approver: UserId,
    ) -> Result<SubstituteAssignment, SchedulingError> {
        // a second approval is refused by the store
        let approved = self.inner.repo.approve_substitute(id, approver).await?;
        info!(substitute = %id, %approver, "substitute approved");
        self.inner
            .events
            .publish(SchedulingEvent::SubstituteApproved { substitute: id, approver });
        Ok(approved)
    }

    /// Substitutions, newest first, optionally for one covering teacher
    /// and within `[from, to]`.
    pub async fn substitute_history(
        &self,
        teacher: Option<TeacherId>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<SubstituteAssignment>, SchedulingError> {
        if let Some(t) = teacher {
            self.inner.repo.teacher(t).await?;
        }
        let mut out = self
            .inner
            .repo
            .substitutes(&SubstituteQuery {
                substitute: teacher,
                from,
                to,
                ..SubstituteQuery::default()
            })
            .await?;
        out.sort_by_key(|s| (Reverse(s.date), Reverse(s.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::repo::ScheduleRepository;
    use crate::tests::{entry, service_with};
    use sched_core::testing::{authorize, class, date, teacher};
    use std::sync::Arc;
    use store::MemoryStore;
    use types::{ClassId, NewAssignment, TermId};
    use crate::tests::Recorder;

    /// Math for class 1 with teacher 1 and for class 2 with teacher 4,
    /// both Monday period 1. Teachers 3 and 4 know class 2 only, teacher 5
    /// knows class 1.
    async fn covered_school(
    ) -> (Timetables<MemoryStore>, Arc<Recorder>, AssignmentId, AssignmentId) {
        let (t, events) = service_with(|parts| {
            parts.classes.push(class(2, 1, 20));
            parts.teachers.extend([teacher(3, "C"), teacher(4, "D"), teacher(5, "E")]);
            parts.authorizations.extend([
                authorize(10, 3, 2, 1),
                authorize(11, 4, 2, 1),
                authorize(12, 5, 1, 1),
            ]);
        });
        let other = NewAssignment {
            class: ClassId(2),
            room: None,
            ..entry(1, 1, 4)
        };
        let out = t
            .repo()
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1), other])
            .await
            .unwrap();
        let (mine, theirs) = (out.created[0].id, out.created[1].id);
        (t, events, mine, theirs)
    }

    fn request(original: AssignmentId, teacher: u64) -> SubstituteRequest {
        SubstituteRequest {
            original,
            substitute: TeacherId(teacher),
            date: date(2024, 4, 8),
            reason: "sick".into(),
            notes: String::new(),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn candidates_rank_familiar_then_free_then_busy() {
        let (t, _, mine, _) = covered_school().await;
        let ranked = t.suggest_substitutes(mine, date(2024, 4, 8)).await.unwrap();
        let ids: Vec<u64> = ranked.iter().map(|c| c.teacher.id.0).collect();
        assert_eq!(ids, vec![5, 3, 4]);
        let scores: Vec<i32> = ranked.iter().map(|c| c.compatibility).collect();
        assert_eq!(scores, vec![120, 100, 50]);
        assert_eq!(ranked[2].conflicts.len(), 1);
    }

    #[tokio::test]
    async fn dates_must_match_the_lesson() {
        let (t, _, mine, _) = covered_school().await;
        // a Tuesday
        let err = t.suggest_substitutes(mine, date(2024, 4, 9)).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        let err = t.suggest_substitutes(mine, date(2024, 9, 2)).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn assignment_checks() {
        let (t, events, mine, theirs) = covered_school().await;

        let err = t.assign_substitute(request(mine, 1)).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        let err = t.assign_substitute(request(mine, 4)).await.unwrap_err();
        assert_eq!(err.code(), "teacher_unavailable");

        let booked = t.assign_substitute(request(mine, 3)).await.unwrap();
        assert_eq!(booked.substitute, TeacherId(3));
        assert!(matches!(
            events.0.lock().as_slice(),
            [SchedulingEvent::SubstituteAssigned { teacher: TeacherId(3), .. }]
        ));

        let err = t.assign_substitute(request(mine, 5)).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");

        // teacher 3 is now busy covering class 1
        let err = t.assign_substitute(request(theirs, 3)).await.unwrap_err();
        assert_eq!(err.code(), "teacher_unavailable");
        // and teacher 1 is free again
        assert!(t.assign_substitute(request(theirs, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (t, _, mine, _) = covered_school().await;
        t.assign_substitute(request(mine, 3)).await.unwrap();
        t.assign_substitute(SubstituteRequest {
            date: date(2024, 4, 15),
            ..request(mine, 3)
        })
        .await
        .unwrap();
        t.assign_substitute(SubstituteRequest {
            date: date(2024, 4, 22),
            ..request(mine, 5)
        })
        .await
        .unwrap();

        let c = t.substitute_history(Some(TeacherId(3)), None, None).await.unwrap();
        let dates: Vec<NaiveDate> = c.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(2024, 4, 15), date(2024, 4, 8)]);

        let april = t
            .substitute_history(None, Some(date(2024, 4, 10)), Some(date(2024, 4, 30)))
            .await
            .unwrap();
        assert_eq!(april.len(), 2);
        assert_eq!(april[0].substitute, TeacherId(5));
    }

    #[tokio::test]
    async fn approval_records_the_approver() {
        let (t, events, mine, _) = covered_school().await;
        let booked = t.assign_substitute(request(mine, 5)).await.unwrap();
        let approved = t.approve_substitute(booked.id, UserId(7)).await.unwrap();
        assert_eq!(approved.approver, Some(UserId(7)));
        assert_eq!(events.0.lock().len(), 2);

        let again = t.approve_substitute(booked.id, UserId(8)).await.unwrap_err();
        assert_eq!(again.code(), "validation_error");
        assert_eq!(events.0.lock().len(), 2);
    }
}

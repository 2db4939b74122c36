use serde::Serialize;
use tracing::info;
use types::{GenerationRun, NewAssignment, SchedulingResult, TermId, UserId};

use crate::catalog::Catalog;
use crate::conflicts;
use crate::error::SchedulingError;
use crate::events::{EventSink, SchedulingEvent};
use crate::repo::{ReplaceOutcome, RepositoryError, RunRepository, ScheduleRepository};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub term: TermId,
    pub removed: usize,
    pub created: usize,
}

/// Turns a successful result into the entries that replace the term's
/// schedule: term bounds as the effective range, `actor` as creator.
///
/// Refuses unsuccessful results, results with conflicts and placements
/// lacking an authorization.
pub fn schedule_entries(
    catalog: &Catalog,
    result: &SchedulingResult,
    actor: Option<UserId>,
) -> Result<Vec<NewAssignment>, SchedulingError> {
    let sessions = catalog.sessions_for(&result.assigned);
    let mut found = conflicts::detect(&sessions);
    if found.is_empty() && !result.conflicts.is_empty() {
        found = result.conflicts.clone();
    }
    if !found.is_empty() {
        return Err(SchedulingError::ConstraintViolation { conflicts: found });
    }
    if !result.success {
        let reason = if !result.unassigned.is_empty() {
            format!("{} required slot(s) unplaced", result.unassigned.len())
        } else {
            let names: Vec<&str> = result.violations.iter().map(|v| v.name.as_str()).collect();
            format!("hard constraint(s) violated: {}", names.join(", "))
        };
        return Err(SchedulingError::OptimizationFailed(reason));
    }

    let mut entries = Vec::with_capacity(result.assigned.len());
    for p in &result.assigned {
        let s = &p.slot;
        if !catalog.is_authorized(s.teacher, s.class, s.subject) {
            return Err(SchedulingError::InvalidSubjectAssignment {
                teacher: s.teacher,
                class: s.class,
                subject: s.subject,
            });
        }
        entries.push(NewAssignment {
            class: s.class,
            subject: s.subject,
            teacher: s.teacher,
            time_slot: p.time_slot,
            room: p.room,
            term: catalog.term.id,
            effective_from: catalog.term.start_date,
            effective_to: catalog.term.end_date,
            created_by: actor,
        });
    }
    Ok(entries)
}

/// Replaces the term's committed schedule with `result.assigned`.
///
/// The replacement itself is a single atomic repository call; on error
/// nothing is changed.
pub async fn save_schedule<R: ScheduleRepository + ?Sized>(
    repo: &R,
    catalog: &Catalog,
    result: &SchedulingResult,
    actor: Option<UserId>,
    events: &dyn EventSink,
) -> Result<SaveSummary, SchedulingError> {
    let entries = schedule_entries(catalog, result, actor)?;
    let outcome = repo.replace_term_schedule(catalog.term.id, entries).await?;
    Ok(persisted(catalog.term.id, &outcome, events))
}

/// Completes a running generation run and saves its schedule in one
/// repository write. Returns `None`, leaving the schedule untouched, when
/// the run already left `running` (cancelled or swept).
pub async fn commit_run_schedule<R: RunRepository + ?Sized>(
    repo: &R,
    catalog: &Catalog,
    result: &SchedulingResult,
    run: GenerationRun,
    events: &dyn EventSink,
) -> Result<Option<(GenerationRun, SaveSummary)>, SchedulingError> {
    let entries = schedule_entries(catalog, result, run.started_by)?;
    match repo.commit_run(run, entries).await {
        Ok((run, outcome)) => Ok(Some((run, persisted(catalog.term.id, &outcome, events)))),
        Err(RepositoryError::InvalidTransition { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn persisted(term: TermId, outcome: &ReplaceOutcome, events: &dyn EventSink) -> SaveSummary {
    let summary = SaveSummary {
        term,
        removed: outcome.removed,
        created: outcome.created.len(),
    };
    info!(
        %term,
        removed = summary.removed,
        created = summary.created,
        "schedule persisted"
    );
    events.publish(SchedulingEvent::SchedulePersisted {
        term,
        removed: summary.removed,
        created: summary.created,
    });
    summary
}

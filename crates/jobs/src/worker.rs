use std::sync::Arc;

use chrono::Utc;
use sched_core::persist::commit_run_schedule;
use sched_core::{Catalog, Repository, RunControl, Scheduler, SchedulingError, SchedulingEvent};
use tracing::{error, info, warn};
use types::{
    GenerationRequest, GenerationRun, RunId, RunStatus, RunSummary, SchedulingResult, StopReason,
};

use crate::generate::generate_timetable;
use crate::{Inner, DEADLINE_EXCEEDED};

/// Drives one run from pending to a terminal state.
pub(crate) async fn run<R: Repository + 'static, S: Scheduler>(
    inner: Arc<Inner<R, S>>,
    run: GenerationRun,
    control: RunControl,
) {
    let id = run.id;
    if let Err(e) = drive(&inner, run, &control).await {
        error!(run_id = %id, code = %e.code(), error = %e, "generation run failed");
        match inner.repo.run(id).await {
            Ok(mut current) if current.status.is_active() => {
                current.status = RunStatus::Failed;
                current.error_message = Some(format!("{}: {e}", e.code()));
                current.completed_at = Some(Utc::now());
                finish(&inner, current).await;
            }
            Ok(_) => {}
            Err(e) => warn!(run_id = %id, error = %e, "run vanished while failing"),
        }
    }
    inner.controls.write().remove(&id);
}

async fn drive<R: Repository + 'static, S: Scheduler>(
    inner: &Inner<R, S>,
    mut run: GenerationRun,
    control: &RunControl,
) -> Result<(), SchedulingError> {
    if control.is_cancelled() {
        return Ok(());
    }
    run.status = RunStatus::Running;
    run.started_at = Some(Utc::now());
    let mut run = match inner.repo.update_run(run).await {
        Ok(run) => run,
        // cancelled or swept before the worker got going
        Err(sched_core::RepositoryError::InvalidTransition { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    info!(run_id = %run.id, term = %run.term, "generation started");
    inner.events.publish(SchedulingEvent::RunStarted {
        run: run.id,
        term: run.term,
    });

    let req = GenerationRequest {
        term: run.term,
        grades: run.grades.clone(),
        algorithm: run.algorithm,
        params: run.params.clone(),
    };
    let (catalog, result) = generate_timetable(
        inner.repo.as_ref(),
        inner.scheduler.clone(),
        &req,
        &inner.rules,
        control.clone(),
    )
    .await?;

    record_result(&mut run, &result);
    let cancelled = control.is_cancelled() || result.stopped == Some(StopReason::Cancelled);
    if cancelled {
        run.status = RunStatus::Cancelled;
        run.best = Some(catalog.sessions_for(&result.assigned));
    } else if result.success {
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        let id = run.id;
        let committed = commit_run_schedule(
            inner.repo.as_ref(),
            &catalog,
            &result,
            run,
            inner.events.as_ref(),
        )
        .await?;
        match committed {
            Some((run, _)) => announce(inner, &run),
            None => {
                warn!(run_id = %id, "run left the running state; result discarded");
                keep_best(inner, id, &catalog, &result).await;
            }
        }
        return Ok(());
    } else {
        run.status = RunStatus::Failed;
        run.error_message = Some(match result.stopped {
            Some(StopReason::DeadlineExceeded) => DEADLINE_EXCEEDED.to_string(),
            _ => failure_reason(&result),
        });
        run.best = Some(catalog.sessions_for(&result.assigned));
    }
    run.completed_at = Some(Utc::now());
    finish(inner, run).await;
    Ok(())
}

/// Attaches the best individual to a run that was swept to `failed` while
/// its worker was still busy.
async fn keep_best<R: Repository + 'static, S: Scheduler>(
    inner: &Inner<R, S>,
    id: RunId,
    catalog: &Catalog,
    result: &SchedulingResult,
) {
    match inner.repo.run(id).await {
        Ok(mut current) if current.status == RunStatus::Failed && current.best.is_none() => {
            record_result(&mut current, result);
            current.best = Some(catalog.sessions_for(&result.assigned));
            if let Err(e) = inner.repo.update_run(current).await {
                warn!(run_id = %id, error = %e, "could not keep the best individual");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(run_id = %id, error = %e, "run vanished after the sweep"),
    }
}

fn failure_reason(result: &SchedulingResult) -> String {
    if !result.unassigned.is_empty() {
        format!("optimization_failed: {} unplaced", result.unassigned.len())
    } else if !result.conflicts.is_empty() {
        format!("optimization_failed: {} conflicts", result.conflicts.len())
    } else {
        format!(
            "optimization_failed: {} hard constraint(s) violated",
            result.violations.len()
        )
    }
}

fn record_result(run: &mut GenerationRun, result: &SchedulingResult) {
    run.optimization_score = Some(result.optimization_score);
    run.execution_time = Some(result.execution_time);
    run.conflicts_resolved = result.conflicts.len();
    run.result_summary = Some(RunSummary {
        assigned: result.assigned.len(),
        unassigned: result.unassigned.len(),
        conflicts: result.conflicts.len(),
        hard_violations: result.violations.len(),
        success: result.success,
        created: 0,
        removed: 0,
        constraint_score: result.constraint_score,
        generations_run: result.generations_run,
    });
}

async fn finish<R: Repository + 'static, S: Scheduler>(inner: &Inner<R, S>, run: GenerationRun) {
    let (id, status) = (run.id, run.status);
    match inner.repo.update_run(run).await {
        Ok(run) => announce(inner, &run),
        Err(e) => warn!(run_id = %id, %status, error = %e, "could not record run outcome"),
    }
}

fn announce<R: Repository + 'static, S: Scheduler>(inner: &Inner<R, S>, run: &GenerationRun) {
    let score = run.optimization_score;
    info!(run_id = %run.id, term = %run.term, status = %run.status, score, "generation finished");
    inner.events.publish(SchedulingEvent::RunFinished {
        run: run.id,
        term: run.term,
        status: run.status,
        score,
    });
}

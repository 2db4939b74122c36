//! Lifecycle of generation runs: submission, one worker task per run,
//! cancellation, deadline sweeping and retention.

mod generate;
mod limit;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use sched_core::config::{RulesConfig, RunsConfig, SchedulingConfig};
use sched_core::{EventSink, Repository, RunControl, Scheduler, SchedulingError, SchedulingEvent};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use types::{GenerationRequest, GenerationRun, RunId, RunStatus, UserId};

pub use generate::generate_timetable;
pub use limit::SubmissionLimiter;

/// Error message recorded on runs stopped by their deadline.
pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";

pub struct GenerationRuns<R: Repository, S: Scheduler> {
    inner: Arc<Inner<R, S>>,
}

impl<R: Repository, S: Scheduler> Clone for GenerationRuns<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<R: Repository, S: Scheduler> {
    repo: Arc<R>,
    scheduler: Arc<S>,
    events: Arc<dyn EventSink>,
    runs_cfg: RunsConfig,
    rules: RulesConfig,
    limiter: SubmissionLimiter,
    gate: tokio::sync::Mutex<()>,
    controls: RwLock<HashMap<RunId, RunControl>>,
    handles: Mutex<HashMap<RunId, JoinHandle<()>>>,
}

impl<R: Repository + 'static, S: Scheduler> GenerationRuns<R, S> {
    pub fn new(
        repo: Arc<R>,
        scheduler: Arc<S>,
        events: Arc<dyn EventSink>,
        cfg: &SchedulingConfig,
    ) -> Self {
        let limiter = SubmissionLimiter::new(
            cfg.runs.max_submissions_per_window,
            Duration::from_secs(cfg.runs.submission_window_secs),
        );
        Self {
            inner: Arc::new(Inner {
                repo,
                scheduler,
                events,
                runs_cfg: cfg.runs.clone(),
                rules: cfg.rules.clone(),
                limiter,
                gate: tokio::sync::Mutex::new(()),
                controls: RwLock::new(HashMap::new()),
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.inner.repo
    }

    /// Creates a pending run and starts its worker. Fails with
    /// `generation_in_progress` while the term already has a pending or
    /// running run.
    pub async fn submit(
        &self,
        req: GenerationRequest,
        actor: Option<UserId>,
    ) -> Result<GenerationRun, SchedulingError> {
        if req.grades.is_empty() {
            return Err(SchedulingError::Validation(
                "at least one grade is required".into(),
            ));
        }
        if !self.inner.limiter.try_acquire(actor, Instant::now()) {
            return Err(SchedulingError::RateLimitExceeded(format!(
                "at most {} submissions per {}s",
                self.inner.runs_cfg.max_submissions_per_window,
                self.inner.runs_cfg.submission_window_secs
            )));
        }
        match self.create(req, actor).await {
            Ok(run) => Ok(run),
            Err(e) => {
                self.inner.limiter.release(actor);
                Err(e)
            }
        }
    }

    async fn create(
        &self,
        req: GenerationRequest,
        actor: Option<UserId>,
    ) -> Result<GenerationRun, SchedulingError> {
        let inner = &self.inner;
        let _gate = inner.gate.lock().await;

        let now = Utc::now();
        let term = inner.repo.term(req.term).await?;
        if !term.accepts_generation(now.date_naive()) {
            return Err(SchedulingError::TermNotActive { term: term.id });
        }
        for g in &req.grades {
            inner.repo.grade(*g).await?;
        }

        let max = inner.runs_cfg.max_duration_secs;
        let budget = req.params.time_limit_secs.map_or(max, |t| t.min(max));
        let deadline = chrono::Duration::from_std(Duration::from_secs(budget))
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                SchedulingError::Validation(format!("run budget of {budget}s is out of range"))
            })?;
        let run = inner
            .repo
            .create_run(GenerationRun::new(req, actor, now, deadline))
            .await?;

        let control = RunControl::new().with_deadline(Instant::now() + Duration::from_secs(budget));
        inner.controls.write().insert(run.id, control.clone());
        info!(
            run_id = %run.id,
            term = %run.term,
            algorithm = %run.algorithm,
            "generation submitted"
        );
        inner.events.publish(SchedulingEvent::RunSubmitted {
            run: run.id,
            term: run.term,
            actor,
        });

        let handle = tokio::spawn(worker::run(inner.clone(), run.clone(), control));
        inner.handles.lock().insert(run.id, handle);
        Ok(run)
    }

    /// Requests cancellation. Pending runs are cancelled at once; running
    /// runs stop at the optimizer's next check. Terminal runs are returned
    /// unchanged.
    pub async fn cancel(&self, id: RunId) -> Result<GenerationRun, SchedulingError> {
        let inner = &self.inner;
        let run = inner.repo.run(id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        let control = inner.controls.read().get(&id).cloned();
        if let Some(control) = control {
            control.cancel();
        }
        if run.status == RunStatus::Pending {
            let mut cancelled = run.clone();
            cancelled.status = RunStatus::Cancelled;
            cancelled.completed_at = Some(Utc::now());
            if let Ok(run) = inner.repo.update_run(cancelled).await {
                info!(run_id = %id, "pending generation cancelled");
                inner.events.publish(SchedulingEvent::RunFinished {
                    run: id,
                    term: run.term,
                    status: run.status,
                    score: None,
                });
                return Ok(run);
            }
        }
        info!(run_id = %id, "cancellation requested");
        Ok(inner.repo.run(id).await?)
    }

    pub async fn get(&self, id: RunId) -> Result<GenerationRun, SchedulingError> {
        Ok(self.inner.repo.run(id).await?)
    }

    /// Waits for the run's worker to finish, then returns the stored run.
    pub async fn join(&self, id: RunId) -> Result<GenerationRun, SchedulingError> {
        let handle = self.inner.handles.lock().remove(&id);
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                SchedulingError::Internal(format!("worker for run {id} failed: {e}"))
            })?;
        }
        self.get(id).await
    }

    /// Fails active runs whose deadline has passed and signals their workers.
    pub async fn sweep_expired(&self) -> Result<usize, SchedulingError> {
        let inner = &self.inner;
        let now = Utc::now();
        let mut swept = 0;
        inner.handles.lock().retain(|_, h| !h.is_finished());
        for mut run in inner.repo.active_runs().await? {
            if run.deadline > now {
                continue;
            }
            let control = inner.controls.read().get(&run.id).cloned();
            if let Some(control) = control {
                control.cancel();
            }
            run.status = RunStatus::Failed;
            run.error_message = Some(DEADLINE_EXCEEDED.into());
            run.completed_at = Some(now);
            match inner.repo.update_run(run).await {
                Ok(run) => {
                    swept += 1;
                    warn!(run_id = %run.id, term = %run.term, "run swept past its deadline");
                    inner.events.publish(SchedulingEvent::RunFinished {
                        run: run.id,
                        term: run.term,
                        status: run.status,
                        score: None,
                    });
                }
                Err(e) => warn!(error = %e, "could not sweep expired run"),
            }
        }
        Ok(swept)
    }

    /// Deletes terminal runs older than the retention period.
    pub async fn cleanup(&self) -> Result<usize, SchedulingError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.inner.runs_cfg.retention_days);
        let removed = self.inner.repo.delete_runs_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "old generation runs deleted");
        }
        Ok(removed)
    }

    /// Periodic sweep and cleanup on the current runtime.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = Duration::from_secs(self.inner.runs_cfg.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                if let Err(e) = this.sweep_expired().await {
                    error!(error = %e, "deadline sweep failed");
                }
                if let Err(e) = this.cleanup().await {
                    error!(error = %e, "run cleanup failed");
                }
            }
        })
    }
}

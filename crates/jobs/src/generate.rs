use std::sync::Arc;

use sched_core::config::RulesConfig;
use sched_core::{Catalog, Repository, RunControl, Scheduler, SchedulingError};
use types::{GenerationRequest, SchedulingResult};

/// Loads the catalog for `req` and runs the scheduler on the blocking pool.
/// The catalog is handed back so the caller can persist against the same
/// snapshot.
pub async fn generate_timetable<R, S>(
    repo: &R,
    scheduler: Arc<S>,
    req: &GenerationRequest,
    rules: &RulesConfig,
    control: RunControl,
) -> Result<(Catalog, SchedulingResult), SchedulingError>
where
    R: Repository + ?Sized,
    S: Scheduler,
{
    let catalog = Catalog::load(repo, req.term, &req.grades, rules).await?;
    let algorithm = req.algorithm;
    let params = req.params.clone();
    tokio::task::spawn_blocking(move || {
        scheduler
            .generate(&catalog, algorithm, &params, &control)
            .map(|result| (catalog, result))
    })
    .await
    .map_err(|e| SchedulingError::Internal(format!("optimizer task failed: {e}")))?
}

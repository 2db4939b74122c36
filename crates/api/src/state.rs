use std::sync::Arc;

use jobs::GenerationRuns;
use sched_core::config::SchedulingConfig;
use sched_core::{EventSink, TracingSink};
use solver_heur::HeurSolver;
use store::MemoryStore;
use timetable::Timetables;

#[derive(Clone)]
pub struct AppState {
    pub runs: GenerationRuns<MemoryStore, HeurSolver>,
    pub timetables: Timetables<MemoryStore>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, cfg: &SchedulingConfig) -> Self {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        let solver = Arc::new(HeurSolver::with_config(cfg.optimizer.clone()));
        Self {
            runs: GenerationRuns::new(store.clone(), solver, events.clone(), cfg),
            timetables: Timetables::new(store, events, cfg.rules.clone()),
        }
    }
}

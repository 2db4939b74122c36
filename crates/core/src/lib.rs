pub mod catalog;
pub mod config;
pub mod conflicts;
pub mod constraints;
pub mod error;
pub mod events;
pub mod persist;
pub mod priority;
pub mod repo;
pub mod scoring;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use catalog::{Catalog, CatalogParts};
pub use error::SchedulingError;
pub use events::{EventSink, NullSink, SchedulingEvent, TracingSink};
pub use repo::{Repository, RepositoryError, RepositoryResult};
pub use validate::{validate, ValidationError};

use types::{Algorithm, GenerationParams, SchedulingResult, StopReason};

/// Shared stop signal for one run: a cancellation flag plus an optional
/// wall-clock deadline. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline; an earlier one already set is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Cancellation wins over an expired deadline.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(StopReason::DeadlineExceeded)
        } else {
            None
        }
    }
}

/// A CPU-bound timetable generator. Implementations must be deterministic
/// for a fixed catalog, algorithm and `params.seed`, apart from
/// `execution_time`.
pub trait Scheduler: Send + Sync + 'static {
    fn generate(
        &self,
        catalog: &Catalog,
        algorithm: Algorithm,
        params: &GenerationParams,
        control: &RunControl,
    ) -> Result<SchedulingResult, SchedulingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let a = RunControl::new();
        let b = a.clone();
        assert_eq!(b.stop_reason(), None);
        a.cancel();
        assert_eq!(b.stop_reason(), Some(StopReason::Cancelled));
    }

    #[test]
    fn past_deadline_stops() {
        let past = Instant::now() - Duration::from_millis(5);
        let c = RunControl::new().with_deadline(past);
        assert_eq!(c.stop_reason(), Some(StopReason::DeadlineExceeded));
        let future = RunControl::new().with_deadline(Instant::now() + Duration::from_secs(60));
        assert_eq!(future.stop_reason(), None);
        let tightened = future.with_deadline(past);
        assert_eq!(tightened.stop_reason(), Some(StopReason::DeadlineExceeded));
    }
}

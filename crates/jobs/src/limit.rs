use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use types::UserId;

/// Sliding-window cap on generation submissions per actor. Anonymous
/// submissions share one bucket.
pub struct SubmissionLimiter {
    max: usize,
    window: Duration,
    seen: Mutex<HashMap<Option<UserId>, VecDeque<Instant>>>,
}

impl SubmissionLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Records a submission at `now` unless the actor is already at the cap.
    pub fn try_acquire(&self, actor: Option<UserId>, now: Instant) -> bool {
        let mut seen = self.seen.lock();
        let q = seen.entry(actor).or_default();
        while q.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            q.pop_front();
        }
        if q.len() >= self.max {
            return false;
        }
        q.push_back(now);
        true
    }

    /// Gives back the most recent slot, for submissions rejected later on.
    pub fn release(&self, actor: Option<UserId>) {
        if let Some(q) = self.seen.lock().get_mut(&actor) {
            q.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_slides() {
        let l = SubmissionLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        let me = Some(UserId(1));
        assert!(l.try_acquire(me, t0));
        assert!(l.try_acquire(me, t0 + Duration::from_secs(1)));
        assert!(!l.try_acquire(me, t0 + Duration::from_secs(2)));
        assert!(l.try_acquire(Some(UserId(2)), t0 + Duration::from_secs(2)));
        assert!(l.try_acquire(me, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn released_slot_is_reusable() {
        let l = SubmissionLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(l.try_acquire(None, t0));
        l.release(None);
        assert!(l.try_acquire(None, t0));
    }
}

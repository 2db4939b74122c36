use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use types::TermId;

use crate::analytics::TermAnalytics;

/// Computed analytics per term, valid while the term's schedule revision
/// is unchanged.
#[derive(Default)]
pub(crate) struct AnalyticsCache {
    entries: RwLock<HashMap<TermId, Arc<TermAnalytics>>>,
}

impl AnalyticsCache {
    pub(crate) fn get(&self, term: TermId, revision: u64) -> Option<Arc<TermAnalytics>> {
        self.entries
            .read()
            .get(&term)
            .filter(|a| a.revision == revision)
            .cloned()
    }

    /// Stores `fresh` unless a newer revision got there first; returns
    /// whichever entry is kept.
    pub(crate) fn put(&self, fresh: TermAnalytics) -> Arc<TermAnalytics> {
        let mut entries = self.entries.write();
        match entries.get(&fresh.term) {
            Some(kept) if kept.revision > fresh.revision => kept.clone(),
            _ => {
                let fresh = Arc::new(fresh);
                entries.insert(fresh.term, fresh.clone());
                fresh
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{compute, ScheduleSnapshot};

    #[test]
    fn stale_revisions_miss() {
        let cache = AnalyticsCache::default();
        let snap = ScheduleSnapshot::default();
        cache.put(compute(TermId(1), 3, &snap));
        assert!(cache.get(TermId(1), 3).is_some());
        assert!(cache.get(TermId(1), 4).is_none());
        assert!(cache.get(TermId(2), 3).is_none());

        let kept = cache.put(compute(TermId(1), 2, &snap));
        assert_eq!(kept.revision, 3);
    }
}

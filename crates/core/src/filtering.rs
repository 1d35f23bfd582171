//! Result filtering policy.
//!
//! Some registry records indicate that the mark owner is represented by
//! a third party (an attorney of record). The business rule for whether
//! such records are excluded from a job's final results is deliberately
//! configurable rather than hard-coded; the counts are always tracked
//! either way so filtered lookups remain visible in the job's
//! filtering stats.

use serde::Serialize;

/// Decides whether a fetched record is retained or excluded.
#[derive(Debug, Clone, Copy)]
pub struct FilterPolicy {
    /// Exclude records whose owner is represented by a third party.
    pub exclude_represented: bool,
}

impl FilterPolicy {
    /// Returns `true` if a record with the given representation flag
    /// should be excluded from the final result list.
    pub fn excludes(&self, is_represented: bool) -> bool {
        self.exclude_represented && is_represented
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            exclude_represented: true,
        }
    }
}

/// Counts of fetched vs. retained vs. excluded records for one job.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilteringStats {
    /// Successful fetches from the registry (before filtering).
    pub fetched: i32,
    /// Records kept in the final result list.
    pub retained: i32,
    /// Records excluded by the filter policy.
    pub excluded: i32,
}

impl FilteringStats {
    /// Record one successfully fetched record and whether it was kept.
    pub fn record_fetch(&mut self, retained: bool) {
        self.fetched += 1;
        if retained {
            self.retained += 1;
        } else {
            self.excluded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_excludes_represented_records() {
        let policy = FilterPolicy::default();
        assert!(policy.excludes(true));
        assert!(!policy.excludes(false));
    }

    #[test]
    fn disabled_policy_retains_everything() {
        let policy = FilterPolicy {
            exclude_represented: false,
        };
        assert!(!policy.excludes(true));
        assert!(!policy.excludes(false));
    }

    #[test]
    fn stats_track_fetched_retained_excluded() {
        let mut stats = FilteringStats::default();
        stats.record_fetch(true);
        stats.record_fetch(true);
        stats.record_fetch(false);

        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.excluded, 1);
    }
}

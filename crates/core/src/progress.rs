//! Progress flush arithmetic for the dispatch engine.
//!
//! Per-identifier completion events are far more frequent than durable
//! progress writes should be. The engine updates its in-memory counts on
//! every item and consults [`FlushPolicy::should_flush`] to decide when
//! to push `processed_count` to the job store and cache, bounding write
//! amplification on large batches.

use std::time::Duration;

/// When to push buffered progress to the durable store.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Flush whenever this much time has passed since the last flush.
    pub interval: Duration,
    /// Flush whenever progress crosses a bucket boundary of this many
    /// percent (e.g. 10 → flush at 10%, 20%, ...). Must be in 1..=100.
    pub bucket_percent: u8,
}

impl FlushPolicy {
    /// Decide whether progress should be flushed after an item completed.
    ///
    /// `prev` and `processed` are the counts before and after the item;
    /// `elapsed` is the time since the last flush. The last item of a
    /// batch always flushes.
    pub fn should_flush(
        &self,
        prev: i32,
        processed: i32,
        total: i32,
        elapsed: Duration,
    ) -> bool {
        if processed >= total {
            return true;
        }
        if elapsed >= self.interval {
            return true;
        }
        self.bucket(prev, total) != self.bucket(processed, total)
    }

    /// Bucket index for a given count (0-based, `100 / bucket_percent`
    /// buckets in total).
    fn bucket(&self, count: i32, total: i32) -> i32 {
        if total <= 0 {
            return 0;
        }
        let percent = count.saturating_mul(100) / total;
        percent / i32::from(self.bucket_percent.max(1))
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            bucket_percent: 10,
        }
    }
}

/// Integer percentage (0-100) for a progress pair, safe for `total == 0`.
pub fn percentage(processed: i32, total: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    (processed.saturating_mul(100) / total).clamp(0, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FlushPolicy {
        FlushPolicy {
            interval: Duration::from_secs(5),
            bucket_percent: 10,
        }
    }

    #[test]
    fn last_item_always_flushes() {
        assert!(policy().should_flush(99, 100, 100, Duration::ZERO));
        assert!(policy().should_flush(0, 1, 1, Duration::ZERO));
    }

    #[test]
    fn elapsed_interval_flushes() {
        assert!(policy().should_flush(41, 42, 1000, Duration::from_secs(5)));
        assert!(!policy().should_flush(41, 42, 1000, Duration::from_secs(1)));
    }

    #[test]
    fn bucket_crossing_flushes() {
        // 99 -> 100 of 1000 crosses the 10% boundary.
        assert!(policy().should_flush(99, 100, 1000, Duration::ZERO));
        // 101 -> 102 stays inside the 10%..20% bucket.
        assert!(!policy().should_flush(101, 102, 1000, Duration::ZERO));
    }

    #[test]
    fn small_batches_flush_every_item() {
        // With 4 items each one crosses a 10% bucket (25% per item).
        let p = policy();
        for n in 1..=4 {
            assert!(p.should_flush(n - 1, n, 4, Duration::ZERO));
        }
    }

    #[test]
    fn percentage_is_clamped_and_zero_safe() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 10), 50);
        assert_eq!(percentage(10, 10), 100);
        assert_eq!(percentage(42, 0), 0);
    }
}

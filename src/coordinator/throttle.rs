use crate::config::ThrottlePolicy;
use crate::models::TaskId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// Recently accepted `(task, seconds)` pairs, used to collapse duplicate
/// dispatches from overlapping timers.
pub struct UpdateThrottle {
    policy: ThrottlePolicy,
    recent: Mutex<HashMap<(TaskId, u64), Instant>>,
}

impl UpdateThrottle {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// True when the same pair was accepted within the duplicate window.
    pub fn is_duplicate(&self, task_id: &str, seconds: u64) -> bool {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent
            .get(&(task_id.to_string(), seconds))
            .map_or(false, |at| at.elapsed() < self.policy.duplicate_window)
    }

    /// Remember an accepted pair and lazily evict stale entries.
    pub fn record(&self, task_id: &str, seconds: u64) {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.insert((task_id.to_string(), seconds), now);
        let ttl = self.policy.cache_ttl;
        recent.retain(|_, at| now.duration_since(*at) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn duplicate_only_inside_window() {
        let throttle = UpdateThrottle::new(ThrottlePolicy::default());
        assert!(!throttle.is_duplicate("t1", 10));
        throttle.record("t1", 10);
        assert!(throttle.is_duplicate("t1", 10));
        assert!(!throttle.is_duplicate("t1", 11));
        assert!(!throttle.is_duplicate("t2", 10));

        tokio::time::advance(Duration::from_millis(2100)).await;
        assert!(!throttle.is_duplicate("t1", 10));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_evicted_on_record() {
        let throttle = UpdateThrottle::new(ThrottlePolicy::default());
        throttle.record("t1", 1);
        throttle.record("t1", 2);
        assert_eq!(throttle.len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        throttle.record("t1", 3);
        assert_eq!(throttle.len(), 1);
    }
}

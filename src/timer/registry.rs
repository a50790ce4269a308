use super::TimerSnapshot;
use crate::models::TaskId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info};

/// Callback notified on forced updates (reset) with the new elapsed value.
pub type Subscriber = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Per-task timer state. Transient subscribers are never persisted.
pub(crate) struct TimerRecord {
    pub(crate) is_active: bool,
    pub(crate) elapsed_seconds: u64,
    pub(crate) last_tick: Instant,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl TimerRecord {
    fn new(is_active: bool, elapsed_seconds: u64) -> Self {
        Self {
            is_active,
            elapsed_seconds,
            last_tick: Instant::now(),
            subscribers: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<TaskId, TimerRecord>,
    /// Ids whose timer is running; kept in step with `TimerRecord::is_active`
    /// and consulted when a record is (re)created.
    active: HashSet<TaskId>,
    next_subscription: u64,
}

/// Authoritative task-keyed timer table, independent of any view's lifetime.
///
/// Every operation on an unknown id is a no-op or returns a default; nothing here fails.
#[derive(Default)]
pub struct TimerRegistry {
    state: Mutex<RegistryState>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic inside one operation must not wedge every timer, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the record if absent. An existing record keeps its running flag and
    /// is only raised (never lowered) by a positive `initial_seconds`.
    pub fn register(&self, task_id: &str, initial_seconds: u64) {
        let mut state = self.lock();
        let was_active = state.active.contains(task_id);
        match state.records.get_mut(task_id) {
            Some(record) => {
                if initial_seconds > 0 && initial_seconds > record.elapsed_seconds {
                    record.elapsed_seconds = initial_seconds;
                }
            }
            None => {
                state.records.insert(
                    task_id.to_string(),
                    TimerRecord::new(was_active, initial_seconds),
                );
                debug!(
                    "[REGISTRY] Registered {} (elapsed={}s, active={})",
                    task_id, initial_seconds, was_active
                );
            }
        }
    }

    pub fn start(&self, task_id: &str) {
        let mut state = self.lock();
        let Some(record) = state.records.get_mut(task_id) else {
            return;
        };
        record.is_active = true;
        record.last_tick = Instant::now();
        state.active.insert(task_id.to_string());
        info!("[REGISTRY] Timer {} started", task_id);
    }

    /// Stop accumulating; the elapsed value is kept.
    pub fn stop(&self, task_id: &str) {
        let mut state = self.lock();
        let Some(record) = state.records.get_mut(task_id) else {
            return;
        };
        record.is_active = false;
        state.active.remove(task_id);
        info!("[REGISTRY] Timer {} stopped", task_id);
    }

    /// Stop and zero the timer, then notify every subscriber with 0.
    pub fn reset(&self, task_id: &str) {
        let subscribers: Vec<Subscriber> = {
            let mut state = self.lock();
            let Some(record) = state.records.get_mut(task_id) else {
                return;
            };
            record.is_active = false;
            record.elapsed_seconds = 0;
            record.last_tick = Instant::now();
            let subscribers = record.subscribers.values().cloned().collect();
            state.active.remove(task_id);
            subscribers
        };
        info!(
            "[REGISTRY] Timer {} reset, notifying {} subscriber(s)",
            task_id,
            subscribers.len()
        );
        // Callbacks run without the lock; they may call back into the registry.
        for subscriber in subscribers {
            subscriber(0);
        }
    }

    pub fn update_time(&self, task_id: &str, seconds: u64) {
        let mut state = self.lock();
        if let Some(record) = state.records.get_mut(task_id) {
            record.elapsed_seconds = seconds;
            record.last_tick = Instant::now();
        }
    }

    pub fn elapsed(&self, task_id: &str) -> u64 {
        self.lock()
            .records
            .get(task_id)
            .map(|r| r.elapsed_seconds)
            .unwrap_or(0)
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.lock()
            .records
            .get(task_id)
            .map(|r| r.is_active)
            .unwrap_or(false)
    }

    /// Fold whole seconds passed since the last tick into an active timer and
    /// return the total. Inactive timers return their value unchanged.
    ///
    /// `last_tick` advances by the whole seconds consumed, so the sub-second
    /// remainder carries into the next reconciliation.
    pub fn reconcile_missed_time(&self, task_id: &str) -> u64 {
        let mut state = self.lock();
        let Some(record) = state.records.get_mut(task_id) else {
            return 0;
        };
        if !record.is_active {
            return record.elapsed_seconds;
        }
        let missed = record.last_tick.elapsed().as_secs();
        if missed > 0 {
            record.elapsed_seconds = record.elapsed_seconds.saturating_add(missed);
            record.last_tick += std::time::Duration::from_secs(missed);
            debug!(
                "[REGISTRY] Caught up {} by {}s (total {}s)",
                task_id, missed, record.elapsed_seconds
            );
        }
        record.elapsed_seconds
    }

    /// Capture `{is_active, elapsed_seconds}`; unknown ids give the idle default.
    pub fn snapshot(&self, task_id: &str) -> TimerSnapshot {
        self.lock()
            .records
            .get(task_id)
            .map(|r| TimerSnapshot {
                is_active: r.is_active,
                elapsed_seconds: r.elapsed_seconds,
            })
            .unwrap_or_default()
    }

    /// Reapply a snapshot, keeping the active id set consistent.
    pub fn restore(&self, task_id: &str, snapshot: TimerSnapshot) {
        let mut state = self.lock();
        let Some(record) = state.records.get_mut(task_id) else {
            return;
        };
        record.is_active = snapshot.is_active;
        record.elapsed_seconds = snapshot.elapsed_seconds;
        record.last_tick = Instant::now();
        if snapshot.is_active {
            state.active.insert(task_id.to_string());
        } else {
            state.active.remove(task_id);
        }
        debug!(
            "[REGISTRY] Restored {}: active={}, elapsed={}s",
            task_id, snapshot.is_active, snapshot.elapsed_seconds
        );
    }

    /// Returns `None` when the id is unknown.
    pub fn subscribe(&self, task_id: &str, callback: Subscriber) -> Option<SubscriptionId> {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_subscription);
        let record = state.records.get_mut(task_id)?;
        record.subscribers.insert(id, callback);
        state.next_subscription += 1;
        Some(id)
    }

    pub fn unsubscribe(&self, task_id: &str, id: SubscriptionId) {
        if let Some(record) = self.lock().records.get_mut(task_id) {
            record.subscribers.remove(&id);
        }
    }

    /// Forget a task entirely (e.g. the task was deleted).
    pub fn remove(&self, task_id: &str) {
        let mut state = self.lock();
        state.records.remove(task_id);
        state.active.remove(task_id);
    }

    pub fn active_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().active.iter().cloned().collect();
        ids.sort();
        ids
    }
}

//! Task Update Coordinator: the single writer of the task collection.
//!
//! Time-only writes are throttled and backed by a durable pending marker;
//! every other mutation is applied optimistically and always sent.

mod files;
mod mutations;
mod throttle;

pub use throttle::UpdateThrottle;

use crate::api::TaskRemote;
use crate::config::ThrottlePolicy;
use crate::database::Database;
use crate::error::AppError;
use crate::models::{ChecklistItem, Task, TaskPayload};
use crate::store::TaskStore;
use scopeguard::guard;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub(crate) const LOAD_FAILED: &str = "Failed to load data. Please try again.";
pub(crate) const UPDATE_TASK_FAILED: &str = "Failed to update task. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Within `min_time_delta_secs` of the last accepted value
    SmallDelta,
    /// Same `(task, seconds)` accepted inside the duplicate window
    Duplicate,
}

/// Result of a time-only write. Network failures are not errors on this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUpdateOutcome {
    Sent,
    /// Remote write failed; the pending marker stays for replay
    Deferred,
    Suppressed(SuppressReason),
}

pub struct TaskUpdateCoordinator {
    pub(crate) remote: Arc<dyn TaskRemote>,
    pub(crate) store: Arc<TaskStore>,
    pub(crate) db: Arc<Database>,
    throttle: UpdateThrottle,
    policy: ThrottlePolicy,
    replaying: AtomicBool,
}

impl TaskUpdateCoordinator {
    pub fn new(
        remote: Arc<dyn TaskRemote>,
        store: Arc<TaskStore>,
        db: Arc<Database>,
        policy: ThrottlePolicy,
    ) -> Self {
        Self {
            remote,
            store,
            db,
            throttle: UpdateThrottle::new(policy),
            policy,
            replaying: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Fetch projects and tasks, attach local files, then replay pending markers.
    pub async fn load(&self) -> Result<(), AppError> {
        info!("[COORD] Fetching projects and tasks");
        let (projects, mut tasks) =
            tokio::try_join!(self.remote.list_projects(), self.remote.list_tasks()).map_err(
                |e| {
                    error!("[COORD] Error fetching data: {}", e);
                    self.store.set_error(LOAD_FAILED);
                    AppError::from(e)
                },
            )?;

        // attachments never come from the server
        for task in tasks.iter_mut() {
            task.files.clear();
        }
        match self.db.load_files() {
            Ok(files) => {
                for (task_id, file) in files {
                    if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                        task.files.push(file);
                    }
                }
            }
            Err(e) => warn!("[COORD] Could not load local files: {}", e),
        }

        info!(
            "[COORD] Loaded {} projects and {} tasks",
            projects.len(),
            tasks.len()
        );
        self.store.replace(tasks, projects);
        self.replay_pending_times().await;
        self.store.dismiss_error();
        Ok(())
    }

    /// Lightweight time-only path (PATCH `/tasks/{id}/time`).
    ///
    /// Order: delta check, duplicate check, durable marker, optimistic store
    /// update, remote write. A failed remote write is logged and reported as
    /// [`TimeUpdateOutcome::Deferred`]; only a marker write failure is an error.
    pub async fn update_time(
        &self,
        task_id: &str,
        seconds: u64,
    ) -> Result<TimeUpdateOutcome, AppError> {
        if let Some(known) = self.store.time_spent(task_id) {
            if known.abs_diff(seconds) <= self.policy.min_time_delta_secs {
                debug!(
                    "[COORD] Ignoring minimal time change for {} ({}s -> {}s)",
                    task_id, known, seconds
                );
                return Ok(TimeUpdateOutcome::Suppressed(SuppressReason::SmallDelta));
            }
        }

        if self.throttle.is_duplicate(task_id, seconds) {
            debug!(
                "[COORD] Ignoring duplicate time update for {} ({}s)",
                task_id, seconds
            );
            self.store.set_time(task_id, seconds);
            return Ok(TimeUpdateOutcome::Suppressed(SuppressReason::Duplicate));
        }

        self.save_marker(task_id, seconds)?;
        self.throttle.record(task_id, seconds);
        self.store.set_time(task_id, seconds);

        match self.remote.update_time(task_id, seconds).await {
            Ok(()) => {
                debug!("[COORD] Time for {} saved: {}s", task_id, seconds);
                self.clear_marker(task_id, seconds);
                Ok(TimeUpdateOutcome::Sent)
            }
            Err(e) => {
                warn!(
                    "[COORD] Time update for {} failed, keeping pending {}s: {}",
                    task_id, seconds, e
                );
                Ok(TimeUpdateOutcome::Deferred)
            }
        }
    }

    /// Time plus running flag (PATCH `/tasks/{id}/timer`). Remote failures are
    /// returned to the caller; the optimistic local state is kept. A failed
    /// marker write abandons the update before anything changes locally.
    pub async fn update_timer(
        &self,
        task_id: &str,
        seconds: u64,
        active: bool,
    ) -> Result<(), AppError> {
        self.save_marker(task_id, seconds)?;
        self.store.modify_task(task_id, |t| {
            t.time_spent = seconds;
            t.timer_active = active;
        });

        self.remote
            .update_timer(task_id, seconds, active)
            .await
            .map_err(|e| {
                warn!(
                    "[COORD] Timer state for {} not saved ({}s, active={}): {}",
                    task_id, seconds, active, e
                );
                AppError::from(e)
            })?;

        self.clear_marker(task_id, seconds);
        Ok(())
    }

    /// Full task update. A change that touches nothing but `time_spent` is
    /// dropped below `full_update_min_delta_secs` and otherwise rerouted to
    /// [`Self::update_time`].
    pub async fn update_task(&self, task: Task) -> Result<Task, AppError> {
        let current = self
            .store
            .task(&task.id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", task.id)))?;

        if current.differs_only_in_time(&task) {
            let delta = current.time_spent.abs_diff(task.time_spent);
            if delta < self.policy.full_update_min_delta_secs {
                debug!(
                    "[COORD] Ignoring {}s time change in full update of {}",
                    delta, task.id
                );
                return Ok(current);
            }
            debug!("[COORD] Task {} carries only a time change", task.id);
            self.update_time(&task.id, task.time_spent).await?;
            return Ok(self.store.task(&task.id).unwrap_or(task));
        }

        self.store.replace_task(task.clone());
        let payload = TaskPayload::from(&task);
        let mut saved = self
            .remote
            .update_task(&task.id, &payload)
            .await
            .map_err(|e| {
                error!("[COORD] Error updating task {}: {}", task.id, e);
                self.store.set_error(UPDATE_TASK_FAILED);
                AppError::from(e)
            })?;

        if !task.checklist.is_empty() && !saved.checklist.is_empty() {
            saved.checklist = keep_checklist_order(&task.checklist, &saved.checklist);
        }
        saved.files = task.files;
        self.store.replace_task(saved.clone());
        info!("[COORD] Task {} updated", saved.id);
        Ok(saved)
    }

    /// Authoritative copy of one task from the backend.
    pub async fn fetch_task(&self, task_id: &str) -> Result<Task, AppError> {
        Ok(self.remote.get_task(task_id).await?)
    }

    /// Replay leftover pending markers whose value exceeds the known time.
    /// Single-flight: a concurrent call returns 0 immediately.
    pub async fn replay_pending_times(&self) -> usize {
        if self
            .replaying
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("[COORD] Replay already in progress, skipping");
            return 0;
        }
        let _guard = guard((), |_| {
            self.replaying.store(false, Ordering::Release);
        });

        let markers = match self.db.load_pending_times() {
            Ok(markers) => markers,
            Err(e) => {
                warn!("[COORD] Could not read pending times: {}", e);
                return 0;
            }
        };
        if markers.is_empty() {
            return 0;
        }
        info!("[COORD] Found {} pending time marker(s)", markers.len());

        let mut replayed = 0;
        for marker in markers {
            let keep = match self.store.time_spent(&marker.task_id) {
                None => {
                    debug!("[COORD] Dropping marker of unknown task {}", marker.task_id);
                    false
                }
                Some(known) if marker.seconds <= known => {
                    debug!(
                        "[COORD] Dropping stale marker for {} ({}s <= {}s)",
                        marker.task_id, marker.seconds, known
                    );
                    false
                }
                Some(known) => {
                    info!(
                        "[COORD] Applying pending time for {} ({}s > {}s)",
                        marker.task_id, marker.seconds, known
                    );
                    match self.update_time(&marker.task_id, marker.seconds).await {
                        Ok(TimeUpdateOutcome::Deferred) => true,
                        Ok(_) => {
                            replayed += 1;
                            false
                        }
                        Err(e) => {
                            warn!("[COORD] Replay for {} failed: {}", marker.task_id, e);
                            true
                        }
                    }
                }
            };
            if !keep {
                self.clear_marker(&marker.task_id, marker.seconds);
            }
        }
        replayed
    }

    fn save_marker(&self, task_id: &str, seconds: u64) -> Result<(), AppError> {
        self.db.save_pending_time(task_id, seconds).map_err(|e| {
            let err = AppError::from(e);
            error!("[COORD] Could not record pending time for {}: {}", task_id, err);
            self.store.set_error(err.to_string());
            err
        })
    }

    /// Only removes the marker if it still holds `seconds`.
    fn clear_marker(&self, task_id: &str, seconds: u64) {
        if let Err(e) = self.db.remove_pending_time_if(task_id, seconds) {
            warn!("[COORD] Could not clear pending time for {}: {}", task_id, e);
        }
    }
}

/// Server items in the order the caller sent them; items the server dropped
/// fall back to the caller's copy.
fn keep_checklist_order(sent: &[ChecklistItem], saved: &[ChecklistItem]) -> Vec<ChecklistItem> {
    let by_id: HashMap<&str, &ChecklistItem> =
        saved.iter().map(|item| (item.id.as_str(), item)).collect();
    sent.iter()
        .map(|item| {
            by_id
                .get(item.id.as_str())
                .map(|found| (*found).clone())
                .unwrap_or_else(|| item.clone())
        })
        .collect()
}

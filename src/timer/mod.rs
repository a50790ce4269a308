mod controller;
mod format;
mod registry;
mod snapshot;
mod unload;

pub use controller::TimerController;
pub use format::{format_clock, format_duration};
pub use registry::{Subscriber, SubscriptionId, TimerRegistry};
pub use snapshot::SnapshotSlots;
pub use unload::{FlushHook, HookToken, UnloadGuard};

use crate::config::TimerConfig;
use crate::coordinator::TaskUpdateCoordinator;
use crate::models::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of one logical timer view, stable across remounts of that view.
///
/// Two views of the same task mounted side by side use different sessions so
/// their preserved snapshots never mix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub task_id: TaskId,
    pub session: String,
}

impl InstanceKey {
    pub fn new(task_id: impl Into<TaskId>, session: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            session: session.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task_id, self.session)
    }
}

/// `{is_active, elapsed_seconds}` carried across a teardown/rebuild boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub is_active: bool,
    pub elapsed_seconds: u64,
}

/// Lifecycle of one timer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerPhase {
    Uninitialized,
    /// Rebuilding from a preserved snapshot
    Restoring,
    /// Fresh mount from caller-supplied seconds
    Initializing,
    Idle,
    Running,
    /// Torn down, snapshot preserved
    Suspended,
}

/// What a view renders after every tick and state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdate {
    pub task_id: TaskId,
    pub session: String,
    pub seconds: u64,
    pub running: bool,
    pub clock: String,
}

pub trait TimerView: Send + Sync {
    fn render(&self, update: &TimerUpdate);
}

impl<F> TimerView for F
where
    F: Fn(&TimerUpdate) + Send + Sync,
{
    fn render(&self, update: &TimerUpdate) {
        self(update)
    }
}

/// Shared timer services handed to every mounted instance.
#[derive(Clone)]
pub struct TimerContext {
    pub registry: Arc<TimerRegistry>,
    pub slots: Arc<SnapshotSlots>,
    pub unload: Arc<UnloadGuard>,
    pub coordinator: Arc<TaskUpdateCoordinator>,
    pub config: TimerConfig,
}

impl TimerContext {
    pub fn new(coordinator: Arc<TaskUpdateCoordinator>, config: TimerConfig) -> Self {
        Self {
            registry: Arc::new(TimerRegistry::new()),
            slots: Arc::new(SnapshotSlots::new()),
            unload: Arc::new(UnloadGuard::new()),
            coordinator,
            config,
        }
    }

    /// Bind a timer for `key` to `view`. Must be called inside a tokio runtime.
    pub fn mount(
        &self,
        key: InstanceKey,
        initial_seconds: u64,
        view: Arc<dyn TimerView>,
    ) -> TimerController {
        TimerController::mount(self.clone(), key, initial_seconds, view)
    }
}

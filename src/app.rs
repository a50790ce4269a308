use crate::api::TaskRemote;
use crate::config::AppConfig;
use crate::coordinator::TaskUpdateCoordinator;
use crate::database::Database;
use crate::error::AppError;
use crate::models::TaskId;
use crate::store::TaskStore;
use crate::timer::TimerContext;
use std::sync::Arc;
use tracing::info;

/// Everything a view needs, wired once at startup and shared by reference.
#[derive(Clone)]
pub struct TaskApp {
    pub store: Arc<TaskStore>,
    pub coordinator: Arc<TaskUpdateCoordinator>,
    pub timers: TimerContext,
    pub config: AppConfig,
}

impl TaskApp {
    pub fn new(db: Arc<Database>, remote: Arc<dyn TaskRemote>, config: AppConfig) -> Self {
        let store = Arc::new(TaskStore::new());
        let coordinator = Arc::new(TaskUpdateCoordinator::new(
            remote,
            store.clone(),
            db,
            config.throttle,
        ));
        let timers = TimerContext::new(coordinator.clone(), config.timer);
        Self {
            store,
            coordinator,
            timers,
            config,
        }
    }

    /// Initial fetch plus replay of pending time markers.
    pub async fn start(&self) -> Result<(), AppError> {
        self.coordinator.load().await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), AppError> {
        self.coordinator.delete_task(task_id).await?;
        self.forget_timers(&[task_id.to_string()]);
        Ok(())
    }

    /// Deletion stops at the first failure; timers of the tasks already gone
    /// are dropped either way.
    pub async fn delete_completed_tasks(&self) -> Result<Vec<TaskId>, AppError> {
        let completed: Vec<TaskId> = self
            .store
            .tasks()
            .into_iter()
            .filter(|t| t.completed)
            .map(|t| t.id)
            .collect();
        let result = self.coordinator.delete_completed_tasks().await;
        let gone: Vec<TaskId> = completed
            .into_iter()
            .filter(|id| self.store.task(id).is_none())
            .collect();
        self.forget_timers(&gone);
        result
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<Vec<TaskId>, AppError> {
        let removed = self.coordinator.delete_project(project_id).await?;
        self.forget_timers(&removed);
        Ok(removed)
    }

    fn forget_timers(&self, task_ids: &[TaskId]) {
        for id in task_ids {
            self.timers.registry.remove(id);
            self.timers.slots.forget_task(id);
        }
    }

    /// Page-unload guard: flush every mounted timer, bounded by the configured timeout.
    pub async fn shutdown(&self) -> usize {
        let flushed = self
            .timers
            .unload
            .fire(self.config.timer.unload_flush_timeout)
            .await;
        info!("[SHUTDOWN] {} timer(s) flushed", flushed);
        flushed
    }
}

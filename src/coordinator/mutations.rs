use super::TaskUpdateCoordinator;
use crate::error::{ApiError, AppError};
use crate::models::{
    ChecklistItem, Comment, NewChecklistItem, NewComment, NewProject, NewTask, Project, Task,
    TaskId, TaskPayload,
};
use tracing::{error, info, warn};

/// Trimmed value, or a validation error when nothing is left.
fn required(value: &str, message: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(trimmed.to_string())
}

impl TaskUpdateCoordinator {
    /// Log a failed mutation and raise the general notification.
    fn surface(&self, context: &str, message: &str, e: ApiError) -> AppError {
        error!("[COORD] {}: {}", context, e);
        self.store.set_error(message);
        AppError::from(e)
    }

    pub(super) fn ensure_task(&self, task_id: &str) -> Result<Task, AppError> {
        self.store
            .task(task_id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))
    }

    fn drop_local_files(&self, task_ids: &[TaskId]) {
        match self.db.delete_files_for_tasks(task_ids) {
            Ok(0) => {}
            Ok(n) => info!("[COORD] Removed {} local file(s)", n),
            Err(e) => warn!("[COORD] Could not remove local files: {}", e),
        }
    }

    // ---- tasks ----

    pub async fn add_task(&self, new_task: NewTask) -> Result<Task, AppError> {
        required(&new_task.title, "Task title is required")?;
        required(&new_task.project_id, "Project is required")?;

        let payload = TaskPayload::from(&new_task);
        let mut task = self
            .remote
            .create_task(&payload)
            .await
            .map_err(|e| self.surface("Error adding task", "Failed to add task. Please try again.", e))?;
        task.files.clear();
        self.store.push_task(task.clone());
        info!("[COORD] Task {} created", task.id);
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), AppError> {
        self.remote.delete_task(task_id).await.map_err(|e| {
            self.surface(
                "Error deleting task",
                "Failed to delete task. Please try again.",
                e,
            )
        })?;
        self.store.remove_task(task_id);
        self.drop_local_files(&[task_id.to_string()]);
        info!("[COORD] Task {} deleted", task_id);
        Ok(())
    }

    /// Delete every completed task; returns the ids removed. Stops at the
    /// first failure, keeping what was already deleted.
    pub async fn delete_completed_tasks(&self) -> Result<Vec<TaskId>, AppError> {
        let ids: Vec<TaskId> = self
            .store
            .tasks()
            .into_iter()
            .filter(|t| t.completed)
            .map(|t| t.id)
            .collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Err(e) = self.remote.delete_task(&id).await {
                self.drop_local_files(&removed);
                return Err(self.surface(
                    "Error deleting completed tasks",
                    "Failed to delete completed tasks. Please try again.",
                    e,
                ));
            }
            self.store.remove_task(&id);
            removed.push(id);
        }
        self.drop_local_files(&removed);
        info!("[COORD] Deleted {} completed task(s)", removed.len());
        Ok(removed)
    }

    // ---- projects ----

    fn validate_project_name(&self, name: &str, except: Option<&str>) -> Result<String, AppError> {
        let name = required(name, "Project name is required")?;
        let taken = self.store.projects().iter().any(|p| {
            Some(p.id.as_str()) != except && p.name.to_lowercase() == name.to_lowercase()
        });
        if taken {
            return Err(AppError::Validation(
                "A project with this name already exists".to_string(),
            ));
        }
        Ok(name)
    }

    pub async fn add_project(&self, name: &str) -> Result<Project, AppError> {
        let name = self.validate_project_name(name, None)?;
        let project = self
            .remote
            .create_project(&NewProject { name })
            .await
            .map_err(|e| {
                self.surface(
                    "Error adding project",
                    "Failed to add project. Please try again.",
                    e,
                )
            })?;
        self.store.push_project(project.clone());
        info!("[COORD] Project {} created", project.id);
        Ok(project)
    }

    pub async fn rename_project(&self, project_id: &str, name: &str) -> Result<Project, AppError> {
        if self.store.project(project_id).is_none() {
            return Err(AppError::NotFound(format!("project {}", project_id)));
        }
        let name = self.validate_project_name(name, Some(project_id))?;
        let project = self
            .remote
            .update_project(project_id, &NewProject { name })
            .await
            .map_err(|e| {
                self.surface(
                    "Error renaming project",
                    "Failed to rename project. Please try again.",
                    e,
                )
            })?;
        self.store.replace_project(project.clone());
        Ok(project)
    }

    /// The backend cascades to the project's tasks; the same tasks (and only
    /// those) leave the local collection once the delete succeeds.
    pub async fn delete_project(&self, project_id: &str) -> Result<Vec<TaskId>, AppError> {
        self.remote.delete_project(project_id).await.map_err(|e| {
            self.surface(
                "Error deleting project",
                "Failed to delete project. Please try again.",
                e,
            )
        })?;
        self.store.remove_project(project_id);
        let removed = self
            .store
            .remove_tasks_where(|t| t.project_id == project_id);
        self.drop_local_files(&removed);
        info!(
            "[COORD] Project {} deleted with {} task(s)",
            project_id,
            removed.len()
        );
        Ok(removed)
    }

    // ---- comments ----

    pub async fn add_comment(&self, task_id: &str, text: &str) -> Result<Comment, AppError> {
        let text = required(text, "Comment text is required")?;
        self.ensure_task(task_id)?;
        let comment = self
            .remote
            .create_comment(&NewComment {
                task_id: task_id.to_string(),
                text,
            })
            .await
            .map_err(|e| {
                self.surface(
                    "Error adding comment",
                    "Failed to add comment. Please try again.",
                    e,
                )
            })?;
        self.store
            .modify_task(task_id, |t| t.comments.push(comment.clone()));
        Ok(comment)
    }

    pub async fn edit_comment(
        &self,
        task_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        let text = required(text, "Comment text is required")?;
        self.ensure_task(task_id)?;
        self.store.modify_task(task_id, |t| {
            if let Some(c) = t.comments.iter_mut().find(|c| c.id == comment_id) {
                c.text = text.clone();
            }
        });
        let saved = self
            .remote
            .update_comment(comment_id, &text)
            .await
            .map_err(|e| {
                self.surface(
                    "Error updating comment",
                    "Failed to update comment. Please try again.",
                    e,
                )
            })?;
        self.store.modify_task(task_id, |t| {
            if let Some(c) = t.comments.iter_mut().find(|c| c.id == saved.id) {
                *c = saved.clone();
            }
        });
        Ok(saved)
    }

    pub async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<(), AppError> {
        self.remote.delete_comment(comment_id).await.map_err(|e| {
            self.surface(
                "Error deleting comment",
                "Failed to delete comment. Please try again.",
                e,
            )
        })?;
        self.store
            .modify_task(task_id, |t| t.comments.retain(|c| c.id != comment_id));
        Ok(())
    }

    // ---- checklist ----

    pub async fn add_checklist_item(
        &self,
        task_id: &str,
        text: &str,
    ) -> Result<ChecklistItem, AppError> {
        let text = required(text, "Checklist item text is required")?;
        self.ensure_task(task_id)?;
        let item = self
            .remote
            .create_checklist_item(&NewChecklistItem {
                task_id: task_id.to_string(),
                text,
                completed: false,
            })
            .await
            .map_err(|e| {
                self.surface(
                    "Error adding checklist item",
                    "Failed to add checklist item. Please try again.",
                    e,
                )
            })?;
        self.store
            .modify_task(task_id, |t| t.checklist.push(item.clone()));
        Ok(item)
    }

    /// Toggle or rename an item in place; list order never changes.
    pub async fn set_checklist_item(
        &self,
        task_id: &str,
        item: ChecklistItem,
    ) -> Result<ChecklistItem, AppError> {
        let text = required(&item.text, "Checklist item text is required")?;
        self.ensure_task(task_id)?;
        let item = ChecklistItem { text, ..item };
        self.store.modify_task(task_id, |t| {
            if let Some(slot) = t.checklist.iter_mut().find(|i| i.id == item.id) {
                *slot = item.clone();
            }
        });
        let saved = self.remote.update_checklist_item(&item).await.map_err(|e| {
            self.surface(
                "Error updating checklist item",
                "Failed to update checklist item. Please try again.",
                e,
            )
        })?;
        self.store.modify_task(task_id, |t| {
            if let Some(slot) = t.checklist.iter_mut().find(|i| i.id == saved.id) {
                *slot = saved.clone();
            }
        });
        Ok(saved)
    }

    pub async fn delete_checklist_item(&self, task_id: &str, item_id: &str) -> Result<(), AppError> {
        self.remote
            .delete_checklist_item(item_id)
            .await
            .map_err(|e| {
                self.surface(
                    "Error deleting checklist item",
                    "Failed to delete checklist item. Please try again.",
                    e,
                )
            })?;
        self.store
            .modify_task(task_id, |t| t.checklist.retain(|i| i.id != item_id));
        Ok(())
    }
}

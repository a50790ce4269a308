//! Remote REST collaborator.
//!
//! [`TaskRemote`] is the seam between the coordinator and the network;
//! [`ApiClient`] is the reqwest implementation used by the app.

mod client;

pub use client::ApiClient;

use crate::error::ApiError;
use crate::models::{
    ChecklistItem, Comment, NewChecklistItem, NewComment, NewProject, Project, Task, TaskPayload,
};
use async_trait::async_trait;

#[async_trait]
pub trait TaskRemote: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError>;
    async fn get_task(&self, id: &str) -> Result<Task, ApiError>;
    async fn create_task(&self, task: &TaskPayload) -> Result<Task, ApiError>;
    async fn update_task(&self, id: &str, task: &TaskPayload) -> Result<Task, ApiError>;
    async fn delete_task(&self, id: &str) -> Result<(), ApiError>;

    /// PATCH `/tasks/{id}/time`: lightweight time-only write.
    async fn update_time(&self, id: &str, time_spent: u64) -> Result<(), ApiError>;
    /// PATCH `/tasks/{id}/timer`: time plus running flag.
    async fn update_timer(
        &self,
        id: &str,
        time_spent: u64,
        timer_active: bool,
    ) -> Result<(), ApiError>;

    async fn list_projects(&self) -> Result<Vec<Project>, ApiError>;
    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError>;
    async fn update_project(&self, id: &str, project: &NewProject) -> Result<Project, ApiError>;
    /// The server cascades the delete to the project's tasks.
    async fn delete_project(&self, id: &str) -> Result<(), ApiError>;

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment, ApiError>;
    async fn update_comment(&self, id: &str, text: &str) -> Result<Comment, ApiError>;
    async fn delete_comment(&self, id: &str) -> Result<(), ApiError>;

    async fn create_checklist_item(&self, item: &NewChecklistItem)
        -> Result<ChecklistItem, ApiError>;
    async fn update_checklist_item(&self, item: &ChecklistItem) -> Result<ChecklistItem, ApiError>;
    async fn delete_checklist_item(&self, id: &str) -> Result<(), ApiError>;
}

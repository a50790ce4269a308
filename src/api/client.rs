use super::TaskRemote;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::{
    ChecklistItem, Comment, NewChecklistItem, NewComment, NewProject, Project, Task, TaskPayload,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-over-HTTP client for the task backend.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) api_base_url: String,
    pub(crate) client: reqwest::Client,
    pub(crate) app_version: String,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            app_version: config.app_version,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!("[API] {} {}", method, path);
        self.client
            .request(method, format!("{}{}", self.api_base_url, path))
            .header("Content-Type", "application/json")
            .header("X-App-Version", &self.app_version)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").into()
        } else {
            body
        };
        warn!("[API] HTTP {}: {}", status.as_u16(), message);
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl TaskRemote for ApiClient {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let tasks: Vec<Task> = self.send_json(self.request(Method::GET, "/tasks")).await?;
        debug!("[API] Retrieved {} tasks", tasks.len());
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> Result<Task, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/tasks/{}", id)))
            .await
    }

    async fn create_task(&self, task: &TaskPayload) -> Result<Task, ApiError> {
        self.send_json(self.request(Method::POST, "/tasks").json(task))
            .await
    }

    async fn update_task(&self, id: &str, task: &TaskPayload) -> Result<Task, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("/tasks/{}", id))
                .json(task),
        )
        .await
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/tasks/{}", id)))
            .await
    }

    async fn update_time(&self, id: &str, time_spent: u64) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::PATCH, &format!("/tasks/{}/time", id))
                .json(&serde_json::json!({ "timeSpent": time_spent })),
        )
        .await
    }

    async fn update_timer(
        &self,
        id: &str,
        time_spent: u64,
        timer_active: bool,
    ) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::PATCH, &format!("/tasks/{}/timer", id))
                .json(&serde_json::json!({
                    "timeSpent": time_spent,
                    "timerActive": timer_active,
                })),
        )
        .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.send_json(self.request(Method::GET, "/projects")).await
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
        self.send_json(self.request(Method::POST, "/projects").json(project))
            .await
    }

    async fn update_project(&self, id: &str, project: &NewProject) -> Result<Project, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("/projects/{}", id))
                .json(project),
        )
        .await
    }

    async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/projects/{}", id)))
            .await
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        self.send_json(self.request(Method::POST, "/comments").json(comment))
            .await
    }

    async fn update_comment(&self, id: &str, text: &str) -> Result<Comment, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("/comments/{}", id))
                .json(&serde_json::json!({ "text": text })),
        )
        .await
    }

    async fn delete_comment(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/comments/{}", id)))
            .await
    }

    async fn create_checklist_item(
        &self,
        item: &NewChecklistItem,
    ) -> Result<ChecklistItem, ApiError> {
        self.send_json(self.request(Method::POST, "/checklist").json(item))
            .await
    }

    async fn update_checklist_item(&self, item: &ChecklistItem) -> Result<ChecklistItem, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("/checklist/{}", item.id))
                .json(item),
        )
        .await
    }

    async fn delete_checklist_item(&self, id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/checklist/{}", id)))
            .await
    }
}

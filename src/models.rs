use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Local attachment. `url` is the storage key (`file_<id>`), never the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub url: String,
}

/// Task as held by the collection. Project references are always a plain id;
/// see [`TaskWire`] for the shapes accepted from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaskWire", rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub project_id: String,
    pub deadline: DateTime<Utc>,
    pub priority: Priority,
    pub completed: bool,
    /// Last persisted whole seconds
    pub time_spent: u64,
    /// Last persisted running flag
    pub timer_active: bool,
    pub comments: Vec<Comment>,
    pub checklist: Vec<ChecklistItem>,
    pub files: Vec<TaskFile>,
}

/// Project reference as sent by the server: a bare id or an embedded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectRef {
    Id(String),
    Embedded {
        id: String,
        #[allow(dead_code)]
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    id: TaskId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    project: Option<ProjectRef>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(deserialize_with = "deserialize_deadline")]
    deadline: DateTime<Utc>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    time_spent: u64,
    #[serde(default)]
    timer_active: Option<bool>,
    #[serde(default)]
    comments: Option<Vec<Comment>>,
    #[serde(default)]
    checklist: Option<Vec<ChecklistItem>>,
    #[serde(default)]
    files: Option<Vec<TaskFile>>,
}

impl From<TaskWire> for Task {
    fn from(wire: TaskWire) -> Self {
        // embedded object wins over projectId, which wins over nothing
        let project_id = match wire.project {
            Some(ProjectRef::Id(id)) if !id.is_empty() => id,
            Some(ProjectRef::Embedded { id, .. }) => id,
            _ => wire.project_id.unwrap_or_default(),
        };
        Self {
            id: wire.id,
            title: wire.title,
            description: wire.description,
            project_id,
            deadline: wire.deadline,
            priority: wire.priority,
            completed: wire.completed,
            time_spent: wire.time_spent,
            timer_active: wire.timer_active.unwrap_or(false),
            comments: wire.comments.unwrap_or_default(),
            checklist: wire.checklist.unwrap_or_default(),
            files: wire.files.unwrap_or_default(),
        }
    }
}

impl Task {
    /// True when `other` is this task with nothing but `time_spent` changed.
    pub fn differs_only_in_time(&self, other: &Task) -> bool {
        if self.time_spent == other.time_spent {
            return false;
        }
        let mut probe = other.clone();
        probe.time_spent = self.time_spent;
        probe == *self
    }

    /// Pending task whose deadline already passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.deadline < now
    }

    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.deadline.date_naive() == day
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM` (form input) or a bare `YYYY-MM-DD` (UTC midnight).
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_deadline(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid deadline: {}", raw)))
}

/// Input for creating a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub project_id: String,
    #[serde(deserialize_with = "deserialize_deadline")]
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub checklist: Vec<NewChecklistText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChecklistText {
    pub text: String,
}

/// Body of POST/PUT `/tasks`. Files stay local and are never sent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub title: String,
    pub description: String,
    pub project_id: String,
    pub deadline: DateTime<Utc>,
    pub priority: Priority,
    pub completed: bool,
    pub time_spent: u64,
    pub timer_active: bool,
    pub comments: Vec<Comment>,
    pub checklist: Vec<PayloadChecklistItem>,
}

/// Checklist entry in a task payload; new items have no id yet.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadChecklistItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    pub completed: bool,
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            project_id: task.project_id.clone(),
            deadline: task.deadline,
            priority: task.priority,
            completed: task.completed,
            time_spent: task.time_spent,
            timer_active: task.timer_active,
            comments: task.comments.clone(),
            checklist: task
                .checklist
                .iter()
                .map(|item| PayloadChecklistItem {
                    id: Some(item.id.clone()),
                    text: item.text.clone(),
                    completed: item.completed,
                })
                .collect(),
        }
    }
}

impl From<&NewTask> for TaskPayload {
    fn from(task: &NewTask) -> Self {
        Self {
            title: task.title.trim().to_string(),
            description: task.description.clone(),
            project_id: task.project_id.clone(),
            deadline: task.deadline,
            priority: task.priority,
            completed: false,
            time_spent: 0,
            timer_active: false,
            comments: Vec::new(),
            checklist: task
                .checklist
                .iter()
                .filter(|item| !item.text.trim().is_empty())
                .map(|item| PayloadChecklistItem {
                    id: None,
                    text: item.text.trim().to_string(),
                    completed: false,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub task_id: TaskId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChecklistItem {
    pub task_id: TaskId,
    pub text: String,
    pub completed: bool,
}

/// Attachment upload from a view.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Not-yet-confirmed elapsed value kept in the local store until the remote write succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingTimeMarker {
    pub task_id: TaskId,
    pub seconds: u64,
    pub recorded_at: i64,
}

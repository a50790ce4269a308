use crate::models::{Priority, Project, Task, TaskFile, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSort {
    #[default]
    None,
    Title,
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskView {
    Overdue,
    /// Deadline falls on the current UTC day
    Today,
    Completed,
}

/// List filter used by the task list screen.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub sort: TaskSort,
    #[serde(default)]
    pub view: Option<TaskView>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskGroups {
    pub overdue: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub completed: Vec<Task>,
}

/// In-memory task and project collections plus the single dismissible
/// error notification. Views read; only the coordinator mutates.
#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<Vec<Task>>,
    projects: Mutex<Vec<Project>>,
    error: Mutex<Option<String>>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        relock(&self.tasks).clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        relock(&self.tasks).iter().find(|t| t.id == id).cloned()
    }

    pub fn projects(&self) -> Vec<Project> {
        relock(&self.projects).clone()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        relock(&self.projects).iter().find(|p| p.id == id).cloned()
    }

    /// Display name for a project id; unknown ids resolve to `None`.
    pub fn project_name(&self, id: &str) -> Option<String> {
        self.project(id).map(|p| p.name)
    }

    /// Last persisted seconds for a task, `None` when the task is unknown.
    pub fn time_spent(&self, id: &str) -> Option<u64> {
        relock(&self.tasks)
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.time_spent)
    }

    pub fn error(&self) -> Option<String> {
        relock(&self.error).clone()
    }

    pub fn query(&self, query: &TaskQuery, now: DateTime<Utc>) -> Vec<Task> {
        let mut tasks: Vec<Task> = relock(&self.tasks)
            .iter()
            .filter(|t| {
                query
                    .project_id
                    .as_deref()
                    .map_or(true, |id| t.project_id == id)
            })
            .filter(|t| query.priority.map_or(true, |p| t.priority == p))
            .cloned()
            .collect();

        match query.sort {
            TaskSort::Title => tasks.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
            TaskSort::Deadline => tasks.sort_by_key(|t| t.deadline),
            TaskSort::None => {}
        }

        if let Some(view) = query.view {
            let today = now.date_naive();
            tasks.retain(|t| match view {
                TaskView::Overdue => t.is_overdue(now),
                TaskView::Today => t.is_due_on(today),
                TaskView::Completed => t.completed,
            });
        }
        tasks
    }

    /// Split into overdue / upcoming / completed, keeping collection order.
    pub fn groups(&self, now: DateTime<Utc>) -> TaskGroups {
        group_tasks(relock(&self.tasks).iter().cloned(), now)
    }

    pub(crate) fn replace(&self, tasks: Vec<Task>, projects: Vec<Project>) {
        *relock(&self.tasks) = tasks;
        *relock(&self.projects) = projects;
    }

    pub(crate) fn push_task(&self, task: Task) {
        relock(&self.tasks).push(task);
    }

    /// Apply `f` to the task in place. Returns false when the task is unknown.
    pub(crate) fn modify_task(&self, id: &str, f: impl FnOnce(&mut Task)) -> bool {
        match relock(&self.tasks).iter_mut().find(|t| t.id == id) {
            Some(task) => {
                f(task);
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_task(&self, task: Task) {
        let mut tasks = relock(&self.tasks);
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => tasks.push(task),
        }
    }

    pub(crate) fn remove_task(&self, id: &str) -> Option<Task> {
        let mut tasks = relock(&self.tasks);
        let index = tasks.iter().position(|t| t.id == id)?;
        Some(tasks.remove(index))
    }

    /// Remove every task matching `predicate`, returning the removed ids.
    pub(crate) fn remove_tasks_where(&self, predicate: impl Fn(&Task) -> bool) -> Vec<TaskId> {
        let mut tasks = relock(&self.tasks);
        let removed = tasks
            .iter()
            .filter(|t| predicate(t))
            .map(|t| t.id.clone())
            .collect();
        tasks.retain(|t| !predicate(t));
        removed
    }

    pub(crate) fn push_project(&self, project: Project) {
        relock(&self.projects).push(project);
    }

    pub(crate) fn replace_project(&self, project: Project) {
        let mut projects = relock(&self.projects);
        if let Some(slot) = projects.iter_mut().find(|p| p.id == project.id) {
            *slot = project;
        }
    }

    pub(crate) fn remove_project(&self, id: &str) {
        relock(&self.projects).retain(|p| p.id != id);
    }

    pub(crate) fn set_time(&self, id: &str, seconds: u64) {
        self.modify_task(id, |t| t.time_spent = seconds);
    }

    pub(crate) fn attach_file(&self, task_id: &str, file: TaskFile) -> bool {
        self.modify_task(task_id, |t| t.files.push(file))
    }

    /// Newest message wins.
    pub fn set_error(&self, message: impl Into<String>) {
        *relock(&self.error) = Some(message.into());
    }

    pub fn dismiss_error(&self) {
        *relock(&self.error) = None;
    }
}

pub fn group_tasks(tasks: impl IntoIterator<Item = Task>, now: DateTime<Utc>) -> TaskGroups {
    let mut groups = TaskGroups::default();
    for task in tasks {
        if task.completed {
            groups.completed.push(task);
        } else if task.is_overdue(now) {
            groups.overdue.push(task);
        } else {
            groups.upcoming.push(task);
        }
    }
    groups
}

/// Rounded percentage of completed checklist items; `None` without a checklist.
pub fn checklist_progress(task: &Task) -> Option<u8> {
    percentage(
        task.checklist.iter().filter(|i| i.completed).count(),
        task.checklist.len(),
    )
}

/// Same as [`checklist_progress`] over the combined checklists of `tasks`.
pub fn group_progress(tasks: &[Task]) -> Option<u8> {
    let total = tasks.iter().map(|t| t.checklist.len()).sum();
    let done = tasks
        .iter()
        .flat_map(|t| t.checklist.iter())
        .filter(|i| i.completed)
        .count();
    percentage(done, total)
}

fn percentage(done: usize, total: usize) -> Option<u8> {
    if total == 0 {
        return None;
    }
    Some(((done as f64 / total as f64) * 100.0).round() as u8)
}

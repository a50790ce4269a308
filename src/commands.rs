use crate::app::TaskApp;
use crate::ipc::events;
use crate::models::{ChecklistItem, Comment, NewFile, NewTask, Project, Task, TaskFile, TaskId};
use crate::store::{TaskGroups, TaskQuery};
use crate::timer::{InstanceKey, TimerController, TimerUpdate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tauri::{AppHandle, Emitter, State};
use tracing::{debug, warn};

/// Timer controllers currently bound to a frontend view.
#[derive(Default)]
pub struct MountedTimers {
    controllers: Mutex<HashMap<InstanceKey, TimerController>>,
}

impl MountedTimers {
    fn get(&self, key: &InstanceKey) -> Result<TimerController, String> {
        self.controllers
            .lock()
            .map_err(|e| format!("Mutex poisoned: {}", e))?
            .get(key)
            .cloned()
            .ok_or_else(|| format!("Timer {} is not mounted", key))
    }
}

/// Push the current notification to the frontend after a mutation.
fn emit_notification(app: &AppHandle, state: &TaskApp) {
    if let Err(e) = app.emit(events::NOTIFICATION, state.store.error()) {
        warn!("[IPC] Failed to emit notification: {}", e);
    }
}

/// Mutations report through the notification surface and return a plain string error.
fn finish<T>(app: &AppHandle, state: &TaskApp, result: Result<T, crate::AppError>) -> Result<T, String> {
    emit_notification(app, state);
    result.map_err(|e| e.to_string())
}

// ---- data ----

#[tauri::command]
pub async fn load_data(state: State<'_, TaskApp>, app: AppHandle) -> Result<(), String> {
    let result = state.start().await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn get_tasks(state: State<'_, TaskApp>) -> Result<Vec<Task>, String> {
    Ok(state.store.tasks())
}

#[tauri::command]
pub async fn get_projects(state: State<'_, TaskApp>) -> Result<Vec<Project>, String> {
    Ok(state.store.projects())
}

#[tauri::command]
pub async fn query_tasks(
    state: State<'_, TaskApp>,
    query: TaskQuery,
) -> Result<Vec<Task>, String> {
    Ok(state.store.query(&query, chrono::Utc::now()))
}

#[tauri::command]
pub async fn get_task_groups(state: State<'_, TaskApp>) -> Result<TaskGroups, String> {
    Ok(state.store.groups(chrono::Utc::now()))
}

// ---- tasks ----

#[tauri::command]
pub async fn add_task(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task: NewTask,
) -> Result<Task, String> {
    let result = state.coordinator.add_task(task).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn update_task(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task: Task,
) -> Result<Task, String> {
    let result = state.coordinator.update_task(task).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn delete_task(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
) -> Result<(), String> {
    let result = state.delete_task(&task_id).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn delete_completed_tasks(
    state: State<'_, TaskApp>,
    app: AppHandle,
) -> Result<Vec<TaskId>, String> {
    let result = state.delete_completed_tasks().await;
    finish(&app, &state, result)
}

// ---- projects ----

#[tauri::command]
pub async fn add_project(
    state: State<'_, TaskApp>,
    app: AppHandle,
    name: String,
) -> Result<Project, String> {
    let result = state.coordinator.add_project(&name).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn rename_project(
    state: State<'_, TaskApp>,
    app: AppHandle,
    project_id: String,
    name: String,
) -> Result<Project, String> {
    let result = state.coordinator.rename_project(&project_id, &name).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn delete_project(
    state: State<'_, TaskApp>,
    app: AppHandle,
    project_id: String,
) -> Result<Vec<TaskId>, String> {
    let result = state.delete_project(&project_id).await;
    finish(&app, &state, result)
}

// ---- comments & checklist ----

#[tauri::command]
pub async fn add_comment(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    text: String,
) -> Result<Comment, String> {
    let result = state.coordinator.add_comment(&task_id, &text).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn edit_comment(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    comment_id: String,
    text: String,
) -> Result<Comment, String> {
    let result = state
        .coordinator
        .edit_comment(&task_id, &comment_id, &text)
        .await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn delete_comment(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    comment_id: String,
) -> Result<(), String> {
    let result = state.coordinator.delete_comment(&task_id, &comment_id).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn add_checklist_item(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    text: String,
) -> Result<ChecklistItem, String> {
    let result = state.coordinator.add_checklist_item(&task_id, &text).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn set_checklist_item(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    item: ChecklistItem,
) -> Result<ChecklistItem, String> {
    let result = state.coordinator.set_checklist_item(&task_id, item).await;
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn delete_checklist_item(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    item_id: String,
) -> Result<(), String> {
    let result = state
        .coordinator
        .delete_checklist_item(&task_id, &item_id)
        .await;
    finish(&app, &state, result)
}

// ---- files ----

#[tauri::command]
pub async fn add_file(
    state: State<'_, TaskApp>,
    app: AppHandle,
    task_id: String,
    file: NewFile,
) -> Result<TaskFile, String> {
    let result = state.coordinator.add_file(&task_id, file);
    finish(&app, &state, result)
}

#[tauri::command]
pub async fn remove_file(
    state: State<'_, TaskApp>,
    task_id: String,
    file_id: String,
) -> Result<(), String> {
    state
        .coordinator
        .remove_file(&task_id, &file_id)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_file_content(
    state: State<'_, TaskApp>,
    file_id: String,
) -> Result<Option<String>, String> {
    state
        .coordinator
        .file_content(&file_id)
        .map_err(|e| e.to_string())
}

// ---- notification ----

#[tauri::command]
pub async fn get_notification(state: State<'_, TaskApp>) -> Result<Option<String>, String> {
    Ok(state.store.error())
}

#[tauri::command]
pub async fn dismiss_notification(state: State<'_, TaskApp>, app: AppHandle) -> Result<(), String> {
    state.store.dismiss_error();
    emit_notification(&app, &state);
    Ok(())
}

// ---- timers ----

/// Bind a timer to a frontend view. Updates arrive as `timer-update` events.
#[tauri::command]
pub async fn mount_timer(
    state: State<'_, TaskApp>,
    timers: State<'_, MountedTimers>,
    app: AppHandle,
    task_id: String,
    session: String,
    initial_seconds: u64,
) -> Result<TimerUpdate, String> {
    let key = InstanceKey::new(task_id, session);
    // the previous instance hands over through its snapshot before the new one mounts
    let previous = timers
        .controllers
        .lock()
        .map_err(|e| format!("Mutex poisoned: {}", e))?
        .remove(&key);
    if let Some(previous) = previous {
        warn!("[TIMER] {} mounted twice, replacing", previous.key());
        previous.unmount();
    }

    let emitter = app.clone();
    let controller = state.timers.mount(
        key.clone(),
        initial_seconds,
        Arc::new(move |update: &TimerUpdate| {
            if let Err(e) = emitter.emit(events::TIMER_UPDATE, update) {
                debug!("[IPC] Failed to emit timer update: {}", e);
            }
        }),
    );
    let update = controller.update();
    timers
        .controllers
        .lock()
        .map_err(|e| format!("Mutex poisoned: {}", e))?
        .insert(key, controller);
    Ok(update)
}

#[tauri::command]
pub async fn unmount_timer(
    timers: State<'_, MountedTimers>,
    task_id: String,
    session: String,
) -> Result<(), String> {
    let key = InstanceKey::new(task_id, session);
    let controller = timers
        .controllers
        .lock()
        .map_err(|e| format!("Mutex poisoned: {}", e))?
        .remove(&key);
    if let Some(controller) = controller {
        controller.unmount();
    }
    Ok(())
}

#[tauri::command]
pub async fn toggle_timer(
    timers: State<'_, MountedTimers>,
    task_id: String,
    session: String,
) -> Result<TimerUpdate, String> {
    let controller = timers.get(&InstanceKey::new(task_id, session))?;
    controller.toggle().await.map_err(|e| e.to_string())?;
    Ok(controller.update())
}

#[tauri::command]
pub async fn reset_timer(
    timers: State<'_, MountedTimers>,
    task_id: String,
    session: String,
) -> Result<TimerUpdate, String> {
    let controller = timers.get(&InstanceKey::new(task_id, session))?;
    controller.reset().await.map_err(|e| e.to_string())?;
    Ok(controller.update())
}

#[tauri::command]
pub async fn get_timer(
    timers: State<'_, MountedTimers>,
    task_id: String,
    session: String,
) -> Result<TimerUpdate, String> {
    Ok(timers.get(&InstanceKey::new(task_id, session))?.update())
}

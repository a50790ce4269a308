//! Task and project board with per-task time tracking.
//!
//! The headless core (remote client, local store, task collection,
//! coordinator and timer subsystem) builds on its own; the `desktop`
//! feature adds the Tauri shell around it.

pub mod api;
pub mod app;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod models;
pub mod store;
pub mod timer;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod ipc;


pub use api::{ApiClient, TaskRemote};
pub use app::TaskApp;
pub use config::{ApiConfig, AppConfig, ThrottlePolicy, TimerConfig};
pub use coordinator::{SuppressReason, TaskUpdateCoordinator, TimeUpdateOutcome};
pub use database::Database;
pub use error::{ApiError, AppError};
pub use store::TaskStore;
pub use timer::{InstanceKey, TimerContext, TimerController, TimerPhase, TimerRegistry};

/// Install the fmt subscriber: `RUST_LOG` if set, `info` otherwise.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use crate::commands::*;
    use crate::{ApiClient, AppConfig, Database, TaskApp};
    use std::path::Path;
    use std::sync::Arc;
    use tauri::{Emitter, Listener, Manager, RunEvent};
    use tracing::{error, info, warn};

    /// Open the database, moving a corrupted file aside and starting fresh once.
    fn open_database(app: &tauri::App, app_data_dir: &Path) -> Result<Arc<Database>, std::io::Error> {
        let db_path = app_data_dir.join("taskboard.db");
        let db_path_str = db_path.to_str().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Database path contains invalid UTF-8: {}",
                    db_path.display()
                ),
            )
        })?;

        match Database::new(db_path_str) {
            Ok(db) => Ok(Arc::new(db)),
            Err(e) => {
                let err_str = e.to_string();
                let is_corruption = err_str.contains("corruption") || err_str.contains("integrity");
                if !is_corruption || !db_path.exists() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to initialize database: {}", e),
                    ));
                }
                let backup_path = app_data_dir.join(format!(
                    "taskboard.db.corrupted.{}",
                    chrono::Utc::now().timestamp()
                ));
                if let Err(rename_e) = std::fs::rename(&db_path, &backup_path) {
                    warn!(
                        "[DB] Failed to rename corrupted DB to {:?}: {}",
                        backup_path, rename_e
                    );
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Database corrupted and could not backup: {}", e),
                    ));
                }
                info!(
                    "[DB] Corrupted DB backed up to {:?}, starting fresh",
                    backup_path
                );
                let _ = app.handle().emit(crate::ipc::events::DB_RECOVERED, ());
                Database::new(db_path_str).map(Arc::new).map_err(|e2| {
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to create fresh database: {}", e2),
                    )
                })
            }
        }
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        crate::init_tracing();

        tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .plugin(tauri_plugin_notification::init())
            .setup(|app| {
                let app_data_dir = app.path().app_data_dir().map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Failed to get app data directory: {}", e),
                    )
                })?;
                std::fs::create_dir_all(&app_data_dir).map_err(|e| {
                    let msg = match e.kind() {
                        std::io::ErrorKind::PermissionDenied => {
                            "Permission denied. Check app data directory is writable."
                        }
                        _ => "Failed to create app data directory.",
                    };
                    std::io::Error::new(
                        e.kind(),
                        format!("{} Path: {}: {}", msg, app_data_dir.display(), e),
                    )
                })?;

                let db = open_database(app, &app_data_dir)?;

                let mut config = AppConfig::from_env();
                config.api.app_version = app.package_info().version.to_string();
                let remote = Arc::new(ApiClient::new(config.api.clone()));
                let task_app = TaskApp::new(db, remote, config);

                let loader = task_app.clone();
                let app_handle = app.handle().clone();
                tauri::async_runtime::spawn(async move {
                    if let Err(e) = loader.start().await {
                        error!("[SETUP] Initial load failed: {}", e);
                    }
                    let _ = app_handle.emit(crate::ipc::events::NOTIFICATION, loader.store.error());
                });

                // Page-unload guard: flush every mounted timer before the window goes away
                let for_close = task_app.clone();
                app.handle().listen("tauri://close-requested", move |_event| {
                    let flushed = tauri::async_runtime::block_on(for_close.shutdown());
                    info!("[SHUTDOWN] Window closing, {} timer(s) saved", flushed);
                });

                app.manage(task_app);
                app.manage(MountedTimers::default());
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                load_data,
                get_tasks,
                get_projects,
                query_tasks,
                get_task_groups,
                add_task,
                update_task,
                delete_task,
                delete_completed_tasks,
                add_project,
                rename_project,
                delete_project,
                add_comment,
                edit_comment,
                delete_comment,
                add_checklist_item,
                set_checklist_item,
                delete_checklist_item,
                add_file,
                remove_file,
                get_file_content,
                get_notification,
                dismiss_notification,
                mount_timer,
                unmount_timer,
                toggle_timer,
                reset_timer,
                get_timer
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application")
            .run(|app_handle, event| {
                if let RunEvent::ExitRequested { .. } = event {
                    if let Some(task_app) = app_handle.try_state::<TaskApp>() {
                        let flushed = tauri::async_runtime::block_on(task_app.shutdown());
                        info!("[SHUTDOWN] Exit requested, {} timer(s) saved", flushed);
                    }
                }
            });
    }
}

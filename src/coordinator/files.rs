use super::TaskUpdateCoordinator;
use crate::config::MAX_FILE_BYTES;
use crate::database::file_storage_key;
use crate::error::AppError;
use crate::models::{NewFile, TaskFile};
use base64::{engine::general_purpose, Engine as _};
use tracing::{error, info, warn};

const SAVE_FILE_FAILED: &str = "Failed to save file. Storage might be full.";

/// `data:<mime>;base64,<payload>` as stored locally.
fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

fn new_file_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

impl TaskUpdateCoordinator {
    /// Attach a file to a task. Files never leave this machine.
    pub fn add_file(&self, task_id: &str, file: NewFile) -> Result<TaskFile, AppError> {
        if file.bytes.len() > MAX_FILE_BYTES {
            return Err(AppError::Validation(format!(
                "File {} is too large (max: 5MB).",
                file.name
            )));
        }
        let content = to_data_url(&file.mime_type, &file.bytes);
        if content.len() > MAX_FILE_BYTES {
            return Err(AppError::Validation(format!(
                "File {} is too large after encoding.",
                file.name
            )));
        }
        self.ensure_task(task_id)?;

        let id = new_file_id();
        let stored = TaskFile {
            url: file_storage_key(&id),
            id,
            name: file.name,
            mime_type: file.mime_type,
            size: file.bytes.len() as u64,
        };
        if let Err(e) = self.db.save_file(task_id, &stored, &content) {
            error!("[COORD] Error saving file {}: {}", stored.name, e);
            self.store.set_error(SAVE_FILE_FAILED);
            return Err(AppError::from(e));
        }
        self.store.attach_file(task_id, stored.clone());
        info!(
            "[COORD] File {} ({} bytes) attached to {}",
            stored.id, stored.size, task_id
        );
        Ok(stored)
    }

    pub fn remove_file(&self, task_id: &str, file_id: &str) -> Result<(), AppError> {
        self.ensure_task(task_id)?;
        if let Err(e) = self.db.delete_file(file_id) {
            warn!("[COORD] Could not delete stored file {}: {}", file_id, e);
        }
        self.store
            .modify_task(task_id, |t| t.files.retain(|f| f.id != file_id));
        Ok(())
    }

    /// Stored data URL of a file, `None` when nothing is stored under that id.
    pub fn file_content(&self, file_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.db.load_file_content(file_id)?)
    }
}

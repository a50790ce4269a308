//! Centralized IPC event names.
//! Prevents typos between the Rust emitters and the frontend listeners.

/// Tauri event names (Rust emit ↔ Frontend listen)
pub mod events {
    /// Payload: `TimerUpdate`, after every tick and state change of a mounted timer
    pub const TIMER_UPDATE: &str = "timer-update";
    /// Payload: `Option<String>`, the current dismissible error notification
    pub const NOTIFICATION: &str = "notification";
    pub const DB_RECOVERED: &str = "db-recovered-from-corruption";
}

use std::time::Duration;

/// Per-file cap for local attachments, applied to raw bytes and to the encoded payload.
pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Remote API settings (base url, timeouts, app_version)
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base_url: String,
    pub http_timeout_secs: u64,
    /// Sent in X-App-Version header for debugging version skew
    pub app_version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            http_timeout_secs: 30,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `TASKBOARD_API_URL` / `TASKBOARD_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TASKBOARD_API_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.api_base_url = url.to_string();
            }
        }
        if let Some(secs) = std::env::var("TASKBOARD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            config.http_timeout_secs = secs;
        }
        config
    }
}

/// Cadence of a running timer instance.
#[derive(Debug, Clone, Copy)]
pub struct TimerConfig {
    /// Visual tick, one increment per firing
    pub tick: Duration,
    /// Periodic persistence of a running timer
    pub flush_interval: Duration,
    /// Upper bound for the best-effort flush when the window closes
    pub unload_flush_timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            flush_interval: Duration::from_secs(60),
            unload_flush_timeout: Duration::from_secs(2),
        }
    }
}

/// Suppression rules for time-only writes.
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    /// Deltas up to this many seconds from the last accepted value are dropped
    pub min_time_delta_secs: u64,
    /// Identical (task, seconds) pairs inside this window are dropped
    pub duplicate_window: Duration,
    /// Throttle cache entries older than this are evicted
    pub cache_ttl: Duration,
    /// A full task update carrying only a time change smaller than this is dropped
    pub full_update_min_delta_secs: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            min_time_delta_secs: 1,
            duplicate_window: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(60),
            full_update_min_delta_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub timer: TimerConfig,
    pub throttle: ThrottlePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            ..Default::default()
        }
    }
}

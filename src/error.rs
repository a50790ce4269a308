use std::fmt;

/// Errors from the remote REST collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    Network(String),
    Http { status: u16, message: String },
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(s) => write!(f, "Network: {}", s),
            ApiError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            ApiError::Decode(s) => write!(f, "Decode: {}", s),
        }
    }
}

impl std::error::Error for ApiError {}

/// Application-level error, the single type surfaced to views and commands.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// User input rejected before any remote call (shown inline).
    Validation(String),
    Api(ApiError),
    /// Local durable store failed (disk full, read-only, corruption).
    Storage(String),
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(s) => write!(f, "{}", s),
            AppError::Api(e) => write!(f, "API: {}", e),
            AppError::Storage(s) => write!(f, "Storage: {}", s),
            AppError::NotFound(s) => write!(f, "Not found: {}", s),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        AppError::Api(e)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(crate::database::storage_error_to_user_message(&e))
    }
}

impl AppError {
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

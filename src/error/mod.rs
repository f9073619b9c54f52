use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Collection error: {0}")]
    Collect(#[from] CollectError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Event store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store is array-shaped, not line-shaped: {path}")]
    ArrayShaped { path: String },

    #[error("Store is corrupt: {parsed} of {lines} lines parsed ({path})")]
    Corrupt {
        path: String,
        lines: usize,
        parsed: usize,
    },

    #[error("Append failed: {message}")]
    Append { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Projection engine errors
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(
        "Store schema version {found} exceeds supported version {supported}; upgrade required"
    )]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// Collector errors
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Invalid session metadata: {message}")]
    Metadata { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for projection operations
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Result type alias for collector operations
pub type CollectResult<T> = Result<T, CollectError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipsmithError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine load failed: {0}")]
    EngineLoad(String),

    #[error("Engine is not ready")]
    EngineNotReady,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Metadata extraction failed: {0}")]
    Extraction(String),

    #[error("{operation} timed out after {seconds}s")]
    ExecutionTimeout { operation: String, seconds: u64 },

    #[error("{0} failed")]
    ExecutionFailed(String),

    #[error("Failed to read output: {0}")]
    OutputReadFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl ClipsmithError {
    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            ClipsmithError::EngineLoad(_) => {
                "The media engine could not be loaded. Please try again.".to_string()
            }
            ClipsmithError::EngineNotReady => {
                "The media engine is still starting up.".to_string()
            }
            ClipsmithError::Validation(reason) => reason.clone(),
            ClipsmithError::Extraction(_) => {
                "The file appears to be corrupted or unreadable.".to_string()
            }
            ClipsmithError::ExecutionTimeout { .. } => {
                "Processing took too long. Please try again with a smaller file.".to_string()
            }
            ClipsmithError::ExecutionFailed(_) | ClipsmithError::OutputReadFailed(_) => {
                "Processing failed. Please try again.".to_string()
            }
            ClipsmithError::Cancelled => "Processing was cancelled.".to_string(),
            ClipsmithError::Io(_) => {
                "A working file could not be read or written. Check disk space and permissions.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipsmithError>;

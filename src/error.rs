use thiserror::Error;

/// Errors raised while driving the browser or harvesting a page
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Failed to snapshot page: {0}")]
    SnapshotFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Failed to {action}: {reason}")]
    InteractionFailed { action: String, reason: String },

    #[error("HEAD request failed: {0}")]
    HeadFailed(String),

    #[error("Download could not be started: {0}")]
    DownloadFailed(String),

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("A harvest run is already in progress")]
    RunInProgress,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl HarvestError {
    pub(crate) fn interaction(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::InteractionFailed { action: action.into(), reason: reason.to_string() }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, HarvestError>;

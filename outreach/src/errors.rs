use thiserror::Error;

/// Errors raised by an automation engine while driving a remote target.
#[derive(Error, Debug, Clone)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    /// The page or frame the operation targeted no longer exists.
    #[error("Context closed: {0}")]
    ContextClosed(String),

    #[error("Session failed to start: {0}")]
    SessionStart(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// True when the error means the context being operated on has vanished.
    pub fn is_context_gone(&self) -> bool {
        matches!(
            self,
            AutomationError::ContextClosed(_) | AutomationError::ElementDetached(_)
        )
    }
}

/// Reasons a submission is rejected before it ever reaches the queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Missing session id")]
    MissingSessionId,

    #[error("Queue is full ({0} tasks pending)")]
    QueueFull(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

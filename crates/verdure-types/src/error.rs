//! Error types for the Verdure orchestration kernel

use thiserror::Error;

/// Main error type for the Verdure workspace
#[derive(Error, Debug)]
pub enum VerdureError {
    /// IO related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key, record, or report absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown agent id requested from the registry
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// A bounded operation exceeded its limit
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient failure (connection blip, bus saturation); safe to retry
    #[error("Transient error: {0}")]
    Transient(String),

    /// Bad configuration; fail fast at configuration time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input provided to a function
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Downstream capability refused or unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Database related errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Lock acquisition errors
    #[error("Lock error: {0}")]
    LockError(String),

    /// Scheduler related errors
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    /// A sync session is already in flight on this orchestrator
    #[error("Session already running: {0}")]
    SessionInFlight(String),

    /// Persistence corruption or undecodable state; stops the scheduler
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Generic error with custom message
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for VerdureError {
    fn from(error: serde_json::Error) -> Self {
        VerdureError::Serialization {
            source: Box::new(error),
        }
    }
}

impl From<anyhow::Error> for VerdureError {
    fn from(error: anyhow::Error) -> Self {
        VerdureError::Other(format!("Anyhow error: {}", error))
    }
}

impl VerdureError {
    /// Whether a retry inside the same call boundary is reasonable
    pub fn is_transient(&self) -> bool {
        matches!(self, VerdureError::Transient(_) | VerdureError::Timeout(_))
    }
}

/// Result type for the Verdure workspace
pub type Result<T> = std::result::Result<T, VerdureError>;

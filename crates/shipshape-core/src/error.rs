use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Retryable filesystem trouble: permissions, locks, flaky mounts.
    #[error("transient IO error on '{path}': {message}")]
    TransientIo { path: String, message: String },

    /// Expected and actual content disagree. Never auto-retried.
    #[error("integrity error on '{path}': {message}")]
    Integrity { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Malformed structure config or unresolvable template syntax.
    /// Fails the whole planner invocation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two actions resolved to the same target and could not be renamed apart.
    #[error("conflict on target '{target}': {message}")]
    Conflict { target: String, message: String },

    #[error("plan {0} is not approved for execution")]
    PlanNotApproved(i64),

    /// Rollback finished but some checkpointed files could not be restored.
    #[error("rollback incomplete: {} file(s) could not be restored", discrepancies.len())]
    RollbackIncomplete { discrepancies: Vec<String> },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn integrity(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Integrity {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn transient(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TransientIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

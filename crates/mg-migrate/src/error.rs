//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Every variant is fatal for the migration run; no recovery is attempted
/// and partial writes to the destination are left as-is.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Invalid or missing configuration (CLI options, ports, endpoints).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or destination unreachable, or authentication failed.
    #[error("Connection error ({target}): {message}")]
    Connect { target: String, message: String },

    /// The reflector couldn't resolve a referenced table or column.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The source database rejected a statement.
    #[error("Source execution error: {0}")]
    SqlExec(String),

    /// Streaming rows from the source failed.
    #[error("Source fetch error: {0}")]
    SqlFetch(String),

    /// The destination rejected a statement.
    #[error("Destination execution error: {0}")]
    GraphExec(String),

    /// Streaming results from the destination failed.
    #[error("Destination fetch error: {0}")]
    GraphFetch(String),

    /// A destination statement produced a result shape outside its contract.
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// `execute` was called while a result stream was still open.
    /// This is an internal contract violation.
    #[error("Cursor is busy: {0}")]
    BusyCursor(String),
}

impl MigrateError {
    /// Create a Connect error with the endpoint it concerns.
    pub fn connect(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connect {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a SqlExec error with context about the failed statement.
    pub fn sql_exec(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::SqlExec(format!("{}: {}", context.into(), message))
    }

    /// Create a GraphExec error with context about the failed statement.
    pub fn graph_exec(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::GraphExec(format!("{}: {}", context.into(), message))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::Connect { .. } => 3,
            _ => 1,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

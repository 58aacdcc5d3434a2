//! Error types for the diagnostics toolkit.
//!
//! This module defines all error types using `thiserror` for ergonomic error
//! handling. Infrastructure failures (pool, connection, query) are errors;
//! diagnostic findings (schema deltas, encoding issues) are results and never
//! appear here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Connection pool exhausted: no connection became free within {timeout_secs}s")]
    PoolExhausted { timeout_secs: u64 },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Invalid connection handle: lease {lease_id} is not outstanding")]
    InvalidHandle { lease_id: String },

    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("SQL syntax error: {message}")]
    QuerySyntax {
        message: String,
        /// e.g., "42601" for a PostgreSQL syntax error
        sql_state: Option<String>,
    },

    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Database error: {message}")]
    Query {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Repair '{script_id}' failed at statement {statement_index}: {message}")]
    RepairExecutionFailed {
        script_id: String,
        /// Zero-based index of the statement that failed; statements before
        /// it were applied and are not rolled back.
        statement_index: usize,
        message: String,
    },

    #[error("Repair '{script_id}' verification failed: expected {expected}, observed {observed}")]
    RepairVerificationFailed {
        script_id: String,
        expected: String,
        observed: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ToolkitError {
    /// Create a connection-lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a syntax error with optional SQLSTATE.
    pub fn query_syntax(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::QuerySyntax {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a constraint violation error.
    pub fn constraint(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a generic database error.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an invalid handle error.
    pub fn invalid_handle(lease_id: impl Into<String>) -> Self {
        Self::InvalidHandle {
            lease_id: lease_id.into(),
        }
    }

    /// Create a repair execution error recording the partial-application point.
    pub fn repair_execution(
        script_id: impl Into<String>,
        statement_index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::RepairExecutionFailed {
            script_id: script_id.into(),
            statement_index,
            message: message.into(),
        }
    }

    /// Create a repair verification error with the observed end state.
    pub fn repair_verification(
        script_id: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::RepairVerificationFailed {
            script_id: script_id.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check whether this error warrants the single connection-loss retry.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    /// Get the SQLSTATE code for this error, if the database reported one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::QuerySyntax { sql_state, .. }
            | Self::ConstraintViolation { sql_state, .. }
            | Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Classify a driver-level database error into the toolkit taxonomy.
fn classify_database_error(db_err: Box<dyn sqlx::error::DatabaseError>) -> ToolkitError {
    use sqlx::error::ErrorKind;

    let code = db_err.code().map(|c| c.to_string());
    let message = db_err.message().to_string();

    match db_err.kind() {
        ErrorKind::UniqueViolation
        | ErrorKind::ForeignKeyViolation
        | ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation => ToolkitError::constraint(message, code),
        _ => {
            // SQLSTATE class 42 covers syntax errors and undefined objects;
            // SQLite reports no SQLSTATE so fall back on the message text.
            let is_syntax = code.as_deref().is_some_and(|c| c.starts_with("42"))
                || message.to_lowercase().contains("syntax");
            if is_syntax {
                ToolkitError::query_syntax(message, code)
            } else {
                ToolkitError::query(message, code)
            }
        }
    }
}

/// Convert sqlx errors to ToolkitError.
impl From<sqlx::Error> for ToolkitError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ToolkitError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => classify_database_error(db_err),
            sqlx::Error::RowNotFound => ToolkitError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => ToolkitError::PoolExhausted { timeout_secs: 0 },
            sqlx::Error::PoolClosed => ToolkitError::PoolClosed,
            sqlx::Error::Io(io_err) => {
                ToolkitError::connection_lost(format!("I/O error: {}", io_err))
            }
            sqlx::Error::Tls(tls_err) => ToolkitError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                ToolkitError::connection_lost(format!("Protocol error: {}", msg))
            }
            sqlx::Error::WorkerCrashed => ToolkitError::connection_lost("Database worker crashed"),
            sqlx::Error::TypeNotFound { type_name } => ToolkitError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                ToolkitError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => ToolkitError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                ToolkitError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => ToolkitError::internal(format!("Decode error: {}", source)),
            _ => ToolkitError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for toolkit operations.
pub type ToolkitResult<T> = Result<T, ToolkitError>;

//! Error types for SQLBridge operations.

use thiserror::Error as ThisError;

/// Boxed driver-level cause carried by execution and procedure errors.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all SQLBridge operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Missing or invalid connection parameters
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// No adapter registered under the requested dialect name
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
    /// The driver reported a parameter-marker style we cannot render
    #[error("Unsupported paramstyle: {0}")]
    UnsupportedParamStyle(String),
    /// Template parsing or evaluation failed
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    /// Heterogeneous rows handed to a bulk insert
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatchError),
    /// Driver-level failure while executing a statement
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    /// Stored-procedure call failure
    #[error("Procedure error: {0}")]
    Procedure(#[from] ProcedureError),
    /// Connect/disconnect failures
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    /// Pool checkout failures
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// Transaction misuse (finished or evicted transactions)
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    /// Value conversion errors
    #[error("Type error: {0}")]
    Type(#[from] TypeError),
}

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct ConfigError {
    /// The offending configuration key, when there is one
    pub key: Option<String>,
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            key: None,
            message: message.into(),
        }
    }

    /// A required key is absent.
    pub fn missing(key: &str, dialect: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            message: format!("missing required key '{key}' for {dialect}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// Malformed `${`, `[` or accessor syntax
    Syntax,
    /// A `$name` reference with no matching variable
    UnresolvedName,
    /// An accessor that cannot be applied to the resolved value
    BadAccess,
}

#[derive(Debug, Clone, ThisError)]
#[error("{message} at position {position} in {text:?}")]
pub struct TemplateError {
    pub kind: TemplateErrorKind,
    pub message: String,
    /// The full template text
    pub text: String,
    /// Byte offset of the failure
    pub position: usize,
}

#[derive(Debug, Clone, ThisError)]
#[error("row {row} for table {table} has columns {found:?}, expected {expected:?}")]
pub struct SchemaMismatchError {
    pub table: String,
    /// Index of the first row whose key set differs
    pub row: usize,
    pub expected: Vec<String>,
    pub found: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database busy or locked
    Busy,
    /// Statement interrupted
    Interrupted,
    /// Other database error
    Database,
}

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub sql: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the statement text that failed.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Attach the underlying driver error.
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, ThisError)]
#[error("{name}: {message}")]
pub struct ProcedureError {
    /// Procedure name
    pub name: String,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl ProcedureError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn caused_by(name: impl Into<String>, source: Error) -> Self {
        Self {
            name: name.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection was closed explicitly
    Closed,
}

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Connection checkout timeout
    Timeout,
    /// Pool is closed
    Closed,
    /// Configuration error
    Config,
}

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// The owning context was evicted or closed
    ContextClosed,
    /// Commit or rollback already happened
    AlreadyFinished,
}

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, ThisError)]
#[error("expected {expected}, found {actual}{}", .column.as_ref().map(|c| format!(" in column '{c}'")).unwrap_or_default())]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect | ConnectionErrorKind::Disconnected
            ),
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Execution(e) => e.sql.as_deref(),
            _ => None,
        }
    }

    pub fn execution(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Error::Execution(ExecutionError::new(kind, message))
    }
}

/// Result type alias for SQLBridge operations.
pub type Result<T> = std::result::Result<T, Error>;

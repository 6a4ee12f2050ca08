//! Engine-wide error taxonomy.
//!
//! Every fallible operation in the library returns [`DbResult`]. Errors bubble
//! up the pipeline unchanged; layers that can add useful context remap the
//! message (e.g. `"Failed to open table: ..."`). The server turns any error
//! into a single-line `ERROR:` response.

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// Bad input shape: arity mismatch, ambiguous column, empty statement.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Table or column lookup failed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate table on CREATE without IF NOT EXISTS.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Filesystem failures and corrupt file headers.
    #[error("IO error: {0}")]
    Io(String),

    /// Tokenizer and parser failures.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Evaluator or operator runtime failures.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Socket-level failures.
    #[error("Network error: {0}")]
    Network(String),

    /// Allocation exhaustion.
    #[error("Memory error: {0}")]
    Memory(String),

    /// Invariant violations.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, DbError::AlreadyExists(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DbError::InvalidArgument(_))
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, DbError::Parse(_))
    }

    pub fn is_execution_error(&self) -> bool {
        matches!(self, DbError::Execution(_))
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::Io(err.to_string())
    }
}

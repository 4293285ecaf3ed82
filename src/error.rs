//! Error taxonomy shared by every pipeline stage.
//!
//! Stages return [`IncomeError`] so callers can tell input problems (fix the
//! upload), internal wiring defects, retryable persistence faults and
//! malformed queries apart. Command handlers wrap these in `anyhow` context.

use thiserror::Error;

pub type IncomeResult<T> = Result<T, IncomeError>;

#[derive(Debug, Error)]
pub enum IncomeError {
    #[error("Failed to decode input as {encoding}")]
    Encoding { encoding: String },

    #[error("Invalid CSV format: {0}")]
    MalformedTable(String),

    #[error("Missing required column: {column} (available columns: {})", .available.join(", "))]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Input table has no data rows")]
    EmptyTable,

    #[error("Row count {rows} does not match estimate count {estimates}")]
    ShapeMismatch { rows: usize, estimates: usize },

    #[error("Persisting '{collection}' collection failed: {message}")]
    Persistence { collection: String, message: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Internal,
    Persistence,
    Query,
}

impl IncomeError {
    pub fn persistence(collection: &str, message: impl Into<String>) -> Self {
        IncomeError::Persistence {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IncomeError::Encoding { .. }
            | IncomeError::MalformedTable(_)
            | IncomeError::MissingColumn { .. }
            | IncomeError::EmptyTable => ErrorKind::Input,
            IncomeError::ShapeMismatch { .. } => ErrorKind::Internal,
            IncomeError::Persistence { .. } => ErrorKind::Persistence,
            IncomeError::InvalidQuery(_) => ErrorKind::Query,
        }
    }

    /// Only storage faults are worth retrying; everything else needs a
    /// different request.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

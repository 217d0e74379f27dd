//! Error types shared by the driver contract and the traced wrappers.

use std::fmt;

use thiserror::Error;

/// Boxed error returned by an underlying driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the driver contract.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors flowing through the driver contract.
///
/// Only [`Error::MalformedDescriptor`] is produced by this crate itself. Every
/// other variant is created by the underlying driver (or by the execution
/// context it honours) and is passed back to the caller unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection descriptor could not be split into key/value pairs.
    #[error("malformed connection descriptor: {0}")]
    MalformedDescriptor(String),

    /// The row cursor has no further rows. Not a failure.
    #[error("end of rows")]
    EndOfRows,

    /// The driver has no fast path or capability for this call. For direct
    /// exec/query the caller should fall back to prepare-then-execute.
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,

    /// The execution context was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The execution context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Any error reported by the backend.
    #[error("{0}")]
    Backend(#[source] BoxError),
}

impl Error {
    /// Wrap an arbitrary backend error.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    /// Wrap a backend error that carries its own diagnostics.
    pub fn diagnosed<E>(err: E) -> Self
    where
        E: crate::diagnostics::Diagnose + std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(crate::diagnostics::Diagnosed::new(err)))
    }

    /// Whether this is the end-of-rows sentinel.
    pub fn is_end_of_rows(&self) -> bool {
        matches!(self, Self::EndOfRows)
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// The backend's native rich error, modelled on a PostgreSQL `ErrorResponse`.
///
/// Drivers return it (possibly behind their own wrapping errors) so that
/// [`crate::diagnostics::extract`] can surface its fields on spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbError {
    pub severity: String,
    /// Five character SQLSTATE code.
    pub code: String,
    pub message: String,
    pub detail: String,
    pub hint: String,
    pub position: String,
    pub where_: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub data_type_name: String,
    pub constraint: String,
}

impl DbError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: "ERROR".to_string(),
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = constraint.into();
        self
    }

    pub fn with_where(mut self, where_: impl Into<String>) -> Self {
        self.where_ = where_.into();
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Condition name of the SQLSTATE code, empty when unknown.
    pub fn code_name(&self) -> &'static str {
        crate::diagnostics::condition_name(&self.code)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if !self.code.is_empty() {
            write!(f, " (SQLSTATE {})", self.code)?;
        }
        Ok(())
    }
}

impl std::error::Error for DbError {}

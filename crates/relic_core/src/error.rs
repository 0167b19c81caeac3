use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of error kinds every operation can surface.
///
/// Driver errors are translated into one of these before they reach the
/// caller; anything a backend reports that has no mapping lands in `Unknown`
/// with the raw message preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Single-row read or mutation could not locate its target.
    NotFound,
    /// A uniqueness constraint was violated.
    UniqueViolation,
    /// A referential constraint was violated.
    ForeignKeyViolation,
    /// A check constraint was violated.
    CheckViolation,
    /// A null was written to a non-nullable column.
    NotNullViolation,
    /// Caller-side malformed input (mutually exclusive options, empty
    /// payloads, unknown columns).
    Validation,
    /// A feature guard triggered before SQL emission.
    Unsupported,
    /// Driver transport failure (connect, pool checkout, broken socket).
    Connection,
    /// Unmapped backend error; carries the raw message.
    Unknown,
}

impl ErrorKind {
    /// Stable string form, used in logs and error payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::UniqueViolation => "UNIQUE_VIOLATION",
            Self::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            Self::CheckViolation => "CHECK_VIOLATION",
            Self::NotNullViolation => "NOT_NULL_VIOLATION",
            Self::Validation => "VALIDATION",
            Self::Unsupported => "UNSUPPORTED_OPERATION",
            Self::Connection => "CONNECTION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Database operation error.
///
/// All engine and driver operations return this type so callers handle one
/// shape regardless of backend. `table`, `column`, and `code` are filled
/// when the originating error carries them; `code` is the backend's native
/// code (SQLSTATE, SQLite extended result code) and is informational only.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}: {message}", .kind.as_str())]
pub struct DbError {
    pub kind: ErrorKind,
    pub message: String,
    pub table: Option<String>,
    pub column: Option<String>,
    pub code: Option<String>,
}

impl DbError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            table: None,
            column: None,
            code: None,
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(ErrorKind::NotFound, format!("no matching row in {}", table)).with_table(table)
    }

    pub fn unique_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UniqueViolation, message).with_table(table)
    }

    pub fn foreign_key_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ForeignKeyViolation, message).with_table(table)
    }

    pub fn check_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CheckViolation, message)
    }

    pub fn not_null_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotNullViolation, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

//! Error types for zero-dbi.

use thiserror::Error;

/// Result type for zero-dbi operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Diagnostic fields reported by a driver for a failed command.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, ...
    pub severity: Option<String>,
    /// SQLSTATE (or vendor) error code
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
}

impl ErrorFields {
    /// Build fields carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach a SQLSTATE code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport or session failure; retry on a new connection.
    Connection,
    /// The command itself is invalid; retrying will not help.
    Execution,
    /// The caller misused the API. Nothing was sent.
    Usage,
}

/// Error type for zero-dbi.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport/session failure: refused connection, dropped socket, bad credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command rejected by the server (syntax, constraint violation, ...)
    #[error("Execution error: {0}")]
    Execution(ErrorFields),

    /// Value could not be decoded from its wire representation
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (missing options, unknown savepoint, finished request, ...)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Shorthand for an execution error carrying only a message.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution(ErrorFields::message(message))
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Io(_) | Error::ConnectionBroken => true,
            Error::Execution(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity.as_deref(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUsage(_) | Error::Unsupported(_) => ErrorKind::Usage,
            e if e.is_connection_broken() => ErrorKind::Connection,
            _ => ErrorKind::Execution,
        }
    }

    /// Get the SQLSTATE code if this is an execution error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Execution(fields) => fields.code.as_deref(),
            _ => None,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(
            Error::Connection("refused".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::Io(std::io::Error::other("reset")).kind(),
            ErrorKind::Connection
        );
        assert_eq!(Error::execution("syntax").kind(), ErrorKind::Execution);
        assert_eq!(Error::Decode("bad int".into()).kind(), ErrorKind::Execution);
        assert_eq!(
            Error::InvalidUsage("no db".into()).kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn test_fatal_is_connection_broken() {
        let fields = ErrorFields {
            severity: Some("FATAL".into()),
            ..ErrorFields::message("terminating connection")
        };
        assert!(Error::Execution(fields).is_connection_broken());
    }

    #[test]
    fn test_display_fields() {
        let e = Error::Execution(ErrorFields::message("duplicate key").with_code("23505"));
        assert_eq!(e.sqlstate(), Some("23505"));
        assert_eq!(
            e.to_string(),
            "Execution error: duplicate key (SQLSTATE 23505)"
        );
    }
}

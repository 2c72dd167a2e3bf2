use std::io;

use thiserror::Error;

/// Main error type for sourcedex operations
#[derive(Error, Debug)]
pub enum SourcedexError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Query parse error in '{field}' at offset {offset}: {message}")]
    QueryParse {
        field: String,
        offset: usize,
        message: String,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Project {project} is unavailable: {reason}")]
    ProjectUnavailable { project: String, reason: String },

    #[error("Corrupt segment {segment}: {reason}")]
    CorruptSegment { segment: u64, reason: String },

    #[error("Repository root not found: {0}")]
    RootMissing(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Indexing aborted during {state}: {reason}")]
    IndexingAborted { state: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for sourcedex operations
pub type Result<T> = std::result::Result<T, SourcedexError>;

impl SourcedexError {
    /// Build a query parse error for `field` at a character offset
    pub fn parse(field: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        SourcedexError::QueryParse {
            field: field.into(),
            offset,
            message: message.into(),
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        match self {
            SourcedexError::Io(e) => is_transient_io(e),
            _ => false,
        }
    }

    /// Whether this error means the underlying index data cannot be trusted
    pub fn is_corruption(&self) -> bool {
        match self {
            SourcedexError::CorruptSegment { .. } | SourcedexError::Serialization(_) => true,
            SourcedexError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// I/O failures worth another attempt after a short pause
pub fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourcedexError::parse("full", 4, "unexpected ')'");
        assert_eq!(
            err.to_string(),
            "Query parse error in 'full' at offset 4: unexpected ')'"
        );
    }

    #[test]
    fn test_retriable_errors() {
        let transient = SourcedexError::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(transient.is_retriable());

        let fatal = SourcedexError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!fatal.is_retriable());
        assert!(!SourcedexError::Cancelled.is_retriable());
    }

    #[test]
    fn test_corruption_classification() {
        let err = SourcedexError::CorruptSegment {
            segment: 3,
            reason: "checksum mismatch".to_string(),
        };
        assert!(err.is_corruption());
        assert!(!SourcedexError::UnknownProject("x".into()).is_corruption());
    }
}

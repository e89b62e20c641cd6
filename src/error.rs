//! Fatal error conditions for trace correlation
//!
//! Only conditions that mean the input contract itself was violated live here.
//! Recoverable per-event problems (orphaned halves, unknown directory handles)
//! are reported through [`crate::diagnostics::Diagnostics`] instead.

use thiserror::Error;

/// Errors that abort a correlation run
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("unsupported event kind \"{kind}\" on line {line}")]
    UnsupportedEventKind { kind: String, line: usize },

    #[error("malformed log record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("log record on line {line} is missing required field \"{field}\"")]
    MissingField { line: usize, field: &'static str },

    #[error("debugger output does not contain the marker {0}")]
    MissingMarker(String),

    #[error("invalid status value \"{value}\" on line {line}")]
    InvalidStatus { line: usize, value: String },
}

/// Result type for trace correlation operations
pub type Result<T> = std::result::Result<T, TraceError>;

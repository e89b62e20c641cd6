//! Recoverable per-event problems
//!
//! Each condition is logged through `tracing` when it is recorded and kept
//! here so callers can report trace completeness separately from the summary.

use crate::event::CallEvent;
use serde::Serialize;
use std::fmt;

/// A single recoverable problem found while processing a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A Return with no pending Enter carrying the same fingerprint
    UnmatchedReturn { event: CallEvent },
    /// An Enter still pending when the stream ended
    UnmatchedEnter { event: CallEvent },
    /// A structured record for a function outside the whitelist
    DroppedRecord { line: usize, function: String },
    /// A directory removal whose handle was never returned by an addition
    UnknownDirectoryHandle { module: String, handle: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnmatchedReturn { event } => write!(
                f,
                "dropped a return value because no corresponding function call was found: {}",
                event
            ),
            Diagnostic::UnmatchedEnter { event } => {
                write!(f, "return value not found for function call: {}", event)
            }
            Diagnostic::DroppedRecord { line, function } => write!(
                f,
                "ignored log record for unsupported function {} on line {}",
                function, line
            ),
            Diagnostic::UnknownDirectoryHandle { module, handle } => write!(
                f,
                "{} removed DLL directory handle {} that was never added",
                module, handle
            ),
        }
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a warning
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns that could not be paired with an Enter
    pub fn unmatched_returns(&self) -> Vec<&CallEvent> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::UnmatchedReturn { event } => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Enters for which no Return was observed
    pub fn unmatched_enters(&self) -> Vec<&CallEvent> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::UnmatchedEnter { event } => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        assert!(diagnostics.unmatched_enters().is_empty());
    }

    #[test]
    fn test_filters_by_kind() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::UnmatchedEnter {
            event: CallEvent::enter("LoadLibraryA", "1", "app.exe"),
        });
        diagnostics.push(Diagnostic::DroppedRecord {
            line: 3,
            function: "GetProcAddress".to_string(),
        });

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.unmatched_enters().len(), 1);
        assert!(diagnostics.unmatched_returns().is_empty());
    }

    #[test]
    fn test_display_unknown_handle() {
        let d = Diagnostic::UnknownDirectoryHandle {
            module: "app.exe".to_string(),
            handle: "99".to_string(),
        };
        assert_eq!(
            d.to_string(),
            "app.exe removed DLL directory handle 99 that was never added"
        );
    }
}

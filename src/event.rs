//! Normalized call events
//!
//! Both trace sources are reduced to a stream of [`CallEvent`] halves. An
//! `Enter` and its `Return` share the identity fields used by
//! [`crate::fingerprint::Fingerprint`]; everything else (`subject`,
//! `observed_at`, `result`, `stack`) may differ between the two halves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which half of a call an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Return,
}

impl EventKind {
    /// Parse a source-level kind tag ("enter", "RETURN", ...)
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("enter") {
            Some(EventKind::Enter)
        } else if tag.eq_ignore_ascii_case("return") {
            Some(EventKind::Return)
        } else {
            None
        }
    }
}

/// Outcome carried by a `Return` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Raw return value (module path, "NULL", bool, cookie, NTSTATUS...)
    pub value: Value,
    /// Win32 error code, 0 on success
    pub code: u32,
    /// Error text reported by the source, may be empty
    pub message: String,
    /// Module the call mapped, when the source reports it separately from `value`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

impl CallResult {
    pub fn new(value: Value, code: u32) -> Self {
        Self {
            value,
            code,
            message: String::new(),
            resolved: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_resolved(mut self, resolved: impl Into<String>) -> Self {
        self.resolved = Some(resolved.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.code == 0
    }
}

/// One half of a traced function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub kind: EventKind,
    pub function: String,
    /// Entry timestamp, identical on both halves when the source records it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub thread: String,
    /// Module the source claims made the call
    pub module: String,
    pub arguments: Vec<Value>,
    /// Per-call random value written by the instrumentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<i64>,
    /// Per-half payload that is not part of the call identity (debugger DLL name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Per-half timestamp (debugger line timestamp or `timestamp_end`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CallResult>,
    /// Module of each stack frame, innermost first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
    /// 1-based source line, 0 for synthetic events
    #[serde(default)]
    pub line: usize,
}

impl CallEvent {
    fn new(kind: EventKind, function: &str, thread: &str, module: &str) -> Self {
        Self {
            kind,
            function: function.to_string(),
            timestamp: None,
            thread: thread.to_string(),
            module: module.to_string(),
            arguments: Vec::new(),
            nonce: None,
            subject: None,
            observed_at: None,
            result: None,
            stack: None,
            line: 0,
        }
    }

    /// Create an `Enter` half
    pub fn enter(function: &str, thread: &str, module: &str) -> Self {
        Self::new(EventKind::Enter, function, thread, module)
    }

    /// Create a `Return` half
    pub fn ret(function: &str, thread: &str, module: &str, result: CallResult) -> Self {
        let mut event = Self::new(EventKind::Return, function, thread, module);
        event.result = Some(result);
        event
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_argument(mut self, argument: impl Into<Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn with_nonce(mut self, nonce: i64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn is_enter(&self) -> bool {
        self.kind == EventKind::Enter
    }

    /// First argument rendered as plain text
    pub fn first_argument(&self) -> Option<String> {
        self.arguments.first().map(value_to_text)
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.thread, self.function)?;
        if let Some(subject) = &self.subject {
            write!(f, " - {}", subject)?;
        } else if let Some(arg) = self.first_argument() {
            write!(f, " - {}", arg)?;
        }
        if !self.module.is_empty() {
            write!(f, " (from {})", self.module)?;
        }
        Ok(())
    }
}

/// Render a JSON value without quoting strings
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

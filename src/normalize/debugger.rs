// Adapter for loader-snap output captured from the debugger.
//
// Relevant lines look like:
//
//   1a2b:3c4d @ 01405890 - LdrLoadDll - ENTER: DLL name: foo.dll
//   1a2b:3c4d @ 01405921 - LdrLoadDll - RETURN: Status: 0xc0000135
//
// Only the region between the helper's start and end markers is considered,
// which skips the loader activity of the helper executable itself.

use super::EventSource;
use crate::config::{EngineConfig, FunctionCatalog};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, TraceError};
use crate::event::{CallEvent, CallResult, EventKind};
use crate::win32_error;
use serde_json::Value;

/// Debugger loader-snap trace source
#[derive(Debug, Clone)]
pub struct DebuggerTrace {
    catalog: FunctionCatalog,
    start_marker: String,
    end_marker: String,
    module: String,
}

impl DebuggerTrace {
    pub fn new(catalog: FunctionCatalog, start_marker: &str, end_marker: &str) -> Self {
        Self {
            catalog,
            start_marker: start_marker.to_string(),
            end_marker: end_marker.to_string(),
            module: String::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.debugger_functions.clone(),
            &config.start_marker,
            &config.end_marker,
        )
    }

    /// Attribute every call in the trace to the module under trace
    pub fn for_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Text between the start and end markers
    pub fn extract_region<'a>(&self, output: &'a str) -> Result<&'a str> {
        let start = output
            .find(&self.start_marker)
            .ok_or_else(|| TraceError::MissingMarker(self.start_marker.clone()))?
            + self.start_marker.len();
        let end = output[start..]
            .find(&self.end_marker)
            .ok_or_else(|| TraceError::MissingMarker(self.end_marker.clone()))?
            + start;
        Ok(&output[start..end])
    }

    /// Split a line into prefix, function and details
    ///
    /// Returns `None` unless the line has exactly three ` - ` separated parts.
    pub fn split_line(line: &str) -> Option<(&str, &str, &str)> {
        let mut parts = line.splitn(3, " - ");
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(function), Some(details)) => Some((prefix, function, details)),
            _ => None,
        }
    }

    /// Parse the three parts of a trace line
    ///
    /// Returns `Ok(None)` for details that do not follow the
    /// `OPERATION:DISCRIMINATOR:PAYLOAD` layout.
    pub fn parse_line(
        &self,
        line: usize,
        prefix: &str,
        function: &str,
        details: &str,
    ) -> Result<Option<CallEvent>> {
        let mut components = details.splitn(3, ':');
        let (operation, payload) = match (components.next(), components.next(), components.next()) {
            (Some(operation), Some(_discriminator), Some(payload)) => {
                (operation.trim(), payload.trim())
            }
            _ => return Ok(None),
        };

        let kind = EventKind::parse(operation).ok_or_else(|| TraceError::UnsupportedEventKind {
            kind: operation.to_string(),
            line,
        })?;

        let (thread, observed_at) = match prefix.split_once(" @ ") {
            Some((thread, timestamp)) => (thread.trim(), timestamp.trim().parse::<u64>().ok()),
            None => (prefix.trim(), None),
        };

        let mut event = match kind {
            EventKind::Enter => {
                CallEvent::enter(function, thread, &self.module).with_subject(payload)
            }
            EventKind::Return => {
                let status =
                    win32_error::parse_nt_status(payload).ok_or_else(|| TraceError::InvalidStatus {
                        line,
                        value: payload.to_string(),
                    })?;
                let code = win32_error::nt_status_to_win32(status);
                let message = win32_error::format_error(code, &[]).unwrap_or_default();
                let result = CallResult::new(Value::String(payload.to_string()), code)
                    .with_message(message);
                CallEvent::ret(function, thread, &self.module, result)
            }
        };
        event.observed_at = observed_at;
        event.line = line;
        Ok(Some(event))
    }
}

impl EventSource for DebuggerTrace {
    fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    fn events(&self, input: &str, _diagnostics: &mut Diagnostics) -> Result<Vec<CallEvent>> {
        let region = self.extract_region(input)?.replace("\r\n", "\n");
        let mut events = Vec::new();

        for (index, text) in region.split('\n').enumerate() {
            let Some((prefix, function, details)) = Self::split_line(text) else {
                continue;
            };
            if !self.catalog.contains(function) {
                continue;
            }
            if let Some(event) = self.parse_line(index + 1, prefix, function, details)? {
                events.push(event);
            }
        }

        tracing::debug!("normalized {} debugger events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> DebuggerTrace {
        DebuggerTrace::from_config(&EngineConfig::default()).for_module("game.exe")
    }

    fn wrap(body: &str) -> String {
        format!(
            "ModLoad: helper noise\r\n[LOADLIBRARY][START]\r\n{}[LOADLIBRARY][END]\r\ntrailing",
            body
        )
    }

    #[test]
    fn test_extract_region() {
        let output = wrap("inside\r\n");
        assert_eq!(source().extract_region(&output).unwrap(), "\r\ninside\r\n");
    }

    #[test]
    fn test_missing_markers() {
        let err = source().extract_region("no markers here").unwrap_err();
        assert!(matches!(err, TraceError::MissingMarker(ref m) if m == "[LOADLIBRARY][START]"));

        let err = source()
            .extract_region("[LOADLIBRARY][START] but no end")
            .unwrap_err();
        assert!(matches!(err, TraceError::MissingMarker(ref m) if m == "[LOADLIBRARY][END]"));
    }

    #[test]
    fn test_split_line() {
        assert_eq!(
            DebuggerTrace::split_line("a @ 1 - LdrLoadDll - ENTER: DLL name: x - y.dll"),
            Some(("a @ 1", "LdrLoadDll", "ENTER: DLL name: x - y.dll"))
        );
        assert_eq!(DebuggerTrace::split_line("just text"), None);
        assert_eq!(DebuggerTrace::split_line("a - b"), None);
    }

    #[test]
    fn test_parse_enter_line() {
        let event = source()
            .parse_line(4, "1a2b:3c4d @ 01405890", "LdrLoadDll", r"ENTER: DLL name: C:\libs\foo.dll")
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Enter);
        assert_eq!(event.thread, "1a2b:3c4d");
        assert_eq!(event.observed_at, Some(1405890));
        assert_eq!(event.subject.as_deref(), Some(r"C:\libs\foo.dll"));
        assert_eq!(event.module, "game.exe");
        assert!(event.arguments.is_empty());
        assert_eq!(event.line, 4);
    }

    #[test]
    fn test_parse_return_line() {
        let event = source()
            .parse_line(5, "1a2b:3c4d @ 01405921", "LdrLoadDll", "RETURN: Status: 0xc0000135")
            .unwrap()
            .unwrap();
        let result = event.result.unwrap();
        assert_eq!(result.code, win32_error::ERROR_MOD_NOT_FOUND);
        assert_eq!(result.message, "The specified module could not be found.");
        assert!(event.subject.is_none());
    }

    #[test]
    fn test_unknown_operation_is_fatal() {
        let err = source()
            .parse_line(1, "t @ 1", "LdrLoadDll", "LEAVE: Status: 0x0")
            .unwrap_err();
        assert!(matches!(err, TraceError::UnsupportedEventKind { line: 1, .. }));
    }

    #[test]
    fn test_invalid_status_is_fatal() {
        let err = source()
            .parse_line(2, "t @ 1", "LdrLoadDll", "RETURN: Status: oops")
            .unwrap_err();
        assert!(matches!(err, TraceError::InvalidStatus { line: 2, .. }));
    }

    #[test]
    fn test_short_details_dropped() {
        let parsed = source()
            .parse_line(1, "t @ 1", "LdrLoadDll", "ENTER only")
            .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_events_filter_whitelist_and_format() {
        let body = "\
1a2b:3c4d @ 100 - LdrLoadDll - ENTER: DLL name: foo.dll\r\n\
1a2b:3c4d @ 101 - LdrpLogDllState - ENTER: DLL name: foo.dll\r\n\
some unrelated debugger chatter\r\n\
1a2b:3c4d @ 102 - LdrLoadDll - RETURN: Status: 0x00000000\r\n";
        let mut diagnostics = Diagnostics::new();

        let events = source().events(&wrap(body), &mut diagnostics).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Enter);
        assert_eq!(events[1].kind, EventKind::Return);
        assert!(diagnostics.is_empty());
    }
}

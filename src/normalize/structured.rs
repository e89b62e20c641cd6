// Adapter for the JSON-lines log written by the injected instrumentation library.

use super::EventSource;
use crate::config::{EngineConfig, FunctionCatalog, FunctionRole};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, TraceError};
use crate::event::{CallEvent, CallResult, EventKind};
use crate::win32_error;
use serde::Deserialize;
use serde_json::Value;

/// Raw record layout, every field optional so missing ones get a precise error
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    function: Option<String>,
    timestamp_start: Option<u64>,
    timestamp_end: Option<u64>,
    thread: Option<Value>,
    module: Option<String>,
    arguments: Option<Vec<Value>>,
    random: Option<i64>,
    result: Option<Value>,
    error: Option<RawError>,
    status: Option<RawError>,
    resolved: Option<String>,
    stack: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

/// Structured instrumentation log source
#[derive(Debug, Clone)]
pub struct StructuredLog {
    catalog: FunctionCatalog,
    defer_dispatch: bool,
}

impl StructuredLog {
    pub fn new(catalog: FunctionCatalog, defer_dispatch: bool) -> Self {
        Self {
            catalog,
            defer_dispatch,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.structured_functions.clone(),
            config.defer_dispatch_events,
        )
    }

    /// Parse one log line into an event, without applying the whitelist
    pub fn parse_record(&self, line: usize, text: &str) -> Result<CallEvent> {
        let raw: RawRecord = serde_json::from_str(text)
            .map_err(|source| TraceError::MalformedRecord { line, source })?;

        let tag = raw.kind.ok_or(TraceError::MissingField {
            line,
            field: "type",
        })?;
        let kind = EventKind::parse(&tag)
            .ok_or(TraceError::UnsupportedEventKind { kind: tag, line })?;

        let function = required(raw.function, line, "function")?;
        let timestamp = required(raw.timestamp_start, line, "timestamp_start")?;
        let thread = match required(raw.thread, line, "thread")? {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let module = required(raw.module, line, "module")?;
        let arguments = required(raw.arguments, line, "arguments")?;

        let result = match kind {
            EventKind::Enter => None,
            EventKind::Return => {
                let dispatch_status = match self.catalog.role(&function) {
                    Some(FunctionRole::DispatchLoad) => raw.result.as_ref().and_then(nt_status),
                    _ => None,
                };
                let (code, message) = match (raw.status, dispatch_status, raw.error) {
                    (Some(status), _, _) => (status_code(status.code), status.message),
                    // The dispatch-level call returns its NTSTATUS as the result,
                    // `error` only carries the cleared thread error
                    (None, Some(status), _) => {
                        let code = win32_error::nt_status_to_win32(status);
                        (code, win32_error::format_error(code, &[]).unwrap_or_default())
                    }
                    (None, None, Some(error)) => (error.code as u32, error.message),
                    (None, None, None) => (win32_error::ERROR_SUCCESS, String::new()),
                };
                let mut result = CallResult::new(raw.result.unwrap_or(Value::Null), code)
                    .with_message(message.trim());
                result.resolved = raw.resolved;
                Some(result)
            }
        };

        Ok(CallEvent {
            kind,
            function,
            timestamp: Some(timestamp),
            thread,
            module,
            arguments,
            nonce: raw.random,
            subject: None,
            observed_at: raw.timestamp_end,
            result,
            stack: raw.stack,
            line,
        })
    }
}

fn required<T>(value: Option<T>, line: usize, field: &'static str) -> Result<T> {
    value.ok_or(TraceError::MissingField { line, field })
}

/// Codes above the Win32 range are NTSTATUS values
fn status_code(code: u64) -> u32 {
    let code = code as u32;
    if code > 0xFFFF {
        win32_error::nt_status_to_win32(code)
    } else {
        code
    }
}

/// Integer result of a dispatch-level return, read as an NTSTATUS
fn nt_status(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

impl EventSource for StructuredLog {
    fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    fn events(&self, input: &str, diagnostics: &mut Diagnostics) -> Result<Vec<CallEvent>> {
        let mut events = Vec::new();
        let mut dispatch = Vec::new();

        for (index, text) in input.lines().enumerate() {
            if text.trim().is_empty() {
                continue;
            }

            let event = self.parse_record(index + 1, text)?;
            match self.catalog.role(&event.function) {
                None => diagnostics.push(Diagnostic::DroppedRecord {
                    line: event.line,
                    function: event.function,
                }),
                Some(FunctionRole::DispatchLoad) if self.defer_dispatch => dispatch.push(event),
                Some(_) => events.push(event),
            }
        }

        // Dispatch-level records are written after the fact, so they go last
        events.extend(dispatch);
        tracing::debug!("normalized {} structured events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> StructuredLog {
        StructuredLog::from_config(&EngineConfig::default())
    }

    const ENTER: &str = r#"{"type":"enter","random":5,"timestamp_start":10,"module":"C:\\app\\app.exe","thread":4242,"function":"LoadLibraryW","arguments":["foo.dll"]}"#;
    const RETURN: &str = r#"{"type":"return","random":5,"timestamp_start":10,"timestamp_end":12,"module":"C:\\app\\app.exe","thread":4242,"function":"LoadLibraryW","arguments":["foo.dll"],"result":"C:\\app\\foo.dll","error":{"code":0,"message":"The operation completed successfully.\r\n"}}"#;

    #[test]
    fn test_parse_enter() {
        let event = source().parse_record(1, ENTER).unwrap();
        assert_eq!(event.kind, EventKind::Enter);
        assert_eq!(event.function, "LoadLibraryW");
        assert_eq!(event.thread, "4242");
        assert_eq!(event.module, r"C:\app\app.exe");
        assert_eq!(event.timestamp, Some(10));
        assert_eq!(event.nonce, Some(5));
        assert!(event.result.is_none());
    }

    #[test]
    fn test_parse_return() {
        let event = source().parse_record(2, RETURN).unwrap();
        let result = event.result.unwrap();
        assert_eq!(result.code, 0);
        assert_eq!(result.value, Value::String(r"C:\app\foo.dll".to_string()));
        assert_eq!(result.message, "The operation completed successfully.");
        assert_eq!(event.observed_at, Some(12));
        assert_eq!(event.line, 2);
    }

    #[test]
    fn test_status_field_translated() {
        let line = r#"{"type":"return","timestamp_start":1,"module":"a.exe","thread":1,"function":"LdrLoadDll","arguments":["x.dll"],"result":3221225781,"status":{"code":3221225781,"message":"not found"},"resolved":""}"#;
        let event = source().parse_record(1, line).unwrap();
        let result = event.result.unwrap();
        assert_eq!(result.code, win32_error::ERROR_MOD_NOT_FOUND);
        assert_eq!(result.resolved.as_deref(), Some(""));
    }

    #[test]
    fn test_dispatch_result_is_nt_status() {
        // Written by the detour: NTSTATUS in `result`, cleared thread error in `error`
        let line = r#"{"type":"return","timestamp_start":1,"module":"a.exe","thread":1,"function":"LdrLoadDll","arguments":["x.dll"],"result":3221225781,"error":{"code":0,"message":"The operation completed successfully.\r\n"},"resolved":""}"#;
        let event = source().parse_record(1, line).unwrap();
        let result = event.result.unwrap();
        assert_eq!(result.code, win32_error::ERROR_MOD_NOT_FOUND);
        assert!(!result.succeeded());
        assert_eq!(result.message, "The specified module could not be found.");
    }

    #[test]
    fn test_dispatch_success_result() {
        let line = r#"{"type":"return","timestamp_start":1,"module":"a.exe","thread":1,"function":"LdrLoadDll","arguments":["x.dll"],"result":0,"error":{"code":0,"message":""},"resolved":"C:\\x.dll"}"#;
        let result = source().parse_record(1, line).unwrap().result.unwrap();
        assert!(result.succeeded());
    }

    #[test]
    fn test_integer_result_of_load_is_not_a_status() {
        let line = r#"{"type":"return","timestamp_start":1,"module":"a.exe","thread":1,"function":"AddDllDirectory","arguments":["C:\\p"],"result":3221225781,"error":{"code":0,"message":""}}"#;
        let result = source().parse_record(1, line).unwrap().result.unwrap();
        assert!(result.succeeded());
    }

    #[test]
    fn test_unsupported_kind_is_fatal() {
        let line = r#"{"type":"exit","timestamp_start":1,"module":"a.exe","thread":1,"function":"LoadLibraryW","arguments":[]}"#;
        let err = source().parse_record(3, line).unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnsupportedEventKind { ref kind, line: 3 } if kind == "exit"
        ));
    }

    #[test]
    fn test_missing_field() {
        let line = r#"{"type":"enter","timestamp_start":1,"thread":1,"function":"LoadLibraryW","arguments":[]}"#;
        let err = source().parse_record(1, line).unwrap_err();
        assert!(matches!(err, TraceError::MissingField { field: "module", .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = source().parse_record(9, "{not json").unwrap_err();
        assert!(matches!(err, TraceError::MalformedRecord { line: 9, .. }));
    }

    #[test]
    fn test_events_skip_blank_and_drop_unknown_functions() {
        let unknown = r#"{"type":"enter","timestamp_start":1,"module":"a.exe","thread":1,"function":"GetProcAddress","arguments":[]}"#;
        let input = format!("{}\n\n{}\n{}\n", ENTER, unknown, RETURN);
        let mut diagnostics = Diagnostics::new();

        let events = source().events(&input, &mut diagnostics).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.iter().next(),
            Some(Diagnostic::DroppedRecord { line: 3, .. })
        ));
    }

    #[test]
    fn test_dispatch_events_deferred() {
        let dispatch = r#"{"type":"enter","timestamp_start":1,"module":"a.exe","thread":1,"function":"LdrLoadDll","arguments":["x.dll"]}"#;
        let input = format!("{}\n{}\n{}\n", dispatch, ENTER, RETURN);

        let mut diagnostics = Diagnostics::new();
        let events = source().events(&input, &mut diagnostics).unwrap();
        let functions: Vec<&str> = events.iter().map(|e| e.function.as_str()).collect();
        assert_eq!(functions, ["LoadLibraryW", "LoadLibraryW", "LdrLoadDll"]);

        let in_order = StructuredLog::new(FunctionCatalog::structured(), false);
        let events = in_order.events(&input, &mut diagnostics).unwrap();
        assert_eq!(events[0].function, "LdrLoadDll");
    }
}

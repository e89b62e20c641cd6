//! Enter/Return correlation
//!
//! Pairs the two halves of every traced call into a [`CallRecord`].
//!
//! # Matching discipline
//!
//! Enter events are pushed onto a pending stack. Each Return is fingerprinted
//! and the stack is scanned from the most recently pushed Enter towards the
//! oldest; the first Enter with an equal fingerprint is removed and paired.
//! The innermost open call is always the one that returns first, so this
//! resolves recursive and reentrant calls to the same function correctly.
//! The scan is O(pending depth), which is bounded by call nesting depth.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──first event──▶ Streaming ──push()──▶ Streaming
//!                             │
//!                             └──finish()──▶ Drained (Correlation)
//! ```
//!
//! `finish()` consumes the correlator: remaining pending Enters become
//! diagnostics and the resulting [`Correlation`] carries the final `Drained`
//! state. Nothing can be pushed after that.
//!
//! # Example
//!
//! ```
//! use dllgraph::correlator::correlate;
//! use dllgraph::event::{CallEvent, CallResult};
//! use serde_json::json;
//!
//! let enter = CallEvent::enter("LoadLibraryW", "1", "app.exe")
//!     .with_timestamp(1)
//!     .with_argument("A.dll");
//! let ret = CallEvent::ret("LoadLibraryW", "1", "app.exe", CallResult::new(json!("A.dll"), 0))
//!     .with_timestamp(1)
//!     .with_argument("A.dll");
//!
//! let correlation = correlate(vec![enter, ret], "NULL");
//! assert_eq!(correlation.records.len(), 1);
//! assert!(correlation.records[0].succeeded);
//! assert!(correlation.diagnostics.is_empty());
//! ```

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::event::{CallEvent, CallResult, EventKind};
use crate::fingerprint::Fingerprint;
use serde::Serialize;
use serde_json::Value;

/// How the instrumentation renders a null module handle
const NULL_MODULE: &str = "NULL";

/// A matched Enter/Return pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub enter: CallEvent,
    #[serde(rename = "return")]
    pub ret: CallEvent,
    /// Calling module, after attribution resolution
    pub caller: String,
    /// Module the call resolved to, or the unresolved sentinel
    pub target: String,
    pub succeeded: bool,
}

impl CallRecord {
    /// Pair two halves and derive caller, target and outcome
    pub fn new(enter: CallEvent, ret: CallEvent, unresolved_sentinel: &str) -> Self {
        let succeeded = ret.result.as_ref().map_or(true, CallResult::succeeded);
        let target = derive_target(&enter, &ret, succeeded, unresolved_sentinel);

        Self {
            caller: enter.module.clone(),
            enter,
            ret,
            target,
            succeeded,
        }
    }

    pub fn function(&self) -> &str {
        &self.enter.function
    }

    pub fn result(&self) -> Option<&CallResult> {
        self.ret.result.as_ref()
    }

    /// Win32 error code of the call, 0 on success
    pub fn code(&self) -> u32 {
        self.result().map_or(0, |r| r.code)
    }

    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.enter.arguments.get(index)
    }

    /// The dependency the call was about: the debugger DLL name or the first argument
    pub fn dependency_name(&self) -> Option<String> {
        self.enter
            .subject
            .clone()
            .or_else(|| self.enter.first_argument())
    }

    /// Stack snapshot captured with the call, innermost frame first
    pub fn stack(&self) -> Option<&[String]> {
        self.ret
            .stack
            .as_deref()
            .or(self.enter.stack.as_deref())
    }

    /// The same call attributed to a different caller
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }
}

fn derive_target(enter: &CallEvent, ret: &CallEvent, succeeded: bool, sentinel: &str) -> String {
    let result = ret.result.as_ref();
    let unresolved = |name: &str| name.is_empty() || name == sentinel || name == NULL_MODULE;

    // An explicit resolved module wins over the raw return value
    if let Some(resolved) = result.and_then(|r| r.resolved.as_deref()) {
        return if unresolved(resolved) {
            sentinel.to_string()
        } else {
            resolved.to_string()
        };
    }

    // Debugger traces only know the requested DLL name
    if let Some(subject) = &enter.subject {
        return if succeeded {
            subject.clone()
        } else {
            sentinel.to_string()
        };
    }

    match result.map(|r| &r.value) {
        Some(Value::String(module)) if !unresolved(module) => module.clone(),
        _ => sentinel.to_string(),
    }
}

/// Correlator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    Idle,
    Streaming,
    Drained,
}

/// An Enter waiting for its Return
#[derive(Debug)]
struct PendingCall {
    fingerprint: Fingerprint,
    event: CallEvent,
}

/// Output of a drained correlator
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    /// Matched calls, in the order their Return events were observed
    pub records: Vec<CallRecord>,
    pub diagnostics: Diagnostics,
    /// Always [`CorrelatorState::Drained`]
    pub state: CorrelatorState,
}

/// Streaming Enter/Return pairing
#[derive(Debug)]
pub struct Correlator {
    state: CorrelatorState,
    pending: Vec<PendingCall>,
    records: Vec<CallRecord>,
    diagnostics: Diagnostics,
    unresolved_sentinel: String,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(NULL_MODULE)
    }
}

impl Correlator {
    pub fn new(unresolved_sentinel: impl Into<String>) -> Self {
        Self {
            state: CorrelatorState::Idle,
            pending: Vec::new(),
            records: Vec::new(),
            diagnostics: Diagnostics::new(),
            unresolved_sentinel: unresolved_sentinel.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.unresolved_sentinel.clone())
    }

    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    /// Number of Enters still waiting for a Return
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Process the next event of the stream
    pub fn push(&mut self, event: CallEvent) {
        self.state = CorrelatorState::Streaming;
        let fingerprint = Fingerprint::of(&event);

        match event.kind {
            EventKind::Enter => self.pending.push(PendingCall { fingerprint, event }),
            EventKind::Return => {
                match self
                    .pending
                    .iter()
                    .rposition(|p| p.fingerprint == fingerprint)
                {
                    Some(index) => {
                        let enter = self.pending.remove(index).event;
                        tracing::trace!("matched {} ({})", enter, fingerprint);
                        self.records
                            .push(CallRecord::new(enter, event, &self.unresolved_sentinel));
                    }
                    None => self
                        .diagnostics
                        .push(Diagnostic::UnmatchedReturn { event }),
                }
            }
        }
    }

    /// End of stream: report unmatched Enters and hand over the result
    pub fn finish(mut self) -> Correlation {
        for pending in std::mem::take(&mut self.pending) {
            self.diagnostics
                .push(Diagnostic::UnmatchedEnter { event: pending.event });
        }
        self.state = CorrelatorState::Drained;
        tracing::debug!(
            "correlated {} calls with {} diagnostics",
            self.records.len(),
            self.diagnostics.len()
        );

        Correlation {
            records: self.records,
            diagnostics: self.diagnostics,
            state: self.state,
        }
    }
}

/// Correlate a complete event sequence
pub fn correlate<I>(events: I, unresolved_sentinel: &str) -> Correlation
where
    I: IntoIterator<Item = CallEvent>,
{
    let mut correlator = Correlator::new(unresolved_sentinel);
    for event in events {
        correlator.push(event);
    }
    correlator.finish()
}

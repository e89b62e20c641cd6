//! Call identity fingerprints
//!
//! An Enter and its Return are paired by hashing the fields both halves carry
//! unchanged: function name, entry timestamp, thread, attributed module,
//! arguments and the optional instrumentation nonce. The fields are assembled
//! into a JSON object (keys sorted) and hashed with SHA-256, so the key is
//! independent of field order in the source record.

use crate::event::CallEvent;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity key for one invocation instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of either half of a call
    pub fn of(event: &CallEvent) -> Self {
        let subset = json!({
            "function": event.function,
            "timestamp_start": event.timestamp,
            "thread": event.thread,
            "module": event.module,
            "arguments": Value::Array(event.arguments.clone()),
            "random": event.nonce,
        });

        let digest = Sha256::digest(subset.to_string().as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell calls apart in logs
        write!(f, "{}", &self.0[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallResult;

    fn load_enter(timestamp: u64, thread: &str, dll: &str) -> CallEvent {
        CallEvent::enter("LoadLibraryW", thread, "app.exe")
            .with_timestamp(timestamp)
            .with_argument(dll)
    }

    fn load_return(timestamp: u64, thread: &str, dll: &str) -> CallEvent {
        CallEvent::ret(
            "LoadLibraryW",
            thread,
            "app.exe",
            CallResult::new(json!("C:\\app\\foo.dll"), 0),
        )
        .with_timestamp(timestamp)
        .with_argument(dll)
    }

    #[test]
    fn test_halves_match() {
        let enter = load_enter(1, "7", "foo.dll");
        let ret = load_return(1, "7", "foo.dll");
        assert_eq!(Fingerprint::of(&enter), Fingerprint::of(&ret));
    }

    #[test]
    fn test_result_and_subject_ignored() {
        let enter = load_enter(1, "7", "foo.dll").with_subject("foo.dll");
        let ret = load_return(1, "7", "foo.dll")
            .with_stack(vec!["app.exe".to_string()])
            .with_line(99);
        assert_eq!(Fingerprint::of(&enter), Fingerprint::of(&ret));
    }

    #[test]
    fn test_thread_distinguishes() {
        let a = load_enter(1, "7", "foo.dll");
        let b = load_enter(1, "8", "foo.dll");
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_timestamp_and_arguments_distinguish() {
        let base = Fingerprint::of(&load_enter(1, "7", "foo.dll"));
        assert_ne!(base, Fingerprint::of(&load_enter(2, "7", "foo.dll")));
        assert_ne!(base, Fingerprint::of(&load_enter(1, "7", "bar.dll")));
    }

    #[test]
    fn test_nonce_distinguishes() {
        let a = load_enter(1, "7", "foo.dll").with_nonce(1);
        let b = load_enter(1, "7", "foo.dll").with_nonce(2);
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_hex_form() {
        let fp = Fingerprint::of(&load_enter(1, "7", "foo.dll"));
        assert_eq!(fp.as_hex().len(), 64);
        assert_eq!(fp.to_string().len(), 12);
    }
}

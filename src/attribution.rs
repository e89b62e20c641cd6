//! Caller attribution for dispatch-level loads
//!
//! The dispatch routine (`LdrLoadDll`) is reached from every public load API,
//! so the module recorded with the call is usually one of the system DLLs
//! that forward into it. The true caller is recovered from the stack snapshot
//! captured with the call: the innermost frame that is neither the module
//! being loaded nor one of the always-resident forwarding modules.

use crate::config::{EngineConfig, FunctionCatalog, FunctionRole};
use crate::correlator::CallRecord;

/// Re-attributes dispatch-level calls to their true caller
#[derive(Debug, Clone, Default)]
pub struct AttributionResolver {
    deny_list: Vec<String>,
}

impl AttributionResolver {
    pub fn new(deny_list: Vec<String>) -> Self {
        Self { deny_list }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.deny_list.clone())
    }

    /// Case-insensitive deny-list membership
    pub fn is_denied(&self, module: &str) -> bool {
        self.deny_list
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(module))
    }

    /// Innermost stack frame eligible as the caller, if any
    pub fn true_caller<'a>(&self, record: &'a CallRecord) -> Option<&'a str> {
        record
            .stack()?
            .iter()
            .map(String::as_str)
            .find(|frame| !frame.eq_ignore_ascii_case(&record.target) && !self.is_denied(frame))
    }

    /// Attribute one record; keeps the recorded module when no frame qualifies
    pub fn resolve(&self, record: CallRecord) -> CallRecord {
        match self.true_caller(&record) {
            Some(caller) => {
                let caller = caller.to_string();
                record.with_caller(caller)
            }
            None => {
                tracing::debug!(
                    "no eligible stack frame for {}, keeping caller {}",
                    record.enter,
                    record.caller
                );
                record
            }
        }
    }

    /// Attribute every dispatch-level record, leaving the others untouched
    pub fn resolve_all(&self, records: Vec<CallRecord>, catalog: &FunctionCatalog) -> Vec<CallRecord> {
        records
            .into_iter()
            .map(|record| match catalog.role(record.function()) {
                Some(FunctionRole::DispatchLoad) => self.resolve(record),
                _ => record,
            })
            .collect()
    }
}

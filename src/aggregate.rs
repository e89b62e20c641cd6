//! Per-dependency outcome aggregation
//!
//! The loader calls its internal routines several times for the same DLL
//! (one per search path entry, retries after a redirect, and so on). For a
//! summary only one outcome per dependency matters: the first successful call
//! if there was one, otherwise the first call.

use crate::config::{FunctionCatalog, FunctionRole};
use crate::correlator::CallRecord;
use crate::win32_error;
use serde::Serialize;
use std::collections::BTreeMap;

/// Representative outcome for one dependency name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// Dependency name as first seen in the trace
    pub name: String,
    pub succeeded: bool,
    pub code: u32,
    /// Human-readable outcome line
    pub text: String,
    #[serde(skip)]
    pub record: CallRecord,
}

/// All outcomes of one traced function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionOutcomes {
    pub function: String,
    pub role: FunctionRole,
    /// Sorted case-insensitively by name
    pub outcomes: Vec<Outcome>,
}

impl FunctionOutcomes {
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }
}

/// First successful call, or the first call when none succeeded
pub fn representative<'a>(calls: &[&'a CallRecord]) -> Option<&'a CallRecord> {
    calls
        .iter()
        .find(|record| record.succeeded)
        .or_else(|| calls.first())
        .copied()
}

/// Final path component of a Windows or POSIX path
pub fn basename(path: &str) -> &str {
    path.rsplit(&['\\', '/'][..]).next().unwrap_or(path)
}

/// Name a call is grouped under
///
/// Name resolution is keyed by file name, since the same DLL is probed under
/// several directories.
pub fn dependency_name(record: &CallRecord, role: FunctionRole) -> Option<String> {
    let name = record.dependency_name()?;
    Some(match role {
        FunctionRole::Resolve => basename(&name).to_string(),
        _ => name,
    })
}

/// Outcome text for a representative call
pub fn outcome_text(record: &CallRecord, role: FunctionRole, name: &str) -> String {
    if record.succeeded {
        return match role {
            FunctionRole::Load | FunctionRole::DispatchLoad => "Loaded successfully".to_string(),
            FunctionRole::Map => "Mapped successfully".to_string(),
            FunctionRole::Resolve => record.dependency_name().unwrap_or_default(),
            _ => "Succeeded".to_string(),
        };
    }

    let fallback = record.result().map(|r| r.message.as_str()).unwrap_or("");
    win32_error::describe(record.code(), &[name], fallback)
}

/// Aggregate the records of one function
pub fn aggregate(records: &[CallRecord], function: &str, role: FunctionRole) -> Vec<Outcome> {
    // Lowercase key for grouping, first-seen spelling for display
    let mut groups: BTreeMap<String, (String, Vec<&CallRecord>)> = BTreeMap::new();

    for record in records.iter().filter(|r| r.function() == function) {
        let Some(name) = dependency_name(record, role) else {
            continue;
        };
        groups
            .entry(name.to_lowercase())
            .or_insert_with(|| (name, Vec::new()))
            .1
            .push(record);
    }

    groups
        .into_values()
        .filter_map(|(name, calls)| {
            let record = representative(&calls)?;
            Some(Outcome {
                text: outcome_text(record, role, &name),
                succeeded: record.succeeded,
                code: record.code(),
                record: record.clone(),
                name,
            })
        })
        .collect()
}

/// Aggregate every whitelisted function, in catalog order
pub fn aggregate_by_function(records: &[CallRecord], catalog: &FunctionCatalog) -> Vec<FunctionOutcomes> {
    catalog
        .entries
        .iter()
        .map(|entry| FunctionOutcomes {
            function: entry.name.clone(),
            role: entry.role,
            outcomes: aggregate(records, &entry.name, entry.role),
        })
        .collect()
}

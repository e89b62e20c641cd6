//! Human-readable summaries
//!
//! Three renderers, all producing plain text:
//!
//! - [`render_graph`]: per-module list of loads (and, in extended mode, the
//!   search path configuration calls) for structured traces
//! - [`render_outcomes`]: per-function, per-dependency outcome table for
//!   debugger traces
//! - [`render_diagnostics`]: warning lines for incomplete traces

use crate::aggregate::{basename, FunctionOutcomes};
use crate::call_graph::{AuxiliaryCall, CallGraph, LoadEdge};
use crate::config::FunctionRole;
use crate::correlator::CallRecord;
use crate::diagnostics::Diagnostics;
use crate::event::value_to_text;
use crate::win32_error;
use serde_json::Value;
use std::collections::HashSet;

/// Modules that hand loads over to a user-mode graphics driver
const DIRECTX_RUNTIMES: [&str; 2] = ["dxgi.dll", "d3d12core.dll"];

/// Rendering options for [`render_graph`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Include auxiliary calls, load flags and annotations
    pub extended: bool,
}

/// Render the per-module summary of a call graph
pub fn render_graph(graph: &CallGraph, options: SummaryOptions) -> String {
    let mut out = String::new();

    for node in graph.nodes() {
        if node.id == graph.unresolved_sentinel() {
            continue;
        }

        let mut lines = Vec::new();
        if options.extended {
            lines.extend(node.auxiliary_calls.iter().map(format_auxiliary));
        }

        let mut loaded_any = false;
        for edge in graph.outgoing(&node.id) {
            lines.push(format_edge(graph, edge, options));
            loaded_any = true;
        }
        if !loaded_any {
            lines.push("This module did not load any libraries.".to_string());
        }

        out.push_str(&format!("{}:\n", node.id));
        let mut seen = HashSet::new();
        for line in lines {
            if seen.insert(line.clone()) {
                out.push_str(&format!("\t{}\n", line));
            }
        }
        out.push('\n');
    }

    out
}

/// Return value of a call, or its error text when it failed
fn return_text(record: &CallRecord) -> String {
    match record.result() {
        Some(result) if result.succeeded() => value_to_text(&result.value),
        Some(result) => failure_text(record, result.message.trim()),
        None => String::new(),
    }
}

fn failure_text(record: &CallRecord, message: &str) -> String {
    if message.is_empty() {
        let name = record.dependency_name().unwrap_or_default();
        win32_error::describe(record.code(), &[&name], "")
    } else {
        message.to_string()
    }
}

/// `A | B` for flag arrays, plain text for anything else
fn format_flags(value: &Value) -> String {
    match value {
        Value::Array(flags) => flags
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(" | "),
        other => value_to_text(other),
    }
}

fn format_auxiliary(aux: &AuxiliaryCall) -> String {
    let record = &aux.record;
    let first = record.argument(0);

    let arguments = match (&aux.role, first) {
        (FunctionRole::RemoveDirectory, Some(handle)) => {
            let directory = aux
                .directory
                .as_ref()
                .map(|lookup| format!(" ({})", lookup))
                .unwrap_or_default();
            format!(" {}{}", value_to_text(handle), directory)
        }
        (_, Some(flags)) if flags.is_array() => format!(" [{}]", format_flags(flags)),
        (_, Some(Value::Null)) => " NULL".to_string(),
        (_, Some(value)) => format!(" \"{}\"", value_to_text(value)),
        (_, None) => String::new(),
    };

    format!("{}{} -> {}", record.function(), arguments, return_text(record))
}

/// Argument holding the load flags, by role
fn flags_argument(record: &CallRecord, role: FunctionRole) -> Option<&Value> {
    match role {
        FunctionRole::DispatchLoad => record.argument(1),
        FunctionRole::Load => record.argument(2),
        _ => None,
    }
}

/// Dispatch call from the DirectX runtime into a driver package
fn is_directx_umd(record: &CallRecord) -> bool {
    let caller = basename(&record.caller).to_lowercase();
    DIRECTX_RUNTIMES.contains(&caller.as_str())
        && record.target.to_lowercase().contains("driverstore")
}

fn format_edge(graph: &CallGraph, edge: &LoadEdge, options: SummaryOptions) -> String {
    let record = &edge.record;
    let role = edge.role;
    let mut line = String::new();

    if options.extended && role == FunctionRole::DispatchLoad && is_directx_umd(record) {
        line.push_str("[DirectX UMD] ");
    }

    line.push_str(record.function());
    if let Some(name) = record.dependency_name() {
        line.push_str(&format!(" \"{}\"", name));
    }

    if options.extended {
        if let Some(flags) = flags_argument(record, role) {
            line.push_str(&format!(" [{}]", format_flags(flags)));
        }
    }

    let outcome = if record.target != graph.unresolved_sentinel() {
        record.target.clone()
    } else {
        let message = record.result().map(|r| r.message.trim()).unwrap_or("");
        failure_text(record, message)
    };
    line.push_str(&format!(" -> {}", outcome));
    line
}

/// Render the per-function outcome tables of a debugger trace
pub fn render_outcomes(summaries: &[FunctionOutcomes]) -> String {
    let mut out = String::new();

    for summary in summaries {
        out.push_str(&format!("Summary of {} calls:\n", summary.function));
        let width = summary
            .outcomes
            .iter()
            .map(|o| o.name.len())
            .max()
            .unwrap_or(0);

        for outcome in &summary.outcomes {
            out.push_str(&format!(
                "    {:<width$}    {}\n",
                outcome.name,
                outcome.text,
                width = width
            ));
        }
        out.push('\n');
    }

    out
}

/// One `Warning: ...` line per diagnostic
pub fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    diagnostics
        .iter()
        .map(|d| format!("Warning: {}\n", d))
        .collect()
}

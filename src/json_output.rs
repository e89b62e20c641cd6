//! JSON output format for load graphs
//!
//! `--format json` writes a single document with the graph, per-function
//! outcomes and every diagnostic, so the result can be consumed by other
//! tools without re-parsing the text summary.

use crate::aggregate::FunctionOutcomes;
use crate::call_graph::{AuxiliaryCall, HandleLookup};
use crate::diagnostics::Diagnostics;
use crate::dot_output::normalize_path;
use crate::pipeline::Analysis;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A search path configuration call attached to a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonAuxiliaryCall {
    pub function: String,
    pub arguments: Vec<Value>,
    pub result: Value,
    pub code: u32,
    /// Directory behind a removal handle, `<UNKNOWN>` when never added
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl From<&AuxiliaryCall> for JsonAuxiliaryCall {
    fn from(aux: &AuxiliaryCall) -> Self {
        let record = &aux.record;
        Self {
            function: record.function().to_string(),
            arguments: record.enter.arguments.clone(),
            result: record.result().map(|r| r.value.clone()).unwrap_or(Value::Null),
            code: record.code(),
            directory: aux.directory.as_ref().map(|lookup| match lookup {
                HandleLookup::Resolved(directory) => directory.clone(),
                HandleLookup::Unknown => lookup.to_string(),
            }),
        }
    }
}

/// A module in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonNode {
    pub id: String,
    pub auxiliary_calls: Vec<JsonAuxiliaryCall>,
}

/// A load call between two modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEdge {
    pub source: String,
    pub target: String,
    pub function: String,
    pub arguments: Vec<Value>,
    pub succeeded: bool,
    pub code: u32,
    pub thread: String,
}

/// Representative outcome of one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutcome {
    pub name: String,
    pub succeeded: bool,
    pub code: u32,
    pub text: String,
}

/// Outcomes of one traced function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFunctionSummary {
    pub function: String,
    pub outcomes: Vec<JsonOutcome>,
}

/// Trace completeness counters and warning texts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonDiagnostics {
    pub unmatched_enters: usize,
    pub unmatched_returns: usize,
    pub warnings: Vec<String>,
}

impl From<&Diagnostics> for JsonDiagnostics {
    fn from(diagnostics: &Diagnostics) -> Self {
        Self {
            unmatched_enters: diagnostics.unmatched_enters().len(),
            unmatched_returns: diagnostics.unmatched_returns().len(),
            warnings: diagnostics.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonSummary {
    pub total_calls: usize,
    pub total_loads: usize,
    pub failed_loads: usize,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub nodes: Vec<JsonNode>,
    pub edges: Vec<JsonEdge>,
    /// Only functions with at least one outcome are listed
    pub outcomes: Vec<JsonFunctionSummary>,
    pub summary: JsonSummary,
    pub diagnostics: JsonDiagnostics,
}

impl JsonOutput {
    /// Create an empty JSON output structure
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "dllgraph-json-v1".to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            outcomes: Vec::new(),
            summary: JsonSummary::default(),
            diagnostics: JsonDiagnostics::default(),
        }
    }

    /// Build the document for a finished analysis
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let mut output = Self::new();
        let graph = &analysis.graph;

        output.nodes = graph
            .nodes()
            .iter()
            .map(|node| JsonNode {
                id: normalize_path(&node.id),
                auxiliary_calls: node.auxiliary_calls.iter().map(JsonAuxiliaryCall::from).collect(),
            })
            .collect();

        for edge in graph.edges() {
            let (source, target) = graph.endpoints(edge);
            output.add_edge(JsonEdge {
                source: normalize_path(source),
                target: normalize_path(target),
                function: edge.record.function().to_string(),
                arguments: edge.record.enter.arguments.clone(),
                succeeded: edge.record.succeeded,
                code: edge.record.code(),
                thread: edge.record.enter.thread.clone(),
            });
        }

        output.set_outcomes(&analysis.outcomes);
        output.summary.total_calls = analysis.call_count;
        output.diagnostics = JsonDiagnostics::from(&analysis.diagnostics);
        output
    }

    /// Add an edge to the output
    pub fn add_edge(&mut self, edge: JsonEdge) {
        self.summary.total_loads += 1;
        if !edge.succeeded {
            self.summary.failed_loads += 1;
        }
        self.edges.push(edge);
    }

    pub fn set_outcomes(&mut self, summaries: &[FunctionOutcomes]) {
        self.outcomes = summaries
            .iter()
            .filter(|s| !s.outcomes.is_empty())
            .map(|s| JsonFunctionSummary {
                function: s.function.clone(),
                outcomes: s
                    .outcomes
                    .iter()
                    .map(|o| JsonOutcome {
                        name: o.name.clone(),
                        succeeded: o.succeeded,
                        code: o.code,
                        text: o.text.clone(),
                    })
                    .collect(),
            })
            .collect();
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

//! Module load graph
//!
//! Builds a directed multigraph from correlated calls. Every module that makes
//! or receives a load becomes a node; every load call becomes an edge from its
//! caller to the module it produced. Loads that produced no module all point
//! at one shared sentinel node.
//!
//! # Structure
//!
//! ```text
//!   app.exe ──LoadLibraryW──▶ C:\app\plugin.dll ──LdrLoadDll──▶ C:\x\dep.dll
//!      │
//!      └──LoadLibraryA──▶ NULL
//! ```
//!
//! Calls that configure the DLL search path do not create edges. They are kept
//! on the calling module's node as auxiliary calls so summaries can report
//! them next to the loads they influenced.
//!
//! Parallel edges are kept: loading the same module twice yields two edges,
//! each carrying its own call record.
//!
//! # Example
//!
//! ```
//! use dllgraph::call_graph::CallGraph;
//! use dllgraph::config::EngineConfig;
//! use dllgraph::correlator::CallRecord;
//! use dllgraph::event::{CallEvent, CallResult};
//! use serde_json::json;
//!
//! let record = CallRecord::new(
//!     CallEvent::enter("LoadLibraryW", "1", "app.exe").with_argument("a.dll"),
//!     CallEvent::ret("LoadLibraryW", "1", "app.exe", CallResult::new(json!("a.dll"), 0))
//!         .with_argument("a.dll"),
//!     "NULL",
//! );
//!
//! let config = EngineConfig::default();
//! let (graph, _) = CallGraph::from_records(vec![record], &config.structured_functions, &config);
//! assert_eq!(graph.node_count(), 2);
//! assert_eq!(graph.edge_count(), 1);
//! ```

use crate::config::{EngineConfig, FunctionCatalog, FunctionRole};
use crate::correlator::CallRecord;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::event::value_to_text;
use fnv::FnvHashMap;
use serde::Serialize;
use std::fmt;

/// Directory behind a removal handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleLookup {
    /// The handle was returned by an earlier addition of this directory
    Resolved(String),
    /// No earlier addition returned the handle
    Unknown,
}

impl fmt::Display for HandleLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleLookup::Resolved(directory) => write!(f, "\"{}\"", directory),
            HandleLookup::Unknown => write!(f, "<UNKNOWN>"),
        }
    }
}

/// A non-load call made by a module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxiliaryCall {
    pub role: FunctionRole,
    pub record: CallRecord,
    /// Set for directory removals only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<HandleLookup>,
}

/// A module in the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleNode {
    pub id: String,
    pub auxiliary_calls: Vec<AuxiliaryCall>,
}

impl ModuleNode {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            auxiliary_calls: Vec::new(),
        }
    }

    /// Directory added by the most recent earlier addition that returned `handle`
    fn added_directory(&self, handle: &serde_json::Value) -> Option<String> {
        self.auxiliary_calls
            .iter()
            .rev()
            .filter(|aux| aux.role == FunctionRole::AddDirectory)
            .find(|aux| aux.record.result().map(|r| &r.value) == Some(handle))
            .and_then(|aux| aux.record.argument(0))
            .map(value_to_text)
    }
}

/// A load call from one module to another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEdge {
    /// Index of the calling module
    pub source: usize,
    /// Index of the loaded module
    pub target: usize,
    pub role: FunctionRole,
    pub record: CallRecord,
}

/// Directed multigraph of module loads
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: Vec<ModuleNode>,
    index: FnvHashMap<String, usize>,
    edges: Vec<LoadEdge>,
    unresolved_sentinel: String,
}

impl CallGraph {
    pub fn new(unresolved_sentinel: impl Into<String>) -> Self {
        Self {
            unresolved_sentinel: unresolved_sentinel.into(),
            ..Self::default()
        }
    }

    /// Build the graph from correlated calls
    ///
    /// Records whose function is not in `catalog` are ignored. Returns the
    /// graph and any diagnostics raised while resolving directory handles.
    pub fn from_records(
        records: Vec<CallRecord>,
        catalog: &FunctionCatalog,
        config: &EngineConfig,
    ) -> (Self, Diagnostics) {
        let mut graph = Self::new(config.unresolved_sentinel.clone());
        let mut diagnostics = Diagnostics::new();

        for record in records {
            let Some(role) = catalog.role(record.function()) else {
                continue;
            };

            if role.is_load() {
                graph.add_load(record, role);
                continue;
            }

            let source = graph.ensure_node(&record.caller);
            let directory = match role {
                FunctionRole::RemoveDirectory => {
                    Some(graph.lookup_handle(source, &record, config, &mut diagnostics))
                }
                _ => None,
            };
            graph.nodes[source].auxiliary_calls.push(AuxiliaryCall {
                role,
                record,
                directory,
            });
        }

        tracing::debug!(
            "built call graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        (graph, diagnostics)
    }

    /// Add an edge from the record's caller to its target
    pub fn add_load(&mut self, record: CallRecord, role: FunctionRole) {
        let source = self.ensure_node(&record.caller);
        let target = self.ensure_node(&record.target);
        self.edges.push(LoadEdge {
            source,
            target,
            role,
            record,
        });
    }

    fn ensure_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(ModuleNode::new(id));
        self.index.insert(id.to_string(), idx);
        idx
    }

    fn lookup_handle(
        &self,
        source: usize,
        record: &CallRecord,
        config: &EngineConfig,
        diagnostics: &mut Diagnostics,
    ) -> HandleLookup {
        let Some(handle) = record.argument(0) else {
            return HandleLookup::Unknown;
        };

        match self.nodes[source].added_directory(handle) {
            Some(directory) => HandleLookup::Resolved(directory),
            None => {
                if config.warn_on_unknown_handle {
                    diagnostics.push(Diagnostic::UnknownDirectoryHandle {
                        module: record.caller.clone(),
                        handle: value_to_text(handle),
                    });
                }
                HandleLookup::Unknown
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes in first-seen order
    pub fn nodes(&self) -> &[ModuleNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[LoadEdge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&ModuleNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Name of the node that collects loads which produced no module
    pub fn unresolved_sentinel(&self) -> &str {
        &self.unresolved_sentinel
    }

    /// Identifiers of an edge's endpoints
    pub fn endpoints(&self, edge: &LoadEdge) -> (&str, &str) {
        (&self.nodes[edge.source].id, &self.nodes[edge.target].id)
    }

    /// Loads made by a module, in record order
    pub fn outgoing<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a LoadEdge> + 'a {
        let source = self.index.get(id).copied();
        self.edges
            .iter()
            .filter(move |edge| Some(edge.source) == source)
    }

    /// Loads that produced a given module
    pub fn incoming<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a LoadEdge> + 'a {
        let target = self.index.get(id).copied();
        self.edges
            .iter()
            .filter(move |edge| Some(edge.target) == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallEvent, CallResult};
    use serde_json::{json, Value};

    fn record(function: &str, caller: &str, args: Vec<Value>, value: Value, code: u32) -> CallRecord {
        CallRecord::new(
            CallEvent::enter(function, "1", caller).with_arguments(args.clone()),
            CallEvent::ret(function, "1", caller, CallResult::new(value, code)).with_arguments(args),
            "NULL",
        )
    }

    fn build(records: Vec<CallRecord>, config: &EngineConfig) -> (CallGraph, Diagnostics) {
        CallGraph::from_records(records, &config.structured_functions, config)
    }

    #[test]
    fn test_empty_graph() {
        let (graph, diagnostics) = build(Vec::new(), &EngineConfig::default());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_failed_load_points_at_sentinel() {
        let records = vec![
            record("LoadLibraryW", "app.exe", vec![json!("a.dll")], json!("a.dll"), 0),
            record("LoadLibraryA", "app.exe", vec![json!("missing.dll")], json!("NULL"), 126),
        ];
        let (graph, _) = build(records, &EngineConfig::default());

        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains("NULL"));
        let targets: Vec<&str> = graph
            .outgoing("app.exe")
            .map(|e| graph.endpoints(e).1)
            .collect();
        assert_eq!(targets, ["a.dll", "NULL"]);
        assert_eq!(graph.incoming("NULL").count(), 1);
    }

    #[test]
    fn test_parallel_edges_kept() {
        let records = vec![
            record("LoadLibraryW", "app.exe", vec![json!("a.dll")], json!("a.dll"), 0),
            record("LoadLibraryW", "app.exe", vec![json!("a.dll")], json!("a.dll"), 0),
        ];
        let (graph, _) = build(records, &EngineConfig::default());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_auxiliary_calls_create_no_edges() {
        let records = vec![
            record("SetDllDirectoryW", "app.exe", vec![json!(r"C:\libs")], json!(true), 0),
            record("AddDllDirectory", "app.exe", vec![json!(r"C:\plugins")], json!(1234), 0),
            record("RemoveDllDirectory", "app.exe", vec![json!(1234)], json!(true), 0),
        ];
        let (graph, diagnostics) = build(records, &EngineConfig::default());

        assert_eq!(graph.edge_count(), 0);
        let node = graph.node("app.exe").unwrap();
        assert_eq!(node.auxiliary_calls.len(), 3);
        assert_eq!(
            node.auxiliary_calls[2].directory,
            Some(HandleLookup::Resolved(r"C:\plugins".to_string()))
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_handle() {
        let records = vec![record("RemoveDllDirectory", "app.exe", vec![json!(99)], json!(false), 87)];

        let (graph, diagnostics) = build(records.clone(), &EngineConfig::default());
        let aux = &graph.node("app.exe").unwrap().auxiliary_calls[0];
        assert_eq!(aux.directory, Some(HandleLookup::Unknown));
        assert_eq!(aux.directory.as_ref().unwrap().to_string(), "<UNKNOWN>");
        assert!(diagnostics.is_empty());

        let config = EngineConfig {
            warn_on_unknown_handle: true,
            ..EngineConfig::default()
        };
        let (_, diagnostics) = build(records, &config);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_handles_are_per_module() {
        let records = vec![
            record("AddDllDirectory", "a.dll", vec![json!(r"C:\one")], json!(7), 0),
            record("RemoveDllDirectory", "b.dll", vec![json!(7)], json!(true), 0),
        ];
        let (graph, _) = build(records, &EngineConfig::default());
        let aux = &graph.node("b.dll").unwrap().auxiliary_calls[0];
        assert_eq!(aux.directory, Some(HandleLookup::Unknown));
    }

    #[test]
    fn test_latest_addition_wins() {
        let records = vec![
            record("AddDllDirectory", "app.exe", vec![json!(r"C:\old")], json!(7), 0),
            record("AddDllDirectory", "app.exe", vec![json!(r"C:\new")], json!(7), 0),
            record("RemoveDllDirectory", "app.exe", vec![json!(7)], json!(true), 0),
        ];
        let (graph, _) = build(records, &EngineConfig::default());
        let aux = &graph.node("app.exe").unwrap().auxiliary_calls[2];
        assert_eq!(aux.directory, Some(HandleLookup::Resolved(r"C:\new".to_string())));
    }

    #[test]
    fn test_unlisted_functions_ignored() {
        let records = vec![record("GetProcAddress", "app.exe", vec![], json!(0), 0)];
        let (graph, _) = build(records, &EngineConfig::default());
        assert_eq!(graph.node_count(), 0);
    }
}

//! End-to-end analysis
//!
//! Wires the stages together for one trace source:
//!
//! ```text
//! raw text ─▶ EventSource ─▶ Correlator ─▶ AttributionResolver ─┬─▶ CallGraph
//!                                                              └─▶ aggregate_by_function
//! ```
//!
//! Every stage is also usable on its own; this module only fixes the order.

use crate::aggregate::{aggregate_by_function, FunctionOutcomes};
use crate::attribution::AttributionResolver;
use crate::call_graph::CallGraph;
use crate::config::{EngineConfig, FunctionCatalog};
use crate::correlator::{CallRecord, Correlator};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::normalize::{DebuggerTrace, EventSource, StructuredLog};

/// Result of analyzing one or more traces
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: CallGraph,
    /// Per-function outcomes, in catalog order
    pub outcomes: Vec<FunctionOutcomes>,
    pub diagnostics: Diagnostics,
    /// Number of correlated calls
    pub call_count: usize,
}

impl Analysis {
    /// No warnings were raised while processing the trace
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Normalize, correlate and attribute one input
pub fn correlate_source<S: EventSource>(
    source: &S,
    input: &str,
    config: &EngineConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<CallRecord>> {
    let mut correlator = Correlator::from_config(config);
    for event in source.events(input, diagnostics)? {
        correlator.push(event);
    }

    let correlation = correlator.finish();
    diagnostics.extend(correlation.diagnostics);

    let resolver = AttributionResolver::from_config(config);
    Ok(resolver.resolve_all(correlation.records, source.catalog()))
}

/// Build the graph and outcome tables from correlated calls
pub fn assemble(
    records: Vec<CallRecord>,
    catalog: &FunctionCatalog,
    config: &EngineConfig,
    mut diagnostics: Diagnostics,
) -> Analysis {
    let outcomes = aggregate_by_function(&records, catalog);
    let call_count = records.len();
    let (graph, graph_diagnostics) = CallGraph::from_records(records, catalog, config);
    diagnostics.extend(graph_diagnostics);

    Analysis {
        graph,
        outcomes,
        diagnostics,
        call_count,
    }
}

/// Analyze any event source
pub fn analyze<S: EventSource>(source: &S, input: &str, config: &EngineConfig) -> Result<Analysis> {
    let mut diagnostics = Diagnostics::new();
    let records = correlate_source(source, input, config, &mut diagnostics)?;
    Ok(assemble(records, source.catalog(), config, diagnostics))
}

/// Analyze a structured instrumentation log
///
/// # Example
///
/// ```
/// use dllgraph::config::EngineConfig;
/// use dllgraph::pipeline::analyze_structured;
///
/// let log = concat!(
///     r#"{"type":"enter","timestamp_start":1,"module":"app.exe","thread":1,"function":"LoadLibraryW","arguments":["a.dll"]}"#,
///     "\n",
///     r#"{"type":"return","timestamp_start":1,"module":"app.exe","thread":1,"function":"LoadLibraryW","arguments":["a.dll"],"result":"a.dll","error":{"code":0,"message":""}}"#,
/// );
///
/// let analysis = analyze_structured(log, &EngineConfig::default()).unwrap();
/// assert_eq!(analysis.graph.edge_count(), 1);
/// assert!(analysis.is_complete());
/// ```
pub fn analyze_structured(input: &str, config: &EngineConfig) -> Result<Analysis> {
    analyze(&StructuredLog::from_config(config), input, config)
}

/// Analyze debugger output captured while loading `module`
pub fn analyze_debugger(input: &str, module: &str, config: &EngineConfig) -> Result<Analysis> {
    analyze(&DebuggerTrace::from_config(config).for_module(module), input, config)
}

/// Analyze several debugger captures as one trace
///
/// Each capture is `(module, output)`. Captures are correlated independently
/// and their records merged before aggregation, so a dependency probed in
/// several captures still gets one outcome.
pub fn analyze_debugger_many(captures: &[(&str, &str)], config: &EngineConfig) -> Result<Analysis> {
    let mut diagnostics = Diagnostics::new();
    let mut records = Vec::new();

    for (module, output) in captures {
        let source = DebuggerTrace::from_config(config).for_module(*module);
        records.extend(correlate_source(&source, output, config, &mut diagnostics)?);
    }

    Ok(assemble(records, &config.debugger_functions, config, diagnostics))
}

//! Graphviz DOT export of the module load graph

use crate::call_graph::CallGraph;

/// DOT output formatter
#[derive(Debug)]
pub struct DotOutput<'a> {
    graph: &'a CallGraph,
}

impl<'a> DotOutput<'a> {
    pub fn new(graph: &'a CallGraph) -> Self {
        Self { graph }
    }

    /// Quote an identifier, with Windows separators turned into forward slashes
    fn quote(id: &str) -> String {
        format!("\"{}\"", normalize_path(id).replace('"', "\\\""))
    }

    /// Generate the DOT document
    pub fn to_dot(&self) -> String {
        let mut output = String::from("digraph {\n");

        for node in self.graph.nodes() {
            output.push_str(&format!("    {};\n", Self::quote(&node.id)));
        }

        for edge in self.graph.edges() {
            let (source, target) = self.graph.endpoints(edge);
            output.push_str(&format!(
                "    {} -> {} [label={}];\n",
                Self::quote(source),
                Self::quote(target),
                Self::quote(edge.record.function())
            ));
        }

        output.push_str("}\n");
        output
    }
}

/// Replace every backslash with a forward slash
pub fn normalize_path(id: &str) -> String {
    id.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::correlator::CallRecord;
    use crate::event::{CallEvent, CallResult};
    use serde_json::json;

    fn load(caller: &str, dll: &str, value: &str, code: u32) -> CallRecord {
        CallRecord::new(
            CallEvent::enter("LoadLibraryW", "1", caller).with_argument(dll),
            CallEvent::ret("LoadLibraryW", "1", caller, CallResult::new(json!(value), code))
                .with_argument(dll),
            "NULL",
        )
    }

    #[test]
    fn test_empty_graph() {
        let graph = CallGraph::new("NULL");
        assert_eq!(DotOutput::new(&graph).to_dot(), "digraph {\n}\n");
    }

    #[test]
    fn test_nodes_and_edges() {
        let config = EngineConfig::default();
        let (graph, _) = CallGraph::from_records(
            vec![
                load(r"C:\app\app.exe", "a.dll", r"C:\app\a.dll", 0),
                load(r"C:\app\app.exe", "b.dll", "NULL", 126),
            ],
            &config.structured_functions,
            &config,
        );

        let dot = DotOutput::new(&graph).to_dot();
        assert_eq!(
            dot,
            "digraph {\n    \
             \"C:/app/app.exe\";\n    \
             \"C:/app/a.dll\";\n    \
             \"NULL\";\n    \
             \"C:/app/app.exe\" -> \"C:/app/a.dll\" [label=\"LoadLibraryW\"];\n    \
             \"C:/app/app.exe\" -> \"NULL\" [label=\"LoadLibraryW\"];\n\
             }\n"
        );
        assert!(!dot.contains('\\'));
    }

    #[test]
    fn test_quotes_escaped() {
        assert_eq!(DotOutput::quote(r#"odd"name"#), r#""odd\"name""#);
    }
}

//! CLI argument parsing for dllgraph

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Kind of trace the input files contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceFormat {
    /// JSON-lines log written by the instrumentation library (default)
    Structured,
    /// Loader-snap output captured under the debugger
    Debugger,
}

/// Output format for the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// JSON document for machine parsing
    Json,
    /// Graphviz DOT graph
    Dot,
}

#[derive(Parser, Debug)]
#[command(name = "dllgraph")]
#[command(version)]
#[command(about = "Reconstruct DLL load graphs from LoadLibrary call traces", long_about = None)]
pub struct Cli {
    /// Trace files to analyze (several debugger captures are merged)
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Kind of trace in the input files
    #[arg(short = 's', long = "source", value_enum, default_value = "structured")]
    pub source: SourceFormat,

    /// Module a debugger capture belongs to (defaults to the file stem)
    #[arg(short = 'm', long = "module", value_name = "NAME")]
    pub module: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Include search path calls, load flags and annotations in the summary
    #[arg(short = 'x', long = "extended")]
    pub extended: bool,

    /// Also print the raw debugger output between the markers
    #[arg(long = "raw")]
    pub raw: bool,

    /// Engine configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["dllgraph", "trace.jsonl"]);
        assert_eq!(cli.inputs, [PathBuf::from("trace.jsonl")]);
        assert_eq!(cli.source, SourceFormat::Structured);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.extended);
        assert!(!cli.raw);
        assert!(cli.module.is_none());
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_debugger_source() {
        let cli = Cli::parse_from([
            "dllgraph",
            "--source",
            "debugger",
            "-m",
            "game.exe",
            "a.txt",
            "b.txt",
        ]);
        assert_eq!(cli.source, SourceFormat::Debugger);
        assert_eq!(cli.module.as_deref(), Some("game.exe"));
        assert_eq!(cli.inputs.len(), 2);
    }

    #[test]
    fn test_cli_output_options() {
        let cli = Cli::parse_from([
            "dllgraph",
            "--format",
            "dot",
            "-o",
            "graph.dot",
            "--extended",
            "--config",
            "dllgraph.toml",
            "--debug",
            "trace.jsonl",
        ]);
        assert_eq!(cli.format, OutputFormat::Dot);
        assert_eq!(cli.output, Some(PathBuf::from("graph.dot")));
        assert_eq!(cli.config, Some(PathBuf::from("dllgraph.toml")));
        assert!(cli.extended);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["dllgraph"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["dllgraph", "--format", "csv", "t.jsonl"]).is_err());
    }
}

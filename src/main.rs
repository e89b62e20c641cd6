use anyhow::{Context, Result};
use clap::Parser;
use dllgraph::cli::{Cli, OutputFormat, SourceFormat};
use dllgraph::config::EngineConfig;
use dllgraph::dot_output::DotOutput;
use dllgraph::json_output::JsonOutput;
use dllgraph::normalize::DebuggerTrace;
use dllgraph::pipeline::{self, Analysis};
use dllgraph::summary::{self, SummaryOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber
///
/// Silent unless `RUST_LOG` is set; `--debug` raises everything to TRACE.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    let filter = if debug {
        filter.add_directive(tracing::Level::TRACE.into())
    } else {
        filter
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Module a capture is attributed to when `--module` is not given
fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_structured(inputs: &[PathBuf], config: &EngineConfig) -> Result<Analysis> {
    let [input] = inputs else {
        anyhow::bail!(
            "Structured logs are analyzed one at a time, got {} inputs",
            inputs.len()
        );
    };
    let log = read_input(input)?;
    pipeline::analyze_structured(&log, config)
        .with_context(|| format!("Failed to analyze {}", input.display()))
}

fn run_debugger(args: &Cli, config: &EngineConfig) -> Result<(Analysis, Vec<String>)> {
    let mut captures = Vec::new();
    for input in &args.inputs {
        let module = args.module.clone().unwrap_or_else(|| module_name(input));
        captures.push((module, read_input(input)?));
    }

    let borrowed: Vec<(&str, &str)> = captures
        .iter()
        .map(|(module, output)| (module.as_str(), output.as_str()))
        .collect();
    let analysis = pipeline::analyze_debugger_many(&borrowed, config)?;

    let mut regions = Vec::new();
    if args.raw {
        let trace = DebuggerTrace::from_config(config);
        for (_, output) in &borrowed {
            regions.push(trace.extract_region(output)?.trim().to_string());
        }
    }
    Ok((analysis, regions))
}

fn render(args: &Cli, analysis: &Analysis, regions: &[String]) -> Result<String> {
    Ok(match args.format {
        OutputFormat::Json => JsonOutput::from_analysis(analysis).to_json()?,
        OutputFormat::Dot => DotOutput::new(&analysis.graph).to_dot(),
        OutputFormat::Text => {
            let mut text = match args.source {
                SourceFormat::Structured => summary::render_graph(
                    &analysis.graph,
                    SummaryOptions {
                        extended: args.extended,
                    },
                ),
                SourceFormat::Debugger => summary::render_outcomes(&analysis.outcomes),
            };
            for region in regions {
                text.push_str("Raw trace output:\n");
                text.push_str(region);
                text.push_str("\n\n");
            }
            text
        }
    })
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let (analysis, regions) = match args.source {
        SourceFormat::Structured => (run_structured(&args.inputs, &config)?, Vec::new()),
        SourceFormat::Debugger => run_debugger(&args, &config)?,
    };

    // Warnings on stderr, summary on stdout
    eprint!("{}", summary::render_diagnostics(&analysis.diagnostics));

    let output = render(&args, &analysis, &regions)?;
    match &args.output {
        Some(path) => fs::write(path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", output),
    }

    Ok(())
}

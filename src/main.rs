//! tracescope - replay a binary record log and print the recovered models
//!
//! ```text
//! tracescope <records.bin> [--config <file>] [--graph]
//! ```
//!
//! Without `--graph` the model snapshot is printed as JSON; with it, the
//! component graph is printed as an indented tree.

use anyhow::{bail, Context};
use std::path::PathBuf;
use tracescope_rs::{
    config::AnalysisConfig,
    graph::{builder::ModelGraphBuilder, Edge, Graph, GraphVisitor, Node},
    logging::init_logging,
    model::ModelSet,
    pipeline::{stages::BinaryLogReader, PipelineBuilder},
};

struct Args {
    log: PathBuf,
    config: Option<PathBuf>,
    graph: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut log = None;
    let mut config = None;
    let mut graph = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(PathBuf::from(
                    args.next().context("--config needs a file argument")?,
                ))
            }
            "--graph" => graph = true,
            other if other.starts_with("--") => bail!("Unknown option {}", other),
            other => log = Some(PathBuf::from(other)),
        }
    }
    Ok(Args {
        log: log.context("Usage: tracescope <records.bin> [--config <file>] [--graph]")?,
        config,
        graph,
    })
}

/// Prints a graph as an indented tree.
struct TreePrinter;

impl GraphVisitor for TreePrinter {
    fn visit_node(&mut self, node: &Node, depth: usize) {
        println!("{}{} ({})", "  ".repeat(depth), node.label, node.id());
    }

    fn visit_edge(&mut self, edge: &Edge, depth: usize) {
        let count = edge.properties.get("count").map(String::as_str).unwrap_or("?");
        println!(
            "{}{} --{}[{}]--> {}",
            "  ".repeat(depth),
            edge.source(),
            edge.label,
            count,
            edge.target()
        );
    }
}

fn print_graph(graph: &Graph) {
    println!("{}", graph.label());
    graph.accept(&mut TreePrinter);
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let (config, load_error) = AnalysisConfig::try_load_or_default(args.config.as_deref());
    let _log_guard = init_logging(&config.logging)?;
    if let Some(e) = load_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    tracing::info!("Replaying {:?}", args.log);

    let extractor = config.signatures.build_extractor()?;
    let reader = BinaryLogReader::open(&args.log, config.pipeline.skip_malformed_records)
        .with_context(|| format!("Failed to open {:?}", args.log))?;
    let models = ModelSet::new();
    let (pipeline, _) =
        PipelineBuilder::new(config).build_default(Box::new(reader), &models, extractor)?;
    pipeline.run()?;

    if args.graph {
        let types = models
            .types
            .read()
            .map_err(|e| anyhow::anyhow!("Type model poisoned: {}", e))?;
        let execution = models
            .execution
            .read()
            .map_err(|e| anyhow::anyhow!("Execution model poisoned: {}", e))?;
        print_graph(&ModelGraphBuilder::default().build(&types, &execution));
    } else {
        println!("{}", models.snapshot()?.to_json_pretty()?);
    }
    Ok(())
}

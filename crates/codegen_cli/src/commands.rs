//! Subcommand implementations. Each one reads its inputs, runs one generation
//! pass and writes the result; nothing is written when generation fails.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use graph_codegen::{
    emit_composite, emit_graph, parse_composite, CompositeConfig, GraphIr, StaticNodeLibrary,
};
use serde::de::DeserializeOwned;

use crate::config::{Command, Config};

pub fn run(command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::Graph { graph, library, out } => {
            let source = generate_graph(graph, library, config)?;
            write_output(out.as_deref(), &source)
        }
        Command::Composite { composite, library, out } => {
            let source = generate_composite(composite, library, config)?;
            write_output(out.as_deref(), &source)
        }
        Command::DecodeComposite { source, out } => {
            let json = decode_composite(source)?;
            write_output(out.as_deref(), &json)
        }
    }
}

pub fn generate_graph(graph_path: &Path, library_path: &Path, config: &Config) -> Result<String> {
    let graph: GraphIr = read_json(graph_path, "graph IR")?;
    let library = load_library(library_path)?;
    emit_graph(&graph, &library, &config.generation)
        .with_context(|| format!("Failed to generate graph {}", graph_path.display()))
}

pub fn generate_composite(
    composite_path: &Path,
    library_path: &Path,
    config: &Config,
) -> Result<String> {
    let composite: CompositeConfig = read_json(composite_path, "composite configuration")?;
    let library = load_library(library_path)?;
    emit_composite(&composite, &library, &config.generation)
        .with_context(|| format!("Failed to generate composite {}", composite_path.display()))
}

/// Pretty JSON of the configuration embedded in a composite module.
pub fn decode_composite(source_path: &Path) -> Result<String> {
    let source = std::fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read {}", source_path.display()))?;
    let composite = parse_composite(&source).with_context(|| {
        format!("Failed to decode composite payload in {}", source_path.display())
    })?;
    let mut json =
        serde_json::to_string_pretty(&composite).context("Failed to serialize composite")?;
    json.push('\n');
    Ok(json)
}

fn load_library(path: &Path) -> Result<StaticNodeLibrary> {
    let manifest = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read node library {}", path.display()))?;
    let library = StaticNodeLibrary::from_json(&manifest)
        .with_context(|| format!("Failed to parse node library {}", path.display()))?;
    tracing::debug!(path = %path.display(), node_types = library.len(), "Loaded node library");
    Ok(library)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {} {}", what, path.display()))
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "Wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

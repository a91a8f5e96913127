//! Graph Codegen - Main Entry Point

use anyhow::{Context, Result};

use graph_codegen_cli::*;

fn main() -> Result<()> {
    // 1. Load configuration
    let (cli, config) = Config::from_env().context("Failed to load configuration")?;

    // 2. Initialize logging and tracing
    logging::init(&config).context("Failed to initialize logging")?;
    logging::log_config(&config);

    // 3. Run the requested command
    commands::run(&cli.command, &config)
}

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{Config, LogFormat};

/// Initialize logging and tracing subsystem
///
/// Logs go to stderr; stdout is reserved for generated source.
pub fn init(config: &Config) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => {
            // JSON formatting for structured logs
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr);

            Registry::default()
                .with(env_filter)
                .with(json_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let pretty_layer = fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);

            Registry::default()
                .with(env_filter)
                .with(pretty_layer)
                .try_init()?;
        }
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "graph-codegen starting");

    Ok(())
}

/// Log the effective configuration
pub fn log_config(config: &Config) {
    let generation = &config.generation;
    tracing::debug!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        preset = %generation.preset,
        import_mode = ?generation.import_mode,
        bootstrap = ?generation.bootstrap_mode,
        validate = generation.validate,
        validator_entry = ?generation.validator_entry,
        "Configuration loaded"
    );
}

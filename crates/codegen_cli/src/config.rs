use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph_codegen::{BootstrapMode, GenerationConfig, ImportMode, Preset};
use serde::{Deserialize, Serialize};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected pretty or json", other)),
        }
    }
}

/// Graph Codegen Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level or `EnvFilter` directive
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Options handed to every generation pass
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            generation: GenerationConfig::default(),
        }
    }
}

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "graph-codegen")]
#[command(about = "Generate Python modules from node graphs and composite nodes")]
pub struct Cli {
    /// Configuration file path (TOML, or JSON with a .json extension)
    #[arg(short, long, global = true, env = "GRAPH_CODEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Runtime preset: server or client
    #[arg(long, global = true, env = "GRAPH_CODEGEN_PRESET")]
    pub preset: Option<Preset>,

    /// Import mode: default or explicit
    #[arg(long, global = true, env = "GRAPH_CODEGEN_IMPORT_MODE")]
    pub import_mode: Option<ImportMode>,

    /// Bootstrap mode: workspace or none
    #[arg(long, global = true, env = "GRAPH_CODEGEN_BOOTSTRAP")]
    pub bootstrap: Option<BootstrapMode>,

    /// Do not wrap generated graph classes with the validator
    #[arg(long, global = true)]
    pub no_validate: bool,

    /// Validator override, `module` or `module:callable`
    #[arg(long, global = true, env = "GRAPH_CODEGEN_VALIDATOR")]
    pub validator_entry: Option<String>,

    /// Log level
    #[arg(long, global = true, env = "GRAPH_CODEGEN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long, global = true, env = "GRAPH_CODEGEN_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate the executable module of a graph
    Graph {
        /// Graph IR (JSON)
        #[arg(long)]
        graph: PathBuf,

        /// Node library manifest (JSON)
        #[arg(long, env = "GRAPH_CODEGEN_LIBRARY")]
        library: PathBuf,

        /// Output file; stdout when absent
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Generate the class module of a composite node
    Composite {
        /// Composite configuration (JSON)
        #[arg(long)]
        composite: PathBuf,

        /// Node library manifest (JSON)
        #[arg(long, env = "GRAPH_CODEGEN_LIBRARY")]
        library: PathBuf,

        /// Output file; stdout when absent
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the configuration embedded in a generated composite module
    DecodeComposite {
        /// Generated composite module
        #[arg(long)]
        source: PathBuf,

        /// Output file; stdout when absent
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

impl Config {
    /// Load configuration from environment and CLI args
    pub fn from_env() -> Result<(Cli, Self)> {
        let cli = Cli::parse();
        let config = Self::load(&cli)?;
        Ok((cli, config))
    }

    /// Defaults, then the config file, then CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // Override with CLI args
        if let Some(preset) = cli.preset {
            config.generation.preset = preset;
        }
        if let Some(import_mode) = cli.import_mode {
            config.generation.import_mode = import_mode;
        }
        if let Some(bootstrap) = cli.bootstrap {
            config.generation.bootstrap_mode = bootstrap;
        }
        if cli.no_validate {
            config.generation.validate = false;
        }
        if let Some(entry) = &cli.validator_entry {
            config.generation.validator_entry = Some(entry.clone());
        }
        if let Some(log_level) = &cli.log_level {
            config.log_level = log_level.clone();
        }
        if let Some(log_format) = cli.log_format {
            config.log_format = log_format;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|extension| extension.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config = if is_json {
            serde_json::from_str(&config_str).context("Failed to parse config file")?
        } else {
            toml::from_str(&config_str).context("Failed to parse config file")?
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level must not be empty");
        }

        if let Err(e) = self.generation.validator() {
            anyhow::bail!("invalid validator_entry: {}", e);
        }

        if !self.generation.validate && self.generation.validator_entry.is_some() {
            tracing::warn!("validator_entry is set but validation is disabled");
        }

        Ok(())
    }
}

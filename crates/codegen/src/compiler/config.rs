//! # Generation Config
//!
//! Caller-side options and the header/wrapper code they turn into.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, Result};

use super::identifiers::is_legal_identifier;

pub const DEFAULT_VALIDATOR_MODULE: &str = "engine.validate.node_graph_validator";
pub const DEFAULT_VALIDATOR_CALLABLE: &str = "validate_node_graph";

/// Type of the context handle, always imported for the `__init__` annotation.
pub const RUNTIME_TYPE: &str = "GameRuntime";

/// Module-level names the header may bind regardless of configuration.
const HEADER_NAMES: &[&str] = &[RUNTIME_TYPE, "sys", "Path", "PROJECT_ROOT", "ASSETS_ROOT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Star-import the whole prelude
    #[default]
    Default,
    /// Import only the call identifiers the script uses
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapMode {
    /// Make the file runnable from any working directory
    Workspace,
    #[default]
    None,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Server => "server",
            Preset::Client => "client",
        }
    }

    /// Runtime module exposing node callables and placeholder types.
    pub fn prelude_module(&self) -> &'static str {
        match self {
            Preset::Server => "runtime.engine.graph_prelude_server",
            Preset::Client => "runtime.engine.graph_prelude_client",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Preset::Server),
            "client" => Ok(Preset::Client),
            other => Err(format!("unknown preset '{}', expected server or client", other)),
        }
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ImportMode::Default),
            "explicit" => Ok(ImportMode::Explicit),
            other => Err(format!("unknown import mode '{}', expected default or explicit", other)),
        }
    }
}

impl FromStr for BootstrapMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workspace" => Ok(BootstrapMode::Workspace),
            "none" => Ok(BootstrapMode::None),
            other => Err(format!("unknown bootstrap mode '{}', expected workspace or none", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub import_mode: ImportMode,
    pub preset: Preset,
    /// Decorate generated classes with the node-graph validator
    pub validate: bool,
    /// `module` or `module:callable`
    pub validator_entry: Option<String>,
    pub bootstrap_mode: BootstrapMode,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            import_mode: ImportMode::Default,
            preset: Preset::Server,
            validate: true,
            validator_entry: None,
            bootstrap_mode: BootstrapMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorEntry {
    pub module: String,
    pub callable: String,
}

impl GenerationConfig {
    /// Validator import target, honoring the override.
    pub fn validator(&self) -> Result<ValidatorEntry> {
        let entry = match self.validator_entry.as_deref().map(str::trim) {
            None | Some("") => {
                return Ok(ValidatorEntry {
                    module: DEFAULT_VALIDATOR_MODULE.to_string(),
                    callable: DEFAULT_VALIDATOR_CALLABLE.to_string(),
                })
            }
            Some(entry) => entry,
        };

        let (module, callable) = match entry.split_once(':') {
            Some((module, callable)) => (module.trim(), callable.trim()),
            None => (entry, DEFAULT_VALIDATOR_CALLABLE),
        };

        if module.is_empty() || !module.split('.').all(is_legal_identifier) {
            return Err(CodegenError::InvalidConfig(format!(
                "validator module '{}' is not a dotted module path",
                module
            )));
        }
        if !is_legal_identifier(callable) {
            return Err(CodegenError::InvalidConfig(format!(
                "validator callable '{}' is not a legal identifier",
                callable
            )));
        }

        Ok(ValidatorEntry {
            module: module.to_string(),
            callable: callable.to_string(),
        })
    }
}

/// Header lines and class wrapper derived from a [`GenerationConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedHeader {
    pub bootstrap: Vec<String>,
    pub imports: Vec<String>,
    /// Decorator line applied to the generated class
    pub decorator: Option<String>,
}

impl ResolvedHeader {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.bootstrap.clone();
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(self.imports.iter().cloned());
        lines
    }
}

/// Names the header binds at module level for `config`; generated names must
/// not collide with them.
pub fn reserved_names(config: &GenerationConfig) -> Result<Vec<String>> {
    let mut names: Vec<String> = HEADER_NAMES.iter().map(|name| name.to_string()).collect();
    if config.validate {
        names.push(config.validator()?.callable);
    }
    Ok(names)
}

/// Resolve imports and the validation wrapper.
///
/// `used_identifiers` are the call identifiers the script references; only
/// explicit import mode looks at them.
pub fn resolve(
    config: &GenerationConfig,
    used_identifiers: &BTreeSet<String>,
) -> Result<ResolvedHeader> {
    let prelude = config.preset.prelude_module();
    let mut header = ResolvedHeader::default();

    if config.bootstrap_mode == BootstrapMode::Workspace {
        header.bootstrap = workspace_bootstrap();
    }

    match config.import_mode {
        ImportMode::Default => {
            header.imports.push(format!("from {} import *  # noqa: F401,F403", prelude));
        }
        ImportMode::Explicit => {
            header.imports.push(format!("from {} import {}", prelude, RUNTIME_TYPE));
            let names: Vec<&str> = used_identifiers
                .iter()
                .map(String::as_str)
                .filter(|name| *name != RUNTIME_TYPE)
                .collect();
            if !names.is_empty() {
                header.imports.push(format!("from {} import {}", prelude, names.join(", ")));
            }
        }
    }

    if config.validate {
        let validator = config.validator()?;
        header
            .imports
            .push(format!("from {} import {}", validator.module, validator.callable));
        header.decorator = Some(format!("@{}", validator.callable));
    }

    tracing::debug!(
        preset = config.preset.as_str(),
        import_mode = ?config.import_mode,
        bootstrap = ?config.bootstrap_mode,
        validate = config.validate,
        "[CONFIG] Resolved generation header"
    );
    Ok(header)
}

/// Puts the project root and the assets root on `sys.path`, nothing else.
fn workspace_bootstrap() -> Vec<String> {
    [
        "import sys",
        "from pathlib import Path",
        "",
        "PROJECT_ROOT = Path(__file__).resolve()",
        "for _ in range(12):",
        "    if (PROJECT_ROOT / \"pyrightconfig.json\").exists():",
        "        break",
        "    if (PROJECT_ROOT / \"engine\").exists() and (PROJECT_ROOT / \"app\").exists():",
        "        break",
        "    PROJECT_ROOT = PROJECT_ROOT.parent",
        "ASSETS_ROOT = PROJECT_ROOT / \"assets\"",
        "if str(PROJECT_ROOT) not in sys.path:",
        "    sys.path.insert(0, str(PROJECT_ROOT))",
        "if str(ASSETS_ROOT) not in sys.path:",
        "    sys.path.insert(1, str(ASSETS_ROOT))",
    ]
    .iter()
    .map(|line| line.to_string())
    .collect()
}

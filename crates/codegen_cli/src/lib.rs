//! Graph Codegen CLI
//!
//! Command line front end for `graph_codegen`: loads graph IR, composite
//! configurations and node library manifests from JSON files and writes the
//! generated Python modules.

pub mod commands;
pub mod config;
pub mod logging;

pub use config::{Cli, Command, Config, LogFormat};

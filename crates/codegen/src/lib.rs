//! Code generation engine for visual node graphs.
//!
//! Consumes the [`graph::GraphIr`] of a node graph (or the
//! [`graph::CompositeConfig`] of a composite node) and deterministically emits
//! Python source that the game runtime can import and the graph validator
//! accepts. Node signatures come from a [`compiler::NodeLibrary`]; the
//! generator only reads it.
//!
//! ```no_run
//! use graph_codegen::{emit_graph, GenerationConfig, GraphIr, StaticNodeLibrary};
//!
//! let library = StaticNodeLibrary::from_json(r#"{ "nodes": [] }"#).unwrap();
//! let graph = GraphIr::new("empty graph");
//! let source = emit_graph(&graph, &library, &GenerationConfig::default()).unwrap();
//! assert!(source.contains("class EmptyGraph:"));
//! ```

pub mod compiler;
pub mod error;
pub mod graph;

pub use compiler::{
    emit_composite, emit_graph, parse_composite, BootstrapMode, GenerationConfig, ImportMode,
    NodeLibrary, NodeSignature, ParamDescriptor, Preset, StaticNodeLibrary,
};
pub use error::{CodegenError, Result};
pub use graph::{CompositeConfig, GraphIr};

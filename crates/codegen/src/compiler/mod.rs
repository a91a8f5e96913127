//! # Graph Code Generator
//!
//! Transforms node graphs into executable Python source.
//!
//! ## Generation Pipeline
//!
//! 1. **Identifier Resolution**: Derive a legal, collision-free call identifier
//!    for every node from its export alias or display name
//! 2. **Data Flow Resolution**: Map every input pin to its source and verify the
//!    data dependencies are acyclic
//! 3. **Execution Routing**: Map execution edges between nodes
//! 4. **Code Generation**: Walk execution order per event handler, binding
//!    arguments against node signatures and hoisting container values
//! 5. **Header Resolution**: Imports, bootstrap and validation wrapper from the
//!    [`GenerationConfig`]
//!
//! Every pass owns its own collision table and caches. Nothing is shared between
//! passes except the read-only [`NodeLibrary`], so independent graphs can be
//! generated from several threads at once.

pub mod identifiers;
pub mod node_library;
pub mod argument_binder;
pub mod expression;
pub mod data_resolver;
pub mod execution_routing;
pub mod code_generator;
pub mod composite;
pub mod config;
pub mod validation;


pub use composite::parse_composite;
pub use config::{BootstrapMode, GenerationConfig, ImportMode, Preset};
pub use identifiers::{IdentifierResolver, ResolvedIdentifier};
pub use node_library::{BindingKind, NodeLibrary, NodeSignature, ParamDescriptor, StaticNodeLibrary};

use crate::error::Result;
use crate::graph::{CompositeConfig, GraphIr};

/// Generate the executable module of a graph.
pub fn emit_graph(
    graph: &GraphIr,
    library: &dyn NodeLibrary,
    config: &GenerationConfig,
) -> Result<String> {
    tracing::info!(
        graph = %graph.metadata.name,
        nodes = graph.nodes.len(),
        "[CODEGEN] Generating graph module"
    );

    let source = code_generator::generate_graph_module(graph, library, config)?;

    tracing::info!(bytes = source.len(), "[CODEGEN] Graph module generated");
    Ok(source)
}

/// Generate the class module of a composite node.
pub fn emit_composite(
    composite: &CompositeConfig,
    library: &dyn NodeLibrary,
    config: &GenerationConfig,
) -> Result<String> {
    tracing::info!(
        composite_id = %composite.composite_id,
        nodes = composite.graph.nodes.len(),
        "[CODEGEN] Generating composite module"
    );

    let source = composite::generate_composite_module(composite, library, config)?;

    tracing::info!(bytes = source.len(), "[CODEGEN] Composite module generated");
    Ok(source)
}

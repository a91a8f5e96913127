use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error("Unknown node type: {type_id}")]
    UnknownNodeType { type_id: String },

    #[error("Required pin '{pin}' of node {node_id} has no binding and no default")]
    UnboundRequiredPin { node_id: String, pin: String },

    #[error("Variadic node {node_id} has pin '{pin}' that is not a legal keyword name")]
    VariadicPositionalFallbackDisallowed { node_id: String, pin: String },

    #[error("Cyclic data dependency between nodes: {}", nodes.join(" -> "))]
    CyclicDependency { nodes: Vec<String> },

    #[error("Composite payload does not round-trip: {0}")]
    CompositePayloadSerializationFailure(String),

    #[error("Node instance not found: {node_id}")]
    UnknownNodeInstance { node_id: String },

    #[error("Node {node_id} binds pin '{pin}' which its signature does not declare")]
    UndeclaredPin { node_id: String, pin: String },

    #[error("Output {node_id}.{pin} is referenced before it is available")]
    UnresolvedReference { node_id: String, pin: String },

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CodegenError>;

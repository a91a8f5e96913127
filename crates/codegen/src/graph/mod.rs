//! # Graph IR
//!
//! The neutral representation of a node graph handed to the code generator by
//! the graph-model collaborator. Everything here is plain data: the generator
//! borrows it, never mutates it, and keeps nothing once a pass returns.
//!
//! Collections are `Vec`s or `BTreeMap`s so that iteration order, and with it
//! the generated text, only depends on the input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod composite;
pub use composite::*;

/// Broad family a node type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry point; becomes a handler method instead of a call.
    Event,
    Query,
    Operation,
    FlowControl,
    /// A nested graph exported as a reusable node type.
    Composite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub type_id: String,
    /// Free user text; may contain any symbol.
    pub display_name: String,
    pub category: NodeCategory,
}

/// One (node, pin) endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub node: String,
    pub pin: String,
}

impl PortRef {
    pub fn new(node: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pin: pin.into(),
        }
    }
}

/// A constant value attached to an input pin or used as a parameter default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<LiteralValue>),
    Map(BTreeMap<String, LiteralValue>),
    /// Interpolated text, rendered as an f-string.
    Template(Vec<TemplatePart>),
}

impl LiteralValue {
    pub fn str(value: impl Into<String>) -> Self {
        LiteralValue::Str(value.into())
    }

    /// Lists and maps need a container literal to be spelled out.
    pub fn is_container(&self) -> bool {
        matches!(self, LiteralValue::List(_) | LiteralValue::Map(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TemplatePart {
    Text(String),
    Value(LiteralValue),
    Output(PortRef),
}

/// Where an input pin gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PinSource {
    /// Connected to another node instance's output pin
    Output { node: String, pin: String },

    /// Constant entered on the pin
    Literal { value: LiteralValue },

    /// Nothing connected and nothing entered
    Unbound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinBinding {
    pub pin: String,
    pub source: PinSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    pub descriptor: NodeDescriptor,
    #[serde(default)]
    pub bindings: Vec<PinBinding>,
    /// Data output pins, in declared order.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl NodeInstance {
    pub fn new(
        id: impl Into<String>,
        type_id: impl Into<String>,
        display_name: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        Self {
            id: id.into(),
            descriptor: NodeDescriptor {
                type_id: type_id.into(),
                display_name: display_name.into(),
                category,
            },
            bindings: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn bind_literal(&mut self, pin: impl Into<String>, value: LiteralValue) {
        self.bindings.push(PinBinding {
            pin: pin.into(),
            source: PinSource::Literal { value },
        });
    }

    pub fn bind_output(
        &mut self,
        pin: impl Into<String>,
        node: impl Into<String>,
        output: impl Into<String>,
    ) {
        self.bindings.push(PinBinding {
            pin: pin.into(),
            source: PinSource::Output {
                node: node.into(),
                pin: output.into(),
            },
        });
    }

    pub fn add_output_pin(&mut self, name: impl Into<String>) {
        self.outputs.push(name.into());
    }

    pub fn is_event(&self) -> bool {
        self.descriptor.category == NodeCategory::Event
    }
}

/// Statement ordering between two node instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEdge {
    pub source_node: String,
    pub source_pin: String,
    pub target_node: String,
}

/// The producer must be evaluated and bound to a name before the consumer runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEdge {
    pub source: PortRef,
    pub target: PortRef,
}

/// Exposes an event node under a signal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBinding {
    pub node: String,
    pub signal_id: String,
    /// Listens to a user-defined signal: the handler takes the signal's
    /// arguments as `**event_kwargs` and reads its outputs from them by name.
    #[serde(default, skip_serializing_if = "is_false")]
    pub listen: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Stable id the resource library tracks the graph under.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub graph_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub folder_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signal_bindings: Vec<SignalBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphIr {
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub execution_edges: Vec<ExecutionEdge>,
    #[serde(default)]
    pub data_edges: Vec<DataEdge>,
    pub metadata: GraphMetadata,
}

impl GraphIr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            execution_edges: Vec::new(),
            data_edges: Vec::new(),
            metadata: GraphMetadata {
                graph_id: String::new(),
                name: name.into(),
                folder_path: String::new(),
                description: String::new(),
                signal_bindings: Vec::new(),
            },
        }
    }

    pub fn add_node(&mut self, node: NodeInstance) {
        self.nodes.push(node);
    }

    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn connect_exec(&mut self, source: &str, source_pin: &str, target: &str) {
        self.execution_edges.push(ExecutionEdge {
            source_node: source.to_string(),
            source_pin: source_pin.to_string(),
            target_node: target.to_string(),
        });
    }

    pub fn connect_data(&mut self, source: PortRef, target: PortRef) {
        self.data_edges.push(DataEdge { source, target });
    }

    pub fn bind_signal(&mut self, node: &str, signal_id: &str) {
        self.metadata.signal_bindings.push(SignalBinding {
            node: node.to_string(),
            signal_id: signal_id.to_string(),
            listen: false,
        });
    }

    /// Bind `node` as the listener of a user-defined signal.
    pub fn listen_signal(&mut self, node: &str, signal_id: &str) {
        self.bind_signal(node, signal_id);
        if let Some(binding) = self.metadata.signal_bindings.last_mut() {
            binding.listen = true;
        }
    }

    fn signal_binding_for(&self, node: &NodeInstance) -> Option<&SignalBinding> {
        self.metadata
            .signal_bindings
            .iter()
            .find(|binding| binding.node == node.id)
    }

    pub fn is_signal_listener(&self, node: &NodeInstance) -> bool {
        self.signal_binding_for(node).map(|binding| binding.listen).unwrap_or(false)
    }

    /// Signal id an event node is exposed under.
    pub fn signal_id_for(&self, node: &NodeInstance) -> String {
        self.signal_binding_for(node)
            .map(|binding| binding.signal_id.clone())
            .unwrap_or_else(|| node.descriptor.display_name.clone())
    }
}

//! # Data Flow Resolver
//!
//! Resolves data dependencies between nodes to determine:
//! 1. Where each input value comes from (connection, constant, or an
//!    externally supplied name)
//! 2. Which producers every node depends on
//! 3. Whether the dependencies can be linearized at all
//!
//! The acyclicity check runs over every node of the graph before the emitter
//! produces a single line, so a cycle never leaves partial output behind. The
//! emitter derives its own order from [`DataResolver::dependencies_of`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::error::{CodegenError, Result};
use crate::graph::{GraphIr, LiteralValue, PinSource, PortRef, TemplatePart};

use super::identifiers::normalize_port_name;

/// Where an input value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Connected to another node's output
    Connection(PortRef),

    /// Constant entered on the pin
    Constant(LiteralValue),

    /// A name already in scope, e.g. a composite's `execute` parameter
    External(String),
}

/// Resolves data flow for a graph
#[derive(Debug)]
pub struct DataResolver {
    /// node_id -> (normalized pin, source), in first-declared order
    input_sources: HashMap<String, Vec<(String, InputSource)>>,

    /// node_id -> producer node ids, in first-referenced order
    dependencies: HashMap<String, Vec<String>>,
}

impl DataResolver {
    /// Build a data resolver from a graph
    pub fn build(graph: &GraphIr) -> Result<Self> {
        Self::build_with_overrides(graph, &BTreeMap::new())
    }

    /// Build a data resolver where the given input ports read an external name
    /// instead of whatever the graph connects to them.
    pub fn build_with_overrides(
        graph: &GraphIr,
        overrides: &BTreeMap<PortRef, String>,
    ) -> Result<Self> {
        let mut resolver = DataResolver {
            input_sources: HashMap::new(),
            dependencies: HashMap::new(),
        };
        let node_ids: HashSet<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();

        // Phase 1: Map pin bindings, then data edges, then overrides
        resolver.map_input_sources(graph, &node_ids, overrides)?;

        // Phase 2: Collect producers per node
        resolver.collect_dependencies(graph, &node_ids)?;

        // Phase 3: Make sure the producers can be linearized
        resolver.check_acyclic(graph)?;

        Ok(resolver)
    }

    fn map_input_sources(
        &mut self,
        graph: &GraphIr,
        node_ids: &HashSet<&str>,
        overrides: &BTreeMap<PortRef, String>,
    ) -> Result<()> {
        for node in &graph.nodes {
            for binding in &node.bindings {
                let source = match &binding.source {
                    PinSource::Output { node, pin } => InputSource::Connection(PortRef::new(
                        node.clone(),
                        normalize_port_name(pin),
                    )),
                    PinSource::Literal { value } => InputSource::Constant(value.clone()),
                    PinSource::Unbound => continue,
                };
                self.set_source(&node.id, &binding.pin, source);
            }
        }

        // Data edges win over pin bindings
        for edge in &graph.data_edges {
            require_node(node_ids, &edge.target.node)?;
            let source =
                PortRef::new(edge.source.node.clone(), normalize_port_name(&edge.source.pin));
            self.set_source(&edge.target.node, &edge.target.pin, InputSource::Connection(source));
        }

        for (port, name) in overrides {
            require_node(node_ids, &port.node)?;
            self.set_source(&port.node, &port.pin, InputSource::External(name.clone()));
        }

        Ok(())
    }

    fn set_source(&mut self, node_id: &str, pin: &str, source: InputSource) {
        let pin = normalize_port_name(pin);
        let sources = self.input_sources.entry(node_id.to_string()).or_default();
        match sources.iter_mut().find(|(existing, _)| *existing == pin) {
            Some(slot) => slot.1 = source,
            None => sources.push((pin, source)),
        }
    }

    fn collect_dependencies(&mut self, graph: &GraphIr, node_ids: &HashSet<&str>) -> Result<()> {
        for node in &graph.nodes {
            let mut producers = Vec::new();
            for (_, source) in self.inputs_of(&node.id) {
                match source {
                    InputSource::Connection(port) => push_unique(&mut producers, &port.node),
                    InputSource::Constant(value) => collect_template_refs(value, &mut producers),
                    InputSource::External(_) => {}
                }
            }
            for producer in &producers {
                require_node(node_ids, producer)?;
            }
            self.dependencies.insert(node.id.clone(), producers);
        }
        Ok(())
    }

    /// Topological sort using Kahn's algorithm, seeded in declaration order
    fn check_acyclic(&self, graph: &GraphIr) -> Result<()> {
        // in_degree[node] = number of distinct producers this node has
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        // dependents[X] = nodes that depend on X
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &graph.nodes {
            let producers = self.dependencies_of(&node.id);
            in_degree.insert(node.id.as_str(), producers.len());
            for producer in producers {
                dependents.entry(producer.as_str()).or_default().push(node.id.as_str());
            }
        }

        let mut order: Vec<String> = Vec::with_capacity(graph.nodes.len());
        let mut queue: VecDeque<&str> = graph
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        while let Some(node_id) = queue.pop_front() {
            order.push(node_id.to_string());

            if let Some(dependent_nodes) = dependents.get(node_id) {
                for dependent in dependent_nodes {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() != graph.nodes.len() {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            let nodes: Vec<String> = graph
                .nodes
                .iter()
                .filter(|node| !ordered.contains(node.id.as_str()))
                .map(|node| node.id.clone())
                .collect();
            tracing::debug!(?nodes, "[DATA] Cyclic data dependency");
            return Err(CodegenError::CyclicDependency { nodes });
        }

        tracing::debug!(nodes = order.len(), "[DATA] Data dependencies linearized");
        Ok(())
    }

    /// Resolved input sources of a node, keyed by normalized pin name.
    pub fn inputs_of(&self, node_id: &str) -> &[(String, InputSource)] {
        self.input_sources
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Producers `node_id` reads from, in first-referenced order.
    pub fn dependencies_of(&self, node_id: &str) -> &[String] {
        self.dependencies
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

fn require_node(node_ids: &HashSet<&str>, node_id: &str) -> Result<()> {
    if node_ids.contains(node_id) {
        Ok(())
    } else {
        Err(CodegenError::UnknownNodeInstance {
            node_id: node_id.to_string(),
        })
    }
}

fn push_unique(producers: &mut Vec<String>, node_id: &str) {
    if !producers.iter().any(|existing| existing == node_id) {
        producers.push(node_id.to_string());
    }
}

/// Output references hidden inside template literals are dependencies too.
fn collect_template_refs(value: &LiteralValue, producers: &mut Vec<String>) {
    match value {
        LiteralValue::Template(parts) => {
            for part in parts {
                match part {
                    TemplatePart::Output(port) => push_unique(producers, &port.node),
                    TemplatePart::Value(inner) => collect_template_refs(inner, producers),
                    TemplatePart::Text(_) => {}
                }
            }
        }
        LiteralValue::List(items) => {
            for item in items {
                collect_template_refs(item, producers);
            }
        }
        LiteralValue::Map(entries) => {
            for item in entries.values() {
                collect_template_refs(item, producers);
            }
        }
        _ => {}
    }
}

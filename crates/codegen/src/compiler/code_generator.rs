//! # Code Generator
//!
//! Turns a graph IR into the statements of a Python class.
//!
//! - **Event nodes**: become handler methods; their outputs are the handler's
//!   parameters
//! - **Everything else**: one call statement, emitted in execution order, with
//!   data dependencies emitted right before their first consumer
//!
//! Call identifiers are resolved for every node before any statement is built,
//! so result variables and hoisted constants can never shadow a callable.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{CodegenError, Result};
use crate::graph::{GraphIr, NodeInstance, PortRef};

use super::{
    argument_binder::{bind_arguments, ArgValue},
    config::{self, GenerationConfig},
    data_resolver::{DataResolver, InputSource},
    execution_routing::ExecutionRouting,
    expression::{quote_string, ExpressionEmitter},
    identifiers::{class_name, normalize_port_name, IdentifierResolver},
    node_library::{NodeLibrary, SignatureInspector},
    validation::contains_container_literal,
};

/// Keyword-argument dict of signal-listen handlers.
pub const EVENT_KWARGS: &str = "event_kwargs";

/// Names generated code relies on inside method bodies.
const RESERVED_NAMES: &[&str] = &["self", "float", EVENT_KWARGS];

/// Appended to the sanitized signal id to form a handler method name.
pub const HANDLER_SUFFIX: &str = "_handler";

pub(crate) const INDENT: &str = "    ";

/// A value in scope that is fed into the graph from outside, e.g. a
/// composite's `execute` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalInput {
    pub name: String,
    pub ports: Vec<PortRef>,
}

/// Registration key and method name of one handler, derived together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerName {
    pub signal_id: String,
    pub method: String,
}

impl HandlerName {
    fn new(signal_id: &str, methods: &mut IdentifierResolver) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            method: format!("{}{}", methods.resolve(signal_id), HANDLER_SUFFIX),
        }
    }

    pub fn registration(&self) -> String {
        format!(
            "self.game.register_event_handler({}, self.{}, owner=self.owner_entity)",
            quote_string(&self.signal_id),
            self.method
        )
    }
}

#[derive(Debug, Clone)]
pub struct HandlerMethod {
    pub name: HandlerName,
    pub params: Vec<String>,
    pub body: Vec<String>,
}

/// Emission state of one method body.
#[derive(Debug, Default)]
pub struct Scope {
    emitted: HashSet<String>,
    walked: HashSet<String>,
    /// (node, normalized output pin) -> bound name
    bindings: HashMap<PortRef, String>,
    lines: Vec<String>,
}

impl Scope {
    pub fn binding(&self, port: &PortRef) -> Option<&String> {
        self.bindings
            .get(&PortRef::new(port.node.clone(), normalize_port_name(&port.pin)))
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Main code generator
pub struct CodeGenerator<'a> {
    /// The graph being generated
    graph: &'a GraphIr,

    /// node_id -> node instance
    index: HashMap<&'a str, &'a NodeInstance>,

    inspector: SignatureInspector<'a>,

    /// Data flow resolver
    data_resolver: DataResolver,

    /// Execution routing table
    exec_routing: ExecutionRouting,

    /// Collision table of this pass
    names: IdentifierResolver,

    /// node_id -> call identifier
    call_identifiers: HashMap<String, String>,

    /// Names bound to external inputs, in the order given
    parameters: Vec<String>,

    used_identifiers: BTreeSet<String>,

    /// Nodes emitted in at least one scope
    emitted_anywhere: HashSet<String>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(graph: &'a GraphIr, library: &'a dyn NodeLibrary) -> Result<Self> {
        Self::build(graph, library, &[], &[])
    }

    /// Generator where `inputs` replace whatever feeds their mapped ports.
    pub fn with_external_inputs(
        graph: &'a GraphIr,
        library: &'a dyn NodeLibrary,
        inputs: &[ExternalInput],
    ) -> Result<Self> {
        Self::build(graph, library, inputs, &[])
    }

    /// Generator that also keeps clear of `reserved`, the module-level names
    /// the surrounding header binds.
    pub fn build(
        graph: &'a GraphIr,
        library: &'a dyn NodeLibrary,
        inputs: &[ExternalInput],
        reserved: &[String],
    ) -> Result<Self> {
        let index = index_nodes(graph)?;
        let exec_routing = ExecutionRouting::build_from_graph(graph)?;

        let mut inspector = SignatureInspector::new(library);
        let mut names = IdentifierResolver::with_reserved(RESERVED_NAMES);
        names.reserve(reserved.iter().map(String::as_str));

        // Phase 1: Call identifiers, first-seen in declaration order
        let mut call_identifiers = HashMap::new();
        for node in graph.nodes.iter().filter(|node| !node.is_event()) {
            let text = inspector.call_text(node)?;
            call_identifiers.insert(node.id.clone(), names.resolve(&text).to_string());
        }

        // Phase 2: External inputs
        let mut parameters = Vec::with_capacity(inputs.len());
        let mut overrides = BTreeMap::new();
        for input in inputs {
            let name = names.fresh(&input.name);
            for port in &input.ports {
                overrides.insert(port.clone(), name.clone());
            }
            parameters.push(name);
        }

        // Phase 3: Data flow, including the acyclicity check
        let data_resolver = DataResolver::build_with_overrides(graph, &overrides)?;

        tracing::debug!(
            nodes = graph.nodes.len(),
            identifiers = call_identifiers.len(),
            "[CODEGEN] Resolved call identifiers"
        );

        Ok(Self {
            graph,
            index,
            inspector,
            data_resolver,
            exec_routing,
            names,
            call_identifiers,
            parameters,
            used_identifiers: BTreeSet::new(),
            emitted_anywhere: HashSet::new(),
        })
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn used_identifiers(&self) -> &BTreeSet<String> {
        &self.used_identifiers
    }

    /// A class name that no callable or variable of this pass uses.
    pub fn claim_class_name(&mut self, text: &str) -> String {
        let name = class_name(text);
        if self.names.is_taken(&name) {
            self.names.fresh(&name)
        } else {
            self.names.fresh(&name);
            name
        }
    }

    /// Fresh local name bound to the outputs of `node`.
    pub fn bind_outputs_as_parameters(
        &mut self,
        node: &NodeInstance,
        scope: &mut Scope,
    ) -> Vec<String> {
        let mut params = Vec::with_capacity(node.outputs.len());
        for output in &node.outputs {
            let name = self.names.fresh(output);
            scope
                .bindings
                .insert(PortRef::new(node.id.clone(), normalize_port_name(output)), name.clone());
            params.push(name);
        }
        params
    }

    /// Bind the outputs of a signal-listen `node` to lookups in the handler's
    /// keyword arguments.
    fn bind_outputs_from_kwargs(&mut self, node: &NodeInstance, scope: &mut Scope) {
        for output in &node.outputs {
            let pin = normalize_port_name(output);
            let name = self.names.fresh(output);
            scope
                .lines
                .push(format!("{} = {}.get({})", name, EVENT_KWARGS, quote_string(&pin)));
            scope.bindings.insert(PortRef::new(node.id.clone(), pin), name);
        }
    }

    /// One handler per event node, in node declaration order.
    pub fn generate_handlers(&mut self) -> Result<Vec<HandlerMethod>> {
        self.check_signal_bindings()?;

        let mut methods = IdentifierResolver::with_reserved(&["__init__", "register_handlers"]);
        let mut signals = HashSet::new();
        let mut handlers = Vec::new();

        let graph = self.graph;
        for event in graph.nodes.iter().filter(|node| node.is_event()) {
            let signal_id = graph.signal_id_for(event);
            if !signals.insert(signal_id.clone()) {
                return Err(CodegenError::InvalidGraph(format!(
                    "signal '{}' is bound to more than one event node",
                    signal_id
                )));
            }
            let name = HandlerName::new(&signal_id, &mut methods);

            let mut scope = Scope::default();
            scope.emitted.insert(event.id.clone());
            scope.walked.insert(event.id.clone());
            let params = if graph.is_signal_listener(event) {
                self.bind_outputs_from_kwargs(event, &mut scope);
                vec![format!("**{}", EVENT_KWARGS)]
            } else {
                self.bind_outputs_as_parameters(event, &mut scope)
            };

            self.generate_exec_chain(&event.id, &mut scope)?;
            tracing::debug!(
                signal = %signal_id,
                method = %name.method,
                statements = scope.lines.len(),
                "[CODEGEN] Generated handler"
            );

            handlers.push(HandlerMethod {
                name,
                params,
                body: scope.into_lines(),
            });
        }

        Ok(handlers)
    }

    fn check_signal_bindings(&self) -> Result<()> {
        for binding in &self.graph.metadata.signal_bindings {
            if !self.node(&binding.node)?.is_event() {
                return Err(CodegenError::InvalidGraph(format!(
                    "signal '{}' is bound to node {} which is not an event",
                    binding.signal_id, binding.node
                )));
            }
        }
        Ok(())
    }

    /// Generate every node reachable through execution edges from `node_id`,
    /// depth first in edge declaration order.
    pub fn generate_exec_chain(&mut self, node_id: &str, scope: &mut Scope) -> Result<()> {
        // (node, its successors, next successor to visit)
        let mut stack = vec![(
            node_id.to_string(),
            self.exec_routing.successors(node_id).to_vec(),
            0usize,
        )];

        while let Some((source, targets, next)) = stack.last_mut() {
            let Some(target) = targets.get(*next).cloned() else {
                stack.pop();
                continue;
            };
            *next += 1;
            if !scope.walked.insert(target.clone()) {
                continue;
            }
            if self.node(&target)?.is_event() {
                return Err(CodegenError::InvalidGraph(format!(
                    "execution edge from {} enters event node {}",
                    source, target
                )));
            }
            self.generate_node(&target, scope)?;
            let successors = self.exec_routing.successors(&target).to_vec();
            stack.push((target, successors, 0));
        }
        Ok(())
    }

    /// Generate a headless body: every node without incoming execution edges
    /// starts a chain, in declaration order.
    pub fn generate_from_roots(&mut self, scope: &mut Scope) -> Result<()> {
        let graph = self.graph;
        for root in graph.nodes.iter().filter(|node| !node.is_event()) {
            if self.exec_routing.has_incoming(&root.id) || !scope.walked.insert(root.id.clone()) {
                continue;
            }
            self.generate_node(&root.id, scope)?;
            self.generate_exec_chain(&root.id, scope)?;
        }
        Ok(())
    }

    /// Emit `node_id` into `scope`, preceded by its not-yet-emitted producers.
    pub fn generate_node(&mut self, node_id: &str, scope: &mut Scope) -> Result<()> {
        if scope.emitted.contains(node_id) {
            return Ok(());
        }

        // Post-order over producers: (node, its producers, next producer)
        let mut stack = vec![(
            node_id.to_string(),
            self.data_resolver.dependencies_of(node_id).to_vec(),
            0usize,
        )];

        while let Some((current, producers, next)) = stack.last_mut() {
            let Some(producer) = producers.get(*next).cloned() else {
                if let Some((done, _, _)) = stack.pop() {
                    self.emit_node(&done, scope)?;
                }
                continue;
            };
            *next += 1;
            if scope.emitted.contains(&producer) {
                continue;
            }
            if self.node(&producer)?.is_event() {
                return Err(CodegenError::UnresolvedReference {
                    pin: self.referenced_pin(current, &producer),
                    node_id: producer,
                });
            }
            let dependencies = self.data_resolver.dependencies_of(&producer).to_vec();
            stack.push((producer, dependencies, 0));
        }
        Ok(())
    }

    /// One call statement for `node_id`; its producers are already bound.
    fn emit_node(&mut self, node_id: &str, scope: &mut Scope) -> Result<()> {
        if !scope.emitted.insert(node_id.to_string()) {
            return Ok(());
        }
        self.emitted_anywhere.insert(node_id.to_string());

        let node = self.node(node_id)?;
        let mut inputs = Vec::new();
        for (pin, source) in self.data_resolver.inputs_of(node_id) {
            let value = match source {
                InputSource::Connection(port) => {
                    let name = scope.binding(port).ok_or_else(|| CodegenError::UnresolvedReference {
                        node_id: port.node.clone(),
                        pin: port.pin.clone(),
                    })?;
                    ArgValue::Reference(name.clone())
                }
                InputSource::Constant(value) => ArgValue::Literal(value.clone()),
                InputSource::External(name) => ArgValue::Reference(name.clone()),
            };
            inputs.push((pin.clone(), value));
        }

        let signature = self.inspector.signature_of(&node.descriptor.type_id)?;
        let args = bind_arguments(node_id, &signature, &inputs)?;
        let identifier = self
            .call_identifiers
            .get(node_id)
            .cloned()
            .ok_or_else(|| CodegenError::UnknownNodeInstance {
                node_id: node_id.to_string(),
            })?;

        let emitted = {
            let lookup = |port: &PortRef| scope.binding(port).cloned();
            ExpressionEmitter::new(&mut self.names, &lookup).emit_call(&identifier, &args)?
        };
        debug_assert!(!contains_container_literal(&emitted.expression));
        scope.lines.extend(emitted.statements);

        let mut results = Vec::with_capacity(node.outputs.len());
        for output in &node.outputs {
            let name = self.names.fresh(output);
            let port = PortRef::new(node_id.to_string(), normalize_port_name(output));
            scope.bindings.insert(port, name.clone());
            results.push(name);
        }

        let statement = match (results.as_slice(), node.outputs.as_slice()) {
            ([], _) => emitted.expression,
            // Only a single result can carry an annotation
            ([name], [output]) => match signature.output_type(output) {
                Some(port_type) => {
                    format!("{}: {} = {}", name, quote_string(port_type), emitted.expression)
                }
                None => format!("{} = {}", name, emitted.expression),
            },
            _ => format!("{} = {}", results.join(", "), emitted.expression),
        };
        tracing::trace!(node_id, %statement, "[CODEGEN] Emitted node");
        scope.lines.push(statement);
        self.used_identifiers.insert(identifier);
        Ok(())
    }

    /// Warn about non-event nodes no scope has emitted.
    pub fn report_unreachable(&self) -> Vec<String> {
        let unreachable: Vec<String> = self
            .graph
            .nodes
            .iter()
            .filter(|node| !node.is_event() && !self.emitted_anywhere.contains(&node.id))
            .map(|node| node.id.clone())
            .collect();
        if !unreachable.is_empty() {
            tracing::warn!(
                nodes = ?unreachable,
                "[CODEGEN] Nodes unreachable from any event were omitted"
            );
        }
        unreachable
    }

    fn node(&self, node_id: &str) -> Result<&'a NodeInstance> {
        self.index
            .get(node_id)
            .copied()
            .ok_or_else(|| CodegenError::UnknownNodeInstance {
                node_id: node_id.to_string(),
            })
    }

    /// First output pin of `producer` that `node_id` reads.
    fn referenced_pin(&self, node_id: &str, producer: &str) -> String {
        self.data_resolver
            .inputs_of(node_id)
            .iter()
            .find_map(|(_, source)| match source {
                InputSource::Connection(port) if port.node == producer => Some(port.pin.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Node lookup table; node ids must be unique.
fn index_nodes(graph: &GraphIr) -> Result<HashMap<&str, &NodeInstance>> {
    let mut index = HashMap::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        if index.insert(node.id.as_str(), node).is_some() {
            return Err(CodegenError::InvalidGraph(format!("duplicate node id {}", node.id)));
        }
    }
    Ok(index)
}

/// Single-line text safe to place inside a `"""` docstring.
pub(crate) fn docstring_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

pub(crate) fn indent(lines: &[String], level: usize) -> Vec<String> {
    let prefix = INDENT.repeat(level);
    lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect()
}

/// Generate a complete executable module for a graph.
pub fn generate_graph_module(
    graph: &GraphIr,
    library: &dyn NodeLibrary,
    config: &GenerationConfig,
) -> Result<String> {
    let reserved = config::reserved_names(config)?;
    let mut generator = CodeGenerator::build(graph, library, &[], &reserved)?;
    let handlers = generator.generate_handlers()?;
    generator.report_unreachable();
    let class = generator.claim_class_name(&graph.metadata.name);
    let header = config::resolve(config, generator.used_identifiers())?;

    let mut lines = vec!["\"\"\"".to_string()];
    if !graph.metadata.graph_id.is_empty() {
        lines.push(format!("graph_id: {}", docstring_text(&graph.metadata.graph_id)));
    }
    lines.push(format!("graph_name: {}", docstring_text(&graph.metadata.name)));
    lines.push(format!("graph_type: {}", config.preset.as_str()));
    if !graph.metadata.folder_path.is_empty() {
        lines.push(format!("folder_path: {}", docstring_text(&graph.metadata.folder_path)));
    }
    if !graph.metadata.description.is_empty() {
        lines.push(format!("description: {}", docstring_text(&graph.metadata.description)));
    }
    lines.push("\"\"\"".to_string());
    lines.push(String::new());
    lines.extend(header.lines());
    lines.push(String::new());
    lines.push(String::new());

    if let Some(decorator) = &header.decorator {
        lines.push(decorator.clone());
    }
    lines.push(format!("class {}:", class));

    let mut members = vec![
        "def __init__(self, game: GameRuntime, owner_entity):".to_string(),
        format!("{}self.game = game", INDENT),
        format!("{}self.owner_entity = owner_entity", INDENT),
    ];

    for handler in &handlers {
        members.push(String::new());
        let mut params = vec!["self".to_string()];
        params.extend(handler.params.iter().cloned());
        members.push(format!("def {}({}):", handler.name.method, params.join(", ")));
        if handler.body.is_empty() {
            members.push(format!("{}pass", INDENT));
        } else {
            members.extend(indent(&handler.body, 1));
        }
    }

    members.push(String::new());
    members.push("def register_handlers(self):".to_string());
    if handlers.is_empty() {
        members.push(format!("{}pass", INDENT));
    }
    for handler in &handlers {
        members.push(format!("{}{}", INDENT, handler.name.registration()));
    }

    lines.extend(indent(&members, 1));

    let mut source = lines.join("\n");
    source.push('\n');
    Ok(source)
}

#[cfg(test)]
mod tests {
    use crate::compiler::node_library::{NodeSignature, ParamDescriptor, StaticNodeLibrary};
    use crate::graph::{LiteralValue, NodeCategory};

    use super::*;

    fn context_param() -> ParamDescriptor {
        ParamDescriptor::keyword("game")
    }

    fn library() -> StaticNodeLibrary {
        let mut library = StaticNodeLibrary::new();
        library.register(NodeSignature::new(
            "math.add",
            vec![ParamDescriptor::keyword("a"), ParamDescriptor::keyword("b")],
        ));
        library.register(NodeSignature::new(
            "log.print",
            vec![context_param(), ParamDescriptor::keyword("message")],
        ));
        library
    }

    fn event(id: &str, name: &str) -> NodeInstance {
        NodeInstance::new(id, "event", name, NodeCategory::Event)
    }

    fn damage_graph() -> GraphIr {
        let mut graph = GraphIr::new("damage flow");
        let mut on_damage = event("e1", "On Damage");
        on_damage.add_output_pin("amount");
        graph.add_node(on_damage);

        let mut add = NodeInstance::new("n1", "math.add", "Add/Sum", NodeCategory::Query);
        add.bind_output("a", "e1", "amount");
        add.bind_literal("b", LiteralValue::Int(1));
        add.add_output_pin("result");
        graph.add_node(add);

        let mut print = NodeInstance::new("n2", "log.print", "Print", NodeCategory::Operation);
        print.bind_output("message", "n1", "result");
        graph.add_node(print);

        graph.connect_exec("e1", "then", "n2");
        graph.bind_signal("e1", "OnDamage");
        graph
    }

    #[test]
    fn test_handler_body_emits_dependencies_first() {
        let graph = damage_graph();
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        let handlers = generator.generate_handlers().unwrap();

        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].name.method, "OnDamage_handler");
        assert_eq!(handlers[0].params, vec!["amount"]);
        assert_eq!(
            handlers[0].body,
            vec!["result = Add_Sum(a=amount, b=1)", "Print(self.game, message=result)"]
        );
        assert!(generator.report_unreachable().is_empty());
    }

    #[test]
    fn test_registration_matches_method() {
        let graph = damage_graph();
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        let handler = &generator.generate_handlers().unwrap()[0];
        assert_eq!(
            handler.name.registration(),
            concat!(
                "self.game.register_event_handler(",
                "\"OnDamage\", self.OnDamage_handler, owner=self.owner_entity)",
            )
        );
    }

    #[test]
    fn test_event_without_signal_binding_uses_display_name() {
        let mut graph = damage_graph();
        graph.metadata.signal_bindings.clear();
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        let handlers = generator.generate_handlers().unwrap();
        assert_eq!(handlers[0].name.signal_id, "On Damage");
        assert_eq!(handlers[0].name.method, "On_Damage_handler");
    }

    #[test]
    fn test_duplicate_signal_rejected() {
        let mut graph = damage_graph();
        graph.add_node(event("e2", "Other"));
        graph.bind_signal("e2", "OnDamage");
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        assert!(matches!(
            generator.generate_handlers(),
            Err(CodegenError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_reference_to_other_event_output() {
        let mut graph = damage_graph();
        let mut other = event("e2", "On Heal");
        other.add_output_pin("amount");
        graph.add_node(other);
        let mut heal_print = NodeInstance::new("n3", "log.print", "Print", NodeCategory::Operation);
        heal_print.bind_output("message", "e1", "amount");
        graph.add_node(heal_print);
        graph.connect_exec("e2", "then", "n3");

        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        assert_eq!(
            generator.generate_handlers().unwrap_err(),
            CodegenError::UnresolvedReference {
                node_id: "e1".to_string(),
                pin: "amount".to_string(),
            }
        );
    }

    #[test]
    fn test_unreachable_nodes_reported() {
        let mut graph = damage_graph();
        graph.add_node(NodeInstance::new("n9", "math.add", "Orphan", NodeCategory::Query));
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        generator.generate_handlers().unwrap();
        assert_eq!(generator.report_unreachable(), vec!["n9"]);
    }

    #[test]
    fn test_shared_dependency_emitted_once() {
        let mut graph = damage_graph();
        let mut second = NodeInstance::new("n3", "log.print", "Print", NodeCategory::Operation);
        second.bind_output("message", "n1", "result");
        graph.add_node(second);
        graph.connect_exec("n2", "then", "n3");

        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        let body = &generator.generate_handlers().unwrap()[0].body;
        assert_eq!(body.iter().filter(|line| line.contains("Add_Sum(")).count(), 1);
        assert_eq!(body.len(), 3);
        assert_eq!(body[2], "Print(self.game, message=result)");
    }

    #[test]
    fn test_class_name_avoids_callables() {
        let mut graph = damage_graph();
        graph.metadata.name = "print".to_string();
        let library = library();
        let mut generator = CodeGenerator::new(&graph, &library).unwrap();
        assert_eq!(generator.claim_class_name("print"), "Print_2");
    }

    #[test]
    fn test_docstring_text_escapes_quotes() {
        assert_eq!(docstring_text("a \"\"\" b \\"), "a \\\"\\\"\\\" b \\\\");
        assert_eq!(docstring_text("two\nlines"), "two\\nlines");
    }
}

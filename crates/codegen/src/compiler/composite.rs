//! # Composite Code Generator
//!
//! Emits a composite node as an importable class. The full configuration is
//! embedded as an opaque JSON payload in a triple-quoted string constant, so
//! the declaration never contains container literal syntax and the class can
//! be decoded back into its [`CompositeConfig`] with [`parse_composite`].

use std::collections::BTreeSet;

use crate::error::{CodegenError, Result};
use crate::graph::{CompositeConfig, ExternalPin, PinDirection};

use super::{
    code_generator::{docstring_text, indent, CodeGenerator, ExternalInput, Scope, INDENT},
    config::{self, GenerationConfig},
    node_library::NodeLibrary,
};

pub const PAYLOAD_CONSTANT: &str = "COMPOSITE_PAYLOAD";

const PAYLOAD_OPEN: &str = "COMPOSITE_PAYLOAD = '''";
const PAYLOAD_CLOSE: &str = "'''";

/// Names from `typing` the `execute` annotations may use.
const TYPING_NAMES: &[&str] = &["Any", "Tuple"];

/// Python annotation for a pin type name; unknown types are `Any`.
pub fn python_type(pin_type: &str) -> &'static str {
    match pin_type.trim() {
        "int" | "integer" | "整数" => "int",
        "float" | "浮点数" => "float",
        "str" | "string" | "字符串" => "str",
        "bool" | "boolean" | "布尔值" => "bool",
        "list" | "列表" => "list",
        "dict" | "字典" => "dict",
        _ => "Any",
    }
}

/// `execute` signature with parameter and return annotations, plus the
/// `typing` names it needs.
fn execute_signature(
    params: &[String],
    inputs: &[&ExternalPin],
    outputs: &[&ExternalPin],
) -> (String, BTreeSet<&'static str>) {
    let mut typing = BTreeSet::new();
    let mut annotate = |pin: &ExternalPin| {
        let annotation = python_type(&pin.pin_type);
        if annotation == "Any" {
            typing.insert("Any");
        }
        annotation
    };

    let mut signature = vec!["self".to_string()];
    for (name, pin) in params.iter().zip(inputs) {
        signature.push(format!("{}: {}", name, annotate(*pin)));
    }

    let returns: Vec<&str> = outputs.iter().map(|pin| annotate(*pin)).collect();
    let return_type = match returns.as_slice() {
        [] => "None".to_string(),
        [single] => single.to_string(),
        many => {
            typing.insert("Tuple");
            format!("Tuple[{}]", many.join(", "))
        }
    };

    (format!("def execute({}) -> {}:", signature.join(", "), return_type), typing)
}

/// Serialize `config` into the body of a `'''` string literal.
pub fn encode_payload(config: &CompositeConfig) -> Result<String> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| CodegenError::CompositePayloadSerializationFailure(e.to_string()))?;
    Ok(json.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Decode the configuration embedded in generated composite source.
pub fn parse_composite(source: &str) -> Result<CompositeConfig> {
    // The declaration always starts a line; docstring text never does
    let start = source
        .match_indices(PAYLOAD_OPEN)
        .map(|(index, _)| index)
        .find(|index| *index == 0 || source[..*index].ends_with('\n'))
        .ok_or_else(|| {
            CodegenError::CompositePayloadSerializationFailure(format!(
                "{} declaration not found",
                PAYLOAD_CONSTANT
            ))
        })?;
    let body = &source[start + PAYLOAD_OPEN.len()..];

    let mut json = String::with_capacity(body.len());
    let mut chars = body.chars();
    let mut closed = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => json.push('\\'),
                Some('\'') => json.push('\''),
                Some(other) => {
                    json.push('\\');
                    json.push(other);
                }
                None => break,
            },
            '\'' if chars.as_str().starts_with("''") => {
                closed = true;
                break;
            }
            c => json.push(c),
        }
    }
    if !closed {
        return Err(CodegenError::CompositePayloadSerializationFailure(
            "unterminated payload string".to_string(),
        ));
    }

    serde_json::from_str(&json)
        .map_err(|e| CodegenError::CompositePayloadSerializationFailure(e.to_string()))
}

/// Generate the module source of a composite node.
pub fn generate_composite_module(
    composite: &CompositeConfig,
    library: &dyn NodeLibrary,
    config: &GenerationConfig,
) -> Result<String> {
    if let Some(event) = composite.graph.nodes.iter().find(|node| node.is_event()) {
        return Err(CodegenError::InvalidGraph(format!(
            "composite {} contains event node {}",
            composite.composite_id, event.id
        )));
    }

    let input_pins = composite.pins_by_index(PinDirection::Input);
    let output_pins = composite.pins_by_index(PinDirection::Output);
    let inputs: Vec<ExternalInput> = input_pins
        .iter()
        .map(|pin| ExternalInput {
            name: pin.name.clone(),
            ports: pin.mapped_ports.clone(),
        })
        .collect();

    // The validation wrapper is specific to node-graph classes
    let header_config = GenerationConfig {
        validate: false,
        ..config.clone()
    };
    let mut reserved = config::reserved_names(&header_config)?;
    reserved.push(PAYLOAD_CONSTANT.to_string());
    reserved.extend(TYPING_NAMES.iter().map(|name| name.to_string()));

    let mut generator = CodeGenerator::build(&composite.graph, library, &inputs, &reserved)?;
    let mut scope = Scope::default();
    generator.generate_from_roots(&mut scope)?;
    generator.report_unreachable();

    let mut returns = Vec::new();
    for pin in &output_pins {
        let bound = pin.mapped_ports.iter().find_map(|port| scope.binding(port).cloned());
        match bound {
            Some(name) => returns.push(name),
            None => {
                return Err(CodegenError::UnboundRequiredPin {
                    node_id: composite.composite_id.clone(),
                    pin: pin.name.clone(),
                })
            }
        }
    }

    let class = generator.claim_class_name(&composite.name);
    let (signature, typing) = execute_signature(generator.parameters(), &input_pins, &output_pins);

    let mut header = config::resolve(&header_config, generator.used_identifiers())?;
    if !typing.is_empty() {
        let names: Vec<&str> = typing.into_iter().collect();
        header.imports.insert(0, format!("from typing import {}", names.join(", ")));
    }
    let payload = encode_payload(composite)?;

    let mut lines = vec!["\"\"\"".to_string()];
    lines.push(format!("composite_id: {}", docstring_text(&composite.composite_id)));
    lines.push(format!("node_name: {}", docstring_text(&composite.name)));
    lines.push(format!("graph_type: {}", config.preset.as_str()));
    let folder_path = &composite.graph.metadata.folder_path;
    if !folder_path.is_empty() {
        lines.push(format!("folder_path: {}", docstring_text(folder_path)));
    }
    lines.push("\"\"\"".to_string());
    lines.push(String::new());
    lines.extend(header.lines());
    lines.push(String::new());
    lines.push(format!("{}{}{}", PAYLOAD_OPEN, payload, PAYLOAD_CLOSE));
    lines.push(String::new());
    lines.push(String::new());
    lines.push(format!("class {}:", class));

    let mut members = class_docstring(composite);
    members.push(String::new());
    members.push(format!("payload = {}", PAYLOAD_CONSTANT));
    members.push(String::new());
    members.push("def __init__(self, game: GameRuntime, owner_entity=None):".to_string());
    members.push(format!("{}self.game = game", INDENT));
    members.push(format!("{}self.owner_entity = owner_entity", INDENT));
    members.push(String::new());
    members.push(signature);

    let mut body = scope.into_lines();
    if !returns.is_empty() {
        body.push(format!("return {}", returns.join(", ")));
    }
    if body.is_empty() {
        body.push("pass".to_string());
    }
    members.extend(indent(&body, 1));
    lines.extend(indent(&members, 1));

    let mut source = lines.join("\n");
    source.push('\n');

    // The payload must decode to the configuration it was made from
    let decoded = parse_composite(&source)?;
    if !decoded.is_equivalent(composite) {
        return Err(CodegenError::CompositePayloadSerializationFailure(format!(
            "decoded payload of {} differs from its configuration",
            composite.composite_id
        )));
    }

    tracing::debug!(
        composite_id = %composite.composite_id,
        inputs = inputs.len(),
        outputs = returns.len(),
        "[COMPOSITE] Generated composite class"
    );
    Ok(source)
}

fn class_docstring(composite: &CompositeConfig) -> Vec<String> {
    let summary = if composite.description.is_empty() {
        composite.name.as_str()
    } else {
        composite.description.as_str()
    };
    let mut lines = vec![format!("\"\"\"{}", docstring_text(summary))];

    let sections = [("Inputs:", PinDirection::Input), ("Outputs:", PinDirection::Output)];
    for (title, direction) in sections {
        let pins = composite.pins_by_index(direction);
        if pins.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(title.to_string());
        for pin in pins {
            let pin_type = if pin.pin_type.is_empty() { "Any" } else { pin.pin_type.as_str() };
            let mut line = format!(
                "{}{} ({})",
                INDENT,
                docstring_text(&pin.name),
                docstring_text(pin_type)
            );
            if !pin.description.is_empty() {
                line.push_str(": ");
                line.push_str(&docstring_text(&pin.description));
            }
            lines.push(line);
        }
    }

    lines.push("\"\"\"".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::compiler::node_library::{NodeSignature, ParamDescriptor, StaticNodeLibrary};
    use crate::compiler::validation::contains_container_literal;
    use crate::graph::{ExternalPin, GraphIr, LiteralValue, NodeCategory, NodeInstance, PortRef};

    use super::*;

    fn library() -> StaticNodeLibrary {
        let mut library = StaticNodeLibrary::new();
        library.register(
            NodeSignature::new(
                "math.multiply",
                vec![ParamDescriptor::keyword("a"), ParamDescriptor::keyword("b")],
            )
            .with_alias("multiply"),
        );
        library
    }

    fn pin(name: &str, direction: PinDirection, index: u32, port: PortRef) -> ExternalPin {
        ExternalPin {
            name: name.to_string(),
            direction,
            index,
            pin_type: "float".to_string(),
            description: String::new(),
            mapped_ports: vec![port],
        }
    }

    fn generate(composite: &CompositeConfig) -> String {
        generate_composite_module(composite, &library(), &GenerationConfig::default()).unwrap()
    }

    fn doubler() -> CompositeConfig {
        let mut graph = GraphIr::new("doubler");
        let mut multiply =
            NodeInstance::new("m1", "math.multiply", "Multiply", NodeCategory::Query);
        multiply.bind_literal("b", LiteralValue::Float(2.0));
        multiply.add_output_pin("product");
        graph.add_node(multiply);

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "tags".to_string(),
            serde_json::json!(["math", "it's \"quoted\" \\ here"]),
        );

        CompositeConfig {
            composite_id: "composite_doubler".to_string(),
            name: "Double It".to_string(),
            description: "Multiplies by two".to_string(),
            graph,
            pins: vec![
                pin("value", PinDirection::Input, 0, PortRef::new("m1", "a")),
                pin("doubled", PinDirection::Output, 0, PortRef::new("m1", "product")),
            ],
            metadata,
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let composite = doubler();
        let source = generate(&composite);
        let decoded = parse_composite(&source).unwrap();
        assert!(decoded.is_equivalent(&composite));
        assert_eq!(decoded, composite);
    }

    #[test]
    fn test_execute_body() {
        let source = generate(&doubler());
        assert!(source.contains("class DoubleIt:\n"));
        assert!(source.contains("    payload = COMPOSITE_PAYLOAD\n"));
        assert!(source.contains("    def execute(self, value: float) -> float:\n"));
        assert!(!source.contains("from typing import"));
        assert!(source.contains("        product = multiply(a=value, b=2.0)\n"));
        assert!(source.contains("        return product\n"));
        assert!(!source.contains("@validate_node_graph"));
    }

    #[test]
    fn test_untyped_and_multiple_outputs_use_typing() {
        let mut composite = doubler();
        composite.pins[0].pin_type = "实体".to_string();
        composite.pins.push(pin("again", PinDirection::Output, 1, PortRef::new("m1", "product")));
        composite.pins[2].pin_type = "整数".to_string();

        let source = generate(&composite);
        assert!(source.contains("    def execute(self, value: Any) -> Tuple[float, int]:\n"));
        assert!(source.contains("        return product, product\n"));
        assert!(source.contains("\"\"\"\n\nfrom typing import Any, Tuple\nfrom runtime.engine"));
    }

    #[test]
    fn test_no_outputs_return_none() {
        let mut composite = doubler();
        composite.pins.truncate(1);
        let source = generate(&composite);
        assert!(source.contains("    def execute(self, value: float) -> None:\n"));
    }

    #[test]
    fn test_header_names_are_not_reused() {
        let mut composite = doubler();
        composite.pins[0].name = "COMPOSITE_PAYLOAD".to_string();
        composite.graph.metadata.folder_path = "shared/math".to_string();

        let source = generate(&composite);
        assert!(source.contains("graph_type: server\nfolder_path: shared/math\n\"\"\"\n"));
        assert!(source.contains("def execute(self, COMPOSITE_PAYLOAD_2: float) -> float:"));
        assert!(source.contains("product = multiply(a=COMPOSITE_PAYLOAD_2, b=2.0)"));
    }

    #[test]
    fn test_python_type_names() {
        assert_eq!(python_type("int"), "int");
        assert_eq!(python_type(" 字符串 "), "str");
        assert_eq!(python_type("Entity"), "Any");
        assert_eq!(python_type(""), "Any");
    }

    #[test]
    fn test_payload_declaration_has_no_container_literal() {
        let source = generate(&doubler());
        let start = source.find(PAYLOAD_OPEN).unwrap();
        let end = source[start..].find("\n\n").unwrap() + start;
        assert!(!contains_container_literal(&source[start..end]));
    }

    #[test]
    fn test_unmapped_output() {
        let mut composite = doubler();
        composite.pins[1].mapped_ports = vec![PortRef::new("m1", "missing")];
        assert_eq!(
            generate_composite_module(&composite, &library(), &GenerationConfig::default()),
            Err(CodegenError::UnboundRequiredPin {
                node_id: "composite_doubler".to_string(),
                pin: "doubled".to_string(),
            })
        );
    }

    #[test]
    fn test_event_nodes_rejected() {
        let mut composite = doubler();
        composite
            .graph
            .add_node(NodeInstance::new("e1", "event", "On Start", NodeCategory::Event));
        assert!(matches!(
            generate_composite_module(&composite, &library(), &GenerationConfig::default()),
            Err(CodegenError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_payload() {
        assert!(matches!(
            parse_composite("class Nothing:\n    pass\n"),
            Err(CodegenError::CompositePayloadSerializationFailure(_))
        ));
        assert!(matches!(
            parse_composite("COMPOSITE_PAYLOAD = '''{\"composite_id\": "),
            Err(CodegenError::CompositePayloadSerializationFailure(_))
        ));
    }

    #[test]
    fn test_non_finite_float_cannot_round_trip() {
        let mut composite = doubler();
        composite.graph.nodes[0].bindings[0] = crate::graph::PinBinding {
            pin: "b".to_string(),
            source: crate::graph::PinSource::Literal {
                value: LiteralValue::Float(f64::NAN),
            },
        };
        assert!(matches!(
            generate_composite_module(&composite, &library(), &GenerationConfig::default()),
            Err(CodegenError::CompositePayloadSerializationFailure(_))
        ));
    }
}

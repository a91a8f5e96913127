//! # Expression Emitter
//!
//! Renders bound calls and literal values as source text.
//!
//! Two grammar restrictions are upheld while rendering, not checked afterwards:
//!
//! - A call's argument list never contains a container literal. Lists and maps
//!   are bound to a fresh name by a preceding statement and passed by name.
//! - An f-string hole never contains a quote or a backslash (Python 3.8 rejects
//!   both). Any hole value whose rendering would need one is bound to a fresh
//!   name first, and only the name is interpolated.

use crate::error::{CodegenError, Result};
use crate::graph::{LiteralValue, PortRef, TemplatePart};

use super::argument_binder::{ArgSlot, ArgValue, BoundArgument};
use super::identifiers::IdentifierResolver;

/// Spelling of the empty string.
pub const EMPTY_STRING: &str = "\"\"";

/// A call expression plus the statements that must run before it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmittedExpression {
    /// Hoisted `name = value` bindings, in dependency order
    pub statements: Vec<String>,
    pub expression: String,
}

pub struct ExpressionEmitter<'a> {
    names: &'a mut IdentifierResolver,
    lookup: &'a dyn Fn(&PortRef) -> Option<String>,
    statements: Vec<String>,
}

impl<'a> ExpressionEmitter<'a> {
    /// `lookup` maps an output port referenced from a template to the name its
    /// value is bound to.
    pub fn new(
        names: &'a mut IdentifierResolver,
        lookup: &'a dyn Fn(&PortRef) -> Option<String>,
    ) -> Self {
        Self {
            names,
            lookup,
            statements: Vec::new(),
        }
    }

    /// Render `identifier(args...)`.
    pub fn emit_call(
        mut self,
        identifier: &str,
        args: &[BoundArgument],
    ) -> Result<EmittedExpression> {
        let mut rendered = Vec::with_capacity(args.len());
        for arg in args {
            let text = match &arg.slot {
                ArgSlot::Keyword(name) => format!("{}={}", name, self.argument(name, &arg.value)?),
                ArgSlot::Context | ArgSlot::Positional => self.argument("arg", &arg.value)?,
                ArgSlot::VariadicItem(_) => self.argument("item", &arg.value)?,
            };
            rendered.push(text);
        }

        Ok(EmittedExpression {
            statements: self.statements,
            expression: format!("{}({})", identifier, rendered.join(", ")),
        })
    }

    fn argument(&mut self, stem: &str, value: &ArgValue) -> Result<String> {
        match value {
            ArgValue::Reference(name) => Ok(name.clone()),
            ArgValue::Literal(literal) if literal.is_container() => {
                let rendered = self.render(literal)?;
                Ok(self.hoist(stem, rendered))
            }
            ArgValue::Literal(literal) => self.render(literal),
        }
    }

    /// Render a literal in a position where containers are allowed.
    fn render(&mut self, value: &LiteralValue) -> Result<String> {
        Ok(match value {
            LiteralValue::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.render(item))
                    .collect::<Result<Vec<_>>>()?;
                format!("[{}]", items.join(", "))
            }
            LiteralValue::Map(entries) => {
                let mut rendered = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    rendered.push(format!("{}: {}", quote_string(key), self.render(item)?));
                }
                format!("{{{}}}", rendered.join(", "))
            }
            LiteralValue::Template(parts) => self.render_template(parts)?,
            scalar => render_scalar(scalar).unwrap_or_default(),
        })
    }

    fn render_template(&mut self, parts: &[TemplatePart]) -> Result<String> {
        let has_holes = parts.iter().any(|part| !matches!(part, TemplatePart::Text(_)));
        if !has_holes {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    TemplatePart::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            return Ok(quote_string(&text));
        }

        let mut out = String::from("f\"");
        for part in parts {
            match part {
                TemplatePart::Text(text) => {
                    out.push_str(&escape_string_body(text).replace('{', "{{").replace('}', "}}"));
                }
                TemplatePart::Value(value) => {
                    let rendered = self.render(value)?;
                    let hole = if is_safe_hole(value, &rendered) {
                        rendered
                    } else {
                        self.hoist("text_part", rendered)
                    };
                    out.push('{');
                    out.push_str(&hole);
                    out.push('}');
                }
                TemplatePart::Output(port) => {
                    let name = (self.lookup)(port).ok_or_else(|| CodegenError::UnresolvedReference {
                        node_id: port.node.clone(),
                        pin: port.pin.clone(),
                    })?;
                    out.push('{');
                    out.push_str(&name);
                    out.push('}');
                }
            }
        }
        out.push('"');
        Ok(out)
    }

    fn hoist(&mut self, stem: &str, expression: String) -> String {
        let name = self.names.fresh(stem);
        self.statements.push(format!("{} = {}", name, expression));
        name
    }
}

fn is_safe_hole(value: &LiteralValue, rendered: &str) -> bool {
    !value.is_container()
        && !matches!(value, LiteralValue::Str(_) | LiteralValue::Template(_))
        && !rendered.contains(&['"', '\'', '\\', '#', '{', '}'][..])
}

/// Render a literal that needs no hoisting; `None` for containers and templates.
pub fn render_scalar(value: &LiteralValue) -> Option<String> {
    let rendered = match value {
        LiteralValue::Null => "None".to_string(),
        LiteralValue::Bool(true) => "True".to_string(),
        LiteralValue::Bool(false) => "False".to_string(),
        LiteralValue::Int(value) => value.to_string(),
        LiteralValue::Float(value) => render_float(*value),
        LiteralValue::Str(text) => quote_string(text),
        LiteralValue::List(_) | LiteralValue::Map(_) | LiteralValue::Template(_) => return None,
    };
    Some(rendered)
}

pub fn render_float(value: f64) -> String {
    if value.is_nan() {
        return "float(\"nan\")".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "float(\"inf\")".to_string()
        } else {
            "float(\"-inf\")".to_string()
        };
    }
    let text = format!("{:?}", value);
    if text.contains(&['.', 'e', 'E'][..]) {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Double-quoted string literal.
pub fn quote_string(text: &str) -> String {
    if text.is_empty() {
        return EMPTY_STRING.to_string();
    }
    format!("\"{}\"", escape_string_body(text))
}

fn escape_string_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && (c as u32) <= 0xff => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

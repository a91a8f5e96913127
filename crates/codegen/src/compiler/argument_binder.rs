//! # Argument Binder
//!
//! Pairs the resolved input values of one node instance with the parameters
//! its signature declares, producing the ordered argument list of its call.
//!
//! One call never mixes keyword and positional forms outside of the variadic
//! layout (`leading positionals, *items, trailing keywords`), which is the only
//! ordering the target grammar accepts unambiguously.

use std::collections::HashSet;

use crate::error::{CodegenError, Result};
use crate::graph::LiteralValue;

use super::identifiers::{is_legal_identifier, normalize_port_name};
use super::node_library::{BindingKind, NodeSignature, ParamDescriptor};

/// Expression bound to the context parameter.
pub const CONTEXT_EXPRESSION: &str = "self.game";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSlot {
    Context,
    Positional,
    Keyword(String),
    VariadicItem(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A name already bound in the generated scope
    Reference(String),
    Literal(LiteralValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgument {
    pub slot: ArgSlot,
    pub value: ArgValue,
}

impl BoundArgument {
    fn new(slot: ArgSlot, value: ArgValue) -> Self {
        Self { slot, value }
    }
}

/// Bind `inputs` (normalized pin name -> value) to the parameters of `signature`.
pub fn bind_arguments(
    node_id: &str,
    signature: &NodeSignature,
    inputs: &[(String, ArgValue)],
) -> Result<Vec<BoundArgument>> {
    let binder = Binder {
        node_id,
        signature,
        inputs,
    };
    binder.check_declared()?;

    let arguments = match signature.params.iter().position(ParamDescriptor::is_variadic) {
        Some(variadic_at) => binder.bind_variadic(variadic_at)?,
        None => binder.bind_fixed()?,
    };

    tracing::trace!(node_id, args = arguments.len(), "[BIND] Bound call arguments");
    Ok(arguments)
}

struct Binder<'a> {
    node_id: &'a str,
    signature: &'a NodeSignature,
    inputs: &'a [(String, ArgValue)],
}

impl<'a> Binder<'a> {
    fn is_context(&self, index: usize) -> bool {
        index == 0 && self.signature.requires_context_handle()
    }

    fn check_declared(&self) -> Result<()> {
        let is_variadic = self.signature.is_variadic();
        let declared: HashSet<String> = self
            .signature
            .params
            .iter()
            .filter(|param| !param.is_variadic())
            .map(|param| normalize_port_name(&param.raw_name))
            .collect();

        for (pin, _) in self.inputs {
            let is_item = is_variadic && pin.parse::<usize>().is_ok();
            if !declared.contains(pin) && !is_item {
                return Err(CodegenError::UndeclaredPin {
                    node_id: self.node_id.to_string(),
                    pin: pin.clone(),
                });
            }
        }
        Ok(())
    }

    /// Bound value of a named parameter: its input, else its default.
    fn value_of(&self, param: &ParamDescriptor) -> Result<ArgValue> {
        let name = normalize_port_name(&param.raw_name);
        if let Some((_, value)) = self.inputs.iter().find(|(pin, _)| *pin == name) {
            return Ok(value.clone());
        }
        match &param.default {
            Some(default) => Ok(ArgValue::Literal(default.clone())),
            None => Err(CodegenError::UnboundRequiredPin {
                node_id: self.node_id.to_string(),
                pin: param.raw_name.clone(),
            }),
        }
    }

    fn bind_fixed(&self) -> Result<Vec<BoundArgument>> {
        let by_keyword = self
            .signature
            .params
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.is_context(*index))
            .all(|(_, param)| {
                param.binding_kind == BindingKind::Keyword
                    && is_legal_identifier(&normalize_port_name(&param.raw_name))
            });
        if !by_keyword {
            tracing::debug!(node_id = self.node_id, "[BIND] Falling back to positional arguments");
        }

        let mut arguments = Vec::with_capacity(self.signature.params.len());
        for (index, param) in self.signature.params.iter().enumerate() {
            if self.is_context(index) {
                arguments.push(context_argument());
                continue;
            }
            let slot = if by_keyword {
                ArgSlot::Keyword(normalize_port_name(&param.raw_name))
            } else {
                ArgSlot::Positional
            };
            arguments.push(BoundArgument::new(slot, self.value_of(param)?));
        }
        Ok(arguments)
    }

    fn bind_variadic(&self, variadic_at: usize) -> Result<Vec<BoundArgument>> {
        for (index, param) in self.signature.params.iter().enumerate() {
            if self.is_context(index) || index == variadic_at {
                continue;
            }
            if !is_legal_identifier(&normalize_port_name(&param.raw_name)) {
                return Err(CodegenError::VariadicPositionalFallbackDisallowed {
                    node_id: self.node_id.to_string(),
                    pin: param.raw_name.clone(),
                });
            }
        }

        let mut arguments = Vec::new();
        for (index, param) in self.signature.params.iter().enumerate() {
            if self.is_context(index) {
                arguments.push(context_argument());
            } else if index < variadic_at {
                arguments.push(BoundArgument::new(ArgSlot::Positional, self.value_of(param)?));
            } else if index == variadic_at {
                arguments.extend(self.variadic_items());
            } else {
                let slot = ArgSlot::Keyword(normalize_port_name(&param.raw_name));
                arguments.push(BoundArgument::new(slot, self.value_of(param)?));
            }
        }
        Ok(arguments)
    }

    /// Inputs on index-named pins, in numeric order.
    fn variadic_items(&self) -> Vec<BoundArgument> {
        let mut items: Vec<(usize, &ArgValue)> = self
            .inputs
            .iter()
            .filter_map(|(pin, value)| pin.parse::<usize>().ok().map(|index| (index, value)))
            .collect();
        items.sort_by_key(|(index, _)| *index);
        items
            .into_iter()
            .map(|(index, value)| BoundArgument::new(ArgSlot::VariadicItem(index), value.clone()))
            .collect()
    }
}

fn context_argument() -> BoundArgument {
    BoundArgument::new(ArgSlot::Context, ArgValue::Reference(CONTEXT_EXPRESSION.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> ArgValue {
        ArgValue::Reference(name.to_string())
    }

    fn inputs(pairs: &[(&str, ArgValue)]) -> Vec<(String, ArgValue)> {
        pairs
            .iter()
            .map(|(pin, value)| (pin.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_keyword_binding_with_context() {
        let signature = NodeSignature::new(
            "entity.damage",
            vec![
                {
                    let mut game = ParamDescriptor::keyword("game");
                    game.requires_context_handle = true;
                    game
                },
                ParamDescriptor::keyword("target"),
                ParamDescriptor::keyword("amount").with_default(LiteralValue::Int(10)),
            ],
        );
        let args =
            bind_arguments("n1", &signature, &inputs(&[("target", reference("enemy"))])).unwrap();

        assert_eq!(
            args,
            vec![
                BoundArgument::new(ArgSlot::Context, reference("self.game")),
                BoundArgument::new(ArgSlot::Keyword("target".to_string()), reference("enemy")),
                BoundArgument::new(
                    ArgSlot::Keyword("amount".to_string()),
                    ArgValue::Literal(LiteralValue::Int(10)),
                ),
            ]
        );
    }

    #[test]
    fn test_positional_fallback_for_illegal_name() {
        let signature = NodeSignature::new(
            "math.f",
            vec![ParamDescriptor::keyword("x"), ParamDescriptor::keyword("a(b)")],
        );
        let args = bind_arguments(
            "n1",
            &signature,
            &inputs(&[("a(b)", reference("v")), ("x", reference("u"))]),
        )
        .unwrap();

        assert!(args.iter().all(|arg| arg.slot == ArgSlot::Positional));
        assert_eq!(args[0].value, reference("u"));
        assert_eq!(args[1].value, reference("v"));
    }

    #[test]
    fn test_positional_only_param_forces_positional() {
        let signature = NodeSignature::new(
            "math.f",
            vec![ParamDescriptor::positional("x"), ParamDescriptor::keyword("y")],
        );
        let args = bind_arguments(
            "n1",
            &signature,
            &inputs(&[("x", reference("u")), ("y", reference("v"))]),
        )
        .unwrap();
        assert!(args.iter().all(|arg| arg.slot == ArgSlot::Positional));
    }

    #[test]
    fn test_variadic_layout() {
        let signature = NodeSignature::new(
            "list.make",
            vec![
                ParamDescriptor::keyword("first"),
                ParamDescriptor::variadic("items"),
                ParamDescriptor::keyword("sep").with_default(LiteralValue::str(",")),
            ],
        );
        let args = bind_arguments(
            "n1",
            &signature,
            &inputs(&[
                ("10", reference("c")),
                ("first", reference("f")),
                ("2", reference("b")),
                ("0", reference("a")),
            ]),
        )
        .unwrap();

        let slots: Vec<_> = args.iter().map(|arg| arg.slot.clone()).collect();
        assert_eq!(
            slots,
            vec![
                ArgSlot::Positional,
                ArgSlot::VariadicItem(0),
                ArgSlot::VariadicItem(2),
                ArgSlot::VariadicItem(10),
                ArgSlot::Keyword("sep".to_string()),
            ]
        );
        assert_eq!(args[3].value, reference("c"));
    }

    #[test]
    fn test_variadic_rejects_illegal_keyword_name() {
        let signature = NodeSignature::new(
            "math.f",
            vec![ParamDescriptor::keyword("a(b)"), ParamDescriptor::variadic("rest")],
        );
        assert_eq!(
            bind_arguments("n1", &signature, &inputs(&[("a(b)", reference("v"))])),
            Err(CodegenError::VariadicPositionalFallbackDisallowed {
                node_id: "n1".to_string(),
                pin: "a(b)".to_string(),
            })
        );
    }

    #[test]
    fn test_unbound_required_pin() {
        let signature = NodeSignature::new("math.f", vec![ParamDescriptor::keyword("x")]);
        assert_eq!(
            bind_arguments("n1", &signature, &[]),
            Err(CodegenError::UnboundRequiredPin {
                node_id: "n1".to_string(),
                pin: "x".to_string(),
            })
        );
    }

    #[test]
    fn test_undeclared_pin() {
        let signature = NodeSignature::new("math.f", vec![ParamDescriptor::keyword("x")]);
        let result = bind_arguments(
            "n1",
            &signature,
            &inputs(&[("x", reference("u")), ("0", reference("v"))]),
        );
        assert!(matches!(result, Err(CodegenError::UndeclaredPin { pin, .. }) if pin == "0"));
    }

    #[test]
    fn test_context_binding_is_never_consulted() {
        let mut game = ParamDescriptor::keyword("game");
        game.requires_context_handle = true;
        let signature = NodeSignature::new("world.tick", vec![game]);
        let args =
            bind_arguments("n1", &signature, &inputs(&[("game", reference("other"))])).unwrap();
        assert_eq!(args, vec![context_argument()]);
    }
}

//! # Node Library
//!
//! Read-only view of the node-library collaborator: which node types exist,
//! what their callables look like, and under which name the runtime exports
//! them. The generator never loads callables itself; it only asks for
//! signatures through [`NodeLibrary`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, Result};
use crate::graph::{LiteralValue, NodeInstance};

use super::identifiers::normalize_port_name;

/// Conventional name of the execution-context parameter.
pub const CONTEXT_PARAM_NAME: &str = "game";

/// How a declared parameter may be passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Positional-only
    Positional,
    /// Positional-or-keyword
    Keyword,
    /// `*args`
    Variadic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub raw_name: String,
    pub binding_kind: BindingKind,
    #[serde(default)]
    pub requires_context_handle: bool,
    /// A parameter without a default is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<LiteralValue>,
}

impl ParamDescriptor {
    pub fn new(raw_name: impl Into<String>, binding_kind: BindingKind) -> Self {
        Self {
            raw_name: raw_name.into(),
            binding_kind,
            requires_context_handle: false,
            default: None,
        }
    }

    pub fn keyword(raw_name: impl Into<String>) -> Self {
        Self::new(raw_name, BindingKind::Keyword)
    }

    pub fn positional(raw_name: impl Into<String>) -> Self {
        Self::new(raw_name, BindingKind::Positional)
    }

    pub fn variadic(raw_name: impl Into<String>) -> Self {
        Self::new(raw_name, BindingKind::Variadic)
    }

    pub fn with_default(mut self, value: LiteralValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && self.binding_kind != BindingKind::Variadic
    }

    pub fn is_variadic(&self) -> bool {
        self.binding_kind == BindingKind::Variadic
    }
}

/// Signature of one node type as consumed by the binder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSignature {
    pub type_id: String,
    /// Export-time alias; the display name is used when absent.
    #[serde(default, rename = "alias", skip_serializing_if = "Option::is_none")]
    pub call_identifier: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
    /// Declared type per data output pin, used for result annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_types: BTreeMap<String, String>,
}

impl NodeSignature {
    pub fn new(type_id: impl Into<String>, params: Vec<ParamDescriptor>) -> Self {
        Self {
            type_id: type_id.into(),
            call_identifier: None,
            params,
            output_types: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.call_identifier = Some(alias.into());
        self
    }

    pub fn with_output_type(
        mut self,
        pin: impl Into<String>,
        port_type: impl Into<String>,
    ) -> Self {
        self.output_types.insert(pin.into(), port_type.into());
        self
    }

    /// Declared type of an output pin, if the library names one.
    pub fn output_type(&self, pin: &str) -> Option<&str> {
        let pin = normalize_port_name(pin);
        self.output_types
            .iter()
            .find(|(name, _)| normalize_port_name(name) == pin)
            .map(|(_, port_type)| port_type.trim())
            .filter(|port_type| !port_type.is_empty())
    }

    pub fn is_variadic(&self) -> bool {
        self.params.iter().any(ParamDescriptor::is_variadic)
    }

    pub fn requires_context_handle(&self) -> bool {
        self.params
            .first()
            .map(|param| param.requires_context_handle)
            .unwrap_or(false)
    }
}

/// Queryable interface of the node-library collaborator.
///
/// Lookups must be side-effect free; a library shared between concurrent
/// generation passes is only ever read.
pub trait NodeLibrary: Send + Sync {
    fn signature_of(&self, type_id: &str) -> Option<Vec<ParamDescriptor>>;

    fn call_identifier_alias(&self, type_id: &str) -> Option<String>;

    /// Declared output pin types of `type_id`. Libraries without type
    /// information report none.
    fn output_types(&self, _type_id: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

#[derive(Debug, Default, Deserialize)]
struct LibraryManifest {
    #[serde(default)]
    nodes: Vec<NodeSignature>,
}

/// In-memory node library, typically loaded from a JSON manifest:
///
/// ```json
/// { "nodes": [ { "type_id": "math.add", "alias": "add", "params": [
///     { "raw_name": "a", "binding_kind": "keyword" } ] } ] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticNodeLibrary {
    signatures: BTreeMap<String, NodeSignature>,
}

impl StaticNodeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(manifest: &str) -> serde_json::Result<Self> {
        let manifest: LibraryManifest = serde_json::from_str(manifest)?;
        let mut library = Self::new();
        for signature in manifest.nodes {
            library.register(signature);
        }
        Ok(library)
    }

    /// Register a node type, replacing any previous signature with the same id.
    pub fn register(&mut self, signature: NodeSignature) {
        self.signatures.insert(signature.type_id.clone(), signature);
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl NodeLibrary for StaticNodeLibrary {
    fn signature_of(&self, type_id: &str) -> Option<Vec<ParamDescriptor>> {
        self.signatures.get(type_id).map(|signature| signature.params.clone())
    }

    fn call_identifier_alias(&self, type_id: &str) -> Option<String> {
        self.signatures
            .get(type_id)
            .and_then(|signature| signature.call_identifier.clone())
    }

    fn output_types(&self, type_id: &str) -> BTreeMap<String, String> {
        self.signatures
            .get(type_id)
            .map(|signature| signature.output_types.clone())
            .unwrap_or_default()
    }
}

/// Per-pass signature cache in front of a [`NodeLibrary`].
pub struct SignatureInspector<'a> {
    library: &'a dyn NodeLibrary,
    cache: HashMap<String, NodeSignature>,
}

impl<'a> SignatureInspector<'a> {
    pub fn new(library: &'a dyn NodeLibrary) -> Self {
        Self {
            library,
            cache: HashMap::new(),
        }
    }

    /// Ordered parameters of `type_id` with `requires_context_handle` recomputed.
    pub fn signature_of(&mut self, type_id: &str) -> Result<NodeSignature> {
        if let Some(signature) = self.cache.get(type_id) {
            return Ok(signature.clone());
        }

        let params = self
            .library
            .signature_of(type_id)
            .ok_or_else(|| CodegenError::UnknownNodeType {
                type_id: type_id.to_string(),
            })?;

        let params = params
            .into_iter()
            .enumerate()
            .map(|(index, mut param)| {
                param.requires_context_handle =
                    index == 0 && normalize_port_name(&param.raw_name) == CONTEXT_PARAM_NAME;
                param
            })
            .collect();

        let signature = NodeSignature {
            type_id: type_id.to_string(),
            call_identifier: self.library.call_identifier_alias(type_id),
            params,
            output_types: self.library.output_types(type_id),
        };
        tracing::trace!(type_id, params = signature.params.len(), "[SIG] Resolved node signature");
        self.cache.insert(type_id.to_string(), signature.clone());
        Ok(signature)
    }

    /// Text the call identifier of `node` is derived from.
    pub fn call_text(&mut self, node: &NodeInstance) -> Result<String> {
        let signature = self.signature_of(&node.descriptor.type_id)?;
        Ok(signature
            .call_identifier
            .unwrap_or_else(|| node.descriptor.display_name.clone()))
    }
}

//! Composite node configuration: a sub-graph plus the pins it exposes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{GraphIr, PortRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDirection {
    Input,
    Output,
}

/// A pin on the composite's outer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPin {
    pub name: String,
    pub direction: PinDirection,
    /// Position among the pins of the same direction.
    pub index: u32,
    #[serde(default)]
    pub pin_type: String,
    #[serde(default)]
    pub description: String,
    /// Internal ports this pin feeds (input) or reads from (output).
    #[serde(default)]
    pub mapped_ports: Vec<PortRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub composite_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub graph: GraphIr,
    #[serde(default)]
    pub pins: Vec<ExternalPin>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CompositeConfig {
    /// Pins of one direction ordered by their declared index.
    pub fn pins_by_index(&self, direction: PinDirection) -> Vec<&ExternalPin> {
        let mut pins: Vec<_> = self
            .pins
            .iter()
            .filter(|pin| pin.direction == direction)
            .collect();
        pins.sort_by_key(|pin| pin.index);
        pins
    }

    /// Semantic equality: both sides describe the same canonical JSON value.
    ///
    /// Textual equality of two payloads is never assumed; whitespace and key
    /// order may differ between encoders.
    pub fn is_equivalent(&self, other: &CompositeConfig) -> bool {
        match (serde_json::to_value(self), serde_json::to_value(other)) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }
}

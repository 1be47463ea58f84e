//! Port definitions for node inputs and outputs.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The type of data a port accepts or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortType {
    /// Numeric value (intensities, rates, positions)
    Number,
    /// Boolean signal (triggers, gates)
    Boolean,
    /// Free text
    String,
    /// Reference to a stored asset of unspecified media kind
    Asset,
    /// RGB color
    Color,
    /// Audio asset reference
    Audio,
    /// Image asset reference
    Image,
    /// Video asset reference
    Video,
    /// Scene identifier
    Scene,
    /// Effect identifier
    Effect,
    /// Client device identifier
    Client,
    /// Outbound control command payload
    Command,
    /// Fuzzy truth value in `0.0..=1.0`
    Fuzzy,
    /// Ordered list of values
    Array,
    /// Any type (for generic nodes)
    Any,
}

impl PortType {
    /// `any` is compatible with every type; all other pairs must match exactly.
    pub fn is_compatible_with(self, other: PortType) -> bool {
        self == PortType::Any || other == PortType::Any || self == other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::Number => "number",
            PortType::Boolean => "boolean",
            PortType::String => "string",
            PortType::Asset => "asset",
            PortType::Color => "color",
            PortType::Audio => "audio",
            PortType::Image => "image",
            PortType::Video => "video",
            PortType::Scene => "scene",
            PortType::Effect => "effect",
            PortType::Client => "client",
            PortType::Command => "command",
            PortType::Fuzzy => "fuzzy",
            PortType::Array => "array",
            PortType::Any => "any",
        }
    }

    pub fn all() -> &'static [PortType] {
        &[
            PortType::Number,
            PortType::Boolean,
            PortType::String,
            PortType::Asset,
            PortType::Color,
            PortType::Audio,
            PortType::Image,
            PortType::Video,
            PortType::Scene,
            PortType::Effect,
            PortType::Client,
            PortType::Command,
            PortType::Fuzzy,
            PortType::Array,
            PortType::Any,
        ]
    }
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a port takes part in the compute graph or only receives side-effect deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortKind {
    /// Participates in the acyclic compute graph
    #[default]
    Data,
    /// Delivered after the data pass; never a dependency source
    Sink,
}

/// Definition of a port on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Port id, unique among the node's inputs (or among its outputs)
    pub id: String,
    /// Port label (displayed in editor)
    pub label: String,
    /// Data type carried by the port
    #[serde(rename = "type")]
    pub port_type: PortType,
    /// Value used when nothing is connected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub kind: PortKind,
}

impl Port {
    pub fn data(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            port_type,
            default_value: None,
            kind: PortKind::Data,
        }
    }

    pub fn sink(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            port_type,
            default_value: None,
            kind: PortKind::Sink,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn is_sink(&self) -> bool {
        self.kind == PortKind::Sink
    }

    /// The declared default, or `Value::None` when the port has none.
    pub fn default_or_none(&self) -> Value {
        self.default_value.clone().unwrap_or_default()
    }
}

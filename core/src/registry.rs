//! Node definitions and the registry that maps node-type ids to them.
//!
//! A definition is plain data (ports, config schema) plus function values. Compute
//! functions are `fn` pointers, so they cannot capture state; anything they need
//! arrives through their arguments.

use crate::config::{ConfigField, ConfigValues};
use crate::dispatch::{Dispatch, TargetSelector};
use crate::error::SinkError;
use crate::interpreter::TickContext;
use crate::ports::Port;
use crate::pulses::FinishPulses;
use crate::value::{PortValues, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Produces a node's outputs from its inputs, validated config and tick context.
pub type ComputeFn = fn(&PortValues, &ConfigValues, &NodeContext<'_>) -> PortValues;

/// Performs a node's side effect after the data pass.
pub type SinkFn = fn(&PortValues, &ConfigValues, &mut SinkContext<'_>) -> Result<(), SinkError>;

/// What a compute function may see besides its inputs and config.
pub struct NodeContext<'a> {
    pub tick: &'a TickContext,
    pub node_id: &'a str,
    pulses: &'a FinishPulses,
}

impl<'a> NodeContext<'a> {
    pub fn new(tick: &'a TickContext, node_id: &'a str, pulses: &'a FinishPulses) -> Self {
        Self {
            tick,
            node_id,
            pulses,
        }
    }

    pub fn time(&self) -> f64 {
        self.tick.time
    }

    pub fn delta_time(&self) -> f64 {
        self.tick.delta_time
    }

    /// Take this node's media finish pulse, if one is pending.
    pub fn consume_finish_pulse(&self) -> bool {
        self.pulses.consume_pulse(self.node_id)
    }
}

/// What a sink handler may see, plus the outbox it writes side effects to.
pub struct SinkContext<'a> {
    pub tick: &'a TickContext,
    pub node_id: &'a str,
    outbox: &'a mut Vec<Dispatch>,
}

impl<'a> SinkContext<'a> {
    pub fn new(tick: &'a TickContext, node_id: &'a str, outbox: &'a mut Vec<Dispatch>) -> Self {
        Self {
            tick,
            node_id,
            outbox,
        }
    }

    pub fn emit(&mut self, target: TargetSelector, payload: Value) {
        self.outbox.push(Dispatch {
            node_id: self.node_id.to_string(),
            target,
            payload,
        });
    }
}

/// Everything the engine needs to know about one kind of node.
#[derive(Clone)]
pub struct NodeDefinition {
    /// Unique type id, e.g. `math.binary`
    pub node_type: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub config_schema: Vec<ConfigField>,
    pub compute: ComputeFn,
    pub on_sink: Option<SinkFn>,
    /// Allow connections from output ids this definition does not declare.
    /// Such ports carry `any`.
    pub exposes_undeclared_outputs: bool,
}

impl NodeDefinition {
    pub fn new(
        node_type: impl Into<String>,
        label: impl Into<String>,
        category: impl Into<String>,
        compute: ComputeFn,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            category: category.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_schema: Vec::new(),
            compute,
            on_sink: None,
            exposes_undeclared_outputs: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn config(mut self, field: ConfigField) -> Self {
        self.config_schema.push(field);
        self
    }

    pub fn sink_handler(mut self, handler: SinkFn) -> Self {
        self.on_sink = Some(handler);
        self
    }

    pub fn with_undeclared_outputs(mut self) -> Self {
        self.exposes_undeclared_outputs = true;
        self
    }

    pub fn input_port(&self, id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_port(&self, id: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == id)
    }

    pub fn has_sink_inputs(&self) -> bool {
        self.inputs.iter().any(Port::is_sink)
    }

    /// Declared output defaults, used to seed frozen nodes that never computed.
    pub fn default_outputs(&self) -> PortValues {
        self.outputs
            .iter()
            .map(|p| (p.id.clone(), p.default_or_none()))
            .collect()
    }

    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            node_type: self.node_type.clone(),
            label: self.label.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            config_schema: self.config_schema.clone(),
            has_sink_handler: self.on_sink.is_some(),
        }
    }
}

impl std::fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("node_type", &self.node_type)
            .field("category", &self.category)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("on_sink", &self.on_sink.is_some())
            .finish()
    }
}

/// Serializable view of a definition for the editor palette.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub config_schema: Vec<ConfigField>,
    pub has_sink_handler: bool,
}

/// Definitions sharing a category, in registration order.
#[derive(Debug, Clone)]
pub struct CategoryGroup {
    pub category: String,
    pub definitions: Vec<Arc<NodeDefinition>>,
}

/// Maps node-type ids to definitions.
///
/// Registering an id that already exists replaces the definition in place; no
/// consistency checks run at registration time.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    definitions: Vec<Arc<NodeDefinition>>,
    index: HashMap<String, usize>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in node library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtin_nodes(&mut registry);
        registry
    }

    pub fn register(&mut self, definition: NodeDefinition) {
        let definition = Arc::new(definition);
        match self.index.get(&definition.node_type) {
            Some(&slot) => {
                tracing::debug!(node_type = %definition.node_type, "replacing node definition");
                self.definitions[slot] = definition;
            }
            None => {
                self.index
                    .insert(definition.node_type.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<NodeDefinition>> {
        self.index
            .get(node_type)
            .map(|&slot| Arc::clone(&self.definitions[slot]))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.index.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn list(&self) -> &[Arc<NodeDefinition>] {
        &self.definitions
    }

    /// Categories in first-registration order, each with its definitions in
    /// registration order.
    pub fn list_by_category(&self) -> Vec<CategoryGroup> {
        let mut groups: Vec<CategoryGroup> = Vec::new();
        for definition in &self.definitions {
            match groups.iter_mut().find(|g| g.category == definition.category) {
                Some(group) => group.definitions.push(Arc::clone(definition)),
                None => groups.push(CategoryGroup {
                    category: definition.category.clone(),
                    definitions: vec![Arc::clone(definition)],
                }),
            }
        }
        groups
    }

    pub fn catalog(&self) -> Vec<NodeDescriptor> {
        self.definitions.iter().map(|d| d.descriptor()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortType;

    fn passthrough(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
        inputs.clone()
    }

    fn constant(_: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
        PortValues::from([("out".to_string(), Value::Number(1.0))])
    }

    fn def(node_type: &str, category: &str) -> NodeDefinition {
        NodeDefinition::new(node_type, node_type, category, passthrough)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = NodeRegistry::new();
        registry.register(def("a", "Math"));
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_registration_wins_in_place() {
        let mut registry = NodeRegistry::new();
        registry.register(def("a", "Math"));
        registry.register(def("b", "Math"));
        registry.register(NodeDefinition::new("a", "Second A", "Logic", constant));

        let types: Vec<_> = registry.list().iter().map(|d| d.node_type.as_str()).collect();
        assert_eq!(types, vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().label, "Second A");
        assert_eq!(registry.get("a").unwrap().category, "Logic");
    }

    #[test]
    fn test_list_by_category_preserves_order() {
        let mut registry = NodeRegistry::new();
        registry.register(def("m1", "Math"));
        registry.register(def("l1", "Logic"));
        registry.register(def("m2", "Math"));
        registry.register(def("l2", "Logic"));

        let groups = registry.list_by_category();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, "Math");
        let math: Vec<_> = groups[0].definitions.iter().map(|d| d.node_type.as_str()).collect();
        assert_eq!(math, vec!["m1", "m2"]);
        let logic: Vec<_> = groups[1].definitions.iter().map(|d| d.node_type.as_str()).collect();
        assert_eq!(logic, vec!["l1", "l2"]);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_registration() {
        let mut registry = NodeRegistry::new();
        registry.register(def("a", "Math"));
        let held = registry.get("a").unwrap();
        registry.register(NodeDefinition::new("a", "Replaced", "Math", constant));
        assert_eq!(held.label, "a");
    }

    #[test]
    fn test_descriptor_omits_functions() {
        let definition = def("gate", "Group")
            .input(Port::data("active", "Active", PortType::Boolean).with_default(true))
            .sink_handler(|_, _, _| Ok(()));
        let json = serde_json::to_value(definition.descriptor()).unwrap();
        assert_eq!(json["type"], "gate");
        assert_eq!(json["hasSinkHandler"], true);
        assert_eq!(json["inputs"][0]["id"], "active");
    }
}

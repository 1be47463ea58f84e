//! Graph structure that holds node instances and connections.
//!
//! The graph is plain, JSON-compatible data. It is deliberately tolerant: dangling
//! connections and unknown node types can be stored and are only rejected when a
//! tick is planned.

use crate::config::RawConfig;
use crate::error::{GraphError, StructuralError};
use crate::interpreter::EvaluationPlan;
use crate::registry::NodeRegistry;
use crate::value::PortValues;
use serde::{Deserialize, Serialize};

/// A node placed in a graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    /// Unique identifier within the graph
    pub id: String,
    /// Node-type id resolved through the registry
    #[serde(rename = "type")]
    pub node_type: String,
    /// Raw config; validated lazily at evaluation time
    #[serde(default)]
    pub config: RawConfig,
    /// Inputs seen by the last compute
    #[serde(default)]
    pub input_values: PortValues,
    /// Outputs produced by the last compute
    #[serde(default)]
    pub output_values: PortValues,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// A connection from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_node_id: String,
    pub source_port_id: String,
    pub target_node_id: String,
    pub target_port_id: String,
}

impl Connection {
    pub fn new(
        source_node_id: impl Into<String>,
        source_port_id: impl Into<String>,
        target_node_id: impl Into<String>,
        target_port_id: impl Into<String>,
    ) -> Self {
        let source_node_id = source_node_id.into();
        let source_port_id = source_port_id.into();
        let target_node_id = target_node_id.into();
        let target_port_id = target_port_id.into();
        Self {
            id: format!(
                "{}:{}->{}:{}",
                source_node_id, source_port_id, target_node_id, target_port_id
            ),
            source_node_id,
            source_port_id,
            target_node_id,
            target_port_id,
        }
    }
}

/// A complete show graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphState {
    /// All nodes in the graph
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    /// Connections between nodes
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl GraphState {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph. Ids must be non-empty and unique.
    pub fn add_node(&mut self, node: NodeInstance) -> Result<(), GraphError> {
        if node.id.trim().is_empty() {
            return Err(GraphError::EmptyNodeId);
        }
        if self.get_node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and all its connections.
    ///
    /// Group membership never blocks this; stale group references are ignored later.
    pub fn remove_node(&mut self, node_id: &str) -> Option<NodeInstance> {
        let position = self.nodes.iter().position(|n| n.id == node_id)?;
        let removed = self.nodes.remove(position);
        self.connections
            .retain(|c| c.source_node_id != node_id && c.target_node_id != node_id);
        Some(removed)
    }

    /// Connect two nodes, replacing any existing connection into the same input.
    ///
    /// Only node existence is checked here; port ids and types are checked when a
    /// tick is planned, because the registry may change in between.
    pub fn connect(
        &mut self,
        source_node_id: &str,
        source_port_id: &str,
        target_node_id: &str,
        target_port_id: &str,
    ) -> Result<&Connection, GraphError> {
        for node_id in [source_node_id, target_node_id] {
            if self.get_node(node_id).is_none() {
                return Err(GraphError::NodeNotFound(node_id.to_string()));
            }
        }

        // Inputs can only have one connection
        self.disconnect(target_node_id, target_port_id);

        self.connections.push(Connection::new(
            source_node_id,
            source_port_id,
            target_node_id,
            target_port_id,
        ));
        Ok(&self.connections[self.connections.len() - 1])
    }

    /// Remove the connection feeding an input, if any.
    pub fn disconnect(&mut self, target_node_id: &str, target_port_id: &str) {
        self.connections.retain(|c| {
            !(c.target_node_id == target_node_id && c.target_port_id == target_port_id)
        });
    }

    pub fn get_node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut NodeInstance> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Get all connections into a node's inputs
    pub fn incoming(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.target_node_id == node_id)
            .collect()
    }

    /// Get all connections out of a node's outputs
    pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.source_node_id == node_id)
            .collect()
    }

    /// Structural problems a tick would report right now, without evaluating.
    pub fn validate(&self, registry: &NodeRegistry) -> Vec<StructuralError> {
        EvaluationPlan::build(self, registry).errors
    }

    /// Drop every cached input/output value.
    pub fn clear_caches(&mut self) {
        for node in &mut self.nodes {
            node.input_values.clear();
            node.output_values.clear();
        }
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> GraphState {
        let mut graph = GraphState::new();
        graph.add_node(NodeInstance::new("a", "input.number")).unwrap();
        graph.add_node(NodeInstance::new("b", "math.binary")).unwrap();
        graph.add_node(NodeInstance::new("c", "math.binary")).unwrap();
        graph
    }

    #[test]
    fn test_add_node_rejects_duplicates_and_blank_ids() {
        let mut graph = graph();
        assert_eq!(
            graph.add_node(NodeInstance::new("a", "x")),
            Err(GraphError::DuplicateNode("a".to_string()))
        );
        assert_eq!(
            graph.add_node(NodeInstance::new("  ", "x")),
            Err(GraphError::EmptyNodeId)
        );
    }

    #[test]
    fn test_connect_replaces_existing_input() {
        let mut graph = graph();
        graph.connect("a", "value", "c", "a").unwrap();
        graph.connect("b", "result", "c", "a").unwrap();

        let incoming = graph.incoming("c");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_node_id, "b");
        assert_eq!(incoming[0].id, "b:result->c:a");
    }

    #[test]
    fn test_connect_requires_nodes() {
        let mut graph = graph();
        assert_eq!(
            graph.connect("a", "value", "zz", "a").unwrap_err(),
            GraphError::NodeNotFound("zz".to_string())
        );
    }

    #[test]
    fn test_remove_node_drops_connections() {
        let mut graph = graph();
        graph.connect("a", "value", "b", "a").unwrap();
        graph.connect("b", "result", "c", "a").unwrap();

        let removed = graph.remove_node("b").unwrap();
        assert_eq!(removed.id, "b");
        assert!(graph.connections.is_empty());
        assert!(graph.remove_node("b").is_none());
    }

    #[test]
    fn test_json_shape_matches_editor() {
        let raw = json!({
            "nodes": [
                {"id": "n1", "type": "input.number", "config": {"value": 3}},
                {"id": "n2", "type": "math.binary"}
            ],
            "connections": [
                {"id": "e1", "sourceNodeId": "n1", "sourcePortId": "value",
                 "targetNodeId": "n2", "targetPortId": "a"}
            ]
        });
        let graph: GraphState = serde_json::from_value(raw).unwrap();
        assert_eq!(graph.nodes[0].config["value"], json!(3));
        assert!(graph.nodes[1].output_values.is_empty());
        assert_eq!(graph.outgoing("n1").len(), 1);

        let back = serde_json::to_value(&graph).unwrap();
        assert_eq!(back["nodes"][0]["type"], "input.number");
        assert!(back["nodes"][0]["outputValues"].is_object());
    }

    #[test]
    fn test_ron_persistence() {
        let mut graph = graph();
        graph.get_node_mut("a").unwrap().config.insert("label".into(), json!("house"));
        graph.connect("a", "value", "b", "a").unwrap();

        let ron = graph.to_ron().unwrap();
        let parsed = GraphState::from_ron(&ron).unwrap();
        assert_eq!(parsed.nodes.len(), 3);
        assert_eq!(parsed.connections, graph.connections);
        assert_eq!(parsed.nodes[0].config["label"], json!("house"));
    }
}

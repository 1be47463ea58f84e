//! Error types reported by graph editing and by the evaluation engine.

use crate::ports::PortType;
use serde::Serialize;
use thiserror::Error;

/// Errors from editing operations on a [`GraphState`](crate::GraphState).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Node id already in use: {0}")]
    DuplicateNode(String),
    #[error("Node id must not be empty")]
    EmptyNodeId,
}

/// Problems with the shape of a graph, found while planning a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StructuralError {
    #[error("Cycle detected among data ports of nodes [{}]", .node_ids.join(", "))]
    Cycle { node_ids: Vec<String> },

    #[error("Connection {connection_id} references missing node {node_id}")]
    MissingNode {
        connection_id: String,
        node_id: String,
    },

    #[error("Connection {connection_id} references missing port {node_id}.{port_id}")]
    MissingPort {
        connection_id: String,
        node_id: String,
        port_id: String,
    },

    #[error("Connection {connection_id} starts at sink output {node_id}.{port_id}")]
    SinkSource {
        connection_id: String,
        node_id: String,
        port_id: String,
    },

    #[error("Connection {connection_id} joins {from_type} to {to_type}")]
    TypeMismatch {
        connection_id: String,
        from_type: PortType,
        to_type: PortType,
    },

    #[error("Node {node_id} has unknown type {node_type}")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Node id {node_id} appears more than once")]
    DuplicateNodeId { node_id: String },

    #[error("Evaluation plan was built for {planned} nodes but the graph now has {found}")]
    StalePlan { planned: usize, found: usize },
}

/// Returned by sink handlers when a side effect cannot be carried out.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A recoverable problem recorded in a tick report.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "category", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("Node {node_id}: config field {key}: {message}")]
    ConfigValidation {
        node_id: String,
        key: String,
        message: String,
    },

    #[error("Node {node_id}: compute failed: {message}")]
    Compute { node_id: String, message: String },

    #[error("Node {node_id}: sink handler failed: {message}")]
    SinkHandler { node_id: String, message: String },
}

impl EngineError {
    /// Node ids this entry is about.
    pub fn node_ids(&self) -> Vec<&str> {
        match self {
            EngineError::Structural(err) => match err {
                StructuralError::Cycle { node_ids } => {
                    node_ids.iter().map(String::as_str).collect()
                }
                StructuralError::MissingNode { node_id, .. }
                | StructuralError::MissingPort { node_id, .. }
                | StructuralError::SinkSource { node_id, .. }
                | StructuralError::UnknownNodeType { node_id, .. }
                | StructuralError::DuplicateNodeId { node_id } => vec![node_id.as_str()],
                StructuralError::TypeMismatch { .. } | StructuralError::StalePlan { .. } => {
                    Vec::new()
                }
            },
            EngineError::ConfigValidation { node_id, .. }
            | EngineError::Compute { node_id, .. }
            | EngineError::SinkHandler { node_id, .. } => vec![node_id.as_str()],
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, EngineError::Structural(_))
    }
}

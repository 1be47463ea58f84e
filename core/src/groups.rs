//! Node groups: nested clusters of node ids.
//!
//! Group lists arrive from persisted shows, partial editor updates and legacy data, so
//! they may repeat ids or carry numbers where strings belong. [`normalize_group_list`]
//! turns any such list into one that can be trusted: unique non-empty ids in first-seen
//! order, each with unique node ids in first-seen order.

use crate::coerce;
use crate::graph::GraphState;
use crate::nodes::{GATE_ACTIVE_OUTPUT, GATE_NODE_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A cluster of node ids. Groups reference nodes; they never own them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub id: String,
    /// `None` for root groups
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub minimized: bool,
    /// Derived from contained gate nodes; absent when the group has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_active: Option<bool>,
}

impl NodeGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|id| id == node_id)
    }

    /// Add a node id unless it is empty or already present.
    pub fn add_node_id(&mut self, node_id: &str) -> bool {
        let node_id = node_id.trim();
        if node_id.is_empty() || self.contains(node_id) {
            return false;
        }
        self.node_ids.push(node_id.to_string());
        true
    }
}

/// Something normalization had to repair. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupIssue {
    #[error("group record {index} is not an object")]
    NotAnObject { index: usize },

    #[error("group record {index} has no usable id")]
    EmptyId { index: usize },

    #[error("group {group_id}: dropped node id entry {entry} of record {index}")]
    DroppedNodeId {
        index: usize,
        group_id: String,
        entry: usize,
    },

    #[error("group {group_id}: record {index} merged into an earlier record")]
    MergedDuplicate { index: usize, group_id: String },
}

/// Normalized groups plus what was repaired along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedGroups {
    pub groups: Vec<NodeGroup>,
    pub issues: Vec<GroupIssue>,
}

/// Normalize an arbitrary list of group-like records.
pub fn normalize_group_list(records: &[Json]) -> Vec<NodeGroup> {
    normalize_group_list_with_report(records).groups
}

/// Normalize, keeping a record of every repair.
///
/// - ids are coerced to strings and trimmed; records with an empty id are dropped
/// - `parentId` survives only as a non-empty string, anything else means root
/// - node ids are coerced, blanks dropped, duplicates removed in first-seen order
/// - the first record for an id fixes its scalar fields; later ones add node ids and
///   may fill `runtimeActive` if it is still unset
pub fn normalize_group_list_with_report(records: &[Json]) -> NormalizedGroups {
    let mut out = NormalizedGroups::default();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut seen_node_ids: Vec<HashSet<String>> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let Some(fields) = record.as_object() else {
            out.issues.push(GroupIssue::NotAnObject { index });
            continue;
        };
        let Some(id) = fields.get("id").and_then(coerce::non_empty_id) else {
            out.issues.push(GroupIssue::EmptyId { index });
            continue;
        };

        let mut node_ids = Vec::new();
        if let Some(entries) = fields.get("nodeIds").and_then(Json::as_array) {
            for (entry, raw) in entries.iter().enumerate() {
                match coerce::non_empty_id(raw) {
                    Some(node_id) => node_ids.push(node_id),
                    None => out.issues.push(GroupIssue::DroppedNodeId {
                        index,
                        group_id: id.clone(),
                        entry,
                    }),
                }
            }
        }

        let slot = match slots.get(&id) {
            Some(&slot) => {
                out.issues.push(GroupIssue::MergedDuplicate {
                    index,
                    group_id: id.clone(),
                });
                let group = &mut out.groups[slot];
                if group.runtime_active.is_none() {
                    group.runtime_active = coerce::optional_bool(fields.get("runtimeActive"));
                }
                slot
            }
            None => {
                let slot = out.groups.len();
                slots.insert(id.clone(), slot);
                seen_node_ids.push(HashSet::new());
                out.groups.push(NodeGroup {
                    id,
                    parent_id: coerce::string_reference(fields.get("parentId")),
                    name: coerce::string_or_empty(fields.get("name")),
                    node_ids: Vec::new(),
                    disabled: coerce::flag(fields.get("disabled")),
                    minimized: coerce::flag(fields.get("minimized")),
                    runtime_active: coerce::optional_bool(fields.get("runtimeActive")),
                });
                slot
            }
        };

        let group = &mut out.groups[slot];
        for node_id in node_ids {
            if seen_node_ids[slot].insert(node_id.clone()) {
                group.node_ids.push(node_id);
            }
        }
    }

    if !out.issues.is_empty() {
        tracing::debug!(
            groups = out.groups.len(),
            issues = out.issues.len(),
            "normalized group list"
        );
    }
    out
}

/// Set each group's `runtimeActive` from the gate nodes it contains.
///
/// A group with at least one gate is active when any of its gates last reported
/// `active = true`; a group without gates gets `None`. Ids of missing nodes are
/// skipped.
pub fn derive_runtime_active(groups: &mut [NodeGroup], graph: &GraphState) {
    for group in groups.iter_mut() {
        let mut gates = group
            .node_ids
            .iter()
            .filter_map(|id| graph.get_node(id))
            .filter(|node| node.node_type == GATE_NODE_TYPE)
            .peekable();
        group.runtime_active = if gates.peek().is_none() {
            None
        } else {
            Some(gates.any(|gate| {
                gate.output_values
                    .get(GATE_ACTIVE_OUTPUT)
                    .is_some_and(|value| value.is_truthy())
            }))
        };
    }
}

/// Direct children of `parent_id` (`None` for root groups), in list order.
pub fn child_groups<'a>(groups: &'a [NodeGroup], parent_id: Option<&str>) -> Vec<&'a NodeGroup> {
    groups
        .iter()
        .filter(|g| g.parent_id.as_deref() == parent_id)
        .collect()
}

/// Ancestry of `group_id`, root first and ending with the group itself.
///
/// Stops at a missing parent or at the first repeated id, so malformed parent
/// chains never loop. Empty when `group_id` is unknown.
pub fn group_path<'a>(groups: &'a [NodeGroup], group_id: &str) -> Vec<&'a NodeGroup> {
    let by_id: HashMap<&str, &NodeGroup> = groups.iter().map(|g| (g.id.as_str(), g)).collect();
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut current = by_id.get(group_id).copied();

    while let Some(group) = current {
        if !visited.insert(group.id.as_str()) {
            break;
        }
        path.push(group);
        current = group
            .parent_id
            .as_deref()
            .and_then(|parent| by_id.get(parent).copied());
    }

    path.reverse();
    path
}

/// Whether the group or any ancestor is disabled.
pub fn is_effectively_disabled(groups: &[NodeGroup], group_id: &str) -> bool {
    group_path(groups, group_id).iter().any(|g| g.disabled)
}

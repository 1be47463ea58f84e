//! WebAssembly bindings for the browser editor.
//!
//! The editor previews a single tick locally before pushing a graph to the show
//! runner. Every binding has a JSON string twin so the same path runs natively.

use crate::graph::GraphState;
use crate::groups::{
    derive_runtime_active, normalize_group_list, normalize_group_list_with_report,
    NodeGroup, NormalizedGroups,
};
use crate::interpreter::{execute_tick, TickContext, TickReport};
use crate::pulses::{FinishPulses, ManualClock};
use crate::registry::{NodeDescriptor, NodeRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

/// Input to a preview tick.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub graph: GraphState,
    #[serde(default)]
    pub tick: TickContext,
    /// Node ids whose media finished since the last preview
    #[serde(default)]
    pub finished: Vec<String>,
    /// Raw group records, normalized before use
    #[serde(default)]
    pub groups: Vec<Json>,
}

/// Graph with refreshed caches, the tick report and derived group state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub graph: GraphState,
    pub report: TickReport,
    pub groups: Vec<NodeGroup>,
}

pub fn node_catalog() -> Vec<NodeDescriptor> {
    NodeRegistry::with_builtins().catalog()
}

/// Run one tick against the built-in library.
pub fn preview(request: PreviewRequest) -> PreviewResponse {
    let registry = NodeRegistry::with_builtins();
    // Pulses only need to live for this call; no wall clock in the browser.
    let pulses = FinishPulses::new(Arc::new(ManualClock::new()));
    for node_id in &request.finished {
        pulses.report_finish(node_id);
    }

    let mut graph = request.graph;
    let report = execute_tick(&mut graph, &registry, &request.tick, &pulses);
    let mut groups = normalize_group_list(&request.groups);
    derive_runtime_active(&mut groups, &graph);

    PreviewResponse {
        graph,
        report,
        groups,
    }
}

pub fn list_node_types_json() -> Result<String, serde_json::Error> {
    serde_json::to_string(&node_catalog())
}

pub fn normalize_groups_json(records: &str) -> Result<String, serde_json::Error> {
    let records: Vec<Json> = serde_json::from_str(records)?;
    serde_json::to_string(&normalize_group_list_with_report(&records))
}

pub fn preview_tick_json(request: &str) -> Result<String, serde_json::Error> {
    let request: PreviewRequest = serde_json::from_str(request)?;
    serde_json::to_string(&preview(request))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer)?)
}

#[wasm_bindgen(js_name = listNodeTypes)]
pub fn list_node_types() -> Result<JsValue, JsError> {
    to_js(&node_catalog())
}

#[wasm_bindgen(js_name = normalizeGroups)]
pub fn normalize_groups(records: JsValue) -> Result<JsValue, JsError> {
    let records: Vec<Json> = serde_wasm_bindgen::from_value(records)?;
    let normalized: NormalizedGroups = normalize_group_list_with_report(&records);
    to_js(&normalized)
}

#[wasm_bindgen(js_name = previewTick)]
pub fn preview_tick(request: JsValue) -> Result<JsValue, JsError> {
    let request: PreviewRequest = serde_wasm_bindgen::from_value(request)?;
    to_js(&preview(request))
}

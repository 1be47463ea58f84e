//! Graph interpreter - evaluates a show graph once per tick.
//!
//! A tick runs three phases to completion:
//!
//! 1. **Plan**: resolve every node's definition once (a consistent registry snapshot),
//!    classify connections into data links and sink links, find cycles among data
//!    links, and order the remaining nodes topologically. Ties are broken by node
//!    position in the graph so the order is stable across runs.
//! 2. **Data pass**: in order, gather inputs from upstream output caches (or port
//!    defaults), validate config, run `compute`, store the caches.
//! 3. **Sink pass**: for nodes whose sink inputs are driven by a firing upstream value
//!    this tick, run `on_sink`. Handlers only emit [`Dispatch`] records. Values held
//!    by frozen nodes never fire.
//!
//! Every recoverable problem lands in [`TickReport::errors`]; nothing here panics or
//! returns early on bad graph data.

use crate::config::ConfigValues;
use crate::dispatch::Dispatch;
use crate::error::{EngineError, StructuralError};
use crate::graph::GraphState;
use crate::ports::{PortKind, PortType};
use crate::pulses::FinishPulses;
use crate::registry::{NodeContext, NodeDefinition, NodeRegistry, SinkContext};
use crate::value::PortValues;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Time information for one tick, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickContext {
    pub time: f64,
    pub delta_time: f64,
}

impl TickContext {
    pub fn new(time: f64, delta_time: f64) -> Self {
        Self { time, delta_time }
    }
}

/// The result of executing one tick.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Node ids in the order they were visited by the data pass
    pub order: Vec<String>,
    /// Nodes whose compute ran successfully
    pub evaluated: usize,
    /// Nodes whose outputs were held at their previous values
    pub frozen: Vec<String>,
    /// Sink handlers that ran successfully
    pub delivered: usize,
    pub errors: Vec<EngineError>,
    pub dispatches: Vec<Dispatch>,
}

impl TickReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Where an input port reads from.
#[derive(Debug, Clone, PartialEq)]
struct Link {
    source: usize,
    port_id: String,
}

/// A resolved tick: definitions, links and evaluation order for one graph shape.
///
/// Node positions refer to `graph.nodes` of the graph the plan was built from. Executing
/// against a graph whose node list has changed since evaluates nothing and reports
/// [`StructuralError::StalePlan`].
#[derive(Debug)]
pub struct EvaluationPlan {
    node_ids: Vec<String>,
    definitions: Vec<Option<Arc<NodeDefinition>>>,
    data_links: Vec<BTreeMap<String, Link>>,
    sink_links: Vec<BTreeMap<String, Link>>,
    /// Positions in evaluation order
    pub order: Vec<usize>,
    /// Positions excluded from the order (cycle members, duplicate ids)
    pub excluded: Vec<usize>,
    pub errors: Vec<StructuralError>,
}

impl EvaluationPlan {
    /// Resolve definitions and ordering. Definitions are captured as `Arc`s, so later
    /// registry changes are not observed by this plan.
    pub fn build(graph: &GraphState, registry: &NodeRegistry) -> Self {
        let n = graph.nodes.len();
        let definitions: Vec<Option<Arc<NodeDefinition>>> = graph
            .nodes
            .iter()
            .map(|node| registry.get(&node.node_type))
            .collect();

        let mut errors = Vec::new();
        let mut excluded_flags = vec![false; n];
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(n);

        for (position, node) in graph.nodes.iter().enumerate() {
            if index.contains_key(node.id.as_str()) {
                excluded_flags[position] = true;
                errors.push(StructuralError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
                continue;
            }
            index.insert(node.id.as_str(), position);
            if definitions[position].is_none() {
                errors.push(StructuralError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            }
        }

        let mut data_links = vec![BTreeMap::new(); n];
        let mut sink_links = vec![BTreeMap::new(); n];

        for connection in &graph.connections {
            let Some(&source) = index.get(connection.source_node_id.as_str()) else {
                errors.push(StructuralError::MissingNode {
                    connection_id: connection.id.clone(),
                    node_id: connection.source_node_id.clone(),
                });
                continue;
            };
            let Some(&target) = index.get(connection.target_node_id.as_str()) else {
                errors.push(StructuralError::MissingNode {
                    connection_id: connection.id.clone(),
                    node_id: connection.target_node_id.clone(),
                });
                continue;
            };
            // Unknown target types are already reported and never compute.
            let Some(target_definition) = &definitions[target] else {
                continue;
            };
            let Some(target_port) = target_definition.input_port(&connection.target_port_id)
            else {
                errors.push(StructuralError::MissingPort {
                    connection_id: connection.id.clone(),
                    node_id: connection.target_node_id.clone(),
                    port_id: connection.target_port_id.clone(),
                });
                continue;
            };

            let source_type = match &definitions[source] {
                Some(definition) => match definition.output_port(&connection.source_port_id) {
                    Some(port) if port.is_sink() => {
                        errors.push(StructuralError::SinkSource {
                            connection_id: connection.id.clone(),
                            node_id: connection.source_node_id.clone(),
                            port_id: connection.source_port_id.clone(),
                        });
                        continue;
                    }
                    Some(port) => port.port_type,
                    None if definition.exposes_undeclared_outputs => PortType::Any,
                    None => {
                        errors.push(StructuralError::MissingPort {
                            connection_id: connection.id.clone(),
                            node_id: connection.source_node_id.clone(),
                            port_id: connection.source_port_id.clone(),
                        });
                        continue;
                    }
                },
                // An unknown source still exposes its frozen cache.
                None => PortType::Any,
            };

            if !source_type.is_compatible_with(target_port.port_type) {
                errors.push(StructuralError::TypeMismatch {
                    connection_id: connection.id.clone(),
                    from_type: source_type,
                    to_type: target_port.port_type,
                });
                continue;
            }

            let link = Link {
                source,
                port_id: connection.source_port_id.clone(),
            };
            // Later connections into the same input replace earlier ones.
            match target_port.kind {
                PortKind::Data => data_links[target].insert(target_port.id.clone(), link),
                PortKind::Sink => sink_links[target].insert(target_port.id.clone(), link),
            };
        }

        // Data dependencies only; sink links never constrain ordering.
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (target, links) in data_links.iter().enumerate() {
            for link in links.values() {
                if !successors[link.source].contains(&target) {
                    successors[link.source].push(target);
                }
            }
        }

        for component in cyclic_components(&successors) {
            for &position in &component {
                excluded_flags[position] = true;
            }
            errors.push(StructuralError::Cycle {
                node_ids: component
                    .iter()
                    .map(|&position| graph.nodes[position].id.clone())
                    .collect(),
            });
        }

        let order = topological_order(&successors, &excluded_flags);
        let excluded = (0..n).filter(|&position| excluded_flags[position]).collect();

        Self {
            node_ids: graph.nodes.iter().map(|node| node.id.clone()).collect(),
            definitions,
            data_links,
            sink_links,
            order,
            excluded,
            errors,
        }
    }

    /// Run the data pass and the sink pass against `graph`, updating its caches.
    pub fn execute(
        self,
        graph: &mut GraphState,
        tick: &TickContext,
        pulses: &FinishPulses,
    ) -> TickReport {
        let n = graph.nodes.len();
        if !self.matches(graph) {
            tracing::warn!(planned = self.node_ids.len(), found = n, "stale evaluation plan");
            return TickReport {
                errors: vec![EngineError::Structural(StructuralError::StalePlan {
                    planned: self.node_ids.len(),
                    found: n,
                })],
                ..Default::default()
            };
        }
        let mut report = TickReport {
            order: self
                .order
                .iter()
                .map(|&position| graph.nodes[position].id.clone())
                .collect(),
            errors: self.errors.iter().cloned().map(EngineError::from).collect(),
            ..Default::default()
        };
        let mut frozen = vec![false; n];
        let mut configs: Vec<Option<ConfigValues>> = vec![None; n];

        // Excluded nodes hold their previous outputs, or definition defaults when
        // they have never produced any.
        for &position in &self.excluded {
            frozen[position] = true;
            let node = &mut graph.nodes[position];
            if node.output_values.is_empty() {
                if let Some(definition) = &self.definitions[position] {
                    node.output_values = definition.default_outputs();
                }
            }
        }

        for &position in &self.order {
            let Some(definition) = self.definitions[position].clone() else {
                frozen[position] = true;
                continue;
            };

            let inputs = self.gather_inputs(graph, position, &definition);
            let node_id = graph.nodes[position].id.clone();
            let (config, issues) =
                ConfigValues::resolve(&definition.config_schema, &graph.nodes[position].config);
            for issue in issues {
                report.errors.push(EngineError::ConfigValidation {
                    node_id: node_id.clone(),
                    key: issue.key,
                    message: issue.message,
                });
            }

            let context = NodeContext::new(tick, &node_id, pulses);
            let computed = panic::catch_unwind(AssertUnwindSafe(|| {
                (definition.compute)(&inputs, &config, &context)
            }));
            match computed {
                Ok(outputs) => {
                    let node = &mut graph.nodes[position];
                    node.input_values = inputs;
                    node.output_values = outputs;
                    report.evaluated += 1;
                    configs[position] = Some(config);
                }
                Err(payload) => {
                    frozen[position] = true;
                    report.errors.push(EngineError::Compute {
                        node_id,
                        message: panic_message(payload),
                    });
                }
            }
        }

        for &position in &self.order {
            let (Some(definition), Some(config)) =
                (&self.definitions[position], &configs[position])
            else {
                continue;
            };
            let Some(handler) = definition.on_sink else {
                continue;
            };
            let Some(inputs) = self.gather_sink_inputs(graph, position, definition, &frozen)
            else {
                continue;
            };

            let node_id = graph.nodes[position].id.clone();
            let emitted_before = report.dispatches.len();
            let mut context = SinkContext::new(tick, &node_id, &mut report.dispatches);
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler(&inputs, config, &mut context)));
            let message = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload),
            };
            // A failed delivery contributes nothing.
            report.dispatches.truncate(emitted_before);
            report
                .errors
                .push(EngineError::SinkHandler { node_id, message });
        }

        report.frozen = (0..n)
            .filter(|&position| frozen[position])
            .map(|position| graph.nodes[position].id.clone())
            .collect();

        tracing::trace!(order = ?report.order, "tick order");
        tracing::debug!(
            time = tick.time,
            evaluated = report.evaluated,
            frozen = report.frozen.len(),
            errors = report.errors.len(),
            dispatches = report.dispatches.len(),
            "tick complete"
        );
        report
    }

    /// Whether `graph` still has the node list this plan was built from.
    pub fn matches(&self, graph: &GraphState) -> bool {
        self.node_ids.len() == graph.nodes.len()
            && self
                .node_ids
                .iter()
                .zip(&graph.nodes)
                .all(|(id, node)| *id == node.id)
    }

    fn gather_inputs(
        &self,
        graph: &GraphState,
        position: usize,
        definition: &NodeDefinition,
    ) -> PortValues {
        definition
            .inputs
            .iter()
            .map(|port| {
                let upstream = match port.kind {
                    PortKind::Data => self.data_links[position]
                        .get(&port.id)
                        .and_then(|link| upstream_value(graph, link)),
                    PortKind::Sink => None,
                };
                let value = upstream.cloned().unwrap_or_else(|| port.default_or_none());
                (port.id.clone(), value)
            })
            .collect()
    }

    /// Cached data inputs plus live sink values, or `None` when no sink input fired.
    /// Only sources that computed this tick can fire.
    fn gather_sink_inputs(
        &self,
        graph: &GraphState,
        position: usize,
        definition: &NodeDefinition,
        frozen: &[bool],
    ) -> Option<PortValues> {
        let mut inputs = graph.nodes[position].input_values.clone();
        let mut fired = false;
        for port in definition.inputs.iter().filter(|p| p.is_sink()) {
            let upstream = self.sink_links[position]
                .get(&port.id)
                .filter(|link| !frozen[link.source])
                .and_then(|link| upstream_value(graph, link))
                .filter(|value| value.is_firing());
            let value = match upstream {
                Some(value) => {
                    fired = true;
                    value.clone()
                }
                None => port.default_or_none(),
            };
            inputs.insert(port.id.clone(), value);
        }
        fired.then_some(inputs)
    }
}

fn upstream_value<'g>(graph: &'g GraphState, link: &Link) -> Option<&'g crate::value::Value> {
    graph.nodes[link.source]
        .output_values
        .get(&link.port_id)
        .filter(|value| !value.is_none())
}

/// Evaluate one tick of `graph`.
///
/// Outputs are written into each node's caches; everything that went wrong is in the
/// returned report.
pub fn execute_tick(
    graph: &mut GraphState,
    registry: &NodeRegistry,
    tick: &TickContext,
    pulses: &FinishPulses,
) -> TickReport {
    EvaluationPlan::build(graph, registry).execute(graph, tick, pulses)
}

/// Strongly connected components that contain a cycle (size > 1, or a self loop),
/// each sorted by position, ordered by their first position.
///
/// Tarjan's algorithm with an explicit work stack, so path length is bounded by the
/// heap rather than the call stack.
fn cyclic_components(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = successors.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();
    // (node, next successor to visit)
    let mut work: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let v = frame.0;
            if index[v].is_none() {
                index[v] = Some(next_index);
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            if let Some(&w) = successors[v].get(frame.1) {
                frame.1 += 1;
                match index[w] {
                    None => work.push((w, 0)),
                    Some(w_index) if on_stack[w] => lowlink[v] = lowlink[v].min(w_index),
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }

            if Some(lowlink[v]) == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                if component.len() > 1 || successors[v].contains(&v) {
                    component.sort_unstable();
                    components.push(component);
                }
            }
        }
    }

    components.sort_by_key(|component| component[0]);
    components
}

/// Kahn's algorithm over the non-excluded nodes, always taking the lowest ready position.
fn topological_order(successors: &[Vec<usize>], excluded: &[bool]) -> Vec<usize> {
    let n = successors.len();
    let mut in_degree = vec![0usize; n];
    for (source, targets) in successors.iter().enumerate() {
        if excluded[source] {
            continue;
        }
        for &target in targets {
            if !excluded[target] {
                in_degree[target] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&v| !excluded[v] && in_degree[v] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(v)) = ready.pop() {
        order.push(v);
        for &w in &successors[v] {
            if excluded[w] {
                continue;
            }
            in_degree[w] -= 1;
            if in_degree[w] == 0 {
                ready.push(Reverse(w));
            }
        }
    }

    order
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

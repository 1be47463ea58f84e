//! Fixed-rate tick loop around the evaluation engine.
//!
//! The registry and the finish-pulse table are shared with other threads (the stdin
//! media reader, hot registration). Each tick takes a read lock only long enough to
//! build its evaluation plan, so a registration landing mid-tick is seen by the next
//! tick as a whole.

use showgraph_core::{
    derive_runtime_active, EngineError, EvaluationPlan, FinishPulses, GraphState, NodeGroup,
    NodeRegistry, TickContext, TickReport,
};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::loader::LoadedShow;
use super::logging::TickLog;

/// Loop parameters, resolved from config and CLI.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick_hz: f64,
    pub max_ticks: Option<u64>,
    pub log_every: u64,
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub dispatches: usize,
    pub logged: u64,
}

/// Everything one tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    pub report: TickReport,
    pub log: TickLog,
    /// The error list differs from the previous tick's
    pub errors_changed: bool,
}

pub struct ShowRunner {
    graph: GraphState,
    groups: Vec<NodeGroup>,
    registry: Arc<RwLock<NodeRegistry>>,
    pulses: Arc<FinishPulses>,
    tick: u64,
    last_errors: Vec<EngineError>,
}

impl ShowRunner {
    pub fn new(
        show: LoadedShow,
        registry: Arc<RwLock<NodeRegistry>>,
        pulses: Arc<FinishPulses>,
    ) -> Self {
        Self {
            graph: show.graph,
            groups: show.groups,
            registry,
            pulses,
            tick: 0,
            last_errors: Vec::new(),
        }
    }

    pub fn graph(&self) -> &GraphState {
        &self.graph
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Evaluate one tick.
    pub fn step(&mut self, context: &TickContext) -> TickOutcome {
        let start = Instant::now();
        let mut log = TickLog::new(self.tick, context, start);

        let plan = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            EvaluationPlan::build(&self.graph, &registry)
        };
        let report = plan.execute(&mut self.graph, context, &self.pulses);
        derive_runtime_active(&mut self.groups, &self.graph);

        let errors_changed = report.errors != self.last_errors;
        if errors_changed {
            for error in report.errors.iter().filter(|e| !self.last_errors.contains(e)) {
                tracing::warn!(tick = self.tick, %error, "engine error");
            }
            self.last_errors = report.errors.clone();
        }
        for dispatch in &report.dispatches {
            tracing::info!(
                node_id = %dispatch.node_id,
                target = ?dispatch.target,
                payload = %dispatch.payload.to_json(),
                "dispatch"
            );
        }

        log.add_report(&report);
        log.add_groups(&self.groups);
        log.set_pending_pulses(self.pulses.pending_count());
        log.finalize();

        self.tick += 1;
        TickOutcome {
            report,
            log,
            errors_changed,
        }
    }

    /// Tick at a fixed rate until `max_ticks` or until `stop` is set, writing tick
    /// logs to `out`.
    ///
    /// Show time advances by exactly one period per tick, whatever the wall clock
    /// does, so runs are reproducible.
    pub fn run<W: Write>(
        &mut self,
        settings: &LoopSettings,
        out: &mut W,
        stop: &AtomicBool,
    ) -> std::io::Result<RunSummary> {
        let period = Duration::from_secs_f64(1.0 / settings.tick_hz);
        let delta = period.as_secs_f64();
        let mut summary = RunSummary::default();
        let mut deadline = Instant::now();

        tracing::info!(tick_hz = settings.tick_hz, max_ticks = ?settings.max_ticks, "tick loop started");

        while !stop.load(Ordering::Relaxed) {
            if settings.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            let context = TickContext::new(self.tick as f64 * delta, delta);
            let outcome = self.step(&context);
            summary.ticks += 1;
            summary.dispatches += outcome.report.dispatches.len();

            if outcome.log.tick % settings.log_every == 0 || outcome.errors_changed {
                writeln!(out, "{}", outcome.log.to_json()?)?;
                summary.logged += 1;
            }

            deadline += period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                // Running behind; don't try to catch up with a burst of ticks.
                deadline = now;
            }
        }

        out.flush()?;
        tracing::info!(ticks = summary.ticks, dispatches = summary.dispatches, "tick loop stopped");
        Ok(summary)
    }
}

/// Parse a media report line: `finish <nodeId>`.
pub fn parse_media_report(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(command), Some(node_id), None) if command.eq_ignore_ascii_case("finish") => {
            Some(node_id)
        }
        _ => None,
    }
}

/// Forward `finish <nodeId>` lines from `reader` into the pulse table until EOF.
pub fn spawn_media_reader<R>(reader: R, pulses: Arc<FinishPulses>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("media report stream failed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_media_report(&line) {
                Some(node_id) => {
                    tracing::debug!(node_id, "media finished");
                    pulses.report_finish(node_id);
                }
                None => tracing::warn!(line = %line, "ignoring media report"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::loader::parse_show_json;
    use serde_json::json;
    use showgraph_core::{NodeDefinition, NodeContext, ConfigValues, PortValues, Value};
    use std::io::Cursor;

    fn show() -> LoadedShow {
        let document = json!({
            "graph": {
                "nodes": [
                    {"id": "on", "type": "input.boolean", "config": {"value": true}},
                    {"id": "gate", "type": "group.gate"},
                    {"id": "clip", "type": "media.player"},
                    {"id": "cue", "type": "output.command", "config": {"command": "next"}}
                ],
                "connections": [
                    {"id": "c1", "sourceNodeId": "on", "sourcePortId": "value",
                     "targetNodeId": "gate", "targetPortId": "active"},
                    {"id": "c2", "sourceNodeId": "clip", "sourcePortId": "finished",
                     "targetNodeId": "cue", "targetPortId": "trigger"}
                ]
            },
            "groups": [{"id": "stage", "nodeIds": ["gate", "clip"]}]
        });
        parse_show_json(&document.to_string()).unwrap()
    }

    fn runner() -> (ShowRunner, Arc<RwLock<NodeRegistry>>, Arc<FinishPulses>) {
        let registry = Arc::new(RwLock::new(NodeRegistry::with_builtins()));
        let pulses = Arc::new(FinishPulses::with_system_clock());
        let runner = ShowRunner::new(show(), registry.clone(), pulses.clone());
        (runner, registry, pulses)
    }

    #[test]
    fn test_step_derives_groups_and_dispatches() {
        let (mut runner, _registry, pulses) = runner();

        let outcome = runner.step(&TickContext::new(0.0, 0.1));
        assert!(!outcome.report.has_errors());
        assert!(!outcome.errors_changed);
        assert_eq!(runner.groups()[0].runtime_active, Some(true));
        assert_eq!(outcome.log.active_groups, vec!["stage"]);

        pulses.report_finish("clip");
        let outcome = runner.step(&TickContext::new(0.1, 0.1));
        assert_eq!(outcome.report.dispatches.len(), 1);
        assert_eq!(runner.ticks(), 2);
    }

    #[test]
    fn test_registry_changes_apply_on_next_tick() {
        let (mut runner, registry, _pulses) = runner();
        fn never_active(_: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
            PortValues::from([("active".to_string(), Value::Boolean(false))])
        }

        runner.step(&TickContext::default());
        registry
            .write()
            .unwrap()
            .register(NodeDefinition::new("group.gate", "Gate", "Group", never_active).with_undeclared_outputs());
        runner.step(&TickContext::default());
        assert_eq!(runner.groups()[0].runtime_active, Some(false));
    }

    #[test]
    fn test_error_changes_are_flagged() {
        let (mut runner, registry, _pulses) = runner();
        runner.step(&TickContext::default());

        *registry.write().unwrap() = NodeRegistry::new();
        let outcome = runner.step(&TickContext::default());
        assert!(outcome.errors_changed);
        assert_eq!(outcome.report.errors.len(), 4);

        let outcome = runner.step(&TickContext::default());
        assert!(!outcome.errors_changed);
    }

    #[test]
    fn test_run_writes_logs() {
        let (mut runner, _registry, _pulses) = runner();
        let settings = LoopSettings {
            tick_hz: 1000.0,
            max_ticks: Some(5),
            log_every: 2,
        };
        let mut out = Vec::new();
        let summary = runner.run(&settings, &mut out, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.logged, 3);
        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let ticks: Vec<_> = lines.iter().map(|l| l["tick"].as_u64().unwrap()).collect();
        assert_eq!(ticks, vec![0, 2, 4]);
        assert!((lines[1]["show_time"].as_f64().unwrap() - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_run_honors_stop_flag() {
        let (mut runner, _registry, _pulses) = runner();
        let settings = LoopSettings {
            tick_hz: 1000.0,
            max_ticks: None,
            log_every: 1,
        };
        let summary = runner
            .run(&settings, &mut std::io::sink(), &AtomicBool::new(true))
            .unwrap();
        assert_eq!(summary.ticks, 0);
    }

    #[test]
    fn test_parse_media_report() {
        assert_eq!(parse_media_report("finish clip"), Some("clip"));
        assert_eq!(parse_media_report("  FINISH   clip  "), Some("clip"));
        assert_eq!(parse_media_report("finish"), None);
        assert_eq!(parse_media_report("finish a b"), None);
        assert_eq!(parse_media_report("start clip"), None);
    }

    #[test]
    fn test_media_reader_reports_pulses() {
        let pulses = Arc::new(FinishPulses::with_system_clock());
        let input = Cursor::new("finish clip\nnonsense\n\nfinish other\n");
        spawn_media_reader(input, pulses.clone()).join().unwrap();
        assert_eq!(pulses.pending_count(), 2);
        assert!(pulses.consume_pulse("clip"));
    }
}

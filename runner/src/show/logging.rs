//! Structured tick logging.
//!
//! One JSON record per logged tick, written as a line to the runner's output:
//! - Tick identity and timing
//! - Evaluation counts and frozen nodes
//! - Engine errors
//! - Dispatch and group state

use chrono::Utc;
use serde::Serialize;
use showgraph_core::{EngineError, NodeGroup, TickContext, TickReport};
use std::time::Instant;
use uuid::{timestamp::Timestamp, NoContext, Uuid};

/// Complete log entry for one tick.
#[derive(Debug, Serialize)]
pub struct TickLog {
    pub tick_id: String,
    pub timestamp: String,
    pub tick: u64,
    pub show_time: f64,
    pub processing_time_us: u64,
    pub evaluated: usize,
    pub frozen: Vec<String>,
    pub errors: Vec<EngineError>,
    pub dispatches: usize,
    pub delivered: usize,
    pub active_groups: Vec<String>,
    pub pending_pulses: usize,
    #[serde(skip)]
    start_time: Instant,
}

impl TickLog {
    /// Start a log entry for tick number `tick`, identified by a UUIDv7.
    pub fn new(tick: u64, context: &TickContext, start_time: Instant) -> Self {
        let now = Utc::now();
        let ts = Timestamp::from_unix(
            &NoContext,
            now.timestamp() as u64,
            now.timestamp_subsec_nanos(),
        );
        let uuid = Uuid::new_v7(ts);

        TickLog {
            tick_id: uuid.to_string(),
            timestamp: now.to_rfc3339(),
            tick,
            show_time: context.time,
            processing_time_us: 0,
            evaluated: 0,
            frozen: Vec::new(),
            errors: Vec::new(),
            dispatches: 0,
            delivered: 0,
            active_groups: Vec::new(),
            pending_pulses: 0,
            start_time,
        }
    }

    pub fn add_report(&mut self, report: &TickReport) {
        self.evaluated = report.evaluated;
        self.frozen = report.frozen.clone();
        self.errors = report.errors.clone();
        self.dispatches = report.dispatches.len();
        self.delivered = report.delivered;
    }

    /// Record the groups whose gates are currently active.
    pub fn add_groups(&mut self, groups: &[NodeGroup]) {
        self.active_groups = groups
            .iter()
            .filter(|g| g.runtime_active == Some(true))
            .map(|g| g.id.clone())
            .collect();
    }

    pub fn set_pending_pulses(&mut self, pending: usize) {
        self.pending_pulses = pending;
    }

    /// Should be called just before writing the entry.
    pub fn finalize(&mut self) {
        self.processing_time_us = self.start_time.elapsed().as_micros() as u64;
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

//! Media finish-pulse bridge.
//!
//! External playback collaborators report "finished" per node id; media nodes consume
//! the pulse at most once. This is the only engine state that outlives a tick, so it
//! is bounded: entries untouched for [`PULSE_RETENTION`] are evicted lazily on every
//! report/consume call. There is no background sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long an entry survives without a report or consume touching it.
pub const PULSE_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Monotonic time source, injectable so tests control eviction.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock measured from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy)]
struct PulseEntry {
    pending: bool,
    updated_at: Duration,
}

/// Process-wide table of pending finish pulses, keyed by node id.
///
/// Shared between the playback side (`report_finish`) and the evaluating side
/// (`consume_pulse`); all methods take `&self`.
pub struct FinishPulses {
    clock: Arc<dyn Clock>,
    retention: Duration,
    entries: Mutex<HashMap<String, PulseEntry>>,
}

impl FinishPulses {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            retention: PULSE_RETENTION,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }

    /// Mark `node_id` as finished. Empty or whitespace ids are ignored.
    pub fn report_finish(&self, node_id: &str) {
        let key = node_id.trim();
        if key.is_empty() {
            return;
        }
        let now = self.clock.now();
        let mut entries = self.lock();
        self.evict_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            PulseEntry {
                pending: true,
                updated_at: now,
            },
        );
        tracing::trace!(node_id = key, "finish pulse reported");
    }

    /// Return and clear the pending pulse for `node_id`.
    ///
    /// `true` at most once per report.
    pub fn consume_pulse(&self, node_id: &str) -> bool {
        let key = node_id.trim();
        if key.is_empty() {
            return false;
        }
        let now = self.clock.now();
        let mut entries = self.lock();
        self.evict_expired(&mut entries, now);
        match entries.get_mut(key) {
            Some(entry) if entry.pending => {
                entry.pending = false;
                entry.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Number of unconsumed pulses currently held.
    pub fn pending_count(&self) -> usize {
        self.lock().values().filter(|e| e.pending).count()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn evict_expired(&self, entries: &mut HashMap<String, PulseEntry>, now: Duration) {
        let retention = self.retention;
        entries.retain(|_, entry| now.saturating_sub(entry.updated_at) <= retention);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PulseEntry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FinishPulses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishPulses")
            .field("retention", &self.retention)
            .field("entries", &self.lock().len())
            .finish()
    }
}

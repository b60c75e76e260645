//! Best-effort mutation monitor for aliased byte ranges.
//!
//! A range handed to [`MonitorContext::monitor`] is checksummed immediately.
//! In `Strict` mode a probe thread re-reads it with no ordering relative to
//! the rest of the program, so that a race detector reports any concurrent
//! writer. Probes are joined by the next flush and by context teardown. In
//! every checksumming mode a recheck is registered with the context's
//! [`DeferredGate`] and runs on the next sweep, either an
//! explicit [`MonitorContext::flush_pending`] at a host safe point or the
//! periodic [`SweeperHandle`] thread.
//!
//! A checksum mismatch is fatal. The default handler logs, prints the
//! diagnostic and aborts the process.
//!
//! Detection has no false-negative bound: a mutation reverted to the original
//! bytes before any recheck runs is invisible.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{MonitorConfig, SafetyMode};
use crate::gate::{DeferredGate, GateError, GateRelease, Registration};
use crate::hash::HashProvider;
use crate::metrics::{MetricsSnapshot, MonitorMetrics};

/// Address and length of memory the caller asserts will not be written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    addr: *const u8,
    len: usize,
}

// SAFETY: a ByteRange is only dereferenced by checks whose callers promised
// (see `MonitorContext::monitor`) that the memory stays readable and is never
// written again. Under that contract concurrent reads from any thread are sound.
unsafe impl Send for ByteRange {}
// SAFETY: as above; the range is read-only.
unsafe impl Sync for ByteRange {}

impl ByteRange {
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            addr: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// # Safety
    ///
    /// `addr` must be valid for reads of `len` bytes whenever the range is
    /// checked.
    #[must_use]
    pub unsafe fn from_raw_parts(addr: *const u8, len: usize) -> Self {
        Self { addr, len }
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// The range must still be readable.
    unsafe fn bytes<'a>(&self) -> &'a [u8] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts(self.addr, self.len) }
    }
}

/// Stored checksum for one monitored range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub id: u64,
    pub range: ByteRange,
    pub checksum: u64,
    pub mode: SafetyMode,
}

/// Which check observed a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSource {
    Probe,
    Deferred,
}

impl std::fmt::Display for CheckSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Probe => "probe",
            Self::Deferred => "deferred recheck",
        })
    }
}

/// A monitored range whose contents changed after aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("mutation detected in string at address 0x{addr:012x}")]
pub struct MutationViolation {
    pub addr: usize,
    pub len: usize,
    pub expected: u64,
    pub observed: u64,
    pub found_by: CheckSource,
}

/// Callback invoked for every detected mutation.
///
/// Handlers are expected not to return into normal operation; the default
/// aborts. Returning is tolerated so test harnesses can record violations.
pub type ViolationHandler = Arc<dyn Fn(&MutationViolation) + Send + Sync>;

/// Default handler: log, print the diagnostic and abort.
pub fn abort_on_violation(violation: &MutationViolation) {
    error!(
        addr = violation.addr,
        len = violation.len,
        expected = violation.expected,
        observed = violation.observed,
        found_by = %violation.found_by,
        "{violation}"
    );
    eprintln!(
        "fatal error: {violation} ({} bytes, found by {})",
        violation.len, violation.found_by
    );
    std::process::abort();
}

fn default_handler() -> ViolationHandler {
    Arc::new(abort_on_violation)
}

/// Why a range was not monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Empty,
}

/// Result of handing a range to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Skipped(SkipReason),
    Registered {
        id: u64,
        checksum: u64,
        probed: bool,
        deferred: Registration,
    },
}

/// Result of one sweep of eligible deferred checks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub violations: usize,
}

/// Parking spot for probe threads, so a test can order a probe after a
/// mutation.
struct ProbeLatch {
    held: Mutex<bool>,
    cv: Condvar,
}

impl ProbeLatch {
    fn wait(&self) {
        let mut held = self.held.lock();
        while *held {
            self.cv.wait(&mut held);
        }
    }

    fn set(&self, held: bool) {
        *self.held.lock() = held;
        if !held {
            self.cv.notify_all();
        }
    }
}

/// State a probe thread needs. Shared with probes so they never keep the
/// context itself alive.
struct Checker {
    hasher: HashProvider,
    metrics: MonitorMetrics,
    handler: RwLock<ViolationHandler>,
    probe_latch: ProbeLatch,
}

impl Checker {
    fn sum(&self, range: &ByteRange) -> u64 {
        MonitorMetrics::inc(&self.metrics.checksums);
        // SAFETY: every record was created under the `monitor` contract.
        self.hasher.checksum(unsafe { range.bytes() })
    }

    fn verify(&self, record: &ChecksumRecord, source: CheckSource) -> bool {
        let observed = self.sum(&record.range);
        if observed == record.checksum {
            return true;
        }
        MonitorMetrics::inc(&self.metrics.violations);
        let violation = MutationViolation {
            addr: record.range.addr(),
            len: record.range.len(),
            expected: record.checksum,
            observed,
            found_by: source,
        };
        let handler = self.handler.read().clone();
        handler(&violation);
        false
    }
}

struct ContextInner {
    mode: AtomicU8,
    checker: Arc<Checker>,
    gate: Arc<DeferredGate<ChecksumRecord>>,
    probes: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl ContextInner {
    /// Lift any probe hold and wait for every probe started so far.
    fn join_probes(&self) -> usize {
        self.checker.probe_latch.set(false);
        let probes = std::mem::take(&mut *self.probes.lock());
        let joined = probes.len();
        for probe in probes {
            if probe.join().is_err() {
                warn!("mutation probe panicked");
            }
        }
        joined
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let joined = self.join_probes();
        let discarded = self.gate.discard_all();
        if joined > 0 || discarded > 0 {
            debug!(joined, discarded, "monitor context dropped");
        }
    }
}

/// Explicitly constructed monitor state: mode, hasher pool, gate, counters
/// and violation handler. Cloning is cheap and shares the state.
#[derive(Clone)]
pub struct MonitorContext {
    inner: Arc<ContextInner>,
}

impl MonitorContext {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let mode = config.effective_mode();
        Self {
            inner: Arc::new(ContextInner {
                mode: AtomicU8::new(mode.to_u8()),
                checker: Arc::new(Checker {
                    hasher: HashProvider::new(config.hash, config.pool_max_idle),
                    metrics: MonitorMetrics::new(),
                    handler: RwLock::new(default_handler()),
                    probe_latch: ProbeLatch {
                        held: Mutex::new(false),
                        cv: Condvar::new(),
                    },
                }),
                gate: Arc::new(DeferredGate::new()),
                probes: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Context configured from `SLICEALIAS_MODE` / `SLICEALIAS_HASH`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(MonitorConfig::from_env())
    }

    #[must_use]
    pub fn mode(&self) -> SafetyMode {
        SafetyMode::from_u8(self.inner.mode.load(Ordering::Acquire))
    }

    /// Downgrade `BestEffort` to `Disabled`. `Strict` always wins, so this has
    /// no effect in strict or instrumented contexts. Returns the mode now in
    /// effect.
    pub fn reduce_safety(&self) -> SafetyMode {
        match self.inner.mode.compare_exchange(
            SafetyMode::BestEffort.to_u8(),
            SafetyMode::Disabled.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                debug!("monitoring disabled by reduce_safety");
                SafetyMode::Disabled
            }
            Err(current) => {
                let current = SafetyMode::from_u8(current);
                if current == SafetyMode::Strict {
                    warn!("reduce_safety ignored: strict monitoring is in effect");
                }
                current
            }
        }
    }

    /// Replace the violation handler.
    pub fn set_violation_handler<F>(&self, handler: F)
    where
        F: Fn(&MutationViolation) + Send + Sync + 'static,
    {
        *self.inner.checker.handler.write() = Arc::new(handler);
    }

    #[must_use]
    pub fn hasher(&self) -> &HashProvider {
        &self.inner.checker.hasher
    }

    /// Checksum `bytes` with this context's strategy. Not counted in the
    /// monitor metrics.
    #[must_use]
    pub fn checksum(&self, bytes: &[u8]) -> u64 {
        self.inner.checker.hasher.checksum(bytes)
    }

    /// Monitor a `'static` byte range.
    pub fn monitor_static(&self, bytes: &'static [u8]) -> MonitorOutcome {
        // SAFETY: 'static memory stays readable for the rest of the process.
        unsafe { self.monitor(ByteRange::from_slice(bytes)) }
    }

    /// Checksum `range` and schedule its rechecks.
    ///
    /// # Safety
    ///
    /// The range must stay readable until a later
    /// [`flush_pending`](Self::flush_pending) on this context has returned, or
    /// until this context and every clone of it (including one held by a
    /// running sweeper) has been dropped. Both wait for outstanding probe
    /// threads. Its contents are promised never to change; a change is
    /// reported as a fatal violation.
    pub unsafe fn monitor(&self, range: ByteRange) -> MonitorOutcome {
        let inner = &self.inner;
        let mode = self.mode();
        if !mode.checksums_enabled() {
            MonitorMetrics::inc(&inner.checker.metrics.views_skipped);
            return MonitorOutcome::Skipped(SkipReason::Disabled);
        }
        if range.is_empty() {
            MonitorMetrics::inc(&inner.checker.metrics.views_skipped);
            return MonitorOutcome::Skipped(SkipReason::Empty);
        }

        let record = ChecksumRecord {
            id: inner.next_id.fetch_add(1, Ordering::Relaxed),
            range,
            checksum: inner.checker.sum(&range),
            mode,
        };
        MonitorMetrics::inc(&inner.checker.metrics.views_monitored);

        let probed = mode.probe_enabled() && self.spawn_probe(record);

        let deferred = inner.gate.register(record);
        if deferred == Registration::Captured {
            MonitorMetrics::inc(&inner.checker.metrics.deferred_captured);
        }
        debug!(
            id = record.id,
            addr = range.addr(),
            len = range.len(),
            probed,
            ?deferred,
            "monitoring aliased range"
        );

        MonitorOutcome::Registered {
            id: record.id,
            checksum: record.checksum,
            probed,
            deferred,
        }
    }

    fn spawn_probe(&self, record: ChecksumRecord) -> bool {
        let checker = Arc::clone(&self.inner.checker);
        let spawned = std::thread::Builder::new()
            .name("slicealias-probe".into())
            .spawn(move || {
                checker.probe_latch.wait();
                checker.verify(&record, CheckSource::Probe);
            });
        match spawned {
            Ok(handle) => {
                let mut probes = self.inner.probes.lock();
                probes.retain(|p| !p.is_finished());
                probes.push(handle);
                drop(probes);
                MonitorMetrics::inc(&self.inner.checker.metrics.probes_spawned);
                true
            }
            Err(err) => {
                warn!(id = record.id, %err, "failed to start mutation probe");
                false
            }
        }
    }

    /// Park probe threads started from now on until the hold is released,
    /// the next [`MonitorContext::flush_pending`], or the context is dropped.
    pub fn hold_probes(&self) -> ProbeHold {
        self.inner.checker.probe_latch.set(true);
        ProbeHold {
            checker: Arc::clone(&self.inner.checker),
        }
    }

    /// Close this context's deferred gate.
    ///
    /// # Panics
    ///
    /// Panics if the gate is already closed.
    pub fn close_gate(&self) -> GateRelease<ChecksumRecord> {
        self.inner.gate.close()
    }

    pub fn try_close_gate(&self) -> Result<GateRelease<ChecksumRecord>, GateError> {
        self.inner.gate.try_close()
    }

    /// `(captured, eligible)` deferred rechecks.
    #[must_use]
    pub fn pending(&self) -> (usize, usize) {
        self.inner.gate.pending_counts()
    }

    /// Wait for every probe started so far, then run every eligible deferred
    /// recheck. Lifts any probe hold.
    pub fn flush_pending(&self) -> SweepReport {
        self.inner.join_probes();
        let records = self.inner.gate.take_eligible();
        let mut report = SweepReport::default();
        for record in &records {
            MonitorMetrics::inc(&self.inner.checker.metrics.rechecks);
            report.checked += 1;
            if !self.inner.checker.verify(record, CheckSource::Deferred) {
                report.violations += 1;
            }
        }
        if report.checked > 0 {
            debug!(
                checked = report.checked,
                violations = report.violations,
                "swept deferred rechecks"
            );
        }
        report
    }

    /// Start a thread that sweeps eligible rechecks every `interval`.
    pub fn spawn_sweeper(&self, interval: Duration) -> std::io::Result<SweeperHandle> {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let ctx = self.clone();
        let thread_signal = Arc::clone(&signal);
        let thread = std::thread::Builder::new()
            .name("slicealias-sweeper".into())
            .spawn(move || {
                let (stopped, cv) = &*thread_signal;
                loop {
                    let mut stop = stopped.lock();
                    if !*stop {
                        cv.wait_for(&mut stop, interval);
                    }
                    let finished = *stop;
                    drop(stop);
                    ctx.flush_pending();
                    if finished {
                        break;
                    }
                }
            })?;
        debug!(?interval, "sweeper started");
        Ok(SweeperHandle {
            signal,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        let checker = &self.inner.checker;
        checker
            .metrics
            .snapshot(checker.hasher.hits(), checker.hasher.misses())
    }
}

impl std::fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorContext")
            .field("mode", &self.mode())
            .field("hasher", &self.inner.checker.hasher)
            .field("gate", &self.inner.gate)
            .finish_non_exhaustive()
    }
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

/// Background sweeper. Stopping (or dropping) runs one last sweep and joins.
pub struct SweeperHandle {
    signal: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let (stopped, cv) = &*self.signal;
        *stopped.lock() = true;
        cv.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps new probe threads parked. Releasing or dropping it lets them run.
#[must_use = "dropping the hold releases parked probes immediately"]
pub struct ProbeHold {
    checker: Arc<Checker>,
}

impl ProbeHold {
    /// Same as dropping the hold.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ProbeHold {
    fn drop(&mut self) {
        self.checker.probe_latch.set(false);
    }
}

static GLOBAL_CONTEXT: OnceLock<MonitorContext> = OnceLock::new();

/// Process-wide context configured from the environment on first use.
#[must_use]
pub fn global_context() -> &'static MonitorContext {
    GLOBAL_CONTEXT.get_or_init(MonitorContext::from_env)
}

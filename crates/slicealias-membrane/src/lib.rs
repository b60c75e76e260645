//! Mutation-detection membrane for slicealias.
//!
//! Aliasing mutable memory as immutable text is only sound if the memory is
//! never written again, and nothing can prove that. This crate makes a
//! best-effort attempt to catch the cases where the promise is broken.
//!
//! # Architecture
//!
//! - **Configuration** (`config`): `SafetyMode` and hash strategy selection
//! - **Hash provider** (`hash`): pooled FNV-1a / keyed BLAKE3 64-bit checksums
//! - **Deferred gate** (`gate`): latch that holds back recheck registrations
//! - **Monitor** (`monitor`): checksum, probe, deferred recheck, fatal report
//! - **Metrics** (`metrics`): atomic counters for observability

pub mod config;
pub mod gate;
pub mod hash;
pub mod metrics;
pub mod monitor;

pub use config::{MonitorConfig, RACE_INSTRUMENTED, SafetyMode};
pub use gate::{DeferredGate, GateError, GateRelease, Registration};
pub use hash::{HashProvider, HashStrategy};
pub use metrics::{MetricsSnapshot, MonitorMetrics};
pub use monitor::{
    ByteRange, CheckSource, ChecksumRecord, MonitorContext, MonitorOutcome, MutationViolation,
    ProbeHold, SkipReason, SweepReport, SweeperHandle, ViolationHandler, abort_on_violation, global_context,
};

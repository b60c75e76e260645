//! Monitoring mode configuration.
//!
//! The mode is read from the `SLICEALIAS_MODE` environment variable:
//! - `best-effort` (default): checksum every aliased range and re-verify it
//!   when deferred checks are swept.
//! - `strict`: best-effort plus an unsynchronized probe thread per range, so a
//!   data-race detector can flag the erroneous writer. Forced whenever the
//!   crate is built with the `race-instrumented` feature.
//! - `off`: no checksums at all. Pure passthrough for throughput-sensitive
//!   callers and benchmark baselines.
//!
//! The hash strategy is read from `SLICEALIAS_HASH` (`seeded` or `fnv`).

use serde::{Deserialize, Serialize};

use crate::hash::HashStrategy;

/// True when the crate was built for a data-race detector.
pub const RACE_INSTRUMENTED: bool = cfg!(feature = "race-instrumented");

/// Default bound on idle hashers kept in the pool.
pub const DEFAULT_POOL_MAX_IDLE: usize = 32;

/// Process-wide monitoring mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyMode {
    /// Checksum, probe concurrently and recheck later.
    Strict,
    /// Checksum and recheck later.
    #[default]
    BestEffort,
    /// Do not monitor aliased ranges.
    Disabled,
}

impl SafetyMode {
    /// Parse from string (case-insensitive). Unknown values map to the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "race" | "full" => Self::Strict,
            "best-effort" | "besteffort" | "best_effort" | "default" => Self::BestEffort,
            "off" | "none" | "disabled" | "unsafe" => Self::Disabled,
            _ => Self::BestEffort,
        }
    }

    /// Returns true if aliased ranges are checksummed at all.
    #[must_use]
    pub const fn checksums_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns true if the concurrent probe runs.
    #[must_use]
    pub const fn probe_enabled(self) -> bool {
        matches!(self, Self::Strict)
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Strict => 0,
            Self::BestEffort => 1,
            Self::Disabled => 2,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Strict,
            2 => Self::Disabled,
            _ => Self::BestEffort,
        }
    }
}

/// Configuration for a [`MonitorContext`](crate::MonitorContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Requested monitoring mode. Overridden to `Strict` under instrumentation.
    pub mode: SafetyMode,
    /// Hash strategy used for every checksum in the context.
    pub hash: HashStrategy,
    /// Maximum number of idle hashers retained for reuse.
    pub pool_max_idle: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            hash: default_hash(),
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
        }
    }
}

impl MonitorConfig {
    /// Build a configuration from `SLICEALIAS_MODE` / `SLICEALIAS_HASH`,
    /// falling back to the compile-time defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mode = std::env::var("SLICEALIAS_MODE")
            .map(|v| SafetyMode::from_str_loose(&v))
            .unwrap_or_else(|_| default_mode());
        let hash = std::env::var("SLICEALIAS_HASH")
            .map(|v| HashStrategy::from_str_loose(&v))
            .unwrap_or_else(|_| default_hash());
        Self {
            mode,
            hash,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
        }
    }

    /// Set the requested mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SafetyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the hash strategy.
    #[must_use]
    pub fn with_hash(mut self, hash: HashStrategy) -> Self {
        self.hash = hash;
        self
    }

    /// Mode actually in effect: instrumented builds always run `Strict`.
    #[must_use]
    pub fn effective_mode(&self) -> SafetyMode {
        if RACE_INSTRUMENTED {
            SafetyMode::Strict
        } else {
            self.mode
        }
    }
}

fn default_mode() -> SafetyMode {
    if cfg!(feature = "unchecked") {
        SafetyMode::Disabled
    } else {
        SafetyMode::BestEffort
    }
}

fn default_hash() -> HashStrategy {
    if cfg!(feature = "fnv-hash") {
        HashStrategy::Fnv
    } else {
        HashStrategy::Seeded
    }
}

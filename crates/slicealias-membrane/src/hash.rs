//! Pooled 64-bit content hashing for mutation checksums.
//!
//! Two strategies:
//! - `Fnv`: FNV-1a 64 with the standard offset basis. Deterministic across
//!   processes, so digests can be compared against published values.
//! - `Seeded`: keyed BLAKE3 truncated to 64 bits. The key is generated once
//!   per process and shared by every hasher, so an adversary cannot craft a
//!   mutation that preserves the checksum without knowing it.
//!
//! Hasher state is checked out of a bounded pool and reset before each use.
//! The guard returns it to the pool when dropped.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const SEED_CONTEXT: &str = "slicealias 2020-11-02 process checksum seed v1";

/// Checksum algorithm selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    /// FNV-1a 64, deterministic initialization.
    Fnv,
    /// Keyed BLAKE3 with a process-lifetime random key.
    #[default]
    Seeded,
}

impl HashStrategy {
    /// Parse from string (case-insensitive). Unknown values map to `Seeded`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "fnv" | "fnv1a" | "fnv-1a" | "deterministic" => Self::Fnv,
            _ => Self::Seeded,
        }
    }
}

/// Streaming FNV-1a 64 hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv64 {
    state: u64,
}

impl Fnv64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    pub fn reset(&mut self) {
        self.state = FNV_OFFSET_BASIS;
    }

    pub fn write(&mut self, bytes: &[u8]) {
        let mut h = self.state;
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(FNV_PRIME);
        }
        self.state = h;
    }

    #[must_use]
    pub const fn sum64(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Hasher state held by the pool.
enum HasherState {
    Fnv(Fnv64),
    // Boxed: a BLAKE3 hasher carries a ~2 KiB chunk stack.
    Seeded(Box<blake3::Hasher>),
}

impl HasherState {
    fn new(strategy: HashStrategy) -> Self {
        match strategy {
            HashStrategy::Fnv => Self::Fnv(Fnv64::new()),
            HashStrategy::Seeded => Self::Seeded(Box::new(blake3::Hasher::new_keyed(
                process_seed(),
            ))),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Fnv(h) => h.reset(),
            Self::Seeded(h) => {
                h.reset();
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        match self {
            Self::Fnv(h) => h.write(bytes),
            Self::Seeded(h) => {
                h.update(bytes);
            }
        }
    }

    fn sum64(&self) -> u64 {
        match self {
            Self::Fnv(h) => h.sum64(),
            Self::Seeded(h) => {
                let out = h.finalize();
                let b = out.as_bytes();
                u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
        }
    }
}

static PROCESS_SEED: OnceLock<[u8; 32]> = OnceLock::new();

/// The process-lifetime key used by the `Seeded` strategy.
///
/// Generated lazily on first use; every later call returns the same key.
#[must_use]
pub fn process_seed() -> &'static [u8; 32] {
    PROCESS_SEED.get_or_init(generate_seed)
}

fn generate_seed() -> [u8; 32] {
    let mut key = [0u8; 32];
    match getrandom::getrandom(&mut key) {
        Ok(()) => key,
        Err(err) => {
            warn!(%err, "OS entropy unavailable; deriving checksum seed from process identity");
            fallback_seed()
        }
    }
}

/// Key derived from the clock, the pid and a stack address. Only used when
/// the OS entropy source fails.
fn fallback_seed() -> [u8; 32] {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let marker = 0u8;
    let mut material = [0u8; 28];
    material[..16].copy_from_slice(&nanos.to_le_bytes());
    material[16..20].copy_from_slice(&std::process::id().to_le_bytes());
    material[20..].copy_from_slice(&(std::ptr::from_ref(&marker) as u64).to_le_bytes());
    blake3::derive_key(SEED_CONTEXT, &material)
}

/// Pool of reusable hashers for one strategy.
pub struct HashProvider {
    strategy: HashStrategy,
    max_idle: usize,
    idle: Mutex<Vec<HasherState>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HashProvider {
    /// Create an empty pool retaining at most `max_idle` hashers.
    #[must_use]
    pub fn new(strategy: HashStrategy, max_idle: usize) -> Self {
        Self {
            strategy,
            max_idle,
            idle: Mutex::new(Vec::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    /// Check out a freshly reset hasher.
    pub fn acquire(&self) -> HasherGuard<'_> {
        let pooled = self.idle.lock().pop();
        let state = match pooled {
            Some(mut state) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                state.reset();
                state
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                HasherState::new(self.strategy)
            }
        };
        HasherGuard {
            provider: self,
            state: Some(state),
        }
    }

    /// Hash `bytes` in one shot.
    #[must_use]
    pub fn checksum(&self, bytes: &[u8]) -> u64 {
        let mut h = self.acquire();
        h.write(bytes);
        h.sum64()
    }

    /// Number of hashers currently idle in the pool.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    /// Checkouts served from the pool.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Checkouts that had to build a new hasher.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn dispose(&self, state: HasherState) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(state);
        }
    }
}

impl std::fmt::Debug for HashProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashProvider")
            .field("strategy", &self.strategy)
            .field("max_idle", &self.max_idle)
            .field("idle", &self.idle_len())
            .finish_non_exhaustive()
    }
}

/// Exclusive loan of a pooled hasher.
pub struct HasherGuard<'a> {
    provider: &'a HashProvider,
    state: Option<HasherState>,
}

impl HasherGuard<'_> {
    pub fn write(&mut self, bytes: &[u8]) {
        if let Some(state) = self.state.as_mut() {
            state.write(bytes);
        }
    }

    #[must_use]
    pub fn sum64(&self) -> u64 {
        self.state.as_ref().map_or(0, HasherState::sum64)
    }
}

impl Drop for HasherGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.provider.dispose(state);
        }
    }
}

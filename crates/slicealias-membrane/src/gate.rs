//! Deferred-check gate.
//!
//! Deferred work is registered here and becomes *eligible* for the next sweep.
//! Closing the gate holds every new registration back until the holder of the
//! [`GateRelease`] reopens it. This turns "recheck eventually" into a schedule
//! a test can control: close, mutate, release, sweep.
//!
//! The latch and the eligible queue share one lock, so a release moves the
//! captured items and reopens the gate in a single step. A registration racing
//! with a release lands either in the captured batch or after it, never lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Gate misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// `close` was called while an earlier closure is still outstanding.
    #[error("deferred gate is already closed (epoch {epoch}); release it before closing again")]
    AlreadyClosed { epoch: u64 },
}

/// Where a registration went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Queued for the next sweep.
    Eligible,
    /// Held back by a closed gate.
    Captured,
}

struct Closed<T> {
    epoch: u64,
    captured: Vec<T>,
}

struct GateState<T> {
    closed: Option<Closed<T>>,
    eligible: VecDeque<T>,
}

/// Latch plus queue of deferred work items.
pub struct DeferredGate<T> {
    state: Mutex<GateState<T>>,
    next_epoch: AtomicU64,
}

impl<T> DeferredGate<T> {
    /// Create an open gate with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                closed: None,
                eligible: VecDeque::new(),
            }),
            next_epoch: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Close the gate, or report the outstanding closure.
    pub fn try_close(self: &Arc<Self>) -> Result<GateRelease<T>, GateError> {
        let mut state = self.state.lock();
        if let Some(closed) = &state.closed {
            return Err(GateError::AlreadyClosed {
                epoch: closed.epoch,
            });
        }
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        state.closed = Some(Closed {
            epoch,
            captured: Vec::new(),
        });
        drop(state);
        debug!(epoch, "deferred gate closed");
        Ok(GateRelease {
            gate: Arc::clone(self),
            epoch,
            released: false,
        })
    }

    /// Close the gate.
    ///
    /// # Panics
    ///
    /// Panics if the gate is already closed. Only one closure may be
    /// outstanding at a time.
    pub fn close(self: &Arc<Self>) -> GateRelease<T> {
        match self.try_close() {
            Ok(release) => release,
            Err(err) => panic!("{err}"),
        }
    }

    /// Register a deferred item.
    pub fn register(&self, item: T) -> Registration {
        let mut state = self.state.lock();
        match state.closed.as_mut() {
            Some(closed) => {
                closed.captured.push(item);
                Registration::Captured
            }
            None => {
                state.eligible.push_back(item);
                Registration::Eligible
            }
        }
    }

    /// Drain every eligible item, oldest first.
    pub fn take_eligible(&self) -> Vec<T> {
        self.state.lock().eligible.drain(..).collect()
    }

    /// `(captured, eligible)` item counts.
    #[must_use]
    pub fn pending_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        let captured = state.closed.as_ref().map_or(0, |c| c.captured.len());
        (captured, state.eligible.len())
    }

    /// Drop everything queued or captured. Returns the number discarded.
    pub fn discard_all(&self) -> usize {
        let mut state = self.state.lock();
        let captured = state
            .closed
            .as_mut()
            .map_or(0, |c| c.captured.drain(..).count());
        captured + state.eligible.drain(..).count()
    }

    fn reopen(&self, epoch: u64) -> usize {
        let mut state = self.state.lock();
        let matches = state.closed.as_ref().is_some_and(|c| c.epoch == epoch);
        if !matches {
            return 0;
        }
        let Some(closed) = state.closed.take() else {
            return 0;
        };
        let released = closed.captured.len();
        state.eligible.extend(closed.captured);
        drop(state);
        debug!(epoch, released, "deferred gate released");
        released
    }
}

impl<T> Default for DeferredGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DeferredGate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (captured, eligible) = self.pending_counts();
        f.debug_struct("DeferredGate")
            .field("closed", &self.is_closed())
            .field("captured", &captured)
            .field("eligible", &eligible)
            .finish()
    }
}

/// Capability to reopen a closed gate. Dropping it releases the gate too.
#[must_use = "dropping the release handle reopens the gate immediately"]
pub struct GateRelease<T> {
    gate: Arc<DeferredGate<T>>,
    epoch: u64,
    released: bool,
}

impl<T> GateRelease<T> {
    /// Epoch of the closure this handle controls.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Reopen the gate, making every captured item eligible.
    /// Returns the number of items released.
    pub fn release(mut self) -> usize {
        self.released = true;
        self.gate.reopen(self.epoch)
    }
}

impl<T> Drop for GateRelease<T> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.gate.reopen(self.epoch);
        }
    }
}

impl<T> std::fmt::Debug for GateRelease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRelease")
            .field("epoch", &self.epoch)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gate_queues_immediately() {
        let gate = Arc::new(DeferredGate::new());
        assert_eq!(gate.register(1), Registration::Eligible);
        assert_eq!(gate.register(2), Registration::Eligible);
        assert_eq!(gate.take_eligible(), vec![1, 2]);
        assert!(gate.take_eligible().is_empty());
    }

    #[test]
    fn closed_gate_captures_until_release() {
        let gate = Arc::new(DeferredGate::new());
        gate.register(0);
        let release = gate.close();
        assert!(gate.is_closed());
        assert_eq!(gate.register(1), Registration::Captured);
        assert_eq!(gate.register(2), Registration::Captured);
        assert_eq!(gate.pending_counts(), (2, 1));
        assert_eq!(gate.take_eligible(), vec![0]);

        assert_eq!(release.release(), 2);
        assert!(!gate.is_closed());
        assert_eq!(gate.take_eligible(), vec![1, 2]);
    }

    #[test]
    fn double_close_is_an_error() {
        let gate: Arc<DeferredGate<u32>> = Arc::new(DeferredGate::new());
        let release = gate.close();
        assert_eq!(
            gate.try_close().unwrap_err(),
            GateError::AlreadyClosed {
                epoch: release.epoch()
            }
        );
        release.release();
        let again = gate.try_close().expect("reopened gate can close");
        assert!(again.epoch() > 0);
    }

    #[test]
    #[should_panic(expected = "already closed")]
    fn double_close_panics() {
        let gate: Arc<DeferredGate<u32>> = Arc::new(DeferredGate::new());
        let _release = gate.close();
        let _second = gate.close();
    }

    #[test]
    fn dropping_release_reopens() {
        let gate = Arc::new(DeferredGate::new());
        {
            let _release = gate.close();
            gate.register("held");
        }
        assert!(!gate.is_closed());
        assert_eq!(gate.take_eligible(), vec!["held"]);
    }

    #[test]
    fn discard_all_empties_both_queues() {
        let gate = Arc::new(DeferredGate::new());
        gate.register(1);
        let release = gate.close();
        gate.register(2);
        assert_eq!(gate.discard_all(), 2);
        assert_eq!(release.release(), 0);
        assert!(gate.take_eligible().is_empty());
    }

    #[test]
    fn concurrent_registrations_survive_release() {
        let gate = Arc::new(DeferredGate::new());
        let release = gate.close();
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        gate.register(t * 1000 + i);
                    }
                })
            })
            .collect();
        std::thread::sleep(std::time::Duration::from_millis(1));
        release.release();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(gate.take_eligible().len(), 1000);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generational readiness barrier between the acquisition loop and handlers.
//!
//! # Sets
//!
//! ```text
//! Alive    connected workers (join/leave at any time)
//! Active   snapshot of Alive taken when the current generation opened
//! Pending  Active workers that have not acknowledged yet
//! Done     Active workers that have acknowledged
//! ```
//!
//! Invariants: `Pending ∩ Done = ∅`, `Pending ∪ Done = Active`. The producer
//! may start the next cycle once `Pending` is empty.
//!
//! # Cycle
//!
//! ```text
//! producer:  await_ready() ──► acquire ──► publish ──► reset() ──┐
//!               ▲                                                │
//!               └────────────── acknowledge() ◄── handlers ◄─────┘
//! ```
//!
//! A worker joining mid-cycle lands in `Alive` only and is picked up by the
//! next `reset()`. A worker leaving is purged from every set under one lock,
//! so an in-flight generation never waits on a dead worker.
//!
//! Timed waits only wake the caller for diagnostics and shutdown polling; a
//! timeout never changes membership.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default timeout between diagnostic wake-ups (1.5s).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Identity of a handler worker, issued by [`GenerationBarrier::join_participant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerHandle(u64);

impl WorkerHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Acknowledgment protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarrierError {
    /// Worker is not part of the current generation's Active set
    #[error("worker {worker} is not an active participant of generation {generation}")]
    NotActive {
        worker: WorkerHandle,
        generation: u64,
    },

    /// Worker already acknowledged this generation
    #[error("worker {worker} already acknowledged generation {generation}")]
    AlreadyAcknowledged {
        worker: WorkerHandle,
        generation: u64,
    },

    /// Worker acknowledged a generation other than the open one
    #[error("worker {worker} acknowledged generation {acked} while generation {current} is open")]
    StaleGeneration {
        worker: WorkerHandle,
        acked: u64,
        current: u64,
    },
}

/// Outcome of [`GenerationBarrier::await_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every Active worker acknowledged `generation`
    Ready { generation: u64 },
    /// Shutdown was requested
    Shutdown,
}

/// Outcome of [`GenerationBarrier::wait_for_generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationWait {
    /// A generation newer than the caller's last-seen one is open
    Advanced(u64),
    /// Diagnostic timeout elapsed, nothing changed
    TimedOut,
    /// Shutdown was requested
    Shutdown,
}

/// Point-in-time copy of the barrier state (sorted handles).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BarrierSnapshot {
    pub generation: u64,
    pub alive: Vec<WorkerHandle>,
    pub active: Vec<WorkerHandle>,
    pub pending: Vec<WorkerHandle>,
    pub done: Vec<WorkerHandle>,
}

#[derive(Debug, Default)]
struct BarrierState {
    generation: u64,
    alive: HashSet<WorkerHandle>,
    active: HashSet<WorkerHandle>,
    pending: HashSet<WorkerHandle>,
    done: HashSet<WorkerHandle>,
}

impl BarrierState {
    fn is_satisfied(&self) -> bool {
        self.pending.is_empty()
    }

    fn debug_check(&self) {
        debug_assert!(self.pending.is_disjoint(&self.done));
        debug_assert_eq!(self.pending.len() + self.done.len(), self.active.len());
    }
}

/// Readiness barrier pacing one producer against a dynamic set of workers.
///
/// Shared via `Arc` between the acquisition loop, every handler worker and
/// the accept loop. It also carries the process-wide shutdown flag.
#[derive(Debug)]
pub struct GenerationBarrier {
    state: Mutex<BarrierState>,
    /// Producer waits here for `Pending = ∅`
    producer: Condvar,
    /// Handlers wait here for a generation advance
    handlers: Condvar,
    next_handle: AtomicU64,
    shutdown: AtomicBool,
    wait_timeout: Duration,
}

impl GenerationBarrier {
    /// Create a barrier with the default diagnostic timeout.
    pub fn new() -> Self {
        Self::with_wait_timeout(DEFAULT_WAIT_TIMEOUT)
    }

    /// Create a barrier whose waits wake every `wait_timeout`.
    pub fn with_wait_timeout(wait_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BarrierState::default()),
            producer: Condvar::new(),
            handlers: Condvar::new(),
            next_handle: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            wait_timeout,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Register a new worker in Alive.
    ///
    /// Returns the worker's handle and the generation open at join time,
    /// which becomes the worker's last-seen generation: it is not required
    /// to acknowledge that generation and first participates after the next
    /// [`reset`](Self::reset).
    pub fn join_participant(&self) -> (WorkerHandle, u64) {
        let handle = WorkerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        state.alive.insert(handle);
        let generation = state.generation;
        self.producer.notify_all();
        log::debug!(
            "[barrier] worker {} joined at generation {} ({} alive)",
            handle,
            generation,
            state.alive.len()
        );
        (handle, generation)
    }

    /// Remove a worker from Alive, Active, Pending and Done atomically.
    ///
    /// Returns `false` if the worker was not registered.
    pub fn leave_participant(&self, handle: WorkerHandle) -> bool {
        let mut state = self.state.lock();
        let was_alive = state.alive.remove(&handle);
        let was_pending = state.pending.remove(&handle);
        state.active.remove(&handle);
        state.done.remove(&handle);
        state.debug_check();

        self.producer.notify_all();
        self.handlers.notify_all();
        log::debug!(
            "[barrier] worker {} left at generation {} (pending: {}, {} alive)",
            handle,
            state.generation,
            was_pending,
            state.alive.len()
        );
        was_alive
    }

    /// Block until every Active worker acknowledged, or shutdown.
    ///
    /// Called by the acquisition loop only.
    pub fn await_ready(&self) -> Readiness {
        let mut state = self.state.lock();
        loop {
            if self.is_shutdown() {
                return Readiness::Shutdown;
            }
            if state.is_satisfied() {
                state.debug_check();
                return Readiness::Ready {
                    generation: state.generation,
                };
            }
            if self
                .producer
                .wait_for(&mut state, self.wait_timeout)
                .timed_out()
            {
                log::debug!(
                    "[barrier] generation {} still waiting: {} pending, {} done, {} alive",
                    state.generation,
                    state.pending.len(),
                    state.done.len(),
                    state.alive.len()
                );
            }
        }
    }

    /// Move `handle` from Pending to Done for `generation`.
    ///
    /// Rejects double acknowledgment, acknowledgment by a worker outside
    /// Active and acknowledgment of a generation that is not open.
    pub fn acknowledge(&self, handle: WorkerHandle, generation: u64) -> Result<(), BarrierError> {
        let mut state = self.state.lock();
        let current = state.generation;

        if state.done.contains(&handle) {
            return Err(BarrierError::AlreadyAcknowledged {
                worker: handle,
                generation: current,
            });
        }
        if !state.pending.contains(&handle) {
            return Err(BarrierError::NotActive {
                worker: handle,
                generation: current,
            });
        }
        if generation != current {
            return Err(BarrierError::StaleGeneration {
                worker: handle,
                acked: generation,
                current,
            });
        }

        state.pending.remove(&handle);
        state.done.insert(handle);
        state.debug_check();

        if state.is_satisfied() {
            self.producer.notify_all();
        }
        Ok(())
    }

    /// Open the next generation.
    ///
    /// Advances the generation counter and sets `Active := Alive`,
    /// `Pending := Active`, `Done := ∅` under one lock, then wakes all
    /// handlers. Called by the acquisition loop right after publishing the
    /// frame for the new generation. Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = state.alive.clone();
        state.pending = state.active.clone();
        state.done.clear();
        state.debug_check();

        log::trace!(
            "[barrier] generation {} opened with {} participants",
            state.generation,
            state.active.len()
        );
        self.handlers.notify_all();
        state.generation
    }

    /// Block until a generation newer than `last_seen` is open.
    ///
    /// Returns [`GenerationWait::TimedOut`] after one wait timeout without
    /// progress so the caller can check its own liveness.
    pub fn wait_for_generation(&self, last_seen: u64) -> GenerationWait {
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if self.is_shutdown() {
                return GenerationWait::Shutdown;
            }
            if state.generation > last_seen {
                return GenerationWait::Advanced(state.generation);
            }
            if timed_out {
                return GenerationWait::TimedOut;
            }
            timed_out = self
                .handlers
                .wait_for(&mut state, self.wait_timeout)
                .timed_out();
        }
    }

    /// Request process-wide shutdown and wake every waiter.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _state = self.state.lock();
        self.producer.notify_all();
        self.handlers.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Currently open generation.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of connected workers.
    pub fn alive_count(&self) -> usize {
        self.state.lock().alive.len()
    }

    /// Copy of the current generation and sets.
    pub fn snapshot(&self) -> BarrierSnapshot {
        let state = self.state.lock();
        let sorted = |set: &HashSet<WorkerHandle>| {
            let mut v: Vec<WorkerHandle> = set.iter().copied().collect();
            v.sort_unstable();
            v
        };
        BarrierSnapshot {
            generation: state.generation,
            alive: sorted(&state.alive),
            active: sorted(&state.active),
            pending: sorted(&state.pending),
            done: sorted(&state.done),
        }
    }
}

impl Default for GenerationBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that triggers shutdown of a running server.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    barrier: Arc<GenerationBarrier>,
}

impl ShutdownHandle {
    pub fn new(barrier: Arc<GenerationBarrier>) -> Self {
        Self { barrier }
    }

    pub fn trigger(&self) {
        self.barrier.shutdown();
    }

    pub fn is_triggered(&self) -> bool {
        self.barrier.is_shutdown()
    }
}

// ============================================================================
// Tests
// ============================================================================

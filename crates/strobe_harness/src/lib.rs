//! Cooperative test harness for cycle-stepped hardware simulators.
//!
//! Test code drives a design through peek, poke and clock stepping, and may
//! fork concurrent test threads that share one simulation deterministically.
//! The harness multiplexes all test threads over a single clock: exactly one
//! thread runs at any instant, threads resume in depth-first fork order
//! within a tick, and cross-thread accesses that would make a test depend on
//! scheduling order are rejected.
//!
//! # Architecture
//!
//! A [`Simulator`] implementation (such as [`EngineSimulator`] over the
//! in-process evaluation engine) is wrapped by the [`AccessChecker`], which
//! validates accesses, coalesces pokes and tracks the idle-cycle timeout.
//! The [`Scheduler`] owns the test threads and advances simulation time
//! through the checker. The backends tie both together behind the
//! user-facing API.
//!
//! # Modules
//!
//! - `error` — Test error types
//! - `simulator` — The underlying simulator contract and engine adapter
//! - `access` — Cross-thread access checking and timeout tracking
//! - `order` — The fork tree and its depth-first schedule order
//! - `scheduler` — Fork, join, step and deadlock detection
//! - `backend` — Single-threaded and threaded user backends

#![warn(missing_docs)]

pub mod access;
pub mod backend;
pub mod error;
pub mod order;
pub mod scheduler;
pub mod simulator;

pub use access::{AccessChecker, AccessMode, SignalDir, SignalId, ThreadView};
pub use backend::{SingleThreadBackend, ThreadedBackend};
pub use error::{ConflictKind, TestError};
pub use order::ThreadOrderTree;
pub use scheduler::{Scheduler, SimThreadId, ThreadStatus};
pub use simulator::{EngineSimulator, Simulator, StepOutcome};

//! Cross-thread access checking and idle-cycle timeout tracking.
//!
//! The [`AccessChecker`] sits between test code and the underlying
//! simulator. It polices same-tick accesses from unrelated threads using
//! per-signal access records and the design's combinational dependency
//! graph, coalesces pokes that would not change the simulator state, and
//! maintains the idle-cycle counter that drives the test timeout.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use strobe_engine::arena::{Arena, ArenaId};

use crate::error::{ConflictKind, TestError};
use crate::simulator::{Simulator, StepOutcome};

/// Opaque ID for a checked IO signal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct SignalId(u32);

impl SignalId {
    /// Creates a `SignalId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for SignalId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// Direction of an IO leaf as seen by test code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDir {
    /// Driven by the test.
    Input,
    /// Driven by the design; read-only for the test.
    Output,
}

/// How a signal was last touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// The last access read the signal.
    Peek,
    /// The last access wrote the signal.
    Poke,
}

/// Per-signal metadata and access records.
#[derive(Clone, Debug)]
pub struct SignalRecord {
    /// The simulator-side name.
    pub name: String,
    /// `true` iff the signal is an output.
    pub read_only: bool,
    /// Combinational sources of this signal, sorted and deduplicated.
    pub depends_on: Vec<SignalId>,
    /// Combinational dependents of this signal, sorted and deduplicated.
    pub depended_on_by: Vec<SignalId>,
    last_poke_value: Option<BigInt>,
    last_access_step: i64,
    last_access_thread: usize,
    last_access_mode: AccessMode,
}

/// The scheduler's view of the accessing thread, passed into every check.
pub struct ThreadView<'a> {
    /// The active thread id.
    pub thread: usize,
    /// The current simulation step.
    pub step: u64,
    /// `is_ancestor_of(a, b)`: whether `a` is `b` or one of its ancestors
    /// in the fork tree.
    pub is_ancestor_of: &'a dyn Fn(usize, usize) -> bool,
}

/// Validates peeks and pokes, forwards them to the simulator and tracks
/// the idle-cycle timeout.
pub struct AccessChecker<S: Simulator> {
    sim: S,
    signals: Arena<SignalId, SignalRecord>,
    by_name: HashMap<String, SignalId>,
    timeout: u64,
    idle_cycles: u64,
    pending: Option<TestError>,
}

impl<S: Simulator> AccessChecker<S> {
    /// Builds the signal table from the design's IO directions and its
    /// combinational sink-to-sources map.
    ///
    /// Ids are assigned in the traversal order of `directions`. Path
    /// entries naming signals outside the table are ignored.
    pub fn new(
        sim: S,
        directions: &[(String, SignalDir)],
        comb_paths: &HashMap<String, Vec<String>>,
    ) -> Self {
        let mut signals = Arena::new();
        let mut by_name = HashMap::new();
        for (name, dir) in directions {
            let id = signals.alloc(SignalRecord {
                name: name.clone(),
                read_only: *dir == SignalDir::Output,
                depends_on: Vec::new(),
                depended_on_by: Vec::new(),
                last_poke_value: None,
                last_access_step: -1,
                last_access_thread: 0,
                last_access_mode: AccessMode::Peek,
            });
            by_name.insert(name.clone(), id);
        }
        for (sink, sources) in comb_paths {
            let Some(&sink_id) = by_name.get(sink) else {
                continue;
            };
            for source in sources {
                let Some(&source_id) = by_name.get(source) else {
                    continue;
                };
                signals.get_mut(sink_id).depends_on.push(source_id);
                signals.get_mut(source_id).depended_on_by.push(sink_id);
            }
        }
        for i in 0..signals.len() {
            let id = SignalId::from_raw(i as u32);
            let rec = signals.get_mut(id);
            rec.depends_on.sort_unstable_by_key(|s| s.as_raw());
            rec.depends_on.dedup();
            rec.depended_on_by.sort_unstable_by_key(|s| s.as_raw());
            rec.depended_on_by.dedup();
        }
        Self {
            sim,
            signals,
            by_name,
            timeout: 0,
            idle_cycles: 0,
            pending: None,
        }
    }

    /// Resolves a signal name to its id.
    pub fn signal_id(&self, name: &str) -> Result<SignalId, TestError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| TestError::UnknownSignal(name.to_string()))
    }

    /// Returns the record for a signal.
    pub fn signal(&self, id: SignalId) -> &SignalRecord {
        self.signals.get(id)
    }

    /// Sets the idle-cycle timeout; zero disables it.
    pub fn set_timeout(&mut self, cycles: u64) {
        self.timeout = cycles;
        self.idle_cycles = 0;
    }

    /// Installs an environment failure to be surfaced by the next step.
    pub fn set_pending_failure(&mut self, error: TestError) {
        if self.pending.is_none() {
            self.pending = Some(error);
        }
    }

    /// Tears down the underlying simulator.
    pub fn finish(&mut self) -> Result<(), TestError> {
        self.sim.finish()
    }

    /// Whether the underlying simulator collects coverage.
    pub fn supports_coverage(&self) -> bool {
        self.sim.supports_coverage()
    }

    /// Coverage counters from the underlying simulator.
    pub fn coverage(&mut self) -> Result<HashMap<String, u64>, TestError> {
        self.sim.coverage()
    }

    /// An access conflicts when the same signal was touched in the current
    /// step by a thread the active thread is not an ancestor of.
    ///
    /// A fresh record (`last_access_step == -1`) can never conflict.
    fn conflicting(record: &SignalRecord, view: &ThreadView<'_>) -> bool {
        record.last_access_step == view.step as i64
            && record.last_access_thread != view.thread
            && !(view.is_ancestor_of)(view.thread, record.last_access_thread)
    }

    fn touch(&mut self, id: SignalId, view: &ThreadView<'_>, mode: AccessMode) {
        let record = self.signals.get_mut(id);
        record.last_access_step = view.step as i64;
        record.last_access_thread = view.thread;
        record.last_access_mode = mode;
    }

    /// Validates and performs a poke.
    ///
    /// Pokes repeating the signal's last poked value are dropped without a
    /// simulator call and without resetting the idle counter; the access
    /// record is still updated.
    pub fn poke(
        &mut self,
        id: SignalId,
        value: &BigInt,
        view: &ThreadView<'_>,
    ) -> Result<(), TestError> {
        let record = self.signals.get(id);
        if record.read_only {
            return Err(TestError::UnpokeableSignal(record.name.clone()));
        }
        if Self::conflicting(record, view) {
            let kind = match record.last_access_mode {
                AccessMode::Poke => ConflictKind::Poke,
                AccessMode::Peek => ConflictKind::Peek,
            };
            return Err(TestError::ThreadOrderDependent {
                signal: record.name.clone(),
                kind,
            });
        }
        for i in 0..record.depended_on_by.len() {
            let dep = self.signals.get(id).depended_on_by[i];
            let dep_record = self.signals.get(dep);
            if Self::conflicting(dep_record, view) && dep_record.last_access_mode == AccessMode::Peek
            {
                return Err(TestError::ThreadOrderDependent {
                    signal: dep_record.name.clone(),
                    kind: ConflictKind::PeekOnDependent,
                });
            }
        }
        let record = self.signals.get(id);
        let changed = record.last_poke_value.as_ref() != Some(value);
        if changed {
            let name = record.name.clone();
            log::trace!("poke {name} <- {value} (thread {})", view.thread);
            self.sim.poke(&name, value)?;
            self.signals.get_mut(id).last_poke_value = Some(value.clone());
            self.idle_cycles = 0;
        }
        self.touch(id, view, AccessMode::Poke);
        Ok(())
    }

    /// Validates and performs a peek.
    pub fn peek(&mut self, id: SignalId, view: &ThreadView<'_>) -> Result<BigInt, TestError> {
        let record = self.signals.get(id);
        if Self::conflicting(record, view) && record.last_access_mode == AccessMode::Poke {
            return Err(TestError::ThreadOrderDependent {
                signal: record.name.clone(),
                kind: ConflictKind::Poke,
            });
        }
        for i in 0..record.depends_on.len() {
            let dep = self.signals.get(id).depends_on[i];
            let dep_record = self.signals.get(dep);
            if Self::conflicting(dep_record, view) && dep_record.last_access_mode == AccessMode::Poke
            {
                return Err(TestError::ThreadOrderDependent {
                    signal: dep_record.name.clone(),
                    kind: ConflictKind::PokeOnDependent,
                });
            }
        }
        let name = self.signals.get(id).name.clone();
        let value = self.sim.peek(&name)?;
        self.touch(id, view, AccessMode::Peek);
        Ok(value)
    }

    /// Advances the simulator by up to `cycles`, honouring the timeout.
    ///
    /// Any pending environment failure is surfaced first, so a step can
    /// never mask a failure that already occurred. The request is clamped
    /// to the remaining timeout window; the returned delta is what actually
    /// ran.
    pub fn simulation_step(&mut self, from: u64, cycles: u64) -> Result<u64, TestError> {
        if let Some(error) = self.pending.take() {
            return Err(error);
        }
        let delta = if self.timeout > 0 {
            cycles.min(self.timeout - self.idle_cycles)
        } else {
            cycles
        };
        match self.sim.step(delta)? {
            StepOutcome::Ok => {
                self.idle_cycles += delta;
                if self.timeout > 0 && self.idle_cycles >= self.timeout {
                    return Err(TestError::Timeout {
                        cycles: self.timeout,
                    });
                }
                Ok(delta)
            }
            StepOutcome::Interrupted {
                after,
                is_assertion,
                ..
            } => {
                if is_assertion {
                    Err(TestError::AssertionFailed {
                        at_step: from + after,
                    })
                } else {
                    Err(TestError::Stop {
                        at_step: from + after,
                    })
                }
            }
        }
    }
}

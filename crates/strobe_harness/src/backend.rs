//! User-facing backends wiring the checker and scheduler to a simulator.
//!
//! The [`SingleThreadBackend`] serves sequential tests with poke
//! coalescing and the idle-cycle timeout but rejects fork/join. The
//! [`ThreadedBackend`] adds cooperative test threads: peeks and pokes run
//! through the [`AccessChecker`] with the scheduler's view of the active
//! thread, and stepping goes through the [`Scheduler`] so concurrent
//! threads share one clock deterministically.

use num_bigint::BigInt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::access::{AccessChecker, SignalDir, ThreadView};
use crate::error::TestError;
use crate::scheduler::{Scheduler, SimThreadId};
use crate::simulator::{Simulator, StepOutcome};

/// Sequential backend: one test thread, no scheduler.
///
/// Holds its own last-poked map so duplicate pokes are dropped, and counts
/// only user-issued steps.
pub struct SingleThreadBackend<S: Simulator> {
    sim: S,
    clock: String,
    directions: HashMap<String, SignalDir>,
    last_poke: HashMap<String, BigInt>,
    step_count: u64,
    timeout: u64,
    idle_cycles: u64,
}

impl<S: Simulator> SingleThreadBackend<S> {
    /// Wraps a simulator with the design's master clock and IO directions.
    pub fn new(sim: S, clock: &str, directions: &[(String, SignalDir)]) -> Self {
        Self {
            sim,
            clock: clock.to_string(),
            directions: directions.iter().cloned().collect(),
            last_poke: HashMap::new(),
            step_count: 0,
            timeout: 0,
            idle_cycles: 0,
        }
    }

    fn check_clock(&self, clock: &str) -> Result<(), TestError> {
        if clock != self.clock {
            return Err(TestError::NotSupported("clocks other than the master clock"));
        }
        Ok(())
    }

    fn direction(&self, signal: &str) -> Result<SignalDir, TestError> {
        self.directions
            .get(signal)
            .copied()
            .ok_or_else(|| TestError::UnknownSignal(signal.to_string()))
    }

    /// Pokes a signal, dropping writes that repeat the last poked value.
    pub fn poke_bits(&mut self, signal: &str, value: &BigInt) -> Result<(), TestError> {
        if self.direction(signal)? == SignalDir::Output {
            return Err(TestError::UnpokeableSignal(signal.to_string()));
        }
        if self.last_poke.get(signal) == Some(value) {
            return Ok(());
        }
        self.sim.poke(signal, value)?;
        self.last_poke.insert(signal.to_string(), value.clone());
        self.idle_cycles = 0;
        Ok(())
    }

    /// Peeks a signal.
    pub fn peek_bits(&mut self, signal: &str) -> Result<BigInt, TestError> {
        self.direction(signal)?;
        self.sim.peek(signal)
    }

    /// Steps the master clock, honouring the idle-cycle timeout.
    pub fn step(&mut self, clock: &str, cycles: u64) -> Result<(), TestError> {
        self.check_clock(clock)?;
        let delta = if self.timeout > 0 {
            cycles.min(self.timeout - self.idle_cycles)
        } else {
            cycles
        };
        match self.sim.step(delta)? {
            StepOutcome::Ok => {
                self.idle_cycles += delta;
                self.step_count += delta;
                if self.timeout > 0 && self.idle_cycles >= self.timeout {
                    return Err(TestError::Timeout {
                        cycles: self.timeout,
                    });
                }
                Ok(())
            }
            StepOutcome::Interrupted {
                after,
                is_assertion,
                ..
            } => {
                let at_step = self.step_count + after;
                self.step_count = at_step;
                if is_assertion {
                    Err(TestError::AssertionFailed { at_step })
                } else {
                    Err(TestError::Stop { at_step })
                }
            }
        }
    }

    /// The number of user steps taken on the master clock.
    pub fn step_count(&self, clock: &str) -> Result<u64, TestError> {
        self.check_clock(clock)?;
        Ok(self.step_count)
    }

    /// Sets the idle-cycle timeout on the master clock; zero disables it.
    pub fn set_timeout(&mut self, clock: &str, cycles: u64) -> Result<(), TestError> {
        self.check_clock(clock)?;
        self.timeout = cycles;
        self.idle_cycles = 0;
        Ok(())
    }

    /// Forking is a threaded-backend feature.
    pub fn fork(&self) -> Result<SimThreadId, TestError> {
        Err(TestError::NotSupported("fork on the single-thread backend"))
    }

    /// Joining is a threaded-backend feature.
    pub fn join(&self, _ids: &[SimThreadId]) -> Result<(), TestError> {
        Err(TestError::NotSupported("join on the single-thread backend"))
    }

    /// Tears down the underlying simulator.
    pub fn finish(&mut self) -> Result<(), TestError> {
        self.sim.finish()
    }
}

/// Concurrent backend: cooperative test threads over one simulator.
pub struct ThreadedBackend<S: Simulator + 'static> {
    checker: Arc<Mutex<AccessChecker<S>>>,
    scheduler: Arc<Scheduler>,
    clock: String,
}

impl<S: Simulator + 'static> ThreadedBackend<S> {
    /// Builds the full wiring: access checker over the simulator, and a
    /// scheduler whose step callback runs through the checker.
    pub fn new(
        sim: S,
        clock: &str,
        directions: &[(String, SignalDir)],
        comb_paths: &HashMap<String, Vec<String>>,
    ) -> Arc<Self> {
        let checker = Arc::new(Mutex::new(AccessChecker::new(sim, directions, comb_paths)));
        let step_checker = checker.clone();
        let scheduler =
            Scheduler::new(move |from, cycles| step_checker.lock().simulation_step(from, cycles));
        Arc::new(Self {
            checker,
            scheduler,
            clock: clock.to_string(),
        })
    }

    fn check_clock(&self, clock: &str) -> Result<(), TestError> {
        if clock != self.clock {
            return Err(TestError::NotSupported("clocks other than the master clock"));
        }
        Ok(())
    }

    /// Pokes a signal through the access checker.
    pub fn poke_bits(&self, signal: &str, value: &BigInt) -> Result<(), TestError> {
        let id = self.checker.lock().signal_id(signal)?;
        let thread = self.scheduler.active_thread();
        let step = self.scheduler.current_step();
        let is_ancestor = |a: usize, b: usize| self.scheduler.is_ancestor_of(a, b);
        let view = ThreadView {
            thread,
            step,
            is_ancestor_of: &is_ancestor,
        };
        self.checker.lock().poke(id, value, &view)
    }

    /// Peeks a signal through the access checker.
    pub fn peek_bits(&self, signal: &str) -> Result<BigInt, TestError> {
        let id = self.checker.lock().signal_id(signal)?;
        let thread = self.scheduler.active_thread();
        let step = self.scheduler.current_step();
        let is_ancestor = |a: usize, b: usize| self.scheduler.is_ancestor_of(a, b);
        let view = ThreadView {
            thread,
            step,
            is_ancestor_of: &is_ancestor,
        };
        self.checker.lock().peek(id, &view)
    }

    /// Steps the master clock on the active test thread.
    pub fn step(&self, clock: &str, cycles: u64) -> Result<(), TestError> {
        self.check_clock(clock)?;
        self.scheduler.step(cycles)
    }

    /// The scheduler's current step.
    pub fn step_count(&self, clock: &str) -> Result<u64, TestError> {
        self.check_clock(clock)?;
        Ok(self.scheduler.current_step())
    }

    /// Sets the idle-cycle timeout on the master clock; zero disables it.
    pub fn set_timeout(&self, clock: &str, cycles: u64) -> Result<(), TestError> {
        self.check_clock(clock)?;
        self.checker.lock().set_timeout(cycles);
        Ok(())
    }

    /// Installs an environment failure surfaced by the next step.
    pub fn set_pending_failure(&self, error: TestError) {
        self.checker.lock().set_pending_failure(error);
    }

    /// Forks a test thread running `body`.
    pub fn fork<F>(self: &Arc<Self>, body: F, name: Option<&str>) -> Result<SimThreadId, TestError>
    where
        F: FnOnce() -> Result<(), TestError> + Send + 'static,
    {
        self.scheduler.fork(name, body)
    }

    /// Joins the given threads in order.
    pub fn join(&self, ids: &[SimThreadId]) -> Result<(), TestError> {
        self.scheduler.join(ids)
    }

    /// Runs a test on the main thread, joins every forked thread and tears
    /// the simulator down. The first failure wins; teardown always runs.
    pub fn run<F>(self: &Arc<Self>, test: F) -> Result<(), TestError>
    where
        F: FnOnce(&Arc<Self>) -> Result<(), TestError>,
    {
        let result = test(self);
        let joined = self.scheduler.finish_main();
        let finished = self.checker.lock().finish();
        result.and(joined).and(finished)
    }

    /// Whether the underlying simulator collects coverage.
    pub fn supports_coverage(&self) -> bool {
        self.checker.lock().supports_coverage()
    }

    /// Coverage counters from the underlying simulator.
    pub fn coverage(&self) -> Result<HashMap<String, u64>, TestError> {
        self.checker.lock().coverage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictKind;
    use crate::simulator::test_support::MockSim;

    fn directions() -> Vec<(String, SignalDir)> {
        vec![
            ("io_x".to_string(), SignalDir::Input),
            ("io_y".to_string(), SignalDir::Input),
            ("io_out".to_string(), SignalDir::Output),
        ]
    }

    fn no_paths() -> HashMap<String, Vec<String>> {
        HashMap::new()
    }

    // ---- single-thread backend ----

    #[test]
    fn single_poke_coalesces_duplicates() {
        let sim = MockSim::new();
        let pokes = sim.pokes.clone();
        let mut backend = SingleThreadBackend::new(sim, "clock", &directions());
        for _ in 0..50 {
            backend.poke_bits("io_x", &BigInt::from(3)).unwrap();
        }
        assert_eq!(pokes.lock().len(), 1);
        backend.poke_bits("io_x", &BigInt::from(4)).unwrap();
        assert_eq!(pokes.lock().len(), 2);
    }

    #[test]
    fn single_rejects_output_poke_and_unknown_names() {
        let mut backend = SingleThreadBackend::new(MockSim::new(), "clock", &directions());
        assert!(matches!(
            backend.poke_bits("io_out", &BigInt::from(1)),
            Err(TestError::UnpokeableSignal(_))
        ));
        assert!(matches!(
            backend.poke_bits("io_q", &BigInt::from(1)),
            Err(TestError::UnknownSignal(_))
        ));
        assert!(matches!(
            backend.peek_bits("io_q"),
            Err(TestError::UnknownSignal(_))
        ));
    }

    #[test]
    fn single_counts_user_steps() {
        let mut backend = SingleThreadBackend::new(MockSim::new(), "clock", &directions());
        backend.step("clock", 3).unwrap();
        backend.step("clock", 4).unwrap();
        assert_eq!(backend.step_count("clock").unwrap(), 7);
    }

    #[test]
    fn single_rejects_foreign_clock() {
        let mut backend = SingleThreadBackend::new(MockSim::new(), "clock", &directions());
        assert!(matches!(
            backend.step("other_clock", 1),
            Err(TestError::NotSupported(_))
        ));
        assert!(matches!(
            backend.set_timeout("other_clock", 10),
            Err(TestError::NotSupported(_))
        ));
    }

    #[test]
    fn single_fork_join_not_supported() {
        let backend = SingleThreadBackend::new(MockSim::new(), "clock", &directions());
        assert!(matches!(backend.fork(), Err(TestError::NotSupported(_))));
        assert!(matches!(
            backend.join(&[1]),
            Err(TestError::NotSupported(_))
        ));
    }

    #[test]
    fn single_coalesced_pokes_accumulate_timeout() {
        // Fifty identical pokes with one-cycle steps never reset the idle
        // counter, so a later large step times out at exactly cycle 100.
        let sim = MockSim::new();
        let pokes = sim.pokes.clone();
        let cycles = sim.cycles.clone();
        let mut backend = SingleThreadBackend::new(sim, "clock", &directions());
        backend.set_timeout("clock", 100).unwrap();
        for _ in 0..50 {
            backend.poke_bits("io_x", &BigInt::from(3)).unwrap();
            backend.step("clock", 1).unwrap();
        }
        assert_eq!(pokes.lock().len(), 1);
        let err = backend.step("clock", 100).unwrap_err();
        assert!(matches!(err, TestError::Timeout { cycles: 100 }));
        assert_eq!(*cycles.lock(), 100);
    }

    #[test]
    fn single_timeout_reset_by_changing_poke() {
        let mut backend = SingleThreadBackend::new(MockSim::new(), "clock", &directions());
        backend.set_timeout("clock", 10).unwrap();
        backend.step("clock", 5).unwrap();
        backend.poke_bits("io_x", &BigInt::from(7)).unwrap();
        backend.step("clock", 9).unwrap();
        assert!(matches!(
            backend.step("clock", 1),
            Err(TestError::Timeout { cycles: 10 })
        ));
    }

    #[test]
    fn single_interrupted_step_maps_to_assertion() {
        let mut sim = MockSim::new();
        sim.interrupt_at = Some((4, true));
        let mut backend = SingleThreadBackend::new(sim, "clock", &directions());
        assert!(matches!(
            backend.step("clock", 10),
            Err(TestError::AssertionFailed { at_step: 4 })
        ));
    }

    // ---- threaded backend ----

    #[test]
    fn threaded_poke_step_peek_roundtrip() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        backend.poke_bits("io_x", &BigInt::from(5)).unwrap();
        backend.step("clock", 1).unwrap();
        assert_eq!(backend.peek_bits("io_x").unwrap(), BigInt::from(5));
        assert_eq!(backend.step_count("clock").unwrap(), 1);
    }

    #[test]
    fn threaded_rejects_foreign_clock() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        assert!(matches!(
            backend.step("sys_clk", 1),
            Err(TestError::NotSupported(_))
        ));
    }

    #[test]
    fn threaded_child_peek_of_parent_poke_conflicts() {
        // The parent pokes, then forks a child that peeks the same signal
        // in the same tick: the child fails with a thread-order error.
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        backend.poke_bits("io_x", &BigInt::from(3)).unwrap();
        let b = backend.clone();
        let child = backend
            .fork(
                move || {
                    let err = b.peek_bits("io_x").unwrap_err();
                    assert!(matches!(
                        err,
                        TestError::ThreadOrderDependent {
                            kind: ConflictKind::Poke,
                            ..
                        }
                    ));
                    Ok(())
                },
                Some("peeker"),
            )
            .unwrap();
        backend.join(&[child]).unwrap();
    }

    #[test]
    fn threaded_parent_may_read_joined_child_poke() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        let b = backend.clone();
        let child = backend
            .fork(
                move || {
                    b.poke_bits("io_y", &BigInt::from(9))?;
                    Ok(())
                },
                Some("poker"),
            )
            .unwrap();
        backend.join(&[child]).unwrap();
        // Same tick, but the child is a descendant of main: allowed.
        assert_eq!(backend.peek_bits("io_y").unwrap(), BigInt::from(9));
    }

    #[test]
    fn threaded_fork_join_ordering() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        let log = Arc::new(Mutex::new(Vec::new()));

        let (ba, la) = (backend.clone(), log.clone());
        let a = backend
            .fork(
                move || {
                    ba.step("clock", 3)?;
                    la.lock().push("a");
                    Ok(())
                },
                Some("a"),
            )
            .unwrap();
        let (bb, lb) = (backend.clone(), log.clone());
        let b = backend
            .fork(
                move || {
                    bb.step("clock", 3)?;
                    lb.lock().push("b");
                    Ok(())
                },
                Some("b"),
            )
            .unwrap();

        backend.join(&[a, b]).unwrap();
        assert_eq!(log.lock().as_slice(), &["a", "b"]);
    }

    #[test]
    fn threaded_timeout_through_scheduler() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        backend.set_timeout("clock", 10).unwrap();
        let err = backend.step("clock", 10).unwrap_err();
        assert!(matches!(err, TestError::Timeout { cycles: 10 }));
    }

    #[test]
    fn threaded_pending_failure_surfaces_before_step() {
        let backend = ThreadedBackend::new(MockSim::new(), "clock", &directions(), &no_paths());
        backend.set_pending_failure(TestError::AssertionFailed { at_step: 3 });
        assert!(matches!(
            backend.step("clock", 1),
            Err(TestError::AssertionFailed { at_step: 3 })
        ));
    }

    #[test]
    fn threaded_run_tears_down_simulator() {
        let sim = MockSim::new();
        let finished = sim.finished.clone();
        let backend = ThreadedBackend::new(sim, "clock", &directions(), &no_paths());
        backend
            .run(|b| {
                b.poke_bits("io_x", &BigInt::from(1))?;
                b.step("clock", 2)?;
                Ok(())
            })
            .unwrap();
        assert!(*finished.lock());
    }

    #[test]
    fn threaded_run_reports_child_error_after_teardown() {
        let sim = MockSim::new();
        let finished = sim.finished.clone();
        let backend = ThreadedBackend::new(sim, "clock", &directions(), &no_paths());
        let err = backend
            .run(|b| {
                let inner = b.clone();
                b.fork(
                    move || {
                        inner.step("clock", 1)?;
                        Err(TestError::AssertionFailed { at_step: 1 })
                    },
                    Some("failing"),
                )?;
                b.step("clock", 5)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, TestError::AssertionFailed { at_step: 1 }));
        assert!(*finished.lock());
    }
}

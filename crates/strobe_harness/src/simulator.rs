//! The underlying simulator contract and the in-process engine adapter.
//!
//! The harness drives any cycle-stepped simulator through [`Simulator`]:
//! name-addressed peek/poke, a bulk `step` that may be interrupted by an
//! assertion or stop, a teardown hook and optional coverage counters.
//! [`EngineSimulator`] implements the contract on top of
//! [`strobe_engine::Simulation`].

use num_bigint::BigInt;
use std::collections::HashMap;

use strobe_engine::{Simulation, SymbolKind};

use crate::access::SignalDir;
use crate::error::TestError;

/// What happened while the simulator advanced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// All requested cycles ran.
    Ok,
    /// The run stopped early.
    Interrupted {
        /// Cycles completed before the interruption.
        after: u64,
        /// `true` for a failed assertion, `false` for an orderly stop.
        is_assertion: bool,
        /// Human-readable payload from the simulator.
        message: String,
    },
}

/// A cycle-stepped simulator the harness can drive.
pub trait Simulator: Send {
    /// Advances the design by up to `cycles` clock cycles.
    fn step(&mut self, cycles: u64) -> Result<StepOutcome, TestError>;

    /// Reads a signal by name as an unsigned big integer.
    fn peek(&mut self, name: &str) -> Result<BigInt, TestError>;

    /// Writes a signal by name.
    fn poke(&mut self, name: &str, value: &BigInt) -> Result<(), TestError>;

    /// Flushes waveforms and terminates any external process.
    fn finish(&mut self) -> Result<(), TestError>;

    /// Whether [`Simulator::coverage`] returns real data.
    fn supports_coverage(&self) -> bool {
        false
    }

    /// Coverage counters by point name.
    fn coverage(&mut self) -> Result<HashMap<String, u64>, TestError> {
        Err(TestError::NotSupported("coverage collection"))
    }
}

/// Adapter driving the in-process evaluation engine as a [`Simulator`].
pub struct EngineSimulator {
    sim: Simulation,
    directions: Vec<(String, SignalDir)>,
    comb_paths: HashMap<String, Vec<String>>,
}

impl EngineSimulator {
    /// Wraps an engine simulation, deriving the IO metadata the access
    /// checker consumes.
    ///
    /// Clock symbols are excluded from the direction list: the clock is
    /// driven by stepping, never by a poke.
    pub fn new(sim: Simulation) -> Self {
        let directions = sim
            .info()
            .iter()
            .filter(|(_, s)| !s.clock && !s.is_memory())
            .filter_map(|(_, s)| match s.kind {
                SymbolKind::Input => Some((s.name.clone(), SignalDir::Input)),
                SymbolKind::Output => Some((s.name.clone(), SignalDir::Output)),
                _ => None,
            })
            .collect();
        let comb_paths = sim.combinational_io_paths();
        Self {
            sim,
            directions,
            comb_paths,
        }
    }

    /// The design's IO signals in declaration order.
    pub fn directions(&self) -> &[(String, SignalDir)] {
        &self.directions
    }

    /// The design's combinational sink-to-sources map.
    pub fn comb_paths(&self) -> &HashMap<String, Vec<String>> {
        &self.comb_paths
    }

    /// The design clock name, if one is declared.
    pub fn clock_name(&self) -> Option<&str> {
        self.sim.clock_name()
    }
}

impl Simulator for EngineSimulator {
    fn step(&mut self, cycles: u64) -> Result<StepOutcome, TestError> {
        for _ in 0..cycles {
            self.sim.step();
        }
        Ok(StepOutcome::Ok)
    }

    fn peek(&mut self, name: &str) -> Result<BigInt, TestError> {
        let id = self
            .sim
            .symbol_id(name)
            .map_err(|_| TestError::UnknownSignal(name.to_string()))?;
        self.sim.peek(id).map_err(|e| match e {
            // Array symbols have no scalar cell to read.
            strobe_engine::EngineError::ClassMismatch { .. } => {
                TestError::UnpeekableSignal(name.to_string())
            }
            other => other.into(),
        })
    }

    fn poke(&mut self, name: &str, value: &BigInt) -> Result<(), TestError> {
        let id = self
            .sim
            .symbol_id(name)
            .map_err(|_| TestError::UnknownSignal(name.to_string()))?;
        self.sim.poke(id, value).map_err(|e| match e {
            strobe_engine::EngineError::ClassMismatch { .. } => {
                TestError::UnpokeableSignal(name.to_string())
            }
            other => other.into(),
        })
    }

    fn finish(&mut self) -> Result<(), TestError> {
        Ok(())
    }
}

/// Shared mock simulator for harness tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every poke and step; optionally interrupts at a scripted
    /// cycle count.
    pub struct MockSim {
        pub pokes: Arc<Mutex<Vec<(String, BigInt)>>>,
        pub values: Arc<Mutex<HashMap<String, BigInt>>>,
        pub cycles: Arc<Mutex<u64>>,
        pub interrupt_at: Option<(u64, bool)>,
        pub finished: Arc<Mutex<bool>>,
    }

    impl MockSim {
        pub fn new() -> Self {
            Self {
                pokes: Arc::new(Mutex::new(Vec::new())),
                values: Arc::new(Mutex::new(HashMap::new())),
                cycles: Arc::new(Mutex::new(0)),
                interrupt_at: None,
                finished: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl Simulator for MockSim {
        fn step(&mut self, cycles: u64) -> Result<StepOutcome, TestError> {
            let mut total = self.cycles.lock();
            if let Some((at, is_assertion)) = self.interrupt_at {
                if *total + cycles >= at {
                    let after = at - *total;
                    *total = at;
                    return Ok(StepOutcome::Interrupted {
                        after,
                        is_assertion,
                        message: "scripted interruption".into(),
                    });
                }
            }
            *total += cycles;
            Ok(StepOutcome::Ok)
        }

        fn peek(&mut self, name: &str) -> Result<BigInt, TestError> {
            Ok(self
                .values
                .lock()
                .get(name)
                .cloned()
                .unwrap_or_else(|| BigInt::from(0)))
        }

        fn poke(&mut self, name: &str, value: &BigInt) -> Result<(), TestError> {
            self.pokes.lock().push((name.to_string(), value.clone()));
            self.values.lock().insert(name.to_string(), value.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<(), TestError> {
            *self.finished.lock() = true;
            Ok(())
        }
    }
}

//! Test-harness error types.
//!
//! Every failure a test can observe is a tagged value of [`TestError`];
//! errors are never used for ordinary control flow. Errors raised in a
//! forked thread are recorded by the scheduler and surface on the main
//! thread's next join.

use strobe_engine::EngineError;

/// The way a cross-thread access conflicted with an earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// The signal itself was poked by an unrelated thread this tick.
    Poke,
    /// The signal itself was peeked by an unrelated thread this tick.
    Peek,
    /// A combinational source of the peeked signal was poked this tick.
    PokeOnDependent,
    /// A combinational dependent of the poked signal was peeked this tick.
    PeekOnDependent,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poke => write!(f, "conflicting poke"),
            Self::Peek => write!(f, "conflicting peek"),
            Self::PokeOnDependent => write!(f, "conflicting poke on a combinational source"),
            Self::PeekOnDependent => write!(f, "conflicting peek on a combinational dependent"),
        }
    }
}

/// Errors surfaced to test code by the backends and the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// A signal name is not part of the design's IO.
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    /// The signal cannot be poked (it is an output).
    #[error("signal '{0}' cannot be poked")]
    UnpokeableSignal(String),

    /// The signal cannot be peeked.
    #[error("signal '{0}' cannot be peeked")]
    UnpeekableSignal(String),

    /// Two unrelated threads touched the same signal in one tick.
    #[error("thread-order dependent access to '{signal}': {kind}")]
    ThreadOrderDependent {
        /// The signal whose access records collided.
        signal: String,
        /// How the accesses collided.
        kind: ConflictKind,
    },

    /// The idle-cycle counter reached the configured limit.
    #[error("timeout after {cycles} idle cycles without a value-changing poke")]
    Timeout {
        /// The configured timeout.
        cycles: u64,
    },

    /// The underlying simulator reported a failed assertion.
    #[error("assertion failed at step {at_step}")]
    AssertionFailed {
        /// The absolute step the assertion fired at.
        at_step: u64,
    },

    /// The underlying simulator requested a stop.
    #[error("simulation stopped at step {at_step}")]
    Stop {
        /// The absolute step the stop fired at.
        at_step: u64,
    },

    /// No thread could be scheduled.
    #[error("deadlock: no test thread can make progress")]
    Deadlock,

    /// The operation is not available on this backend.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The underlying native harness died unexpectedly.
    #[error("simulator exited early")]
    SimulatorExitedEarly,

    /// An engine-level failure bubbled through the harness.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_kind_display() {
        assert_eq!(ConflictKind::Poke.to_string(), "conflicting poke");
        assert_eq!(
            ConflictKind::PeekOnDependent.to_string(),
            "conflicting peek on a combinational dependent"
        );
    }

    #[test]
    fn thread_order_dependent_display() {
        let e = TestError::ThreadOrderDependent {
            signal: "io_x".into(),
            kind: ConflictKind::Poke,
        };
        assert_eq!(
            e.to_string(),
            "thread-order dependent access to 'io_x': conflicting poke"
        );
    }

    #[test]
    fn timeout_display() {
        let e = TestError::Timeout { cycles: 100 };
        assert_eq!(
            e.to_string(),
            "timeout after 100 idle cycles without a value-changing poke"
        );
    }

    #[test]
    fn deadlock_display() {
        assert_eq!(
            TestError::Deadlock.to_string(),
            "deadlock: no test thread can make progress"
        );
    }

    #[test]
    fn engine_error_is_transparent() {
        let e: TestError = EngineError::UnknownSymbol("q".into()).into();
        assert_eq!(e.to_string(), "unknown symbol: q");
    }
}

//! Error types for executable construction and the simulation façade.

use crate::value::WidthClass;

/// Errors that can occur while building or driving an executable.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A symbol name was looked up but never declared.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A symbol name was declared twice.
    #[error("symbol '{name}' is already declared")]
    DuplicateSymbol {
        /// The conflicting name.
        name: String,
    },

    /// A symbol was declared with an unusable width.
    #[error("invalid width {width} for symbol '{name}'")]
    InvalidWidth {
        /// The symbol name.
        name: String,
        /// The rejected width.
        width: u32,
    },

    /// A typed peek or poke used the wrong value class for the symbol.
    #[error("symbol '{name}' holds {actual} values, not {requested}")]
    ClassMismatch {
        /// The symbol name.
        name: String,
        /// The class the symbol was declared with.
        actual: WidthClass,
        /// The class the caller asked for.
        requested: WidthClass,
    },

    /// An element access was attempted on a scalar symbol.
    #[error("symbol '{name}' is not a memory")]
    NotAMemory {
        /// The symbol name.
        name: String,
    },

    /// A memory element index was out of range.
    #[error("element {offset} out of range for memory '{name}' ({elements} elements)")]
    ElementOutOfRange {
        /// The memory symbol name.
        name: String,
        /// The rejected element index.
        offset: usize,
        /// The declared element count.
        elements: usize,
    },
}

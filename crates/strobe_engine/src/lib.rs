//! Cycle-accurate evaluation engine for compiled synchronous designs.
//!
//! This crate executes a design that an external compiler has lowered into
//! an ordered list of store operations over three flat storage classes:
//! single bits, values up to 64 bits and arbitrary-precision values. One
//! call to [`Simulation::step`] runs every store once (one clock tick)
//! with bit-exact hardware semantics enforced by compile-time masks.
//!
//! # Architecture
//!
//! The symbol table assigns every named entity a storage class and a dense
//! index at compile time. Expression trees are immutable tagged sums whose
//! loads address storage by index, so evaluation needs nothing but a shared
//! borrow of the [`DataStore`] and a cloned store doubles as a state
//! snapshot.
//!
//! # Modules
//!
//! - `arena` — Dense ID-indexed storage
//! - `error` — Engine error types
//! - `value` — Width classes, masks and boundary values
//! - `symbol` — Symbol table and storage index assignment
//! - `storage` — Flat value storage
//! - `expr` — Typed expression trees
//! - `store` — Compiled assignments
//! - `executable` — The compiled unit and its tick loop
//! - `sim` — Peek/poke/step façade

#![warn(missing_docs)]

pub mod arena;
pub mod error;
pub mod executable;
pub mod expr;
pub mod sim;
pub mod storage;
pub mod store;
pub mod symbol;
pub mod value;

pub use error::EngineError;
pub use executable::Executable;
pub use expr::{BigExpr, BoolExpr, LongExpr};
pub use sim::Simulation;
pub use storage::DataStore;
pub use store::StoreOp;
pub use symbol::{Symbol, SymbolId, SymbolKind, SymbolTable};
pub use value::{big_mask, long_mask, Value, WidthClass};

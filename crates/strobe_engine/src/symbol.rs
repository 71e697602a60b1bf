//! Symbol table for compiled executables.
//!
//! A [`Symbol`] describes one named entity of the design (a port, register
//! or internal node) together with the storage class and dense storage
//! index assigned to it at compile time. The [`SymbolTable`] owns every
//! symbol, resolves names to [`SymbolId`]s and hands out storage indices
//! that are unique within each width class.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::arena::{Arena, ArenaId};
use crate::error::EngineError;
use crate::value::WidthClass;

/// Opaque ID for a symbol in a compiled executable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Creates a `SymbolId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for SymbolId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// What role a symbol plays in the design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// A top-level input port.
    Input,
    /// A top-level output port.
    Output,
    /// A clocked state element.
    Register,
    /// An internal combinational node.
    Node,
}

/// A named entity in a compiled executable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Symbol {
    /// The declared name.
    pub name: String,
    /// The symbol's role.
    pub kind: SymbolKind,
    /// Declared bit width, at least 1.
    pub width: u32,
    /// Whether the front end declared the symbol signed.
    pub signed: bool,
    /// Whether this symbol is the design clock.
    pub clock: bool,
    /// The storage class chosen from the width at compile time.
    pub class: WidthClass,
    /// Dense index into the storage vector for `class` (or into the
    /// memory vector for array symbols).
    pub index: usize,
    /// `Some(n)` for array symbols backed by an n-element memory.
    pub elements: Option<usize>,
}

impl Symbol {
    /// Returns `true` if this symbol is backed by a memory.
    pub fn is_memory(&self) -> bool {
        self.elements.is_some()
    }
}

/// All symbols of an executable, with name resolution and index assignment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Arena<SymbolId, Symbol>,
    by_name: HashMap<String, SymbolId>,
    bool_cells: usize,
    long_cells: usize,
    big_cells: usize,
    long_mem_sizes: Vec<usize>,
    big_mem_sizes: Vec<usize>,
}

impl SymbolTable {
    /// Creates an empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a scalar symbol and assigns it a storage cell.
    pub fn add(
        &mut self,
        name: &str,
        kind: SymbolKind,
        width: u32,
        signed: bool,
        clock: bool,
    ) -> Result<SymbolId, EngineError> {
        if width == 0 || (clock && width != 1) {
            return Err(EngineError::InvalidWidth {
                name: name.to_string(),
                width,
            });
        }
        if self.by_name.contains_key(name) {
            return Err(EngineError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        let class = WidthClass::for_width(width);
        let index = match class {
            WidthClass::Bool => {
                self.bool_cells += 1;
                self.bool_cells - 1
            }
            WidthClass::Long => {
                self.long_cells += 1;
                self.long_cells - 1
            }
            WidthClass::Big => {
                self.big_cells += 1;
                self.big_cells - 1
            }
        };
        let id = self.symbols.alloc(Symbol {
            name: name.to_string(),
            kind,
            width,
            signed,
            clock,
            class,
            index,
            elements: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declares an array symbol backed by a linear memory.
    ///
    /// Memories are never clocks. Single-bit memories share the long-element
    /// storage with everything up to 64 bits wide.
    pub fn add_memory(
        &mut self,
        name: &str,
        kind: SymbolKind,
        width: u32,
        elements: usize,
    ) -> Result<SymbolId, EngineError> {
        if width == 0 || elements == 0 {
            return Err(EngineError::InvalidWidth {
                name: name.to_string(),
                width,
            });
        }
        if self.by_name.contains_key(name) {
            return Err(EngineError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        let class = if width <= 64 {
            WidthClass::Long
        } else {
            WidthClass::Big
        };
        let index = match class {
            WidthClass::Long => {
                self.long_mem_sizes.push(elements);
                self.long_mem_sizes.len() - 1
            }
            _ => {
                self.big_mem_sizes.push(elements);
                self.big_mem_sizes.len() - 1
            }
        };
        let id = self.symbols.alloc(Symbol {
            name: name.to_string(),
            kind,
            width,
            signed: false,
            clock: false,
            class,
            index,
            elements: Some(elements),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolves a name to its symbol ID.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    /// Returns the symbol with the given ID.
    pub fn get(&self, id: SymbolId) -> &Symbol {
        self.symbols.get(id)
    }

    /// Returns the number of declared symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if no symbols are declared.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates over `(id, symbol)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter()
    }

    /// Number of scalar `bool` cells assigned so far.
    pub fn bool_cells(&self) -> usize {
        self.bool_cells
    }

    /// Number of scalar `i64` cells assigned so far.
    pub fn long_cells(&self) -> usize {
        self.long_cells
    }

    /// Number of scalar big-integer cells assigned so far.
    pub fn big_cells(&self) -> usize {
        self.big_cells
    }

    /// Element counts of the long-element memories, in index order.
    pub fn long_mem_sizes(&self) -> &[usize] {
        &self.long_mem_sizes
    }

    /// Element counts of the big-element memories, in index order.
    pub fn big_mem_sizes(&self) -> &[usize] {
        &self.big_mem_sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_dense_indices_per_class() {
        let mut t = SymbolTable::new();
        let clk = t.add("clock", SymbolKind::Input, 1, false, true).unwrap();
        let a = t.add("io_a", SymbolKind::Input, 32, false, false).unwrap();
        let b = t.add("io_b", SymbolKind::Input, 32, false, false).unwrap();
        let v = t.add("io_v", SymbolKind::Output, 1, false, false).unwrap();
        let w = t.add("wide", SymbolKind::Register, 80, false, false).unwrap();

        assert_eq!(t.get(clk).index, 0);
        assert_eq!(t.get(v).index, 1);
        assert_eq!(t.get(a).index, 0);
        assert_eq!(t.get(b).index, 1);
        assert_eq!(t.get(w).index, 0);
        assert_eq!(t.get(w).class, WidthClass::Big);
        assert_eq!(t.bool_cells(), 2);
        assert_eq!(t.long_cells(), 2);
        assert_eq!(t.big_cells(), 1);
    }

    #[test]
    fn lookup_finds_declared_names() {
        let mut t = SymbolTable::new();
        let id = t.add("io_z", SymbolKind::Output, 16, false, false).unwrap();
        assert_eq!(t.lookup("io_z"), Some(id));
        assert_eq!(t.lookup("io_q"), None);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut t = SymbolTable::new();
        t.add("x", SymbolKind::Register, 8, false, false).unwrap();
        assert!(matches!(
            t.add("x", SymbolKind::Register, 8, false, false),
            Err(EngineError::DuplicateSymbol { .. })
        ));
    }

    #[test]
    fn zero_width_rejected() {
        let mut t = SymbolTable::new();
        assert!(matches!(
            t.add("x", SymbolKind::Node, 0, false, false),
            Err(EngineError::InvalidWidth { .. })
        ));
    }

    #[test]
    fn wide_clock_rejected() {
        let mut t = SymbolTable::new();
        assert!(matches!(
            t.add("clock", SymbolKind::Input, 2, false, true),
            Err(EngineError::InvalidWidth { .. })
        ));
    }

    #[test]
    fn memory_indices_and_sizes() {
        let mut t = SymbolTable::new();
        let m1 = t.add_memory("ram", SymbolKind::Register, 8, 16).unwrap();
        let m2 = t.add_memory("rom", SymbolKind::Register, 32, 4).unwrap();
        let m3 = t.add_memory("wide", SymbolKind::Register, 128, 2).unwrap();
        assert_eq!(t.get(m1).index, 0);
        assert_eq!(t.get(m2).index, 1);
        assert_eq!(t.get(m3).index, 0);
        assert!(t.get(m1).is_memory());
        assert_eq!(t.long_mem_sizes(), &[16, 4]);
        assert_eq!(t.big_mem_sizes(), &[2]);
    }

    #[test]
    fn zero_element_memory_rejected() {
        let mut t = SymbolTable::new();
        assert!(matches!(
            t.add_memory("ram", SymbolKind::Register, 8, 0),
            Err(EngineError::InvalidWidth { .. })
        ));
    }

    #[test]
    fn serde_roundtrip_table() {
        let mut t = SymbolTable::new();
        t.add("clock", SymbolKind::Input, 1, false, true).unwrap();
        t.add("io_a", SymbolKind::Input, 32, false, false).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: SymbolTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.lookup("io_a"), t.lookup("io_a"));
    }
}

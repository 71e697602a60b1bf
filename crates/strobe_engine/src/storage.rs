//! Flat value storage for one executable.
//!
//! [`DataStore`] holds every signal value of a running design: one dense
//! vector per scalar width class and one vector of memories per memory
//! element class, all sized from the symbol table. Loads and stores address
//! cells by the indices assigned at compile time, so a cloned store is
//! immediately usable as a state snapshot.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::symbol::SymbolTable;

/// The complete mutable state of an executable.
///
/// During evaluation only store operations write to it; between ticks the
/// simulation façade reads and writes cells on behalf of peek and poke.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    /// Single-bit cells.
    pub bools: Vec<bool>,
    /// Cells of width 2..=64, two's complement.
    pub longs: Vec<i64>,
    /// Cells wider than 64 bits, non-negative.
    pub bigs: Vec<BigInt>,
    /// Memories with elements up to 64 bits wide.
    pub long_mems: Vec<Vec<i64>>,
    /// Memories with elements wider than 64 bits.
    pub big_mems: Vec<Vec<BigInt>>,
}

impl DataStore {
    /// Allocates zero-initialized storage for every cell the table declares.
    pub fn for_table(info: &SymbolTable) -> Self {
        Self {
            bools: vec![false; info.bool_cells()],
            longs: vec![0; info.long_cells()],
            bigs: vec![BigInt::zero(); info.big_cells()],
            long_mems: info.long_mem_sizes().iter().map(|&n| vec![0; n]).collect(),
            big_mems: info
                .big_mem_sizes()
                .iter()
                .map(|&n| vec![BigInt::zero(); n])
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    #[test]
    fn sized_from_table() {
        let mut t = SymbolTable::new();
        t.add("en", SymbolKind::Input, 1, false, false).unwrap();
        t.add("a", SymbolKind::Input, 8, false, false).unwrap();
        t.add("b", SymbolKind::Register, 64, false, false).unwrap();
        t.add("w", SymbolKind::Register, 100, false, false).unwrap();
        t.add_memory("ram", SymbolKind::Register, 16, 8).unwrap();
        t.add_memory("wram", SymbolKind::Register, 96, 2).unwrap();

        let d = DataStore::for_table(&t);
        assert_eq!(d.bools.len(), 1);
        assert_eq!(d.longs.len(), 2);
        assert_eq!(d.bigs.len(), 1);
        assert_eq!(d.long_mems.len(), 1);
        assert_eq!(d.long_mems[0].len(), 8);
        assert_eq!(d.big_mems.len(), 1);
        assert_eq!(d.big_mems[0].len(), 2);
    }

    #[test]
    fn starts_zeroed() {
        let mut t = SymbolTable::new();
        t.add("a", SymbolKind::Input, 8, false, false).unwrap();
        t.add("w", SymbolKind::Register, 80, false, false).unwrap();
        let d = DataStore::for_table(&t);
        assert_eq!(d.longs[0], 0);
        assert!(d.bigs[0].is_zero());
    }

    #[test]
    fn clone_is_independent_snapshot() {
        let mut t = SymbolTable::new();
        t.add("a", SymbolKind::Input, 8, false, false).unwrap();
        let mut d = DataStore::for_table(&t);
        let snapshot = d.clone();
        d.longs[0] = 42;
        assert_eq!(snapshot.longs[0], 0);
        assert_eq!(d.longs[0], 42);
    }
}

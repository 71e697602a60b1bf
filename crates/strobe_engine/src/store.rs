//! Store operations: the compiled assignments executed once per tick.
//!
//! A [`StoreOp`] pairs one destination cell with the expression tree that
//! produces its next value. The executable runs its store list in compile
//! order; that order is a topological order of the design's combinational
//! dependencies, so every read of a node observes the value produced
//! earlier in the same tick.

use serde::{Deserialize, Serialize};

use crate::expr::{BigExpr, BoolExpr, LongExpr};
use crate::storage::DataStore;

/// One compiled assignment into a storage cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StoreOp {
    /// Writes a single-bit cell.
    Bool {
        /// Destination index into the `bool` cells.
        index: usize,
        /// The value tree.
        expr: BoolExpr,
    },
    /// Writes an `i64` cell.
    Long {
        /// Destination index into the long cells.
        index: usize,
        /// The value tree.
        expr: LongExpr,
    },
    /// Writes a big-integer cell.
    Big {
        /// Destination index into the big cells.
        index: usize,
        /// The value tree.
        expr: BigExpr,
    },
    /// Writes one element of a long-element memory.
    ///
    /// Out-of-range addresses drop the write.
    LongMem {
        /// The memory index.
        mem: usize,
        /// The element address.
        addr: LongExpr,
        /// The value tree.
        expr: LongExpr,
    },
    /// Writes one element of a big-element memory.
    ///
    /// Out-of-range addresses drop the write.
    BigMem {
        /// The memory index.
        mem: usize,
        /// The element address.
        addr: LongExpr,
        /// The value tree.
        expr: BigExpr,
    },
}

impl StoreOp {
    /// Evaluates the root expression and writes the destination cell.
    pub fn execute(&self, data: &mut DataStore) {
        match self {
            Self::Bool { index, expr } => {
                let v = expr.eval(data);
                data.bools[*index] = v;
            }
            Self::Long { index, expr } => {
                let v = expr.eval(data);
                data.longs[*index] = v;
            }
            Self::Big { index, expr } => {
                let v = expr.eval(data);
                data.bigs[*index] = v;
            }
            Self::LongMem { mem, addr, expr } => {
                let a = addr.eval(data);
                let v = expr.eval(data);
                if let Ok(i) = usize::try_from(a) {
                    if let Some(cell) = data.long_mems[*mem].get_mut(i) {
                        *cell = v;
                    }
                }
            }
            Self::BigMem { mem, addr, expr } => {
                let a = addr.eval(data);
                let v = expr.eval(data);
                if let Ok(i) = usize::try_from(a) {
                    if let Some(cell) = data.big_mems[*mem].get_mut(i) {
                        *cell = v;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_traits::Zero;

    fn empty_store() -> DataStore {
        DataStore {
            bools: vec![false; 2],
            longs: vec![0; 3],
            bigs: vec![BigInt::zero(); 2],
            long_mems: vec![vec![0; 4]],
            big_mems: vec![vec![BigInt::zero(); 2]],
        }
    }

    #[test]
    fn bool_store_writes_destination() {
        let mut d = empty_store();
        let op = StoreOp::Bool {
            index: 1,
            expr: BoolExpr::Const(true),
        };
        op.execute(&mut d);
        assert!(d.bools[1]);
        assert!(!d.bools[0]);
    }

    #[test]
    fn long_store_reads_then_writes() {
        let mut d = empty_store();
        d.longs[0] = 20;
        let op = StoreOp::Long {
            index: 1,
            expr: LongExpr::Add(
                Box::new(LongExpr::Load(0)),
                Box::new(LongExpr::Const(22)),
            ),
        };
        op.execute(&mut d);
        assert_eq!(d.longs[1], 42);
    }

    #[test]
    fn big_store_writes_destination() {
        let mut d = empty_store();
        let op = StoreOp::Big {
            index: 0,
            expr: BigExpr::Const(BigInt::from(9) << 90),
        };
        op.execute(&mut d);
        assert_eq!(d.bigs[0], BigInt::from(9) << 90);
    }

    #[test]
    fn mem_store_in_and_out_of_range() {
        let mut d = empty_store();
        let write = |addr: i64| StoreOp::LongMem {
            mem: 0,
            addr: LongExpr::Const(addr),
            expr: LongExpr::Const(7),
        };
        write(2).execute(&mut d);
        assert_eq!(d.long_mems[0], vec![0, 0, 7, 0]);
        // Dropped silently.
        write(9).execute(&mut d);
        write(-1).execute(&mut d);
        assert_eq!(d.long_mems[0], vec![0, 0, 7, 0]);
    }

    #[test]
    fn big_mem_store() {
        let mut d = empty_store();
        let op = StoreOp::BigMem {
            mem: 0,
            addr: LongExpr::Const(1),
            expr: BigExpr::Const(BigInt::from(3) << 70),
        };
        op.execute(&mut d);
        assert_eq!(d.big_mems[0][1], BigInt::from(3) << 70);
    }

    #[test]
    fn stores_see_earlier_writes_in_same_tick() {
        let mut d = empty_store();
        let first = StoreOp::Long {
            index: 0,
            expr: LongExpr::Const(5),
        };
        let second = StoreOp::Long {
            index: 1,
            expr: LongExpr::Add(Box::new(LongExpr::Load(0)), Box::new(LongExpr::Const(1))),
        };
        first.execute(&mut d);
        second.execute(&mut d);
        assert_eq!(d.longs[1], 6);
    }
}

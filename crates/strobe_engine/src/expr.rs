//! Typed expression trees evaluated against a [`DataStore`].
//!
//! Expressions come in three result kinds, one per storage class:
//! [`BoolExpr`], [`LongExpr`] and [`BigExpr`]. Each variant carries exactly
//! the parameters it needs: operand sub-trees, a compile-time mask, a shift
//! count, a constant or a load index. Trees are immutable after compilation;
//! evaluation walks them recursively with a shared borrow of the storage,
//! never mutating and never allocating outside of big-integer arithmetic.
//!
//! Width discipline: `Add`/`Sub` are evaluated at full carrier precision and
//! rely on a follow-on `Bits` mask emitted by the front end, while `Not`,
//! `Bits` and the long-to-big conversion truncate in-node with their stored
//! masks.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::storage::DataStore;
use crate::value::big_low_u64;

/// A storage cell read by some expression, used for dependency analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    /// A single-bit cell.
    Bool(usize),
    /// An `i64` cell.
    Long(usize),
    /// A big-integer cell.
    Big(usize),
}

/// A single-bit expression.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BoolExpr {
    /// Reads a `bool` storage cell.
    Load(usize),
    /// A constant.
    Const(bool),
    /// Logical negation.
    Not(Box<BoolExpr>),
    /// Extracts one bit of a long operand: `((e >> bit) & 1) == 1`.
    BitOfLong {
        /// The operand.
        e: Box<LongExpr>,
        /// The bit position, below 64.
        bit: u32,
    },
    /// Extracts one bit of a big operand.
    BitOfBig {
        /// The operand.
        e: Box<BigExpr>,
        /// The bit position.
        bit: u32,
    },
    /// Two-way select.
    Mux {
        /// The select condition.
        cond: Box<BoolExpr>,
        /// Value when the condition holds.
        tru: Box<BoolExpr>,
        /// Value otherwise.
        fals: Box<BoolExpr>,
    },
    /// Single-bit equality.
    Eq(Box<BoolExpr>, Box<BoolExpr>),
    /// Long equality.
    EqLong(Box<LongExpr>, Box<LongExpr>),
    /// Big equality.
    EqBig(Box<BigExpr>, Box<BigExpr>),
    /// Signed `>` on the `i64` carrier.
    GtLong(Box<LongExpr>, Box<LongExpr>),
    /// Unsigned `>` for 64-bit values stored in a signed cell.
    ///
    /// With both sign bits equal the host's signed compare is already the
    /// unsigned answer; otherwise the operand with the sign bit set is the
    /// larger unsigned value.
    GtLongUnsigned(Box<LongExpr>, Box<LongExpr>),
    /// Unlimited-precision `>`.
    GtBig(Box<BigExpr>, Box<BigExpr>),
    /// Unsigned `>` on single bits: `a && !b`.
    GtBoolUnsigned(Box<BoolExpr>, Box<BoolExpr>),
    /// Signed `>` on single bits: `!a && b`, since a set bit reads as -1.
    GtBoolSigned(Box<BoolExpr>, Box<BoolExpr>),
}

/// An expression of width 2..=64, carried in `i64`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LongExpr {
    /// Reads an `i64` storage cell.
    Load(usize),
    /// Reads one element of a long-element memory.
    ///
    /// Out-of-range addresses read as zero.
    LoadMem {
        /// The memory index.
        mem: usize,
        /// The element address.
        addr: Box<LongExpr>,
    },
    /// A constant.
    Const(i64),
    /// 1 if the operand holds, else 0.
    FromBool(Box<BoolExpr>),
    /// Wrapping addition; the enclosing store's mask governs the width.
    Add(Box<LongExpr>, Box<LongExpr>),
    /// Wrapping subtraction; the enclosing store's mask governs the width.
    Sub(Box<LongExpr>, Box<LongExpr>),
    /// Bit slice of a long operand: `(e >> shift) & mask`.
    Bits {
        /// The operand.
        e: Box<LongExpr>,
        /// Compile-time mask of the slice width.
        mask: i64,
        /// Right-shift amount, below 64.
        shift: u32,
    },
    /// Bit slice of a big operand narrowed into the long carrier.
    BitsOfBig {
        /// The operand.
        e: Box<BigExpr>,
        /// Compile-time mask of the slice width.
        mask: i64,
        /// Right-shift amount.
        shift: u32,
    },
    /// Masked complement: `(!e) & mask`.
    Not {
        /// The operand.
        e: Box<LongExpr>,
        /// Compile-time mask of the result width.
        mask: i64,
    },
    /// Two-way select.
    Mux {
        /// The select condition.
        cond: Box<BoolExpr>,
        /// Value when the condition holds.
        tru: Box<LongExpr>,
        /// Value otherwise.
        fals: Box<LongExpr>,
    },
}

/// An expression wider than 64 bits, carried in [`BigInt`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BigExpr {
    /// Reads a big-integer storage cell.
    Load(usize),
    /// Reads one element of a big-element memory.
    ///
    /// Out-of-range addresses read as zero.
    LoadMem {
        /// The memory index.
        mem: usize,
        /// The element address.
        addr: Box<LongExpr>,
    },
    /// A constant.
    Const(BigInt),
    /// 1 if the operand holds, else 0.
    FromBool(Box<BoolExpr>),
    /// Unsigned zero-extension of a long operand.
    FromLong(Box<LongExpr>),
    /// Addition; the enclosing store's mask governs the width.
    Add(Box<BigExpr>, Box<BigExpr>),
    /// Subtraction; may go negative until a follow-on mask is applied.
    Sub(Box<BigExpr>, Box<BigExpr>),
    /// Bit slice: `(e >> shift) & mask`.
    Bits {
        /// The operand.
        e: Box<BigExpr>,
        /// Compile-time mask of the slice width.
        mask: BigInt,
        /// Right-shift amount.
        shift: u32,
    },
    /// Masked complement: `(!e) & mask`.
    Not {
        /// The operand.
        e: Box<BigExpr>,
        /// Compile-time mask of the result width.
        mask: BigInt,
    },
    /// Two-way select.
    Mux {
        /// The select condition.
        cond: Box<BoolExpr>,
        /// Value when the condition holds.
        tru: Box<BigExpr>,
        /// Value otherwise.
        fals: Box<BigExpr>,
    },
}

impl BoolExpr {
    /// Evaluates this expression against the given storage.
    pub fn eval(&self, data: &DataStore) -> bool {
        match self {
            Self::Load(i) => data.bools[*i],
            Self::Const(v) => *v,
            Self::Not(e) => !e.eval(data),
            Self::BitOfLong { e, bit } => ((e.eval(data) >> bit) & 1) == 1,
            Self::BitOfBig { e, bit } => !((e.eval(data) >> *bit) & BigInt::from(1)).is_zero(),
            Self::Mux { cond, tru, fals } => {
                if cond.eval(data) {
                    tru.eval(data)
                } else {
                    fals.eval(data)
                }
            }
            Self::Eq(a, b) => a.eval(data) == b.eval(data),
            Self::EqLong(a, b) => a.eval(data) == b.eval(data),
            Self::EqBig(a, b) => a.eval(data) == b.eval(data),
            Self::GtLong(a, b) => a.eval(data) > b.eval(data),
            Self::GtLongUnsigned(a, b) => {
                let (a, b) = (a.eval(data), b.eval(data));
                match (a < 0, b < 0) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => a > b,
                }
            }
            Self::GtBig(a, b) => a.eval(data) > b.eval(data),
            Self::GtBoolUnsigned(a, b) => a.eval(data) && !b.eval(data),
            Self::GtBoolSigned(a, b) => !a.eval(data) && b.eval(data),
        }
    }

    /// Visits every storage cell this tree reads.
    pub(crate) fn for_each_load(&self, f: &mut dyn FnMut(Slot)) {
        match self {
            Self::Load(i) => f(Slot::Bool(*i)),
            Self::Const(_) => {}
            Self::Not(e) => e.for_each_load(f),
            Self::BitOfLong { e, .. } => e.for_each_load(f),
            Self::BitOfBig { e, .. } => e.for_each_load(f),
            Self::Mux { cond, tru, fals } => {
                cond.for_each_load(f);
                tru.for_each_load(f);
                fals.for_each_load(f);
            }
            Self::Eq(a, b) | Self::GtBoolUnsigned(a, b) | Self::GtBoolSigned(a, b) => {
                a.for_each_load(f);
                b.for_each_load(f);
            }
            Self::EqLong(a, b) | Self::GtLong(a, b) | Self::GtLongUnsigned(a, b) => {
                a.for_each_load(f);
                b.for_each_load(f);
            }
            Self::EqBig(a, b) | Self::GtBig(a, b) => {
                a.for_each_load(f);
                b.for_each_load(f);
            }
        }
    }
}

impl LongExpr {
    /// Evaluates this expression against the given storage.
    pub fn eval(&self, data: &DataStore) -> i64 {
        match self {
            Self::Load(i) => data.longs[*i],
            Self::LoadMem { mem, addr } => {
                let addr = addr.eval(data);
                usize::try_from(addr)
                    .ok()
                    .and_then(|i| data.long_mems[*mem].get(i))
                    .copied()
                    .unwrap_or(0)
            }
            Self::Const(v) => *v,
            Self::FromBool(e) => i64::from(e.eval(data)),
            Self::Add(a, b) => a.eval(data).wrapping_add(b.eval(data)),
            Self::Sub(a, b) => a.eval(data).wrapping_sub(b.eval(data)),
            Self::Bits { e, mask, shift } => (e.eval(data) >> shift) & mask,
            Self::BitsOfBig { e, mask, shift } => {
                let sliced = (e.eval(data) >> *shift) & BigInt::from(*mask as u64);
                big_low_u64(&sliced) as i64
            }
            Self::Not { e, mask } => !e.eval(data) & mask,
            Self::Mux { cond, tru, fals } => {
                if cond.eval(data) {
                    tru.eval(data)
                } else {
                    fals.eval(data)
                }
            }
        }
    }

    /// Visits every storage cell this tree reads.
    pub(crate) fn for_each_load(&self, f: &mut dyn FnMut(Slot)) {
        match self {
            Self::Load(i) => f(Slot::Long(*i)),
            Self::LoadMem { addr, .. } => addr.for_each_load(f),
            Self::Const(_) => {}
            Self::FromBool(e) => e.for_each_load(f),
            Self::Add(a, b) | Self::Sub(a, b) => {
                a.for_each_load(f);
                b.for_each_load(f);
            }
            Self::Bits { e, .. } | Self::Not { e, .. } => e.for_each_load(f),
            Self::BitsOfBig { e, .. } => e.for_each_load(f),
            Self::Mux { cond, tru, fals } => {
                cond.for_each_load(f);
                tru.for_each_load(f);
                fals.for_each_load(f);
            }
        }
    }
}

impl BigExpr {
    /// Evaluates this expression against the given storage.
    pub fn eval(&self, data: &DataStore) -> BigInt {
        match self {
            Self::Load(i) => data.bigs[*i].clone(),
            Self::LoadMem { mem, addr } => {
                let addr = addr.eval(data);
                usize::try_from(addr)
                    .ok()
                    .and_then(|i| data.big_mems[*mem].get(i))
                    .cloned()
                    .unwrap_or_else(BigInt::zero)
            }
            Self::Const(v) => v.clone(),
            Self::FromBool(e) => BigInt::from(u8::from(e.eval(data))),
            Self::FromLong(e) => BigInt::from(e.eval(data) as u64),
            Self::Add(a, b) => a.eval(data) + b.eval(data),
            Self::Sub(a, b) => a.eval(data) - b.eval(data),
            Self::Bits { e, mask, shift } => (e.eval(data) >> *shift) & mask,
            Self::Not { e, mask } => !e.eval(data) & mask,
            Self::Mux { cond, tru, fals } => {
                if cond.eval(data) {
                    tru.eval(data)
                } else {
                    fals.eval(data)
                }
            }
        }
    }

    /// Visits every storage cell this tree reads.
    pub(crate) fn for_each_load(&self, f: &mut dyn FnMut(Slot)) {
        match self {
            Self::Load(i) => f(Slot::Big(*i)),
            Self::LoadMem { addr, .. } => addr.for_each_load(f),
            Self::Const(_) => {}
            Self::FromBool(e) => e.for_each_load(f),
            Self::FromLong(e) => e.for_each_load(f),
            Self::Add(a, b) | Self::Sub(a, b) => {
                a.for_each_load(f);
                b.for_each_load(f);
            }
            Self::Bits { e, .. } | Self::Not { e, .. } => e.for_each_load(f),
            Self::Mux { cond, tru, fals } => {
                cond.for_each_load(f);
                tru.for_each_load(f);
                fals.for_each_load(f);
            }
        }
    }
}

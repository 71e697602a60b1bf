//! Two-tier numeric representation and width-derived bit masks.
//!
//! Every signal value lives in one of three classes chosen from its declared
//! bit width: [`WidthClass::Bool`] (width 1, a `bool`), [`WidthClass::Long`]
//! (widths 2..=64, two's complement in an `i64`) and [`WidthClass::Big`]
//! (wider, a non-negative [`BigInt`]). Masks are computed once at compile
//! time and stored inside expression nodes; evaluation never recomputes them.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The storage class a symbol's values belong to, derived from its width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidthClass {
    /// Width 1, stored as `bool`.
    Bool,
    /// Widths 2 through 64, stored two's-complement in `i64`.
    Long,
    /// Widths 65 and up, stored as a non-negative `BigInt`.
    Big,
}

impl WidthClass {
    /// Selects the storage class for a declared bit width.
    pub fn for_width(width: u32) -> Self {
        match width {
            1 => Self::Bool,
            2..=64 => Self::Long,
            _ => Self::Big,
        }
    }
}

impl fmt::Display for WidthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Long => write!(f, "long"),
            Self::Big => write!(f, "big"),
        }
    }
}

/// Returns the low-`bits` mask for values stored in an `i64` cell.
///
/// `long_mask(0)` is 0 and `long_mask(64)` is all ones; for anything in
/// between the mask has exactly `bits` low bits set.
///
/// # Panics
///
/// Panics if `bits > 64`.
pub fn long_mask(bits: u32) -> i64 {
    assert!(bits <= 64, "long mask width {bits} out of range");
    match bits {
        0 => 0,
        64 => -1,
        b => ((1u64 << b) - 1) as i64,
    }
}

/// Returns the low-`bits` mask as a big integer: `(1 << bits) - 1`.
pub fn big_mask(bits: u32) -> BigInt {
    (BigInt::from(1) << bits) - 1
}

/// Extracts the low 64 bits of a non-negative big integer.
///
/// Callers must only pass values that have already been masked to a
/// non-negative range; the sign is ignored.
pub fn big_low_u64(value: &BigInt) -> u64 {
    value.magnitude().iter_u64_digits().next().unwrap_or(0)
}

/// A value in one of the three storage classes.
///
/// Used at the simulation façade boundary for width-appropriate dispatch;
/// the evaluator itself works on the raw representations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// A single-bit value.
    Bool(bool),
    /// A value of width 2..=64.
    Long(i64),
    /// A value wider than 64 bits.
    Big(BigInt),
}

impl Value {
    /// Returns the storage class of this value.
    pub fn class(&self) -> WidthClass {
        match self {
            Self::Bool(_) => WidthClass::Bool,
            Self::Long(_) => WidthClass::Long,
            Self::Big(_) => WidthClass::Big,
        }
    }

    /// Converts to a big integer, reading the `Long` cell as unsigned bits.
    pub fn to_big(&self) -> BigInt {
        match self {
            Self::Bool(b) => BigInt::from(u8::from(*b)),
            Self::Long(v) => BigInt::from(*v as u64),
            Self::Big(v) => v.clone(),
        }
    }

    /// Builds a value of the given class and width from a big integer.
    ///
    /// The input is masked to `width` bits first, so negative inputs are
    /// interpreted through their two's-complement window.
    pub fn from_big(class: WidthClass, width: u32, value: &BigInt) -> Self {
        match class {
            WidthClass::Bool => Self::Bool(!(value & BigInt::from(1)).is_zero()),
            WidthClass::Long => {
                let masked = value & big_mask(width);
                Self::Long(big_low_u64(&masked) as i64)
            }
            WidthClass::Big => Self::Big(value & big_mask(width)),
        }
    }
}

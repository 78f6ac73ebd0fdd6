//! Element types and the dtype promotion lattice.
//!
//! Three element types are supported and ordered `Bool < I64 < F64`. Any
//! narrower kind widens losslessly into a wider one; the reverse direction is
//! only taken by the non-strict extractors (truncation for `F64 -> I64`,
//! non-zero test for `-> Bool`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::ArrayStorage;
use crate::value::ValueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    I64,
    F64,
}

impl DType {
    pub const ALL: [Self; 3] = [Self::Bool, Self::I64, Self::F64];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I64 => "int64",
            Self::F64 => "double",
        }
    }

    /// Parse a dtype name as written in primitive arguments.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int64" | "i64" | "int" => Some(Self::I64),
            "double" | "f64" | "float" => Some(Self::F64),
            _ => None,
        }
    }

    /// Stable one-byte tag used by the wire codec.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::I64 => 2,
            Self::F64 => 3,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Bool),
            2 => Some(Self::I64),
            3 => Some(Self::F64),
            _ => None,
        }
    }

    #[must_use]
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Least upper bound of two dtypes in the promotion lattice.
    #[must_use]
    pub fn promote(self, other: Self) -> Self {
        self.max(other)
    }

    #[must_use]
    pub fn widens_to(self, target: Self) -> bool {
        self <= target
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar type that can live inside [`ArrayStorage`].
///
/// The arithmetic hooks exist so reduction operators can be written once and
/// instantiated per element type. Integer arithmetic wraps instead of
/// panicking on overflow.
pub trait Element:
    Copy + PartialEq + PartialOrd + fmt::Debug + Default + Send + Sync + 'static
{
    const DTYPE: DType;

    fn zero() -> Self;
    fn one() -> Self;
    /// Smallest representable value; identity of `max`.
    fn lowest() -> Self;
    /// Largest representable value; identity of `min`.
    fn highest() -> Self;

    fn from_bool(value: bool) -> Self;
    fn from_i64(value: i64) -> Self;
    fn from_f64(value: f64) -> Self;

    fn to_bool(self) -> bool;
    fn to_i64(self) -> i64;
    fn to_f64(self) -> f64;

    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn max_of(self, rhs: Self) -> Self;
    fn min_of(self, rhs: Self) -> Self;
    /// Divide by an element count. A count of zero leaves the value as is
    /// except for doubles, which follow IEEE semantics.
    fn div_count(self, count: usize) -> Self;

    fn wrap(storage: ArrayStorage<Self>) -> ValueKind;
    fn peek(kind: &ValueKind) -> Option<&ArrayStorage<Self>>;
    fn unwrap(kind: ValueKind) -> Result<ArrayStorage<Self>, ValueKind>;

    #[inline]
    fn cast<U: Element>(self) -> U {
        match Self::DTYPE {
            DType::Bool => U::from_bool(self.to_bool()),
            DType::I64 => U::from_i64(self.to_i64()),
            DType::F64 => U::from_f64(self.to_f64()),
        }
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn zero() -> Self {
        false
    }
    fn one() -> Self {
        true
    }
    fn lowest() -> Self {
        false
    }
    fn highest() -> Self {
        true
    }

    fn from_bool(value: bool) -> Self {
        value
    }
    fn from_i64(value: i64) -> Self {
        value != 0
    }
    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn to_bool(self) -> bool {
        self
    }
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }

    fn add(self, rhs: Self) -> Self {
        self || rhs
    }
    fn mul(self, rhs: Self) -> Self {
        self && rhs
    }
    fn max_of(self, rhs: Self) -> Self {
        self || rhs
    }
    fn min_of(self, rhs: Self) -> Self {
        self && rhs
    }
    fn div_count(self, _count: usize) -> Self {
        self
    }

    fn wrap(storage: ArrayStorage<Self>) -> ValueKind {
        ValueKind::Bool(storage)
    }
    fn peek(kind: &ValueKind) -> Option<&ArrayStorage<Self>> {
        match kind {
            ValueKind::Bool(storage) => Some(storage),
            _ => None,
        }
    }
    fn unwrap(kind: ValueKind) -> Result<ArrayStorage<Self>, ValueKind> {
        match kind {
            ValueKind::Bool(storage) => Ok(storage),
            other => Err(other),
        }
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::I64;

    fn zero() -> Self {
        0
    }
    fn one() -> Self {
        1
    }
    fn lowest() -> Self {
        i64::MIN
    }
    fn highest() -> Self {
        i64::MAX
    }

    fn from_bool(value: bool) -> Self {
        i64::from(value)
    }
    fn from_i64(value: i64) -> Self {
        value
    }
    fn from_f64(value: f64) -> Self {
        // `as` truncates toward zero and saturates at the bounds.
        value as i64
    }

    fn to_bool(self) -> bool {
        self != 0
    }
    fn to_i64(self) -> i64 {
        self
    }
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }
    fn max_of(self, rhs: Self) -> Self {
        self.max(rhs)
    }
    fn min_of(self, rhs: Self) -> Self {
        self.min(rhs)
    }
    fn div_count(self, count: usize) -> Self {
        match i64::try_from(count) {
            Ok(0) | Err(_) => self,
            Ok(divisor) => self / divisor,
        }
    }

    fn wrap(storage: ArrayStorage<Self>) -> ValueKind {
        ValueKind::Int(storage)
    }
    fn peek(kind: &ValueKind) -> Option<&ArrayStorage<Self>> {
        match kind {
            ValueKind::Int(storage) => Some(storage),
            _ => None,
        }
    }
    fn unwrap(kind: ValueKind) -> Result<ArrayStorage<Self>, ValueKind> {
        match kind {
            ValueKind::Int(storage) => Ok(storage),
            other => Err(other),
        }
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn lowest() -> Self {
        f64::NEG_INFINITY
    }
    fn highest() -> Self {
        f64::INFINITY
    }

    fn from_bool(value: bool) -> Self {
        if value { 1.0 } else { 0.0 }
    }
    fn from_i64(value: i64) -> Self {
        value as f64
    }
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_bool(self) -> bool {
        self != 0.0
    }
    fn to_i64(self) -> i64 {
        self as i64
    }
    fn to_f64(self) -> f64 {
        self
    }

    fn add(self, rhs: Self) -> Self {
        self + rhs
    }
    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }
    fn max_of(self, rhs: Self) -> Self {
        f64::max(self, rhs)
    }
    fn min_of(self, rhs: Self) -> Self {
        f64::min(self, rhs)
    }
    fn div_count(self, count: usize) -> Self {
        self / count as f64
    }

    fn wrap(storage: ArrayStorage<Self>) -> ValueKind {
        ValueKind::Float(storage)
    }
    fn peek(kind: &ValueKind) -> Option<&ArrayStorage<Self>> {
        match kind {
            ValueKind::Float(storage) => Some(storage),
            _ => None,
        }
    }
    fn unwrap(kind: ValueKind) -> Result<ArrayStorage<Self>, ValueKind> {
        match kind {
            ValueKind::Float(storage) => Ok(storage),
            other => Err(other),
        }
    }
}

//! Document value model for BagQL.
//!
//! Queries operate over nested, heterogeneous data: scalars, structs,
//! ordered lists, and unordered duplicate-preserving bags. This crate
//! defines the [`Value`] enum the lexer builds literals into and the
//! evaluator consumes, together with the Ion-style partial-precision
//! [`Timestamp`].

mod timestamp;

use std::fmt;

use rust_decimal::Decimal;

pub use crate::timestamp::{Timestamp, TimestampError, TimestampPrecision};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically-typed document value.
///
/// `Struct` preserves field order and permits duplicate keys; `Bag` is the
/// unordered counterpart of `List`. The distinction matters to the
/// evaluator, not to this crate, which only stores the shapes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// An exact decimal number.
    Decimal(Decimal),
    /// A UTF-8 string.
    String(String),
    /// A symbolic identifier. Distinct from `String` in the data model.
    Symbol(String),
    /// A point in time with explicit precision.
    Timestamp(Timestamp),
    /// An ordered collection of name/value fields.
    Struct(Vec<(String, Value)>),
    /// An ordered collection.
    List(Vec<Value>),
    /// An unordered, duplicate-preserving collection.
    Bag(Vec<Value>),
}

impl Value {
    /// Construct a boolean value.
    #[must_use]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Construct an integer value.
    #[must_use]
    pub const fn integer(i: i64) -> Self {
        Self::Integer(i)
    }

    /// Construct a decimal value.
    #[must_use]
    pub const fn decimal(d: Decimal) -> Self {
        Self::Decimal(d)
    }

    /// Construct a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Construct a symbol value.
    #[must_use]
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::Symbol(s.into())
    }

    /// Construct a timestamp value.
    #[must_use]
    pub const fn timestamp(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }

    /// Whether this value is the null sentinel.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is a non-negative integer.
    ///
    /// Type parameters in `CAST` targets must satisfy this predicate.
    #[must_use]
    pub const fn is_unsigned_integer(&self) -> bool {
        matches!(self, Self::Integer(i) if *i >= 0)
    }

    /// The numeric value as an `i64`, if this is an integer.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The textual content, if this is a string or symbol.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// A short tag naming this value's type, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Timestamp(_) => "timestamp",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
            Self::Bag(_) => "bag",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Symbol(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "`{ts}`"),
            Self::Struct(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{k}': {v}")?;
                }
                f.write_str("}")
            }
            Self::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Bag(items) => {
                f.write_str("<<")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(">>")
            }
        }
    }
}

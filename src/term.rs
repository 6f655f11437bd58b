//! Logical Keys and Values
//!
//! Every store speaks in [`Term`]s, whatever its backend keeps underneath.
//! A term is a small self-describing value tree, close to what a dynamic
//! language would hand to a key-value store: nil, booleans, integers,
//! strings, raw bytes, lists, and maps.
//!
//! Terms are totally ordered and hashable, so they work as keys in both
//! hash-based and ordered backends, and they derive `serde` so byte-oriented
//! backends can encode them (see [`crate::storage::codec`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A logical key or value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// The absent value. Also what `get` returns when no default is given.
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Term>),
    Map(BTreeMap<Term, Term>),
}

impl Term {
    /// Returns `true` for [`Term::Nil`].
    pub fn is_nil(&self) -> bool {
        matches!(self, Term::Nil)
    }

    /// Returns the integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Nil => write!(f, "nil"),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Int(n) => write!(f, "{}", n),
            Term::Str(s) => write!(f, "{:?}", s),
            Term::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Term::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Term::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Int(n)
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Int(n.into())
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Str(s.to_string())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Str(s)
    }
}

impl From<Vec<u8>> for Term {
    fn from(b: Vec<u8>) -> Self {
        Term::Bytes(b)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::List(items)
    }
}

impl From<BTreeMap<Term, Term>> for Term {
    fn from(entries: BTreeMap<Term, Term>) -> Self {
        Term::Map(entries)
    }
}

impl<T: Into<Term>> From<Option<T>> for Term {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Term::Nil)
    }
}

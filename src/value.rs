//! Dynamically typed action arguments.
//!
//! Format tables carry literal arguments for each action call. An argument
//! is a tagged-union [`Value`]; each action validates its positions at call
//! time with the `as_*` accessors, which raise the distinct permanent error
//! kinds the contract requires.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stream::StreamId;

/// Dynamic type tag for a [`Value`] position in an action descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A string literal.
    Str,
    /// A signed integer.
    Int,
    /// A logical stream identifier.
    Stream,
}

/// A dynamically typed action argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// String literal (payloads, patterns).
    Str(String),
    /// Integer literal (lengths, delays).
    Int(i64),
    /// Logical stream identifier.
    Stream(StreamId),
}

impl Value {
    /// Dynamic type of this value.
    pub fn kind(&self) -> ArgKind {
        match self {
            Value::Str(_) => ArgKind::Str,
            Value::Int(_) => ArgKind::Int,
            Value::Stream(_) => ArgKind::Stream,
        }
    }

    /// Interpret as a string, or fail with `InvalidArgumentType`.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(Error::InvalidArgumentType),
        }
    }

    /// Interpret as an integer, or fail with `InvalidArgumentType`.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            _ => Err(Error::InvalidArgumentType),
        }
    }

    /// Interpret as a stream id, or fail with `InvalidArgumentType`.
    pub fn as_stream(&self) -> Result<StreamId> {
        match self {
            Value::Stream(id) => Ok(*id),
            _ => Err(Error::InvalidArgumentType),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<StreamId> for Value {
    fn from(id: StreamId) -> Self {
        Value::Stream(id)
    }
}

/// Require at least `min` arguments, or fail with `NotEnoughArguments`.
pub fn require(args: &[Value], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(Error::NotEnoughArguments);
    }
    Ok(())
}

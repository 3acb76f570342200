//! XML-RPC value model used by the wire codec and reply decoding.

use crate::error::{Error, Result};

/// A decoded XML-RPC value.
///
/// Struct members keep their wire order; supervisord replies are small enough
/// that linear member lookup is fine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a struct member by name.
    pub fn get(&self, member: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members
                .iter()
                .find(|(name, _)| name == member)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Returns a string member of a struct, or a protocol error naming the field.
    pub(crate) fn str_member(&self, member: &str) -> Result<String> {
        self.get(member)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("missing string member '{member}'")))
    }

    /// Returns an integer member of a struct, or a protocol error naming the field.
    pub(crate) fn i64_member(&self, member: &str) -> Result<i64> {
        self.get(member)
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Protocol(format!("missing int member '{member}'")))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

//! Flattens a list of flat records into a JSON array string.
//!
//! Used by the query layer that reads the job's output; it shares nothing
//! with the aggregation pipeline.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::errors::Result;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    String(String),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
    /// Any other value, carried as its textual form.
    Other(String),
}

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Primitive::String(s) | Primitive::Other(s) => serializer.serialize_str(s),
            Primitive::Int(i) => serializer.serialize_i64(*i),
            Primitive::UInt(u) => serializer.serialize_u64(*u),
            Primitive::Float(f) => serializer.serialize_f64(*f),
            Primitive::Bool(b) => serializer.serialize_bool(*b),
            Primitive::Null => serializer.serialize_unit(),
        }
    }
}

impl From<Value> for Primitive {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Primitive::Null,
            Value::Bool(b) => Primitive::Bool(b),
            Value::String(s) => Primitive::String(s),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Primitive::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Primitive::UInt(u)
                } else {
                    match n.as_f64() {
                        Some(f) => Primitive::Float(f),
                        None => Primitive::Other(n.to_string()),
                    }
                }
            }
            other => Primitive::Other(other.to_string()),
        }
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_string())
    }
}

impl From<i64> for Primitive {
    fn from(i: i64) -> Self {
        Primitive::Int(i)
    }
}

impl From<u64> for Primitive {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Primitive::UInt(u), Primitive::Int)
    }
}

impl From<f64> for Primitive {
    fn from(f: f64) -> Self {
        Primitive::Float(f)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

/// Field name to value, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, Primitive)>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Primitive>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, Primitive)] {
        &self.0
    }
}

impl FromIterator<(String, Primitive)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Primitive)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Serializes `records` as a JSON array.
///
/// A missing or empty list yields `[]`; a missing element becomes `null`.
pub fn to_json_array(records: Option<&[Option<Record>]>) -> Result<String> {
    match records {
        None => Ok("[]".to_string()),
        Some([]) => Ok("[]".to_string()),
        Some(records) => Ok(serde_json::to_string(records)?),
    }
}

/// Builds a record from a JSON object; any other JSON value is rejected.
pub fn record_from_json(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(name, value)| (name, Primitive::from(value)))
                .collect(),
        ),
        _ => None,
    }
}

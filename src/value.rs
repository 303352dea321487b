//! The generic value tree that document/template/patch bodies are built from.
//!
//! This is the fixed variant mapping {null, bool, number, text, list, map}
//! that a "writer for any value" interface would otherwise have to reflect
//! over; we just declare it directly.

use indexmap::IndexMap;
use std::fmt;

/// A single node of a document or template body.
///
/// `Map` uses an [`IndexMap`] rather than a [`std::collections::HashMap`] so
/// that byte-level persistence (`serde_json`, see [`crate::directory`]) is
/// stable across writes of the same logical document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Returns a tag name as used in violation messages and template dumps.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Empty map, used as the seed body for patches applied to nonexistent
    /// documents and for map-coercion during patch descent.
    pub fn empty_map() -> Value {
        Value::Map(IndexMap::new())
    }

    /// Empty list, used for list-coercion during patch descent.
    pub fn empty_list() -> Value {
        Value::List(Vec::new())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}:{}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_template_tags() {
        assert_eq!(Value::Null.kind(), "Null");
        assert_eq!(Value::Bool(true).kind(), "Boolean");
        assert_eq!(Value::Number(1.0).kind(), "Number");
        assert_eq!(Value::Text("x".into()).kind(), "Text");
        assert_eq!(Value::List(vec![]).kind(), "List");
        assert_eq!(Value::empty_map().kind(), "Map");
    }

    #[test]
    fn json_round_trip_preserves_key_order() {
        let mut m = IndexMap::new();
        m.insert("b".to_string(), Value::Bool(true));
        m.insert("a".to_string(), Value::Number(1.0));
        let v = Value::Map(m);

        let encoded = serde_json::to_string(&v).unwrap();
        assert_eq!(encoded, r#"{"b":true,"a":1.0}"#);

        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, v);
    }
}

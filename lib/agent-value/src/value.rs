use ordered_float::NotNan;
use std::collections::BTreeMap;
use std::fmt;

/// The main value type used to represent a parsed HTTP method tree:
/// headers, query parameters, cookies, auth, and body (structured JSON,
/// form-urlencoded, or multipart all normalize into this tree — spec.md
/// §3). A tagged union of primitive / struct / list / none, per the
/// Design Note in spec.md §9.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A UTF-8 string primitive.
    String(String),
    /// An integer primitive.
    Integer(i64),
    /// A non-NaN float primitive.
    Float(NotNan<f64>),
    /// A boolean primitive.
    Boolean(bool),
    /// A struct node: an ordered map of field name to child value.
    Object(BTreeMap<String, Value>),
    /// A list node.
    Array(Vec<Value>),
    /// The absence of a value (distinct from an empty string).
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Object(map) => {
                let joined = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{joined}}}")
            }
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{joined}]")
            }
            Value::Null => write!(f, "null"),
        }
    }
}

impl Value {
    pub fn float(v: f64) -> Value {
        Value::Float(NotNan::new(v).unwrap_or_else(|_| NotNan::new(0.0).unwrap()))
    }

    /// True for the primitive variants (string/integer/float/boolean);
    /// false for `Object`, `Array`, and `Null`. Matches the "primitive"
    /// tag the Redactor and Zero-Obfuscator visitors branch on.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Boolean(_)
        )
    }

    pub fn is_struct_or_list(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// The zero value of this node's declared type, used by the
    /// Zero-Obfuscator (spec.md §4.5) which must preserve tree shape:
    /// structural nodes keep their children (recursed into
    /// separately), only primitives are replaced in place.
    pub fn zero_of_same_type(&self) -> Value {
        match self {
            Value::String(_) => Value::String(String::new()),
            Value::Integer(_) => Value::Integer(0),
            Value::Float(_) => Value::float(0.0),
            Value::Boolean(_) => Value::Boolean(false),
            Value::Object(_) => Value::Object(BTreeMap::new()),
            Value::Array(_) => Value::Array(Vec::new()),
            Value::Null => Value::Null,
        }
    }

    /// Replace every primitive leaf in this subtree (including `self`
    /// if it is itself a primitive) with the literal redaction marker,
    /// leaving structural shape and non-string primitive types intact
    /// by converting them to a redacted string — matching the spec's
    /// "replace primitive with the literal string `*REDACTED*`"
    /// (spec.md §4.5 rule 1/3).
    pub fn redact_all_primitives(&mut self, marker: &str) {
        match self {
            Value::String(s) => *s = marker.to_string(),
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => {
                *self = Value::String(marker.to_string());
            }
            Value::Object(map) => {
                for v in map.values_mut() {
                    v.redact_all_primitives(marker);
                }
            }
            Value::Array(items) => {
                for v in items.iter_mut() {
                    v.redact_all_primitives(marker);
                }
            }
            Value::Null => {}
        }
    }

    /// Replace every primitive leaf in this subtree with the zero value
    /// of its own declared type, preserving tree shape exactly (used by
    /// the Zero-Obfuscator and the Upload Batcher's oversize fallback).
    pub fn zero_all_primitives(&mut self) {
        match self {
            Value::Object(map) => {
                for v in map.values_mut() {
                    v.zero_all_primitives();
                }
            }
            Value::Array(items) => {
                for v in items.iter_mut() {
                    v.zero_all_primitives();
                }
            }
            Value::Null => {}
            primitive => *primitive = primitive.zero_of_same_type(),
        }
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
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

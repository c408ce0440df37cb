//! value representation
//!
//! A template is a tree of the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! Locations inside the tree are addressed with a [Path], a list of [PathSegment]s.
//!
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};
use sha2::{Digest, Sha256};

pub type Map = indexmap::IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Object member lookup; `None` for missing keys and non-objects
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Returns the single `(key, value)` pair of a one-entry object
    ///
    /// Intrinsic function calls are always written in this shape.
    pub fn single_entry(&self) -> Option<(&str, &Value)> {
        match self {
            Value::Object(o) if o.len() == 1 => o.first().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        }
    }

    /// Follow `path` from this value
    pub fn lookup(&self, path: &[PathSegment]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(o)) => o.get(key)?,
                (PathSegment::Index(idx), Value::Array(a)) => a.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Scalars as the string the template engine would see
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Compact JSON rendering
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Hex encoded sha256 of the compact JSON rendering
    ///
    /// Two structurally equal values (including key order) have the same digest.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.to_json_string().as_bytes());
        hash.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl From<serde_json::Number> for Value {
    fn from(value: serde_json::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        // u64 above i64::MAX or a float; both fit an f64 well enough for analysis
        Value::Decimal(value.as_f64().unwrap_or(f64::NAN))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => n.into(),
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(a) => {
                a.into_iter().map(Value::from).collect::<Vec<_>>().into()
            }
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

/// One step from a value to one of its children
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside a template, starting at the root
pub type Path = Vec<PathSegment>;

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Key(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        PathSegment::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        PathSegment::Index(value)
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl serde::ser::Serialize for PathSegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathSegment::Key(key) => serializer.serialize_str(key),
            PathSegment::Index(idx) => serializer.serialize_u64(*idx as u64),
        }
    }
}

/// Parses a dotted path such as `Resources.Bucket.Properties.Tags.0`
///
/// Segments consisting only of digits become [PathSegment::Index].
pub fn parse_path(dotted: &str) -> Path {
    dotted
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(idx) => PathSegment::Index(idx),
            Err(_) => PathSegment::Key(segment.to_string()),
        })
        .collect()
}

/// Utility macro to create a [Path]
///
/// ```
/// # use cfnsym::template_path;
/// # use cfnsym::value::PathSegment;
/// let path = template_path!["Resources", "Bucket", "Properties", 0usize];
/// assert_eq!(path[3], PathSegment::Index(0));
/// ```
#[macro_export]
macro_rules! template_path {
    [ $($segment:expr),* $(,)? ] => {
        {
            let path: $crate::value::Path =
                vec![ $( $crate::value::PathSegment::from($segment) ),* ];
            path
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn json(text: &str) -> Value {
        serde_json::from_str::<serde_json::Value>(text)
            .expect("valid json")
            .into()
    }

    #[test]
    fn lookup_follows_keys_and_indices() {
        let value = json(r#"{"a": {"b": [1, {"c": "found"}]}}"#);

        assert_eq!(
            value.lookup(&crate::template_path!["a", "b", 1usize, "c"]),
            Some(&Value::from("found"))
        );
        assert_eq!(value.lookup(&crate::template_path!["a", "x"]), None);
        assert_eq!(value.lookup(&crate::template_path!["a", 0usize]), None);
    }

    #[test]
    fn key_order_is_preserved() {
        let value = json(r#"{"z": 1, "a": 2, "m": 3}"#);
        assert_eq!(value.to_json_string(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn digest_is_structural() {
        let one = json(r#"{"Ref": "Param"}"#);
        let two = json(r#"{ "Ref" : "Param" }"#);
        let three = json(r#"{"Ref": "Other"}"#);

        assert_eq!(one.digest(), two.digest());
        assert_ne!(one.digest(), three.digest());
        assert_eq!(one.digest().len(), 64);
    }

    #[test]
    fn dotted_paths() {
        assert_eq!(
            parse_path("Resources.Bucket.Tags.2"),
            crate::template_path!["Resources", "Bucket", "Tags", 2usize]
        );
    }
}

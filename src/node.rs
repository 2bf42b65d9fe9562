//! The value model stored inside a [`PathMap`](crate::PathMap).
//!
//! A [`Node`] is either a scalar (null, bool, integer, float, string,
//! duration, timestamp), a [`Mapping`] of names to nodes, or a sequence of
//! nodes. Mappings are ordered by key so that listings are deterministic;
//! the order carries no meaning.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A nested mapping of names to nodes.
pub type Mapping = BTreeMap<String, Node>;

/// Key toml uses to smuggle datetimes through serde.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Duration(Duration),
    Time(DateTime<Utc>),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Node {
    pub fn empty_mapping() -> Self {
        Node::Mapping(Mapping::new())
    }

    pub fn empty_sequence() -> Self {
        Node::Sequence(Vec::new())
    }

    /// The zero value of this node's kind. Used when a sequence has to be
    /// padded up to an index that is written out of order.
    pub fn zero_like(&self) -> Self {
        match self {
            Node::Null => Node::Null,
            Node::Bool(_) => Node::Bool(false),
            Node::Int(_) => Node::Int(0),
            Node::Float(_) => Node::Float(0.0),
            Node::String(_) => Node::String(String::new()),
            Node::Duration(_) => Node::Duration(Duration::ZERO),
            Node::Time(_) => Node::Time(DateTime::<Utc>::UNIX_EPOCH),
            Node::Sequence(_) => Node::empty_sequence(),
            Node::Mapping(_) => Node::empty_mapping(),
        }
    }

    /// Short name of the node's kind for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Duration(_) => "duration",
            Node::Time(_) => "time",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Node::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Node::Sequence(_))
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_mapping() && !self.is_sequence()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Float(f) => Some(*f),
            Node::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Render a scalar the way it would be written in a config file or an
    /// environment variable. Collections render as JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            Node::Null => String::new(),
            Node::Bool(b) => b.to_string(),
            Node::Int(i) => i.to_string(),
            Node::Float(f) => f.to_string(),
            Node::String(s) => s.clone(),
            Node::Duration(d) => humantime::format_duration(*d).to_string(),
            Node::Time(t) => t.to_rfc3339(),
            Node::Sequence(_) | Node::Mapping(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

// -- conversions --------------------------------------------------------------

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Node {
            fn from(v: $t) -> Self {
                Node::Int(v as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Node {
            fn from(v: $t) -> Self {
                match i64::try_from(v) {
                    Ok(i) => Node::Int(i),
                    Err(_) => Node::String(v.to_string()),
                }
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<f32> for Node {
    fn from(v: f32) -> Self {
        Node::Float(v as f64)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Float(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::String(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::String(v)
    }
}

impl From<Duration> for Node {
    fn from(v: Duration) -> Self {
        Node::Duration(v)
    }
}

impl From<DateTime<Utc>> for Node {
    fn from(v: DateTime<Utc>) -> Self {
        Node::Time(v)
    }
}

impl From<Mapping> for Node {
    fn from(v: Mapping) -> Self {
        Node::Mapping(v)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(v: Vec<T>) -> Self {
        Node::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Node>> From<HashMap<String, T>> for Node {
    fn from(v: HashMap<String, T>) -> Self {
        Node::Mapping(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Node::Null)
    }
}

impl<K: Into<String>, V: Into<Node>> FromIterator<(K, V)> for Node {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Node::Mapping(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Build a [`Node::Mapping`] from `key => value` pairs.
///
/// ```ignore
/// let settings = node! { "port" => 80, "host" => "localhost" };
/// ```
#[macro_export]
macro_rules! node {
    () => {
        $crate::Node::empty_mapping()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut mapping = $crate::Mapping::new();
        $(mapping.insert(::std::string::String::from($key), $crate::Node::from($value));)+
        $crate::Node::Mapping(mapping)
    }};
}

// -- serde --------------------------------------------------------------------

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Float(f) => serializer.serialize_f64(*f),
            Node::String(s) => serializer.serialize_str(s),
            Node::Duration(d) => {
                serializer.serialize_str(&humantime::format_duration(*d).to_string())
            }
            Node::Time(t) => serializer.serialize_str(&t.to_rfc3339()),
            Node::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Mapping(mapping) => {
                let mut map = serializer.serialize_map(Some(mapping.len()))?;
                for (k, v) in mapping {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Node::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut mapping = Mapping::new();
        while let Some((key, value)) = map.next_entry::<String, Node>()? {
            mapping.insert(key, value);
        }

        // toml datetimes arrive as a single-entry map; keep them as strings
        // so the time caster can parse them like any other timestamp.
        if mapping.len() == 1 {
            if let Some(Node::String(raw)) = mapping.get(TOML_DATETIME_KEY) {
                return Ok(Node::String(raw.clone()));
            }
        }

        Ok(Node::Mapping(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_like_keeps_kind() {
        assert_eq!(Node::Int(9).zero_like(), Node::Int(0));
        assert_eq!(Node::from("x").zero_like(), Node::from(""));
        assert_eq!(Node::Bool(true).zero_like(), Node::Bool(false));
        assert_eq!(node! { "a" => 1 }.zero_like(), Node::empty_mapping());
    }

    #[test]
    fn unsigned_beyond_i64_becomes_string() {
        assert_eq!(Node::from(u64::MAX), Node::String(u64::MAX.to_string()));
        assert_eq!(Node::from(7u64), Node::Int(7));
    }

    #[test]
    fn node_macro_builds_mapping() {
        let n = node! { "port" => 80, "host" => "localhost" };
        let m = n.as_mapping().unwrap();
        assert_eq!(m["port"], Node::Int(80));
        assert_eq!(m["host"], Node::from("localhost"));
    }

    #[test]
    fn deserialize_from_json() {
        let n: Node = serde_json::from_str(r#"{"a": [1, "x", null], "b": {"c": 1.5}}"#).unwrap();
        assert_eq!(
            n,
            node! {
                "a" => Node::Sequence(vec![Node::Int(1), Node::from("x"), Node::Null]),
                "b" => node! { "c" => 1.5 },
            }
        );
    }

    #[test]
    fn toml_datetime_becomes_string() {
        let n: Node = toml::from_str("at = 1979-05-27T07:32:00Z\n").unwrap();
        assert_eq!(n, node! { "at" => "1979-05-27T07:32:00Z" });
    }

    #[test]
    fn serialize_duration_as_humantime() {
        let json = serde_json::to_string(&Node::Duration(Duration::from_secs(90))).unwrap();
        assert_eq!(json, "\"1m 30s\"");
    }

    #[test]
    fn display_scalars() {
        assert_eq!(Node::Int(80).to_string(), "80");
        assert_eq!(Node::Bool(true).to_string(), "true");
        assert_eq!(Node::Null.to_string(), "");
    }
}

//! A serde `Serializer` producing a [`Node`] tree, so any `Serialize` value
//! can be merged into a store.
//!
//! `Option::None` becomes [`Node::Null`], which the store treats as absent.
//! Unsigned values above `i64::MAX` become their decimal string. Map keys
//! may be strings, chars, integers or bools; integers and bools are
//! rendered in decimal/`true`/`false`.

use serde::ser::{self, Serialize};

use crate::error::ConfigError;
use crate::node::{Mapping, Node};

/// Serialize `value` into a node tree.
pub fn to_node<S: Serialize + ?Sized>(value: &S) -> Result<Node, ConfigError> {
    value
        .serialize(NodeSerializer)
        .map_err(|e| ConfigError::Serialize(e.0))
}

#[derive(Debug)]
struct SerializeError(String);

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SerializeError {}

impl ser::Error for SerializeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        SerializeError(msg.to_string())
    }
}

struct NodeSerializer;

impl ser::Serializer for NodeSerializer {
    type Ok = Node;
    type Error = SerializeError;
    type SerializeSeq = SeqSerializer;
    type SerializeTuple = SeqSerializer;
    type SerializeTupleStruct = SeqSerializer;
    type SerializeTupleVariant = VariantSerializer<SeqSerializer>;
    type SerializeMap = MapSerializer;
    type SerializeStruct = MapSerializer;
    type SerializeStructVariant = VariantSerializer<MapSerializer>;

    fn serialize_bool(self, v: bool) -> Result<Node, Self::Error> {
        Ok(Node::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Node, Self::Error> {
        Ok(Node::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Node, Self::Error> {
        self.serialize_i64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Node, Self::Error> {
        Ok(Node::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Node, Self::Error> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Node, Self::Error> {
        Ok(Node::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Node, Self::Error> {
        Ok(Node::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Node, Self::Error> {
        Ok(Node::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node, Self::Error> {
        Ok(Node::Sequence(v.iter().map(|b| Node::Int((*b).into())).collect()))
    }

    fn serialize_none(self) -> Result<Node, Self::Error> {
        Ok(Node::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node, Self::Error> {
        Ok(Node::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node, Self::Error> {
        Ok(Node::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node, Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node, Self::Error> {
        let mut out = Mapping::new();
        out.insert(variant.to_string(), value.serialize(NodeSerializer)?);
        Ok(Node::Mapping(out))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(SeqSerializer {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Ok(VariantSerializer {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapSerializer::default())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(MapSerializer::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(VariantSerializer {
            variant,
            inner: MapSerializer::default(),
        })
    }
}

// --- sequences ---

struct SeqSerializer {
    items: Vec<Node>,
}

impl ser::SerializeSeq for SeqSerializer {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node, Self::Error> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTuple for SeqSerializer {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqSerializer {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

// --- maps and structs ---

#[derive(Default)]
struct MapSerializer {
    entries: Mapping,
    current_key: Option<String>,
}

impl ser::SerializeMap for MapSerializer {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.current_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| SerializeError("map value without a key".into()))?;
        self.entries.insert(key, value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node, Self::Error> {
        Ok(Node::Mapping(self.entries))
    }
}

impl ser::SerializeStruct for MapSerializer {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.entries
            .insert(key.to_string(), value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node, Self::Error> {
        Ok(Node::Mapping(self.entries))
    }
}

// --- enum variants: `{ variant: inner }` ---

struct VariantSerializer<S> {
    variant: &'static str,
    inner: S,
}

impl<S> VariantSerializer<S> {
    fn wrap(variant: &'static str, inner: Node) -> Node {
        let mut out = Mapping::new();
        out.insert(variant.to_string(), inner);
        Node::Mapping(out)
    }
}

impl ser::SerializeTupleVariant for VariantSerializer<SeqSerializer> {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Node, Self::Error> {
        let inner = ser::SerializeSeq::end(self.inner)?;
        Ok(Self::wrap(self.variant, inner))
    }
}

impl ser::SerializeStructVariant for VariantSerializer<MapSerializer> {
    type Ok = Node;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Node, Self::Error> {
        let inner = ser::SerializeStruct::end(self.inner)?;
        Ok(Self::wrap(self.variant, inner))
    }
}

// --- map keys ---

struct KeySerializer;

fn key_error() -> SerializeError {
    SerializeError("map keys must be strings, integers or bools".into())
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = SerializeError;
    type SerializeSeq = ser::Impossible<String, SerializeError>;
    type SerializeTuple = ser::Impossible<String, SerializeError>;
    type SerializeTupleStruct = ser::Impossible<String, SerializeError>;
    type SerializeTupleVariant = ser::Impossible<String, SerializeError>;
    type SerializeMap = ser::Impossible<String, SerializeError>;
    type SerializeStruct = ser::Impossible<String, SerializeError>;
    type SerializeStructVariant = ser::Impossible<String, SerializeError>;

    fn serialize_str(self, v: &str) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_char(self, v: char) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_bool(self, v: bool) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i8(self, v: i8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i16(self, v: i16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i32(self, v: i32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i64(self, v: i64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u8(self, v: u8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u16(self, v: u16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u32(self, v: u32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u64(self, v: u64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_f32(self, _: f32) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_f64(self, _: f64) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_none(self) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, v: &T) -> Result<String, Self::Error> {
        v.serialize(self)
    }
    fn serialize_unit(self) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        v: &'static str,
    ) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        v: &T,
    ) -> Result<String, Self::Error> {
        v.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(key_error())
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(key_error())
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(key_error())
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(key_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Server {
        host: String,
        port: u16,
        tls: Option<bool>,
        tags: Vec<&'static str>,
    }

    #[derive(Serialize)]
    enum Mode {
        Plain,
        Weighted { weight: u8 },
    }

    #[test]
    fn struct_becomes_mapping() {
        let server = Server {
            host: "localhost".into(),
            port: 80,
            tls: None,
            tags: vec!["a", "b"],
        };
        assert_eq!(
            to_node(&server).unwrap(),
            node! {
                "host" => "localhost",
                "port" => 80,
                "tls" => Node::Null,
                "tags" => vec!["a", "b"],
            }
        );
    }

    #[test]
    fn integer_map_keys_are_rendered() {
        let map: BTreeMap<u32, &str> = [(1, "one")].into_iter().collect();
        assert_eq!(to_node(&map).unwrap(), node! { "1" => "one" });
    }

    #[test]
    fn float_map_keys_are_rejected() {
        struct FloatKeys;
        impl Serialize for FloatKeys {
            fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                use ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&1.5f64, &1)?;
                map.end()
            }
        }
        let err = to_node(&FloatKeys).unwrap_err();
        assert!(matches!(err, ConfigError::Serialize(_)));
    }

    #[test]
    fn enums_serialize_by_variant() {
        assert_eq!(to_node(&Mode::Plain).unwrap(), Node::String("Plain".into()));
        assert_eq!(
            to_node(&Mode::Weighted { weight: 3 }).unwrap(),
            node! { "Weighted" => node! { "weight" => 3 } }
        );
    }

    #[test]
    fn huge_unsigned_becomes_string() {
        assert_eq!(to_node(&u64::MAX).unwrap(), Node::String(u64::MAX.to_string()));
    }
}

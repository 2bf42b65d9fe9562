//! Moves values between a [`PathMap`] and typed records.
//!
//! Records opt in with `#[derive(Settings)]`, which describes each field
//! (key, default literal, validation rules, kind) and generates the code that
//! reads and writes it. Leaves go through one casting pipeline:
//!
//! 1. values that already have the target type pass through untouched,
//! 2. otherwise the caster chain gets a chance (unless the field is `nocast`),
//! 3. then the generic conversions, which never reinterpret an integer as a
//!    character,
//! 4. and finally the decoder chain runs on the cast value (unless the field
//!    is `nodecode`).
//!
//! Default literals take the same route minus the decoders, so a default of
//! `"{app.name}-db"` is stored verbatim and only expanded when written into
//! the record.

pub mod cast;
pub mod descriptor;
mod impls;

use std::sync::Arc;

use crate::error::BindError;
use crate::node::{Mapping, Node};
use crate::pathmap::PathMap;
use crate::path::join_key;

pub use cast::{Caster, Decoder, DurationCaster, ScalarType, TimeCaster};
pub use descriptor::{FieldDescriptor, FieldFlags, Kind, StructDescriptor, StructKey};

/// A type the binder can read from and write into a node.
pub trait Bindable: Sized {
    fn kind() -> Kind;

    fn type_name() -> &'static str;

    /// The zero value of the type as a node. `Node::Null` means "absent".
    fn zero_node() -> Node;

    /// Descriptor of the record this type is, or holds as elements.
    fn record_descriptor() -> Option<StructDescriptor> {
        None
    }

    fn to_node(&self) -> Node;

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError>;

    /// Overwrite `self` from `node`. Records override this to update in
    /// place so fields missing from `node` keep their current value.
    fn write_node(&mut self, node: Node, ctx: &BindContext<'_>) -> Result<(), BindError> {
        *self = Self::from_node(node, ctx)?;
        Ok(())
    }
}

/// A typed record. Implemented by `#[derive(Settings)]`.
pub trait Settings: Bindable + Default {
    fn descriptor() -> StructDescriptor;

    /// Insert every keyed field into `out`. Promoted fields write into the
    /// same mapping.
    fn read_fields(&self, out: &mut Mapping);

    /// Update every keyed field present in `source`.
    fn write_fields(&mut self, source: &Mapping, ctx: &BindContext<'_>) -> Result<(), BindError>;
}

/// Where in the tree a value is being bound, and with which pipeline.
#[derive(Clone)]
pub struct BindContext<'a> {
    binder: &'a Binder,
    path: String,
    flags: FieldFlags,
}

impl<'a> BindContext<'a> {
    pub fn new(binder: &'a Binder) -> Self {
        Self {
            binder,
            path: String::new(),
            flags: FieldFlags::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// Context for a record field. Flags are the field's own.
    pub fn field(&self, key: &str, flags: FieldFlags) -> Self {
        Self {
            binder: self.binder,
            path: join_key(&self.path, key),
            flags,
        }
    }

    /// Context for a mapping entry; flags carry over from the container.
    pub fn entry(&self, key: &str) -> Self {
        Self {
            binder: self.binder,
            path: join_key(&self.path, key),
            flags: self.flags,
        }
    }

    /// Context for a sequence element; flags carry over from the container.
    pub fn index(&self, index: usize) -> Self {
        Self {
            binder: self.binder,
            path: format!("{}[{index}]", self.path),
            flags: self.flags,
        }
    }

    /// Run a leaf through casters, generic conversion and decoders.
    pub fn cast(&self, value: Node, target: ScalarType) -> Result<Node, BindError> {
        let mut value = value;

        if !self.flags.nocast && !target.matches(&value) {
            for caster in &self.binder.casters {
                let cast = caster
                    .cast(target, &value)
                    .map_err(|reason| BindError::Caster {
                        path: self.path.clone(),
                        reason,
                    })?;
                if let Some(cast) = cast {
                    value = cast;
                    break;
                }
            }
        }

        let value = match cast::generic(value.clone(), target) {
            Some(v) => v,
            None => return Err(self.mismatch(target.name(), &value)),
        };

        self.decode(value)
    }

    pub fn decode(&self, value: Node) -> Result<Node, BindError> {
        if self.flags.nodecode {
            return Ok(value);
        }
        let mut value = value;
        for decoder in &self.binder.decoders {
            value = decoder.decode(value).map_err(|source| BindError::Decode {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(value)
    }

    pub fn mismatch(&self, expected: &'static str, found: &Node) -> BindError {
        BindError::TypeMismatch {
            path: self.path.clone(),
            expected,
            found: found.kind_name(),
            value: found.to_display_string(),
        }
    }

    pub fn shape(&self, expected: &'static str, found: &Node) -> BindError {
        BindError::Shape {
            path: self.path.clone(),
            expected,
            found: found.kind_name(),
        }
    }
}

/// The casting pipeline plus the read/write entry points.
#[derive(Clone)]
pub struct Binder {
    casters: Vec<Arc<dyn Caster>>,
    decoders: Vec<Arc<dyn Decoder>>,
}

impl Default for Binder {
    fn default() -> Self {
        Self {
            casters: vec![Arc::new(DurationCaster), Arc::new(TimeCaster)],
            decoders: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("casters", &self.casters.len())
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caster(mut self, caster: impl Caster + 'static) -> Self {
        self.casters.push(Arc::new(caster));
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    fn without_decoders(&self) -> Binder {
        Binder {
            casters: self.casters.clone(),
            decoders: Vec::new(),
        }
    }

    /// Read every keyed field of `record` into a fresh [`PathMap`].
    pub fn read<R: Settings>(&self, record: &R) -> PathMap {
        let mut out = Mapping::new();
        record.read_fields(&mut out);
        PathMap::from(out)
    }

    /// Zero values and cast default literals for every field of `R`.
    pub fn read_zero_and_default_values<R: Settings>(
        &self,
    ) -> Result<(PathMap, PathMap), BindError> {
        let plain = self.without_decoders();
        let ctx = BindContext::new(&plain);
        let mut zeros = Mapping::new();
        let mut defaults = Mapping::new();
        zeros_and_defaults(&R::descriptor(), &mut zeros, &mut defaults, &ctx)?;
        Ok((PathMap::from(zeros), PathMap::from(defaults)))
    }

    /// Populate `record` from `source`. Fields without a value in `source`
    /// are left untouched.
    pub fn write<R: Settings>(&self, record: &mut R, source: &PathMap) -> Result<(), BindError> {
        let ctx = BindContext::new(self);
        match source.data() {
            Node::Mapping(m) => record.write_fields(&m, &ctx),
            Node::Null => Ok(()),
            other => Err(ctx.shape("mapping", &other)),
        }
    }

    pub fn keys<R: Settings>(&self) -> Vec<StructKey> {
        R::descriptor().keys()
    }
}

fn zeros_and_defaults(
    descriptor: &StructDescriptor,
    zeros: &mut Mapping,
    defaults: &mut Mapping,
    ctx: &BindContext<'_>,
) -> Result<(), BindError> {
    for field in &descriptor.fields {
        let field_ctx = ctx.field(field.key, field.flags);

        match (field.kind, &field.fields) {
            (Kind::Promoted, Some(inner)) => {
                zeros_and_defaults(inner, zeros, defaults, ctx)?;
            }
            (Kind::Record, Some(inner)) if !(field.zero)().is_null() => {
                let mut nested_zeros = Mapping::new();
                let mut nested_defaults = Mapping::new();
                zeros_and_defaults(inner, &mut nested_zeros, &mut nested_defaults, &field_ctx)?;
                zeros.insert(field.key.to_string(), Node::Mapping(nested_zeros));
                if !nested_defaults.is_empty() {
                    defaults.insert(field.key.to_string(), Node::Mapping(nested_defaults));
                }
            }
            _ => {
                let zero = (field.zero)();
                if !zero.is_null() {
                    zeros.insert(field.key.to_string(), zero);
                }
                if let Some(literal) = field.default {
                    let value = (field.cast_default)(literal, &field_ctx).map_err(|source| {
                        BindError::InvalidDefault {
                            field: format!("{}.{}", descriptor.type_name, field.name),
                            default: literal.to_string(),
                            source: Box::new(source),
                        }
                    })?;
                    defaults.insert(field.key.to_string(), value);
                }
            }
        }
    }
    Ok(())
}

/// Cast a default literal into `T` and back into a node. The context's
/// binder is expected to carry no decoders.
pub fn cast_default<T: Bindable>(literal: &str, ctx: &BindContext<'_>) -> Result<Node, BindError> {
    T::from_node(Node::String(literal.to_string()), ctx).map(|v| v.to_node())
}

/// Zero value of a record: the zeros of all its fields.
pub fn record_zero<R: Settings>() -> Node {
    let mut zeros = Mapping::new();
    zeros_of(&R::descriptor(), &mut zeros);
    Node::Mapping(zeros)
}

fn zeros_of(descriptor: &StructDescriptor, zeros: &mut Mapping) {
    for field in &descriptor.fields {
        match (field.kind, &field.fields) {
            (Kind::Promoted, Some(inner)) => zeros_of(inner, zeros),
            _ => {
                let zero = (field.zero)();
                if !zero.is_null() {
                    zeros.insert(field.key.to_string(), zero);
                }
            }
        }
    }
}

/// [`Bindable::to_node`] for records.
pub fn record_to_node<R: Settings>(record: &R) -> Node {
    let mut out = Mapping::new();
    record.read_fields(&mut out);
    Node::Mapping(out)
}

/// [`Bindable::write_node`] for records.
pub fn record_write_node<R: Settings>(
    record: &mut R,
    node: Node,
    ctx: &BindContext<'_>,
) -> Result<(), BindError> {
    match node {
        Node::Mapping(m) => record.write_fields(&m, ctx),
        Node::Null => Ok(()),
        other => Err(ctx.shape("mapping", &other)),
    }
}

/// [`Bindable::from_node`] for records.
pub fn record_from_node<R: Settings>(node: Node, ctx: &BindContext<'_>) -> Result<R, BindError> {
    let mut record = R::default();
    record_write_node(&mut record, node, ctx)?;
    Ok(record)
}

/// Write one keyed field from `source`, if present.
pub fn write_field<T: Bindable>(
    field: &mut T,
    source: &Mapping,
    key: &str,
    flags: FieldFlags,
    ctx: &BindContext<'_>,
) -> Result<(), BindError> {
    match source.get(key) {
        Some(node) if !node.is_null() => field.write_node(node.clone(), &ctx.field(key, flags)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{Backoff, Endpoint, RedisSettings, Shouter};
    use crate::node;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn read_uses_field_keys_and_skips_unkeyed() {
        let settings = RedisSettings {
            addr: "localhost:6379".into(),
            db: 3,
            scratch: "ignored".into(),
            ..Default::default()
        };
        let pm = Binder::new().read(&settings);
        assert_eq!(pm.get("addr"), Some(Node::from("localhost:6379")));
        assert_eq!(pm.get("db"), Some(Node::Int(3)));
        assert!(!pm.has("scratch"));
        assert_eq!(
            pm.get("backoff.max_elapsed_time"),
            Some(Node::Duration(Duration::ZERO))
        );
    }

    #[test]
    fn promoted_fields_share_parent_namespace() {
        let endpoint = Endpoint {
            name: "api".into(),
            ..Default::default()
        };
        let pm = Binder::new().read(&endpoint);
        assert!(pm.has("host"));
        assert!(pm.has("port"));
        assert!(!pm.has("address"));
    }

    #[test]
    fn zeros_and_defaults() {
        let (zeros, defaults) = Binder::new()
            .read_zero_and_default_values::<RedisSettings>()
            .unwrap();

        assert_eq!(zeros.get("addr"), Some(Node::from("")));
        assert_eq!(zeros.get("tags"), Some(Node::empty_sequence()));
        assert_eq!(zeros.get("labels"), Some(Node::empty_mapping()));
        assert_eq!(zeros.get("backoff.attempts"), Some(Node::Int(0)));

        assert_eq!(defaults.get("db"), Some(Node::Int(0)));
        assert_eq!(defaults.get("addr"), Some(Node::from("localhost:6379")));
        assert_eq!(
            defaults.get("backoff.max_elapsed_time"),
            Some(Node::Duration(Duration::from_secs(600)))
        );
        assert_eq!(defaults.get("tags"), Some(Node::from(vec!["a", "b"])));
        assert!(!defaults.has("labels"));
    }

    #[test]
    fn invalid_default_names_the_field() {
        let err = Binder::new()
            .read_zero_and_default_values::<crate::fixtures::test::BrokenDefault>()
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidDefault { ref field, .. } if field == "BrokenDefault.port"));
    }

    #[test]
    fn write_populates_nested_and_collections() {
        let source = PathMap::from(node! {
            "addr" => "redis:6379",
            "db" => "2",
            "tags" => "x, y ,z",
            "labels" => node! { "team" => "core" },
            "backoff" => node! { "attempts" => 5, "max_elapsed_time" => "1m" },
            "endpoints" => vec![node! { "name" => "a", "host" => "h", "port" => 1 }],
        });

        let mut settings = RedisSettings::default();
        Binder::new().write(&mut settings, &source).unwrap();

        assert_eq!(settings.addr, "redis:6379");
        assert_eq!(settings.db, 2);
        assert_eq!(settings.tags, vec!["x", "y", "z"]);
        assert_eq!(
            settings.labels,
            HashMap::from([("team".to_string(), "core".to_string())])
        );
        assert_eq!(settings.backoff.attempts, 5);
        assert_eq!(settings.backoff.max_elapsed_time, Duration::from_secs(60));
        assert_eq!(settings.endpoints.len(), 1);
        assert_eq!(settings.endpoints[0].address.host, "h");
    }

    #[test]
    fn write_leaves_missing_fields_untouched() {
        let mut settings = RedisSettings {
            addr: "keep".into(),
            ..Default::default()
        };
        Binder::new()
            .write(&mut settings, &PathMap::from(node! { "db" => 7 }))
            .unwrap();
        assert_eq!(settings.addr, "keep");
        assert_eq!(settings.db, 7);
    }

    #[test]
    fn integer_into_char_field_is_rejected() {
        let mut shouter = Shouter::default();
        let err = Binder::new()
            .write(&mut shouter, &PathMap::from(node! { "letter" => 80 }))
            .unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { expected: "char", .. }));
        assert_eq!(shouter.letter, char::default());
    }

    #[test]
    fn integer_into_string_field_is_formatted() {
        let mut shouter = Shouter::default();
        Binder::new()
            .write(&mut shouter, &PathMap::from(node! { "word" => 80 }))
            .unwrap();
        assert_eq!(shouter.word, "80");
    }

    #[test]
    fn shape_errors_for_wrong_topology() {
        let mut settings = RedisSettings::default();
        let err = Binder::new()
            .write(&mut settings, &PathMap::from(node! { "backoff" => "fast" }))
            .unwrap_err();
        assert!(matches!(err, BindError::Shape { ref path, .. } if path == "backoff"));

        let err = Binder::new()
            .write(&mut settings, &PathMap::from(node! { "labels" => vec![1] }))
            .unwrap_err();
        assert!(matches!(err, BindError::Shape { expected: "mapping", .. }));
    }

    #[test]
    fn narrowing_is_range_checked() {
        let mut backoff = Backoff::default();
        let err = Binder::new()
            .write(&mut backoff, &PathMap::from(node! { "attempts" => 70000 }))
            .unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { ref path, .. } if path == "attempts"));
    }

    #[test]
    fn decoders_run_after_cast_unless_nodecode() {
        struct Upper;
        impl Decoder for Upper {
            fn decode(
                &self,
                value: Node,
            ) -> Result<Node, Box<dyn std::error::Error + Send + Sync>> {
                Ok(match value {
                    Node::String(s) => Node::String(s.to_uppercase()),
                    other => other,
                })
            }
        }

        let mut shouter = Shouter::default();
        Binder::new()
            .decoder(Upper)
            .write(
                &mut shouter,
                &PathMap::from(node! { "word" => "hey", "raw" => "hey" }),
            )
            .unwrap();
        assert_eq!(shouter.word, "HEY");
        assert_eq!(shouter.raw, "hey");
    }

    #[test]
    fn keys_carry_sub_keys_for_record_sequences() {
        let keys = Binder::new().keys::<RedisSettings>();
        let names: Vec<_> = keys.iter().map(|k| k.key.as_str()).collect();
        assert!(names.contains(&"addr"));
        assert!(!names.contains(&"backoff"));

        let endpoints = keys.iter().find(|k| k.key == "endpoints").unwrap();
        assert_eq!(endpoints.kind, Kind::Sequence);
        let sub: Vec<_> = endpoints.sub_keys.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(sub, vec!["name", "host", "port"]);

        let tags = keys.iter().find(|k| k.key == "tags").unwrap();
        assert!(tags.sub_keys.is_empty());
    }
}

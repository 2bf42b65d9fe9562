//! The shape of a typed record as seen by the binder.

use crate::error::BindError;
use crate::node::Node;

use super::BindContext;

/// Closed set of field kinds the binder distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar,
    Mapping,
    Sequence,
    Record,
    /// A record whose fields live in the parent's namespace.
    Promoted,
}

/// Per-field binder switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    /// Skip the caster chain.
    pub nocast: bool,
    /// Skip the decoder chain.
    pub nodecode: bool,
}

#[derive(Clone)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// Path segment within the parent. Empty for promoted fields.
    pub key: &'static str,
    pub default: Option<&'static str>,
    pub validate: Option<&'static str>,
    pub kind: Kind,
    pub flags: FieldFlags,
    pub type_name: &'static str,
    /// Descriptor of the record held by this field, or by its elements.
    pub fields: Option<StructDescriptor>,
    pub zero: fn() -> Node,
    pub cast_default: fn(&str, &BindContext<'_>) -> Result<Node, BindError>,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("default", &self.default)
            .field("validate", &self.validate)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StructDescriptor {
    pub type_name: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl StructDescriptor {
    /// Key metadata used to probe environment variables.
    ///
    /// Promoted fields are inlined and nested records are left out (their
    /// leaves are found by walking the merged values instead). Sequences of
    /// records carry the element keys as `sub_keys`.
    pub fn keys(&self) -> Vec<StructKey> {
        let mut keys = Vec::new();
        for field in &self.fields {
            match field.kind {
                Kind::Promoted => {
                    if let Some(inner) = &field.fields {
                        keys.extend(inner.keys());
                    }
                }
                Kind::Record => {}
                kind => keys.push(StructKey {
                    key: field.key.to_string(),
                    kind,
                    sub_keys: match (kind, &field.fields) {
                        (Kind::Sequence, Some(inner)) => inner.keys(),
                        _ => Vec::new(),
                    },
                }),
            }
        }
        keys
    }

    /// Find a field by its key, looking through promoted records.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find_map(|f| match f.kind {
            Kind::Promoted => f.fields.as_ref().and_then(|inner| inner.field(key)),
            _ if f.key == key => Some(f),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructKey {
    pub key: String,
    pub kind: Kind,
    pub sub_keys: Vec<StructKey>,
}

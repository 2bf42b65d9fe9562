use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{BindContext, Bindable, Kind, ScalarType, StructDescriptor};
use crate::error::BindError;
use crate::node::{Mapping, Node};

macro_rules! bind_signed {
    ($($t:ty),*) => {
        $(impl Bindable for $t {
            fn kind() -> Kind {
                Kind::Scalar
            }

            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn zero_node() -> Node {
                Node::Int(0)
            }

            fn to_node(&self) -> Node {
                Node::from(*self)
            }

            fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
                let cast = ctx.cast(node, ScalarType::Int)?;
                cast.as_i64()
                    .and_then(|i| <$t>::try_from(i).ok())
                    .ok_or_else(|| ctx.mismatch(stringify!($t), &cast))
            }
        })*
    };
}

macro_rules! bind_unsigned {
    ($($t:ty),*) => {
        $(impl Bindable for $t {
            fn kind() -> Kind {
                Kind::Scalar
            }

            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn zero_node() -> Node {
                Node::Int(0)
            }

            fn to_node(&self) -> Node {
                Node::from(*self)
            }

            fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
                let cast = ctx.cast(node, ScalarType::UInt)?;
                let parsed = match &cast {
                    Node::Int(i) => <$t>::try_from(*i).ok(),
                    Node::String(s) => s.parse::<$t>().ok(),
                    _ => None,
                };
                parsed.ok_or_else(|| ctx.mismatch(stringify!($t), &cast))
            }
        })*
    };
}

bind_signed!(i8, i16, i32, i64, isize);
bind_unsigned!(u8, u16, u32, u64, usize);

macro_rules! bind_leaf {
    ($t:ty, $target:expr, $zero:expr, |$node:ident| $extract:expr) => {
        impl Bindable for $t {
            fn kind() -> Kind {
                Kind::Scalar
            }

            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn zero_node() -> Node {
                $zero
            }

            fn to_node(&self) -> Node {
                Node::from(self.clone())
            }

            fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
                let cast = ctx.cast(node, $target)?;
                let extracted = {
                    let $node = &cast;
                    $extract
                };
                extracted.ok_or_else(|| ctx.mismatch(stringify!($t), &cast))
            }
        }
    };
}

bind_leaf!(bool, ScalarType::Bool, Node::Bool(false), |n| n.as_bool());
bind_leaf!(f64, ScalarType::Float, Node::Float(0.0), |n| n.as_f64());
bind_leaf!(f32, ScalarType::Float, Node::Float(0.0), |n| n.as_f64().map(|f| f as f32));
bind_leaf!(String, ScalarType::String, Node::String(String::new()), |n| n
    .as_str()
    .map(str::to_string));
bind_leaf!(Duration, ScalarType::Duration, Node::Duration(Duration::ZERO), |n| match n {
    Node::Duration(d) => Some(*d),
    _ => None,
});
bind_leaf!(
    DateTime<Utc>,
    ScalarType::Time,
    Node::Time(DateTime::<Utc>::UNIX_EPOCH),
    |n| match n {
        Node::Time(t) => Some(*t),
        _ => None,
    }
);

impl Bindable for char {
    fn kind() -> Kind {
        Kind::Scalar
    }

    fn type_name() -> &'static str {
        "char"
    }

    fn zero_node() -> Node {
        Node::String(char::default().to_string())
    }

    fn to_node(&self) -> Node {
        Node::String(self.to_string())
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        let cast = ctx.cast(node, ScalarType::Char)?;
        let mut chars = cast.as_str().unwrap_or_default().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ctx.mismatch("char", &cast)),
        }
    }
}

/// Untyped leaves keep the stored node as is.
impl Bindable for Node {
    fn kind() -> Kind {
        Kind::Scalar
    }

    fn type_name() -> &'static str {
        "Node"
    }

    fn zero_node() -> Node {
        Node::Null
    }

    fn to_node(&self) -> Node {
        self.clone()
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        ctx.decode(node)
    }
}

impl<T: Bindable> Bindable for Option<T> {
    fn kind() -> Kind {
        T::kind()
    }

    fn type_name() -> &'static str {
        T::type_name()
    }

    fn zero_node() -> Node {
        Node::Null
    }

    fn record_descriptor() -> Option<StructDescriptor> {
        T::record_descriptor()
    }

    fn to_node(&self) -> Node {
        self.as_ref().map_or(Node::Null, T::to_node)
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        match node {
            Node::Null => Ok(None),
            node => T::from_node(node, ctx).map(Some),
        }
    }

    fn write_node(&mut self, node: Node, ctx: &BindContext<'_>) -> Result<(), BindError> {
        if node.is_null() {
            return Ok(());
        }
        if let Some(inner) = self {
            return inner.write_node(node, ctx);
        }
        *self = Some(T::from_node(node, ctx)?);
        Ok(())
    }
}

impl<T: Bindable> Bindable for Vec<T> {
    fn kind() -> Kind {
        Kind::Sequence
    }

    fn type_name() -> &'static str {
        "Vec"
    }

    fn zero_node() -> Node {
        Node::empty_sequence()
    }

    fn record_descriptor() -> Option<StructDescriptor> {
        T::record_descriptor()
    }

    fn to_node(&self) -> Node {
        Node::Sequence(self.iter().map(T::to_node).collect())
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        let items = match node {
            Node::Sequence(items) => items,
            Node::Null => Vec::new(),
            Node::String(s) => split_list(&s),
            other => return Err(ctx.shape("sequence", &other)),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| T::from_node(item, &ctx.index(i)))
            .collect()
    }
}

/// `"a, b ,c"` becomes `["a", "b", "c"]`; the empty string is the empty list.
fn split_list(raw: &str) -> Vec<Node> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',')
        .map(|s| Node::String(s.trim().to_string()))
        .collect()
}

fn mapping_entries<T: Bindable>(
    node: Node,
    ctx: &BindContext<'_>,
) -> Result<Vec<(String, T)>, BindError> {
    let entries = match node {
        Node::Mapping(m) => m,
        Node::Null => Mapping::new(),
        other => return Err(ctx.shape("mapping", &other)),
    };

    entries
        .into_iter()
        .map(|(k, v)| {
            let value = T::from_node(v, &ctx.entry(&k))?;
            Ok((k, value))
        })
        .collect()
}

impl<T: Bindable> Bindable for HashMap<String, T> {
    fn kind() -> Kind {
        Kind::Mapping
    }

    fn type_name() -> &'static str {
        "HashMap"
    }

    fn zero_node() -> Node {
        Node::empty_mapping()
    }

    fn record_descriptor() -> Option<StructDescriptor> {
        T::record_descriptor()
    }

    fn to_node(&self) -> Node {
        Node::Mapping(self.iter().map(|(k, v)| (k.clone(), v.to_node())).collect())
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        Ok(mapping_entries(node, ctx)?.into_iter().collect())
    }
}

impl<T: Bindable> Bindable for BTreeMap<String, T> {
    fn kind() -> Kind {
        Kind::Mapping
    }

    fn type_name() -> &'static str {
        "BTreeMap"
    }

    fn zero_node() -> Node {
        Node::empty_mapping()
    }

    fn record_descriptor() -> Option<StructDescriptor> {
        T::record_descriptor()
    }

    fn to_node(&self) -> Node {
        Node::Mapping(self.iter().map(|(k, v)| (k.clone(), v.to_node())).collect())
    }

    fn from_node(node: Node, ctx: &BindContext<'_>) -> Result<Self, BindError> {
        Ok(mapping_entries(node, ctx)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Binder;
    use crate::node;

    fn bind<T: Bindable>(node: Node) -> Result<T, BindError> {
        let binder = Binder::new();
        T::from_node(node, &BindContext::new(&binder))
    }

    #[test]
    fn option_null_is_none() {
        assert_eq!(bind::<Option<u16>>(Node::Null).unwrap(), None);
        assert_eq!(bind::<Option<u16>>(Node::from("8")).unwrap(), Some(8));
    }

    #[test]
    fn comma_split_sequences() {
        assert_eq!(bind::<Vec<i32>>(Node::from("1, 2,3")).unwrap(), vec![1, 2, 3]);
        assert!(bind::<Vec<i32>>(Node::from("")).unwrap().is_empty());
    }

    #[test]
    fn nested_sequences_cast_element_wise() {
        let node = Node::Sequence(vec![Node::from(vec![1, 2]), Node::from("3,4")]);
        assert_eq!(
            bind::<Vec<Vec<u8>>>(node).unwrap(),
            vec![vec![1, 2], vec![3, 4]]
        );
    }

    #[test]
    fn sequence_element_errors_carry_index() {
        let err = bind::<Vec<u8>>(Node::from(vec![1, 300])).unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { ref path, .. } if path == "[1]"));
    }

    #[test]
    fn maps_of_maps() {
        let node = node! { "a" => node! { "x" => 1 } };
        let parsed = bind::<BTreeMap<String, HashMap<String, i64>>>(node).unwrap();
        assert_eq!(parsed["a"]["x"], 1);
    }

    #[test]
    fn large_unsigned_round_trips_through_string() {
        let parsed = bind::<u64>(Node::from(u64::MAX)).unwrap();
        assert_eq!(parsed, u64::MAX);
    }

    #[test]
    fn char_needs_exactly_one_character() {
        assert_eq!(bind::<char>(Node::from("x")).unwrap(), 'x');
        assert!(bind::<char>(Node::from("xy")).is_err());
        assert!(bind::<char>(Node::Int(80)).is_err());
    }

    #[test]
    fn any_keeps_node() {
        let node = node! { "k" => vec![1] };
        assert_eq!(bind::<Node>(node.clone()).unwrap(), node);
    }
}

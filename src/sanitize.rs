//! Sanitizers rewrite values on their way into a store.

use crate::error::ConfigError;
use crate::node::Node;
use crate::path::join_key;

pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, path: &str, value: Node) -> Result<Node, ConfigError>;
}

/// Stores timestamps as RFC 3339 strings so they compare equal to the same
/// timestamp coming from an environment variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeSanitizer;

impl Sanitizer for TimeSanitizer {
    fn sanitize(&self, _path: &str, value: Node) -> Result<Node, ConfigError> {
        Ok(match value {
            Node::Time(t) => Node::String(t.to_rfc3339()),
            other => other,
        })
    }
}

impl<F> Sanitizer for F
where
    F: Fn(&str, Node) -> Result<Node, ConfigError> + Send + Sync,
{
    fn sanitize(&self, path: &str, value: Node) -> Result<Node, ConfigError> {
        self(path, value)
    }
}

/// Run `sanitizers` over `value` and, depth first, over everything it
/// contains. Children are sanitized before their parent.
pub fn sanitize_tree(
    sanitizers: &[std::sync::Arc<dyn Sanitizer>],
    path: &str,
    value: Node,
) -> Result<Node, ConfigError> {
    if sanitizers.is_empty() {
        return Ok(value);
    }

    let value = match value {
        Node::Mapping(entries) => Node::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let child = join_key(path, &k);
                    sanitize_tree(sanitizers, &child, v).map(|v| (k, v))
                })
                .collect::<Result<_, _>>()?,
        ),
        Node::Sequence(items) => Node::Sequence(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| sanitize_tree(sanitizers, &format!("{path}[{i}]"), v))
                .collect::<Result<_, _>>()?,
        ),
        scalar => scalar,
    };

    sanitizers
        .iter()
        .try_fold(value, |value, s| s.sanitize(path, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    #[test]
    fn time_becomes_rfc3339_everywhere() {
        let t: DateTime<Utc> = DateTime::from_timestamp(0, 0).unwrap();
        let sanitizers: Vec<Arc<dyn Sanitizer>> = vec![Arc::new(TimeSanitizer)];
        let out = sanitize_tree(
            &sanitizers,
            "root",
            node! { "at" => t, "list" => vec![t] },
        )
        .unwrap();
        assert_eq!(
            out,
            node! {
                "at" => "1970-01-01T00:00:00+00:00",
                "list" => vec!["1970-01-01T00:00:00+00:00"],
            }
        );
    }

    #[test]
    fn closures_see_child_paths() {
        let mask = |path: &str, value: Node| -> Result<Node, ConfigError> {
            Ok(match value {
                Node::String(s) if path.ends_with("secret") => Node::String("*".repeat(s.len())),
                other => other,
            })
        };
        let sanitizers: Vec<Arc<dyn Sanitizer>> = vec![Arc::new(mask)];
        let out = sanitize_tree(&sanitizers, "", node! { "db" => node! { "secret" => "abc" } })
            .unwrap();
        assert_eq!(out, node! { "db" => node! { "secret" => "***" } });
    }
}

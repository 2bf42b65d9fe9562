//! Field validation for unmarshalled records.
//!
//! Rules are attached with `#[config(validate = "...")]` as a comma separated
//! list, each either a bare name or `name=param`:
//!
//! | rule                     | passes when                                         |
//! |--------------------------|-----------------------------------------------------|
//! | `required`               | the value is not its zero value                     |
//! | `omitempty`              | always; skips the remaining rules for zero values   |
//! | `oneof=a b c`            | the value renders as one of the listed words        |
//! | `min`, `max`, `len`      | numbers by value, strings/sequences/maps by length  |
//! | `gt`, `gte`, `lt`, `lte` | as above, strict or inclusive                       |
//! | `required_unless=k v`    | required unless sibling key `k` renders as `v`      |
//! | `required_with=k`        | required when sibling key `k` is set                |
//! | `dive`                   | applies the remaining rules to every element        |
//!
//! Durations compare against a humantime parameter (`min=1s`). Nested records
//! are always validated. Every violation is collected before returning.

use std::cmp::Ordering;
use std::time::Duration;

use crate::binder::{Kind, Settings, StructDescriptor};
use crate::error::{ValidationError, ValidationErrors};
use crate::node::{Mapping, Node};
use crate::path::join_key;

/// Validate `record` against the rules declared on its fields.
pub fn validate<R: Settings>(record: &R) -> Result<(), ValidationErrors> {
    let node = record.to_node();
    let values = node.as_mapping().cloned().unwrap_or_default();

    let mut errors = Vec::new();
    validate_fields(&R::descriptor(), &values, "", &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule<'a> {
    text: &'a str,
    name: &'a str,
    param: &'a str,
}

fn parse_rules(rules: &str) -> Vec<Rule<'_>> {
    rules
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|text| {
            let (name, param) = text.split_once('=').unwrap_or((text, ""));
            Rule {
                text,
                name: name.trim(),
                param: param.trim(),
            }
        })
        .collect()
}

fn validate_fields(
    descriptor: &StructDescriptor,
    values: &Mapping,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for field in &descriptor.fields {
        if field.kind == Kind::Promoted {
            if let Some(inner) = &field.fields {
                validate_fields(inner, values, path, errors);
            }
            continue;
        }

        let value = values.get(field.key).unwrap_or(&Node::Null);
        let field_path = join_key(path, field.key);

        if let Some(rules) = field.validate {
            let target = Target {
                field: field.name,
                path: &field_path,
                siblings: values,
            };
            target.apply(&parse_rules(rules), value, errors);
        }

        let Some(inner) = &field.fields else {
            continue;
        };
        match (field.kind, value) {
            (Kind::Record, Node::Mapping(nested)) => {
                validate_fields(inner, nested, &field_path, errors);
            }
            (Kind::Sequence, Node::Sequence(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if let Node::Mapping(nested) = item {
                        validate_fields(inner, nested, &format!("{field_path}[{i}]"), errors);
                    }
                }
            }
            (Kind::Mapping, Node::Mapping(entries)) => {
                for (key, item) in entries {
                    if let Node::Mapping(nested) = item {
                        validate_fields(inner, nested, &join_key(&field_path, key), errors);
                    }
                }
            }
            _ => {}
        }
    }
}

struct Target<'a> {
    field: &'static str,
    path: &'a str,
    siblings: &'a Mapping,
}

impl Target<'_> {
    fn apply(&self, rules: &[Rule<'_>], value: &Node, errors: &mut Vec<ValidationError>) {
        for (i, rule) in rules.iter().enumerate() {
            match rule.name {
                "omitempty" if is_zero(value) => return,
                "omitempty" => {}
                "dive" => {
                    let rest = &rules[i + 1..];
                    match value {
                        Node::Sequence(items) => {
                            for (index, item) in items.iter().enumerate() {
                                self.element(&format!("{}[{index}]", self.path))
                                    .apply(rest, item, errors);
                            }
                        }
                        Node::Mapping(entries) => {
                            for (key, item) in entries {
                                self.element(&join_key(self.path, key)).apply(rest, item, errors);
                            }
                        }
                        _ => {}
                    }
                    return;
                }
                _ => {
                    if !self.check(rule, value) {
                        errors.push(ValidationError {
                            field: self.field.to_string(),
                            path: self.path.to_string(),
                            rule: rule.text.to_string(),
                            value: value.to_display_string(),
                        });
                    }
                }
            }
        }
    }

    fn element<'p>(&self, path: &'p str) -> Target<'p>
    where
        Self: 'p,
    {
        Target {
            field: self.field,
            path,
            siblings: self.siblings,
        }
    }

    fn check(&self, rule: &Rule<'_>, value: &Node) -> bool {
        let ordering = || compare(value, rule.param);
        match rule.name {
            "required" => !is_zero(value),
            "oneof" => {
                let rendered = value.to_display_string();
                rule.param.split_whitespace().any(|option| option == rendered)
            }
            "min" | "gte" => ordering().is_some_and(|o| o != Ordering::Less),
            "max" | "lte" => ordering().is_some_and(|o| o != Ordering::Greater),
            "len" => ordering() == Some(Ordering::Equal),
            "gt" => ordering() == Some(Ordering::Greater),
            "lt" => ordering() == Some(Ordering::Less),
            "required_unless" => {
                let mut parts = rule.param.split_whitespace();
                let (Some(other), expected) = (parts.next(), parts.next().unwrap_or("")) else {
                    return !is_zero(value);
                };
                let other = self
                    .siblings
                    .get(other)
                    .map(Node::to_display_string)
                    .unwrap_or_default();
                other == expected || !is_zero(value)
            }
            "required_with" => {
                let other_set = self
                    .siblings
                    .get(rule.param)
                    .is_some_and(|other| !is_zero(other));
                !other_set || !is_zero(value)
            }
            _ => true,
        }
    }
}

/// Whether `value` equals the zero value of its kind.
fn is_zero(value: &Node) -> bool {
    match value {
        Node::Null => true,
        Node::Bool(b) => !b,
        Node::Int(i) => *i == 0,
        Node::Float(f) => *f == 0.0,
        Node::String(s) => s.is_empty(),
        Node::Duration(d) => d.is_zero(),
        Node::Time(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
        Node::Sequence(items) => items.is_empty(),
        Node::Mapping(entries) => entries.is_empty(),
    }
}

/// Order `value` against a rule parameter. Numbers compare by value,
/// durations by length of time and everything else by its length.
fn compare(value: &Node, param: &str) -> Option<Ordering> {
    match value {
        Node::Int(i) => (*i as f64).partial_cmp(&param.parse::<f64>().ok()?),
        Node::Float(f) => f.partial_cmp(&param.parse::<f64>().ok()?),
        Node::Duration(d) => Some(d.cmp(&parse_duration_param(param)?)),
        Node::String(s) => Some(s.chars().count().cmp(&param.parse::<usize>().ok()?)),
        Node::Sequence(items) => Some(items.len().cmp(&param.parse::<usize>().ok()?)),
        Node::Mapping(entries) => Some(entries.len().cmp(&param.parse::<usize>().ok()?)),
        Node::Null => Some(0usize.cmp(&param.parse::<usize>().ok()?)),
        Node::Bool(_) | Node::Time(_) => None,
    }
}

fn parse_duration_param(param: &str) -> Option<Duration> {
    humantime::parse_duration(param)
        .ok()
        .or_else(|| param.parse::<u64>().ok().map(Duration::from_secs))
}
